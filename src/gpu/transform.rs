// SPDX-License-Identifier: GPL-3.0-only

//! 4×4 texture transform matrices
//!
//! Matrices are column-major, matching what `glUniformMatrix4fv` expects with
//! `transpose = false`. They transform texture coordinates `(s, t, 0, 1)`.

/// Column-major 4×4 matrix applied to texture coordinates when sampling
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TransformMatrix(pub [f32; 16]);

impl TransformMatrix {
    pub const IDENTITY: TransformMatrix = TransformMatrix([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    /// Flip `t` (row order) so top-down images sample upright: t' = 1 - t
    pub fn vertical_flip() -> Self {
        TransformMatrix([
            1.0, 0.0, 0.0, 0.0, //
            0.0, -1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 1.0, 0.0, 1.0,
        ])
    }

    /// Mirror `s`: s' = 1 - s
    pub fn horizontal_flip() -> Self {
        TransformMatrix([
            -1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            1.0, 0.0, 0.0, 1.0,
        ])
    }

    /// Rotate texture coordinates by `degrees` around the texture center
    ///
    /// Only multiples of 90° are meaningful for camera frames; other values are
    /// snapped down to the previous multiple.
    pub fn rotation(degrees: u32) -> Self {
        // (s, t) -> rotated around (0.5, 0.5)
        let (cos, sin) = match (degrees / 90) % 4 {
            0 => return Self::IDENTITY,
            1 => (0.0, 1.0),
            2 => (-1.0, 0.0),
            _ => (0.0, -1.0),
        };
        // Translate to origin, rotate, translate back
        let tx = 0.5 - 0.5 * cos + 0.5 * sin;
        let ty = 0.5 - 0.5 * sin - 0.5 * cos;
        TransformMatrix([
            cos, sin, 0.0, 0.0, //
            -sin, cos, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            tx, ty, 0.0, 1.0,
        ])
    }

    /// Matrix product `self * rhs` (apply `rhs` first)
    pub fn multiply(&self, rhs: &TransformMatrix) -> TransformMatrix {
        let a = &self.0;
        let b = &rhs.0;
        let mut out = [0.0f32; 16];
        for col in 0..4 {
            for row in 0..4 {
                out[col * 4 + row] = (0..4).map(|k| a[k * 4 + row] * b[col * 4 + k]).sum();
            }
        }
        TransformMatrix(out)
    }

    /// Transform a texture coordinate
    pub fn apply(&self, s: f32, t: f32) -> (f32, f32) {
        let m = &self.0;
        (
            m[0] * s + m[4] * t + m[12],
            m[1] * s + m[5] * t + m[13],
        )
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

impl Default for TransformMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

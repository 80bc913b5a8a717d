// SPDX-License-Identifier: GPL-3.0-only

//! Filter shaders and the programs that run them
//!
//! Every filter stage is a GLSL ES 1.00 vertex/fragment pair drawn over a
//! full-screen quad. Stages agree on one interface:
//!
//! - attributes `aPosition` and `aTextureCoord`
//! - uniforms `inputTexture` (sampler) and `transformMatrix` (mat4 applied
//!   to texture coordinates)

mod filter_program;

pub use filter_program::{FilterChain, FilterProgram};

use serde::{Deserialize, Serialize};

/// Vertex shader shared by all built-in filters
pub const PASSTHROUGH_VERTEX_SHADER: &str = include_str!("passthrough.vert");

/// Samples the input texture unchanged
pub const PASSTHROUGH_FRAGMENT_SHADER: &str = include_str!("passthrough.frag");

/// Rec. 601 luma
pub const GRAYSCALE_FRAGMENT_SHADER: &str = include_str!("grayscale.frag");

pub const ATTRIB_POSITION: &str = "aPosition";
pub const ATTRIB_TEXTURE_COORD: &str = "aTextureCoord";
pub const UNIFORM_INPUT_TEXTURE: &str = "inputTexture";
pub const UNIFORM_TRANSFORM_MATRIX: &str = "transformMatrix";

/// Full-screen quad as a triangle strip, (x, y) per vertex
pub const QUAD_VERTICES: [f32; 8] = [
    -1.0, -1.0, //
    1.0, -1.0, //
    -1.0, 1.0, //
    1.0, 1.0,
];

/// Texture coordinates matching [`QUAD_VERTICES`], (s, t) per vertex
pub const QUAD_TEXTURE_COORDS: [f32; 8] = [
    0.0, 0.0, //
    1.0, 0.0, //
    0.0, 1.0, //
    1.0, 1.0,
];

/// Components per vertex in the quad arrays
pub const COORDS_PER_VERTEX: i32 = 2;

/// Filters that ship with the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinFilter {
    #[default]
    Passthrough,
    Grayscale,
}

impl BuiltinFilter {
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinFilter::Passthrough => "passthrough",
            BuiltinFilter::Grayscale => "grayscale",
        }
    }

    pub fn fragment_source(&self) -> &'static str {
        match self {
            BuiltinFilter::Passthrough => PASSTHROUGH_FRAGMENT_SHADER,
            BuiltinFilter::Grayscale => GRAYSCALE_FRAGMENT_SHADER,
        }
    }
}

/// Shader sources for one filter stage, as configured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSource {
    Builtin { filter: BuiltinFilter },
    Custom {
        name: String,
        vertex: String,
        fragment: String,
    },
}

impl FilterSource {
    pub fn builtin(filter: BuiltinFilter) -> Self {
        FilterSource::Builtin { filter }
    }

    /// Name used in logs
    pub fn name(&self) -> &str {
        match self {
            FilterSource::Builtin { filter } => filter.name(),
            FilterSource::Custom { name, .. } => name,
        }
    }

    pub fn vertex_source(&self) -> &str {
        match self {
            FilterSource::Builtin { .. } => PASSTHROUGH_VERTEX_SHADER,
            FilterSource::Custom { vertex, .. } => vertex,
        }
    }

    pub fn fragment_source(&self) -> &str {
        match self {
            FilterSource::Builtin { filter } => filter.fragment_source(),
            FilterSource::Custom { fragment, .. } => fragment,
        }
    }
}

impl Default for FilterSource {
    fn default() -> Self {
        FilterSource::builtin(BuiltinFilter::Passthrough)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_shaders_use_shared_interface() {
        for name in [ATTRIB_POSITION, ATTRIB_TEXTURE_COORD, UNIFORM_TRANSFORM_MATRIX] {
            assert!(PASSTHROUGH_VERTEX_SHADER.contains(name), "{}", name);
        }
        for filter in [BuiltinFilter::Passthrough, BuiltinFilter::Grayscale] {
            assert!(filter.fragment_source().contains(UNIFORM_INPUT_TEXTURE));
        }
    }

    #[test]
    fn test_filter_source_json_shape() {
        let json = serde_json::to_string(&FilterSource::builtin(BuiltinFilter::Grayscale)).unwrap();
        assert_eq!(json, r#"{"kind":"builtin","filter":"grayscale"}"#);

        let custom: FilterSource = serde_json::from_str(
            r#"{"kind":"custom","name":"invert","vertex":"v","fragment":"f"}"#,
        )
        .unwrap();
        assert_eq!(custom.name(), "invert");
        assert_eq!(custom.vertex_source(), "v");
        assert_eq!(custom.fragment_source(), "f");
    }
}

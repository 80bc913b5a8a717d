// SPDX-License-Identifier: GPL-3.0-only

//! GPU texture receiving camera frames

use super::surface::TextureFrame;
use crate::errors::{PipelineError, PipelineResult};
use crate::gpu::{GlApi, TextureId, TransformMatrix};
use tracing::debug;

/// The texture the filter chain samples, plus the transform of its current frame
#[derive(Debug)]
pub struct FrameTexture {
    id: TextureId,
    width: u32,
    height: u32,
    transform: TransformMatrix,
}

impl FrameTexture {
    pub fn new(gl: &dyn GlApi) -> PipelineResult<Self> {
        let id = gl.create_texture().map_err(|e| {
            PipelineError::ContextCreationFailed(format!("frame texture: {}", e))
        })?;
        debug!(texture = id.0, "Frame texture created");
        Ok(Self {
            id,
            width: 0,
            height: 0,
            transform: TransformMatrix::IDENTITY,
        })
    }

    /// Upload `frame` and adopt its transform
    pub fn update(&mut self, gl: &dyn GlApi, frame: &TextureFrame) -> Result<(), String> {
        gl.upload_rgba(self.id, frame.width, frame.height, &frame.pixels)?;
        self.width = frame.width;
        self.height = frame.height;
        self.transform = frame.transform;
        Ok(())
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn transform(&self) -> &TransformMatrix {
        &self.transform
    }

    /// Size of the last uploaded frame, `(0, 0)` before the first one
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn has_frame(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn release(self, gl: &dyn GlApi) {
        gl.delete_texture(self.id);
        debug!(texture = self.id.0, "Frame texture deleted");
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Frame rendering
//!
//! - [`surface`]: where the camera publishes frames, and the coalescing signal
//! - [`frame_texture`]: the GPU texture those frames are uploaded into
//! - [`engine`]: the worker that owns the GPU context and draws

pub mod engine;
pub mod frame_texture;
pub mod surface;

pub use engine::{RenderCommand, RenderCore, RenderEngine, RenderStats};
pub use frame_texture::FrameTexture;
pub use surface::{CameraSurface, FrameSignal, TextureFrame};

// SPDX-License-Identifier: GPL-3.0-only

//! Live Preview - camera capture into a GPU-rendered preview
//!
//! Two workers cooperate: a camera worker that owns the device session and a
//! render worker that owns the GL context. Frames flow from the camera's
//! pipeline into a [`render::CameraSurface`]; each new frame schedules one
//! render, coalesced while a render is still pending.
//!
//! # Architecture
//!
//! - [`backends`]: Camera HAL trait, GStreamer implementation, and the camera controller
//! - [`render`]: Render engine, frame texture and the camera surface
//! - [`shaders`]: Filter programs and the built-in shader sources
//! - [`gpu`]: GL abstraction, EGL context creation and texture transforms
//! - [`worker`]: Single-thread command workers
//! - [`config`]: JSON settings
//! - [`status`]: Status listeners

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod gpu;
pub mod render;
pub mod shaders;
pub mod status;
pub mod worker;

// Re-export commonly used types
pub use backends::camera::{CameraController, CameraState, PreviewConfig};
pub use config::Config;
pub use errors::{ErrorCode, PipelineError, PipelineResult};
pub use render::RenderEngine;
pub use status::{CameraStatusListener, ChannelListener, RenderStatusListener, StatusEvent};

// SPDX-License-Identifier: GPL-3.0-only

//! Camera hardware abstraction and session control
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │       Caller         │  open / start_preview / stop_preview / close
//! └──────────┬───────────┘
//!            │ posts commands
//!            ▼
//! ┌──────────────────────┐
//! │  CameraController    │  ← camera worker thread, negotiation, state
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │ CameraHal / Device   │  ← common interface
//! └──────────┬───────────┘
//!            │
//!            ▼
//!      ┌───────────┐
//!      │ GStreamer │  ← concrete implementation
//!      └───────────┘
//! ```

pub mod buffer_ring;
pub mod controller;
pub mod gstreamer;
pub mod negotiation;
pub mod types;

pub use buffer_ring::{BufferRing, ConsumerSlot, PreviewConsumer};
pub use controller::{CameraCommand, CameraController, CameraCore, select_camera};
pub use types::*;

use crate::render::CameraSurface;
use std::sync::Arc;

/// Camera enumeration and device access
///
/// Implementations must be cheap to share; the controller calls them from its
/// worker thread only.
pub trait CameraHal: Send + Sync {
    /// Backend name, for logging
    fn name(&self) -> &str;

    /// Enumerate available cameras
    fn cameras(&self) -> Vec<CameraInfo>;

    /// Open a camera for exclusive use
    fn open(&self, camera: &CameraInfo) -> BackendResult<Box<dyn CameraDevice>>;
}

/// An open camera
///
/// Every method is called on the camera worker thread. Preview frames are
/// delivered from the device's own threads into the preview surface and the
/// buffer ring.
pub trait CameraDevice {
    /// Supported and currently selected parameters
    fn parameters(&self) -> BackendResult<CameraParameters>;

    /// Apply the selected size, format and frame rate
    fn set_parameters(&mut self, params: &CameraParameters) -> BackendResult<()>;

    /// Rotation, in degrees clockwise, the preview should be displayed with
    fn set_display_orientation(&mut self, degrees: u32) -> BackendResult<()>;

    /// Surface receiving preview frames; `None` detaches it
    fn set_preview_surface(&mut self, surface: Option<Arc<CameraSurface>>) -> BackendResult<()>;

    /// Ring receiving raw preview buffers; `None` detaches it
    fn set_buffer_ring(&mut self, ring: Option<BufferRing>);

    fn start_preview(&mut self) -> BackendResult<()>;

    fn stop_preview(&mut self) -> BackendResult<()>;

    /// Release the device. The device is not used afterwards.
    fn release(&mut self);
}

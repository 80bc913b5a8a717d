// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for the camera HAL and controller

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which way a camera points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    /// Toward the user; the preview is mirrored
    #[default]
    Front,
    Back,
    /// USB or otherwise detached camera; treated like a rear camera
    External,
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Facing::Front => write!(f, "front"),
            Facing::Back => write!(f, "back"),
            Facing::External => write!(f, "external"),
        }
    }
}

/// A camera as reported by enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    /// Stable identifier the HAL uses to open the device
    pub id: String,
    /// Human-readable name
    pub name: String,
    pub facing: Facing,
    /// Clockwise sensor mounting angle in degrees (0, 90, 180, 270)
    pub orientation: u32,
}

impl fmt::Display for CameraInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {}°)", self.name, self.facing, self.orientation)
    }
}

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `width / height`; 0 for a zero height
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f64 / self.height as f64
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel layouts the preview path can negotiate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, three planes
    I420,
    /// Semi-planar YUV 4:2:0, interleaved UV
    Nv12,
    /// Semi-planar YUV 4:2:0, interleaved VU
    Nv21,
    /// Packed YUV 4:2:2
    Yuy2,
    /// Packed 8-bit RGBA
    Rgba,
}

impl PixelFormat {
    /// Average bits per pixel across all planes
    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::I420 | PixelFormat::Nv12 | PixelFormat::Nv21 => 12,
            PixelFormat::Yuy2 => 16,
            PixelFormat::Rgba => 32,
        }
    }

    /// GStreamer `format` caps string
    pub fn gst_name(&self) -> &'static str {
        match self {
            PixelFormat::I420 => "I420",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Nv21 => "NV21",
            PixelFormat::Yuy2 => "YUY2",
            PixelFormat::Rgba => "RGBA",
        }
    }

    /// Parse a GStreamer `format` caps string
    pub fn from_gst_name(name: &str) -> Option<Self> {
        match name {
            "I420" => Some(PixelFormat::I420),
            "NV12" => Some(PixelFormat::Nv12),
            "NV21" => Some(PixelFormat::Nv21),
            "YUY2" => Some(PixelFormat::Yuy2),
            "RGBA" => Some(PixelFormat::Rgba),
            _ => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.gst_name())
    }
}

/// Frame rate range in whole frames per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FpsRange {
    pub min: u32,
    pub max: u32,
}

impl FpsRange {
    pub const fn fixed(fps: u32) -> Self {
        Self { min: fps, max: fps }
    }

    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }
}

impl fmt::Display for FpsRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_fixed() {
            write!(f, "{} fps", self.max)
        } else {
            write!(f, "{}-{} fps", self.min, self.max)
        }
    }
}

/// What a device supports and what is currently selected
///
/// Read with `CameraDevice::parameters`, adjusted by negotiation, written back
/// with `CameraDevice::set_parameters`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CameraParameters {
    pub supported_sizes: Vec<Size>,
    pub supported_formats: Vec<PixelFormat>,
    pub supported_fps_ranges: Vec<FpsRange>,
    pub preview_size: Option<Size>,
    pub preview_format: Option<PixelFormat>,
    pub fps_range: Option<FpsRange>,
}

/// Observable controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CameraState {
    #[default]
    Closed,
    Opened,
    Previewing,
    /// Worker torn down; no further commands run
    Released,
}

impl fmt::Display for CameraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraState::Closed => write!(f, "closed"),
            CameraState::Opened => write!(f, "opened"),
            CameraState::Previewing => write!(f, "previewing"),
            CameraState::Released => write!(f, "released"),
        }
    }
}

/// The negotiated preview configuration of the open session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewConfig {
    pub size: Size,
    pub format: PixelFormat,
    /// Rotation applied to the preview, degrees clockwise
    pub orientation: u32,
    /// Bytes per raw preview buffer
    pub buffer_size: usize,
    pub fps_range: Option<FpsRange>,
}

impl fmt::Display for PreviewConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} rot {}° ({} bytes/frame)",
            self.size, self.format, self.orientation, self.buffer_size
        )?;
        if let Some(fps) = self.fps_range {
            write!(f, " @ {}", fps)?;
        }
        Ok(())
    }
}

/// Result type alias using BackendError
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors raised by camera HAL implementations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Backend is not available on this system
    NotAvailable(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Device exists but is in use
    Busy(String),
    /// The device refused the requested parameters
    ParametersRejected(String),
    /// Preview could not be started
    PreviewFailed(String),
    /// Preview could not be stopped
    StopFailed(String),
    /// Backend crashed or became unresponsive
    Crashed(String),
    /// Other errors
    Other(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::Busy(msg) => write!(f, "Device busy: {}", msg),
            BackendError::ParametersRejected(msg) => write!(f, "Parameters rejected: {}", msg),
            BackendError::PreviewFailed(msg) => write!(f, "Preview failed: {}", msg),
            BackendError::StopFailed(msg) => write!(f, "Stop failed: {}", msg),
            BackendError::Crashed(msg) => write!(f, "Backend crashed: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

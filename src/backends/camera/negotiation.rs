// SPDX-License-Identifier: GPL-3.0-only

//! Preview parameter negotiation
//!
//! Pure functions over what the device reports. The controller runs them once
//! per open, on the camera worker.

use super::types::{CameraParameters, Facing, FpsRange, PixelFormat, PreviewConfig, Size};
use crate::constants::negotiation::ASPECT_TOLERANCE;

/// Format the preview path asks for first
pub const TARGET_FORMAT: PixelFormat = PixelFormat::I420;

/// `target` if the device supports it, otherwise whatever it currently uses
pub fn choose_preview_format(
    supported: &[PixelFormat],
    current: Option<PixelFormat>,
) -> Option<PixelFormat> {
    if supported.contains(&TARGET_FORMAT) {
        Some(TARGET_FORMAT)
    } else {
        current.or_else(|| supported.first().copied())
    }
}

/// Pick the preview size for a requested `width`×`height`
///
/// Sizes whose aspect ratio is within [`ASPECT_TOLERANCE`] of the requested
/// ratio win, closest height first. Without such a size, the smallest ratio
/// difference wins and height breaks ties. Ties keep the earliest size.
/// Returns `None` only when `supported` is empty.
pub fn choose_preview_size(supported: &[Size], width: u32, height: u32) -> Option<Size> {
    if height == 0 {
        return supported.first().copied();
    }
    let target_ratio = width as f64 / height as f64;
    let ratio_diff = |size: &Size| (size.aspect_ratio() - target_ratio).abs();
    let height_diff = |size: &Size| size.height.abs_diff(height);

    let within_tolerance = supported
        .iter()
        .filter(|size| ratio_diff(size) <= ASPECT_TOLERANCE)
        .min_by_key(|size| height_diff(size));
    if let Some(size) = within_tolerance {
        return Some(*size);
    }

    supported
        .iter()
        .min_by(|a, b| {
            ratio_diff(a)
                .total_cmp(&ratio_diff(b))
                .then_with(|| height_diff(a).cmp(&height_diff(b)))
        })
        .copied()
}

/// A fixed `[fps, fps]` range if the device offers one
pub fn choose_fixed_fps(supported: &[FpsRange], fps: u32) -> Option<FpsRange> {
    supported
        .iter()
        .find(|range| range.is_fixed() && range.max == fps)
        .copied()
}

/// Rotation to apply to the preview so it appears upright
///
/// `rotation` is the display rotation in degrees. Front cameras are mirrored,
/// so their result is compensated.
pub fn display_orientation(facing: Facing, sensor_orientation: u32, rotation: u32) -> u32 {
    match facing {
        Facing::Front => (360 - ((sensor_orientation + rotation) % 360)) % 360,
        Facing::Back | Facing::External => (sensor_orientation + 360 - rotation % 360) % 360,
    }
}

/// Bytes needed for one raw preview frame
pub fn preview_buffer_size(size: Size, format: PixelFormat) -> usize {
    (size.width as usize * size.height as usize * format.bits_per_pixel() as usize) / 8
}

/// Apply every negotiation step to `params`
///
/// Returns the resulting configuration, or `None` if the device reports no
/// preview sizes or no usable format.
pub fn negotiate(
    params: &mut CameraParameters,
    facing: Facing,
    sensor_orientation: u32,
    display_rotation: u32,
    requested: Size,
    target_fps: u32,
) -> Option<PreviewConfig> {
    let format = choose_preview_format(&params.supported_formats, params.preview_format)?;
    let size = choose_preview_size(&params.supported_sizes, requested.width, requested.height)?;
    if let Some(range) = choose_fixed_fps(&params.supported_fps_ranges, target_fps) {
        params.fps_range = Some(range);
    }
    params.preview_format = Some(format);
    params.preview_size = Some(size);

    Some(PreviewConfig {
        size,
        format,
        orientation: display_orientation(facing, sensor_orientation, display_rotation),
        buffer_size: preview_buffer_size(size, format),
        fps_range: params.fps_range,
    })
}

// SPDX-License-Identifier: GPL-3.0-only

//! Camera discovery through the GStreamer device monitor
//!
//! Every `Video/Source` device becomes a [`CameraInfo`]. Supported sizes,
//! formats and frame rates are read from the device caps.

use super::super::types::{CameraInfo, CameraParameters, Facing, FpsRange, PixelFormat, Size};
use crate::constants::pipeline::VIDEO_SOURCE_CLASS;
use gstreamer::prelude::*;
use tracing::{debug, info, warn};

/// A discovered device and its metadata
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub info: CameraInfo,
    pub device: gstreamer::Device,
}

/// List video sources known to GStreamer
pub fn enumerate_devices() -> Vec<DiscoveredDevice> {
    if let Err(e) = gstreamer::init() {
        warn!(error = %e, "GStreamer init failed");
        return Vec::new();
    }

    let monitor = gstreamer::DeviceMonitor::new();
    let _ = monitor.add_filter(Some(VIDEO_SOURCE_CLASS), None);
    if let Err(e) = monitor.start() {
        warn!(error = %e, "Device monitor failed to start");
        return Vec::new();
    }
    let devices: Vec<gstreamer::Device> = monitor.devices().into_iter().collect();
    monitor.stop();

    let discovered: Vec<DiscoveredDevice> = devices
        .into_iter()
        .map(|device| DiscoveredDevice {
            info: describe(&device),
            device,
        })
        .collect();

    for d in &discovered {
        debug!(id = %d.info.id, camera = %d.info, "Found video source");
    }
    info!(count = discovered.len(), "Enumerated GStreamer video sources");
    discovered
}

/// Build the camera description from device properties
fn describe(device: &gstreamer::Device) -> CameraInfo {
    let name = device.display_name().to_string();
    let props = device.properties();

    let string_prop = |key: &str| {
        props
            .as_ref()
            .and_then(|p| p.get::<String>(key).ok())
            .filter(|v| !v.is_empty())
    };

    let id = ["api.v4l2.path", "device.path", "object.path", "api.libcamera.path"]
        .into_iter()
        .find_map(|key| string_prop(key))
        .unwrap_or_else(|| name.clone());

    let facing = match string_prop("api.libcamera.location").as_deref() {
        Some("front") => Facing::Front,
        Some("back") => Facing::Back,
        _ => Facing::External,
    };

    let orientation = props
        .as_ref()
        .and_then(|p| {
            p.get::<i32>("api.libcamera.rotation")
                .ok()
                .or_else(|| p.get::<String>("api.libcamera.rotation").ok()?.parse().ok())
        })
        .map(|r| r.rem_euclid(360) as u32)
        .unwrap_or(0);

    CameraInfo {
        id,
        name,
        facing,
        orientation,
    }
}

/// Collect what raw video caps advertise
///
/// Non-raw structures (e.g. `image/jpeg`) and range-valued fields are skipped.
pub fn parameters_from_caps(caps: &gstreamer::CapsRef) -> CameraParameters {
    let mut params = CameraParameters::default();

    for s in caps.iter() {
        if !s.has_name("video/x-raw") {
            continue;
        }

        let mut formats = Vec::new();
        if let Ok(format) = s.get::<&str>("format") {
            formats.extend(PixelFormat::from_gst_name(format));
        } else if let Ok(list) = s.get::<gstreamer::List>("format") {
            formats.extend(
                list.iter()
                    .filter_map(|v| v.get::<&str>().ok())
                    .filter_map(PixelFormat::from_gst_name),
            );
        }
        for format in formats {
            if !params.supported_formats.contains(&format) {
                params.supported_formats.push(format);
            }
        }

        if let (Ok(w), Ok(h)) = (s.get::<i32>("width"), s.get::<i32>("height"))
            && w > 0
            && h > 0
        {
            let size = Size::new(w as u32, h as u32);
            if !params.supported_sizes.contains(&size) {
                params.supported_sizes.push(size);
            }
        }

        let mut rates = Vec::new();
        if let Ok(rate) = s.get::<gstreamer::Fraction>("framerate") {
            rates.push(rate);
        } else if let Ok(list) = s.get::<gstreamer::List>("framerate") {
            rates.extend(list.iter().filter_map(|v| v.get::<gstreamer::Fraction>().ok()));
        }
        for rate in rates {
            if rate.denom() > 0 && rate.numer() > 0 {
                let fps = FpsRange::fixed((rate.numer() / rate.denom()) as u32);
                if !params.supported_fps_ranges.contains(&fps) {
                    params.supported_fps_ranges.push(fps);
                }
            }
        }
    }

    params
}

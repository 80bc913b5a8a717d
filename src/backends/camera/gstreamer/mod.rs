// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer camera HAL
//!
//! Real cameras come from the GStreamer device monitor; a `videotestsrc`
//! "Test Pattern" device can be added so the whole pipeline runs without
//! hardware.

mod device;
mod enumeration;

pub use device::GstCameraDevice;
pub use enumeration::{DiscoveredDevice, enumerate_devices, parameters_from_caps};

use super::types::{BackendError, BackendResult, CameraInfo, Facing};
use super::{CameraDevice, CameraHal};
use crate::constants::pipeline::{TEST_PATTERN_ID, TEST_PATTERN_NAME};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};

/// Where a device's frames come from
#[derive(Debug, Clone)]
pub(crate) enum SourceSpec {
    Device(gstreamer::Device),
    TestPattern,
}

/// Camera HAL backed by GStreamer
pub struct GstCameraHal {
    include_test_pattern: bool,
    /// Devices seen by the last enumeration, by camera id
    devices: Mutex<HashMap<String, gstreamer::Device>>,
}

impl GstCameraHal {
    /// `include_test_pattern` appends the synthetic test pattern camera
    pub fn new(include_test_pattern: bool) -> Self {
        Self {
            include_test_pattern,
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// The synthetic camera description
    pub fn test_pattern_info() -> CameraInfo {
        CameraInfo {
            id: TEST_PATTERN_ID.to_string(),
            name: TEST_PATTERN_NAME.to_string(),
            facing: Facing::External,
            orientation: 0,
        }
    }
}

impl Default for GstCameraHal {
    fn default() -> Self {
        Self::new(true)
    }
}

impl CameraHal for GstCameraHal {
    fn name(&self) -> &str {
        "gstreamer"
    }

    fn cameras(&self) -> Vec<CameraInfo> {
        let discovered = enumerate_devices();
        let mut cameras: Vec<CameraInfo> = discovered.iter().map(|d| d.info.clone()).collect();

        let mut devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
        devices.clear();
        devices.extend(discovered.into_iter().map(|d| (d.info.id, d.device)));
        drop(devices);

        if self.include_test_pattern {
            cameras.push(Self::test_pattern_info());
        }
        debug!(count = cameras.len(), "Cameras available");
        cameras
    }

    fn open(&self, camera: &CameraInfo) -> BackendResult<Box<dyn CameraDevice>> {
        gstreamer::init().map_err(|e| BackendError::NotAvailable(e.to_string()))?;

        let source = if camera.id == TEST_PATTERN_ID {
            SourceSpec::TestPattern
        } else {
            let devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
            let device = devices
                .get(&camera.id)
                .cloned()
                .ok_or_else(|| BackendError::DeviceNotFound(camera.id.clone()))?;
            SourceSpec::Device(device)
        };

        let device = GstCameraDevice::open(camera.clone(), source)?;
        info!(camera = %camera, "GStreamer camera opened");
        Ok(Box::new(device))
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Persistent settings
//!
//! Stored as JSON under the platform config directory. Missing fields take
//! their defaults, so a partial file is valid.

use crate::backends::camera::Facing;
use crate::constants::app_info::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use crate::constants::buffers::PREVIEW_BUFFER_COUNT;
use crate::constants::negotiation::{
    DEFAULT_PREVIEW_HEIGHT, DEFAULT_PREVIEW_WIDTH, DEFAULT_TARGET_FPS,
};
use crate::constants::render::CLEAR_COLOR;
use crate::errors::ConfigError;
use crate::shaders::FilterSource;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Camera selection and preview negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Preferred lens facing
    pub facing: Facing,
    /// Camera id or name; overrides `facing` when it matches a device
    pub device: Option<String>,
    /// Requested preview width
    pub preview_width: u32,
    /// Requested preview height
    pub preview_height: u32,
    /// Frame rate used when picking a fixed fps range
    pub target_fps: u32,
    /// Number of preview callback buffers
    pub buffer_count: usize,
    /// Rotation of the display the preview is shown on, degrees clockwise
    pub display_rotation: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            facing: Facing::default(),
            device: None,
            preview_width: DEFAULT_PREVIEW_WIDTH,
            preview_height: DEFAULT_PREVIEW_HEIGHT,
            target_fps: DEFAULT_TARGET_FPS,
            buffer_count: PREVIEW_BUFFER_COUNT,
            display_rotation: 0,
        }
    }
}

/// Render engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Filter stages applied in order; empty means passthrough
    pub filters: Vec<FilterSource>,
    /// RGBA color the target is cleared to before each frame
    pub clear_color: [f32; 4],
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            filters: vec![FilterSource::default()],
            clear_color: CLEAR_COLOR,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraSettings,
    pub render: RenderSettings,
}

impl Config {
    /// `<config dir>/live-preview/config.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load `path`, falling back to defaults when it is missing or invalid
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No configuration file, using defaults");
                Self::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring configuration file");
                Self::default()
            }
        }
    }

    /// Write pretty-printed JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        info!(path = %path.display(), "Configuration saved");
        Ok(())
    }
}

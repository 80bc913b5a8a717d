// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use live_preview::Config;
use live_preview::backends::camera::Facing;
use live_preview::config::RenderSettings;
use live_preview::constants::buffers::PREVIEW_BUFFER_COUNT;
use live_preview::errors::ConfigError;
use live_preview::shaders::{BuiltinFilter, FilterSource};

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.camera.facing, Facing::Front);
    assert_eq!(config.camera.device, None);
    assert_eq!(config.camera.buffer_count, PREVIEW_BUFFER_COUNT);
    assert_eq!(config.camera.display_rotation, 0);
    assert_eq!(
        (config.camera.preview_width, config.camera.preview_height),
        (1280, 720)
    );
    assert_eq!(config.render.filters, vec![FilterSource::default()]);
}

#[test]
fn test_config_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.camera.facing = Facing::Back;
    config.camera.device = Some("/dev/video2".to_string());
    config.camera.buffer_count = 5;
    config.camera.display_rotation = 270;
    config.render.filters = vec![FilterSource::builtin(BuiltinFilter::Grayscale)];
    config.render.clear_color = [0.1, 0.2, 0.3, 1.0];

    config.save(&path).unwrap();
    assert_eq!(Config::load(&path).unwrap(), config);
}

#[test]
fn test_missing_fields_take_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "camera": { "facing": "back", "preview_width": 640 } }"#).unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.camera.facing, Facing::Back);
    assert_eq!(config.camera.preview_width, 640);
    assert_eq!(config.camera.preview_height, 720);
    assert_eq!(config.camera.buffer_count, PREVIEW_BUFFER_COUNT);
    assert_eq!(config.render, RenderSettings::default());
}

#[test]
fn test_invalid_file_is_reported_and_defaulted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    assert_eq!(Config::load_or_default(&path), Config::default());
}

#[test]
fn test_missing_file_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");

    assert!(matches!(Config::load(&path), Err(ConfigError::Io(_))));
    assert_eq!(Config::load_or_default(&path), Config::default());
}

#[test]
fn test_custom_filter_round_trips_through_json() {
    let json = r#"{
        "render": {
            "filters": [
                { "kind": "builtin", "filter": "grayscale" },
                { "kind": "custom", "name": "sepia", "vertex": "v", "fragment": "f" }
            ]
        }
    }"#;
    let config: Config = serde_json::from_str(json).unwrap();
    assert_eq!(config.render.filters.len(), 2);
    assert_eq!(config.render.filters[1].name(), "sepia");
    assert_eq!(config.render.clear_color, [0.0, 0.0, 0.0, 1.0]);
}

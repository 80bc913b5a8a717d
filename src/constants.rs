// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline-wide constants

/// Camera parameter negotiation
pub mod negotiation {
    /// Maximum |ratio - target_ratio| for a preview size to count as a match
    pub const ASPECT_TOLERANCE: f64 = 0.1;

    /// Requested preview width when nothing is configured
    pub const DEFAULT_PREVIEW_WIDTH: u32 = 1280;

    /// Requested preview height when nothing is configured
    pub const DEFAULT_PREVIEW_HEIGHT: u32 = 720;

    /// Target frame rate used for fixed-range selection
    pub const DEFAULT_TARGET_FPS: u32 = 30;
}

/// Preview callback buffers
pub mod buffers {
    /// Number of pre-allocated preview buffers handed to the device
    pub const PREVIEW_BUFFER_COUNT: usize = 3;
}

/// GStreamer capture pipeline
pub mod pipeline {
    /// Maximum buffers queued in each appsink before old ones are dropped
    pub const MAX_BUFFERS: u32 = 2;

    /// Name of the appsink that delivers raw preview buffers
    pub const RAW_SINK_NAME: &str = "raw_sink";

    /// Name of the appsink that feeds the camera surface
    pub const TEXTURE_SINK_NAME: &str = "texture_sink";

    /// Format uploaded to the frame texture
    pub const TEXTURE_FORMAT: &str = "RGBA";

    /// Device class reported by GStreamer for cameras
    pub const VIDEO_SOURCE_CLASS: &str = "Video/Source";

    /// Identifier of the synthetic test pattern device
    pub const TEST_PATTERN_ID: &str = "videotestsrc";

    /// Display name of the synthetic test pattern device
    pub const TEST_PATTERN_NAME: &str = "Test Pattern";
}

/// Timing and logging intervals
pub mod timing {
    /// Log frame statistics every N frames
    pub const FRAME_LOG_INTERVAL: u64 = 120;

    /// Timeout for stopping pipeline (in seconds)
    pub const STOP_TIMEOUT_SECS: u64 = 2;

    /// Timeout for starting pipeline (in seconds)
    pub const START_TIMEOUT_SECS: u64 = 5;
}

/// Render engine defaults
pub mod render {
    /// Clear color used before drawing each frame (RGBA)
    pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

    /// Texture unit the camera texture is bound to
    pub const INPUT_TEXTURE_UNIT: u32 = 0;

    /// Vertices in the full-screen quad
    pub const QUAD_VERTEX_COUNT: i32 = 4;

    /// Offscreen surface size used by the CLI preview
    pub const OFFSCREEN_WIDTH: i32 = 1280;
    pub const OFFSCREEN_HEIGHT: i32 = 720;
}

/// Worker thread names
pub mod threads {
    pub const CAMERA_THREAD: &str = "camera-worker";
    pub const RENDER_THREAD: &str = "render-worker";
}

/// Application metadata
pub mod app_info {
    /// Directory name under the platform config dir
    pub const CONFIG_DIR_NAME: &str = "live-preview";

    /// Config file name inside [`CONFIG_DIR_NAME`]
    pub const CONFIG_FILE_NAME: &str = "config.json";

    /// Version string, including the commit hash when built from git
    pub fn version() -> &'static str {
        env!("LIVE_PREVIEW_BUILD_VERSION")
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! - `list`: enumerate cameras and their preview sizes
//! - `preview`: run camera and render workers headless for a few seconds

use live_preview::backends::camera::gstreamer::GstCameraHal;
use live_preview::backends::camera::{CameraController, CameraHal};
use live_preview::config::Config;
use live_preview::constants::pipeline::TEST_PATTERN_ID;
use live_preview::constants::render::{OFFSCREEN_HEIGHT, OFFSCREEN_WIDTH};
use live_preview::gpu::TargetSurface;
use live_preview::gpu::egl::EglContextFactory;
use live_preview::render::RenderEngine;
use live_preview::status::{ChannelListener, Source, StatusEvent};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, timeout_at};

/// How long to wait for the camera to report `stopped` after a close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// List all available cameras
pub fn list_cameras(test_pattern: bool) -> Result<(), Box<dyn std::error::Error>> {
    gstreamer::init()?;

    let hal = GstCameraHal::new(test_pattern);
    let cameras = hal.cameras();

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for (index, camera) in cameras.iter().enumerate() {
        println!("  [{}] {}", index, camera);
        println!("      id: {}", camera.id);

        let mut device = match hal.open(camera) {
            Ok(device) => device,
            Err(e) => {
                println!("      unavailable: {}", e);
                continue;
            }
        };
        match device.parameters() {
            Ok(params) => {
                let mut sizes = params.supported_sizes.clone();
                // Largest first
                sizes.sort_by(|a, b| (b.width * b.height).cmp(&(a.width * a.height)));
                let sizes: Vec<String> = sizes.iter().map(|s| s.to_string()).collect();
                let formats: Vec<String> =
                    params.supported_formats.iter().map(|f| f.to_string()).collect();
                println!("      sizes: {}", sizes.join(", "));
                println!("      formats: {}", formats.join(", "));
            }
            Err(e) => println!("      parameters unavailable: {}", e),
        }
        device.release();
    }

    Ok(())
}

/// Options for [`run_preview`]
pub struct PreviewOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub rotation: Option<u32>,
    pub seconds: u64,
    pub test_pattern: bool,
    pub config: Option<PathBuf>,
}

/// Run a headless preview and print what was negotiated and rendered
pub fn run_preview(options: PreviewOptions) -> Result<(), Box<dyn std::error::Error>> {
    gstreamer::init()?;

    let path = match options.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let mut config = Config::load_or_default(&path);
    if let Some(width) = options.width {
        config.camera.preview_width = width;
    }
    if let Some(height) = options.height {
        config.camera.preview_height = height;
    }
    if let Some(rotation) = options.rotation {
        config.camera.display_rotation = rotation;
    }
    if options.test_pattern {
        config.camera.device = Some(TEST_PATTERN_ID.to_string());
    }

    let (listener, events) = ChannelListener::new();
    let listener = Arc::new(listener);

    let mut engine = RenderEngine::new(
        Arc::new(EglContextFactory::new()),
        listener.clone(),
        config.render.clone(),
    )?;
    engine.init(TargetSurface::Offscreen {
        width: OFFSCREEN_WIDTH,
        height: OFFSCREEN_HEIGHT,
    });

    let hal = Arc::new(GstCameraHal::new(options.test_pattern));
    let mut controller = CameraController::new(hal, listener, config.camera.clone())?;

    let raw_buffers = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&raw_buffers);
    controller.set_preview_consumer(Some(Arc::new(move |_buffer: &[u8]| {
        counter.fetch_add(1, Ordering::Relaxed);
    })));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let failed = runtime.block_on(drive_session(
        &controller,
        &engine,
        events,
        Duration::from_secs(options.seconds),
    ));

    controller.release_and_wait();
    engine.release_and_wait();

    let stats = engine.stats();
    println!();
    println!("Frames rendered:   {}", stats.frames_rendered);
    println!("Frames presented:  {}", stats.frames_presented);
    println!("Present failures:  {}", stats.present_failures);
    println!("Draw failures:     {}", stats.draw_failures);
    println!("Signals coalesced: {}", stats.signals_coalesced);
    println!("Raw buffers:       {}", raw_buffers.load(Ordering::Relaxed));

    if failed {
        return Err("preview failed".into());
    }
    Ok(())
}

/// React to status events until the preview has run for `duration`
///
/// Returns true if the camera reported an error.
async fn drive_session(
    controller: &CameraController,
    engine: &RenderEngine,
    mut events: UnboundedReceiver<StatusEvent>,
    duration: Duration,
) -> bool {
    controller.open();

    let mut failed = false;
    let mut deadline = None;

    loop {
        let event = match deadline {
            Some(at) => match timeout_at(at, events.recv()).await {
                Ok(event) => event,
                Err(_) => break,
            },
            None => events.recv().await,
        };
        let Some(event) = event else {
            break;
        };

        match event {
            StatusEvent::Opened => {
                if let Some(config) = controller.preview_config() {
                    println!("Preview: {}", config);
                }
                if let Some(camera) = controller.device() {
                    println!("Camera:  {}", camera);
                }
                controller.start_preview(engine.camera_surface());
            }
            StatusEvent::Previewing => {
                println!("Previewing for {} s...", duration.as_secs());
                deadline = Some(Instant::now() + duration);
            }
            StatusEvent::Stopped => break,
            StatusEvent::Error {
                source,
                code,
                message,
            } => {
                eprintln!("{:?} error ({}): {}", source, code, message);
                if source == Source::Camera {
                    failed = true;
                    break;
                }
            }
        }
    }

    controller.stop_preview();
    controller.close_camera(true);

    let close_deadline = Instant::now() + CLOSE_TIMEOUT;
    while let Ok(Some(event)) = timeout_at(close_deadline, events.recv()).await {
        if event == StatusEvent::Stopped {
            break;
        }
    }

    failed
}

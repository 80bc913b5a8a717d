// SPDX-License-Identifier: GPL-3.0-only

//! An open GStreamer camera and its capture pipeline
//!
//! ```text
//! source → capsfilter(format, size, rate) → tee ─┬→ queue → appsink (raw)     → BufferRing
//!                                                └→ queue → videoconvert
//!                                                     → capsfilter(RGBA) → appsink (texture) → CameraSurface
//! ```

use super::SourceSpec;
use super::enumeration::parameters_from_caps;
use crate::backends::camera::types::{
    BackendError, BackendResult, CameraInfo, CameraParameters, FpsRange, PixelFormat, Size,
};
use crate::backends::camera::{BufferRing, CameraDevice};
use crate::constants::pipeline::{MAX_BUFFERS, RAW_SINK_NAME, TEXTURE_FORMAT, TEXTURE_SINK_NAME};
use crate::constants::timing::{FRAME_LOG_INTERVAL, START_TIMEOUT_SECS, STOP_TIMEOUT_SECS};
use crate::gpu::TransformMatrix;
use crate::render::{CameraSurface, TextureFrame};
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, trace, warn};

type SurfaceSlot = Arc<Mutex<Option<Arc<CameraSurface>>>>;
type RingSlot = Arc<Mutex<Option<BufferRing>>>;

/// Sizes offered by the test pattern source
const TEST_PATTERN_SIZES: [Size; 4] = [
    Size::new(320, 240),
    Size::new(640, 480),
    Size::new(1280, 720),
    Size::new(1920, 1080),
];

const TEST_PATTERN_FORMATS: [PixelFormat; 3] =
    [PixelFormat::I420, PixelFormat::Nv12, PixelFormat::Yuy2];

const TEST_PATTERN_RATES: [u32; 3] = [15, 30, 60];

/// Parameters the synthetic test pattern camera advertises
pub(super) fn test_pattern_parameters() -> CameraParameters {
    CameraParameters {
        supported_sizes: TEST_PATTERN_SIZES.to_vec(),
        supported_formats: TEST_PATTERN_FORMATS.to_vec(),
        supported_fps_ranges: TEST_PATTERN_RATES.iter().map(|&fps| FpsRange::fixed(fps)).collect(),
        ..Default::default()
    }
}

/// Running capture pipeline
struct ActivePipeline {
    pipeline: gstreamer::Pipeline,
    raw_sink: AppSink,
    texture_sink: AppSink,
}

impl ActivePipeline {
    /// Detach callbacks and bring the pipeline to NULL
    fn shutdown(&self) -> BackendResult<()> {
        self.raw_sink
            .set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());
        self.texture_sink
            .set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());

        self.pipeline
            .set_state(gstreamer::State::Null)
            .map_err(|e| BackendError::StopFailed(format!("Failed to stop pipeline: {}", e)))?;

        let (result, state, _) = self
            .pipeline
            .state(gstreamer::ClockTime::from_seconds(STOP_TIMEOUT_SECS));
        debug!(result = ?result, state = ?state, "Pipeline stopped");
        Ok(())
    }
}

/// A camera opened through GStreamer
pub struct GstCameraDevice {
    info: CameraInfo,
    source: SourceSpec,
    params: CameraParameters,
    orientation: u32,
    surface: SurfaceSlot,
    ring: RingSlot,
    active: Option<ActivePipeline>,
    released: bool,
}

impl GstCameraDevice {
    /// Probe the source and read its capabilities
    ///
    /// The source is brought to READY once so a device held by another
    /// process is reported as busy here rather than at preview start.
    pub(super) fn open(info: CameraInfo, source: SourceSpec) -> BackendResult<Self> {
        let element = make_source(&source)?;
        if let Err(e) = element.set_state(gstreamer::State::Ready) {
            let _ = element.set_state(gstreamer::State::Null);
            return Err(BackendError::Busy(format!("{}: {}", info.id, e)));
        }
        let _ = element.set_state(gstreamer::State::Null);

        let params = match &source {
            SourceSpec::TestPattern => test_pattern_parameters(),
            SourceSpec::Device(device) => device
                .caps()
                .map(|caps| parameters_from_caps(&caps))
                .unwrap_or_default(),
        };
        if params.supported_sizes.is_empty() || params.supported_formats.is_empty() {
            warn!(camera = %info, "Device advertises no raw video modes");
        }
        debug!(
            camera = %info,
            sizes = params.supported_sizes.len(),
            formats = ?params.supported_formats,
            "Device capabilities"
        );

        Ok(Self {
            info,
            source,
            params,
            orientation: 0,
            surface: Arc::new(Mutex::new(None)),
            ring: Arc::new(Mutex::new(None)),
            active: None,
            released: false,
        })
    }

    fn build_pipeline(
        &self,
        size: Size,
        format: PixelFormat,
        fps: Option<FpsRange>,
    ) -> BackendResult<ActivePipeline> {
        let failed = |e: gstreamer::glib::BoolError| BackendError::PreviewFailed(e.to_string());

        let source = make_source(&self.source)?;

        let mut caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", format.gst_name())
            .field("width", size.width as i32)
            .field("height", size.height as i32);
        if let Some(fps) = fps.filter(FpsRange::is_fixed) {
            caps = caps.field("framerate", gstreamer::Fraction::new(fps.max as i32, 1));
        }
        let source_caps = gstreamer::ElementFactory::make("capsfilter")
            .property("caps", caps.build())
            .build()
            .map_err(failed)?;

        let tee = gstreamer::ElementFactory::make("tee").build().map_err(failed)?;
        let raw_queue = gstreamer::ElementFactory::make("queue").build().map_err(failed)?;
        let texture_queue = gstreamer::ElementFactory::make("queue").build().map_err(failed)?;
        let convert = gstreamer::ElementFactory::make("videoconvert")
            .build()
            .map_err(failed)?;
        let rgba_caps = gstreamer::ElementFactory::make("capsfilter")
            .property(
                "caps",
                gstreamer::Caps::builder("video/x-raw")
                    .field("format", TEXTURE_FORMAT)
                    .build(),
            )
            .build()
            .map_err(failed)?;
        let raw_sink = make_appsink(RAW_SINK_NAME)?;
        let texture_sink = make_appsink(TEXTURE_SINK_NAME)?;

        let pipeline = gstreamer::Pipeline::new();
        pipeline
            .add_many([
                &source,
                &source_caps,
                &tee,
                &raw_queue,
                raw_sink.upcast_ref(),
                &texture_queue,
                &convert,
                &rgba_caps,
                texture_sink.upcast_ref(),
            ])
            .map_err(failed)?;
        gstreamer::Element::link_many([&source, &source_caps, &tee]).map_err(failed)?;
        gstreamer::Element::link_many([&tee, &raw_queue, raw_sink.upcast_ref()]).map_err(failed)?;
        gstreamer::Element::link_many([
            &tee,
            &texture_queue,
            &convert,
            &rgba_caps,
            texture_sink.upcast_ref(),
        ])
        .map_err(failed)?;

        raw_sink.set_callbacks(raw_callbacks(Arc::clone(&self.ring)));
        texture_sink.set_callbacks(texture_callbacks(
            Arc::clone(&self.surface),
            preview_transform(self.orientation),
        ));

        Ok(ActivePipeline {
            pipeline,
            raw_sink,
            texture_sink,
        })
    }
}

impl CameraDevice for GstCameraDevice {
    fn parameters(&self) -> BackendResult<CameraParameters> {
        Ok(self.params.clone())
    }

    fn set_parameters(&mut self, params: &CameraParameters) -> BackendResult<()> {
        if let Some(size) = params.preview_size
            && !self.params.supported_sizes.contains(&size)
        {
            return Err(BackendError::ParametersRejected(format!(
                "preview size {} not supported",
                size
            )));
        }
        if let Some(format) = params.preview_format
            && !self.params.supported_formats.contains(&format)
        {
            return Err(BackendError::ParametersRejected(format!(
                "preview format {} not supported",
                format
            )));
        }
        if let Some(fps) = params.fps_range
            && !self.params.supported_fps_ranges.is_empty()
            && !self.params.supported_fps_ranges.contains(&fps)
        {
            return Err(BackendError::ParametersRejected(format!(
                "frame rate {} not supported",
                fps
            )));
        }

        self.params.preview_size = params.preview_size;
        self.params.preview_format = params.preview_format;
        self.params.fps_range = params.fps_range;
        Ok(())
    }

    fn set_display_orientation(&mut self, degrees: u32) -> BackendResult<()> {
        if degrees % 90 != 0 {
            return Err(BackendError::ParametersRejected(format!(
                "display orientation {} is not a multiple of 90",
                degrees
            )));
        }
        self.orientation = degrees % 360;
        Ok(())
    }

    fn set_preview_surface(&mut self, surface: Option<Arc<CameraSurface>>) -> BackendResult<()> {
        if let Some(surface) = &surface
            && !surface.is_valid()
        {
            return Err(BackendError::PreviewFailed(
                "preview surface was abandoned".to_string(),
            ));
        }
        *self.surface.lock().unwrap_or_else(|e| e.into_inner()) = surface;
        Ok(())
    }

    fn set_buffer_ring(&mut self, ring: Option<BufferRing>) {
        *self.ring.lock().unwrap_or_else(|e| e.into_inner()) = ring;
    }

    fn start_preview(&mut self) -> BackendResult<()> {
        if self.active.is_some() {
            return Ok(());
        }
        let (Some(size), Some(format)) = (self.params.preview_size, self.params.preview_format)
        else {
            return Err(BackendError::PreviewFailed(
                "preview size and format not configured".to_string(),
            ));
        };

        let active = self.build_pipeline(size, format, self.params.fps_range)?;

        if let Err(e) = active.pipeline.set_state(gstreamer::State::Playing) {
            let detail = bus_error(&active.pipeline).unwrap_or_else(|| e.to_string());
            let _ = active.shutdown();
            return Err(BackendError::PreviewFailed(detail));
        }

        let (result, state, pending) = active
            .pipeline
            .state(gstreamer::ClockTime::from_seconds(START_TIMEOUT_SECS));
        debug!(result = ?result, state = ?state, pending = ?pending, "Pipeline state");
        if let Some(detail) = bus_error(&active.pipeline) {
            let _ = active.shutdown();
            return Err(BackendError::PreviewFailed(detail));
        }
        if state != gstreamer::State::Playing {
            warn!(state = ?state, "Pipeline is not in PLAYING state yet");
        }

        info!(
            camera = %self.info,
            size = %size,
            format = %format,
            orientation = self.orientation,
            "Preview pipeline started"
        );
        self.active = Some(active);
        Ok(())
    }

    fn stop_preview(&mut self) -> BackendResult<()> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        active.shutdown()?;
        info!(camera = %self.info, "Preview pipeline stopped");
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.stop_preview() {
            error!(error = %e, "Failed to stop pipeline on release");
        }
        *self.surface.lock().unwrap_or_else(|e| e.into_inner()) = None;
        *self.ring.lock().unwrap_or_else(|e| e.into_inner()) = None;
        debug!(camera = %self.info, "Camera released");
    }
}

impl Drop for GstCameraDevice {
    fn drop(&mut self) {
        self.release();
    }
}

fn make_source(source: &SourceSpec) -> BackendResult<gstreamer::Element> {
    match source {
        SourceSpec::Device(device) => device
            .create_element(None)
            .map_err(|e| BackendError::NotAvailable(e.to_string())),
        SourceSpec::TestPattern => gstreamer::ElementFactory::make("videotestsrc")
            .property("is-live", true)
            .build()
            .map_err(|e| BackendError::NotAvailable(e.to_string())),
    }
}

fn make_appsink(name: &str) -> BackendResult<AppSink> {
    let appsink = gstreamer::ElementFactory::make("appsink")
        .name(name)
        .build()
        .map_err(|e| BackendError::PreviewFailed(e.to_string()))?
        .dynamic_cast::<AppSink>()
        .map_err(|_| BackendError::PreviewFailed(format!("Failed to cast {}", name)))?;

    appsink.set_property("emit-signals", true);
    appsink.set_property("sync", false);
    appsink.set_property("max-buffers", MAX_BUFFERS);
    appsink.set_property("drop", true);
    appsink.set_property("enable-last-sample", false);
    Ok(appsink)
}

/// Sampling transform for a frame displayed at `orientation` degrees
///
/// GStreamer rows run top to bottom while GL texture rows run bottom to top.
pub fn preview_transform(orientation: u32) -> TransformMatrix {
    TransformMatrix::rotation(orientation).multiply(&TransformMatrix::vertical_flip())
}

/// First error message on the bus, if any
fn bus_error(pipeline: &gstreamer::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    let msg = bus.timed_pop_filtered(
        gstreamer::ClockTime::ZERO,
        &[gstreamer::MessageType::Error],
    )?;
    match msg.view() {
        gstreamer::MessageView::Error(err) => {
            error!(error = %err.error(), debug = ?err.debug(), "Pipeline error");
            Some(err.error().to_string())
        }
        _ => None,
    }
}

fn raw_callbacks(ring: RingSlot) -> gstreamer_app::AppSinkCallbacks {
    gstreamer_app::AppSinkCallbacks::builder()
        .new_sample(move |appsink| {
            let sample = appsink
                .pull_sample()
                .map_err(|_| gstreamer::FlowError::Eos)?;
            let buffer = sample.buffer().ok_or(gstreamer::FlowError::Error)?;
            let map = buffer
                .map_readable()
                .map_err(|_| gstreamer::FlowError::Error)?;

            let ring = ring.lock().unwrap_or_else(|e| e.into_inner()).clone();
            let Some(ring) = ring else {
                return Ok(gstreamer::FlowSuccess::Ok);
            };
            if let Some(mut target) = ring.acquire() {
                let len = target.len().min(map.len());
                target[..len].copy_from_slice(&map[..len]);
                ring.deliver(target);
            }
            Ok(gstreamer::FlowSuccess::Ok)
        })
        .build()
}

fn texture_callbacks(
    surface: SurfaceSlot,
    transform: TransformMatrix,
) -> gstreamer_app::AppSinkCallbacks {
    let frames = AtomicU64::new(0);
    gstreamer_app::AppSinkCallbacks::builder()
        .new_sample(move |appsink| {
            let sample = appsink
                .pull_sample()
                .map_err(|_| gstreamer::FlowError::Eos)?;
            let buffer = sample.buffer().ok_or(gstreamer::FlowError::Error)?;
            let caps = sample.caps().ok_or(gstreamer::FlowError::Error)?;
            let info = VideoInfo::from_caps(caps).map_err(|_| gstreamer::FlowError::Error)?;
            let map = buffer
                .map_readable()
                .map_err(|_| gstreamer::FlowError::Error)?;

            let surface = surface.lock().unwrap_or_else(|e| e.into_inner()).clone();
            let Some(surface) = surface else {
                return Ok(gstreamer::FlowSuccess::Ok);
            };

            let Some(pixels) = pack_rgba(
                map.as_slice(),
                info.width(),
                info.height(),
                info.stride()[0] as usize,
            ) else {
                trace!("Short RGBA buffer, frame skipped");
                return Ok(gstreamer::FlowSuccess::Ok);
            };

            surface.publish(TextureFrame {
                width: info.width(),
                height: info.height(),
                pixels,
                transform,
            });

            let count = frames.fetch_add(1, Ordering::Relaxed) + 1;
            if count % FRAME_LOG_INTERVAL == 0 {
                debug!(
                    frames = count,
                    width = info.width(),
                    height = info.height(),
                    "Preview frames published"
                );
            }
            Ok(gstreamer::FlowSuccess::Ok)
        })
        .build()
}

/// Copy the frame into one shared allocation, dropping row padding so rows
/// are exactly `width * 4` bytes
fn pack_rgba(data: &[u8], width: u32, height: u32, stride: usize) -> Option<Arc<[u8]>> {
    let row = width as usize * 4;
    let height = height as usize;
    if row == 0 || stride < row || height == 0 || data.len() < stride * (height - 1) + row {
        return None;
    }
    if stride == row {
        return Some(Arc::from(&data[..row * height]));
    }
    let mut packed: Arc<[u8]> = (0..row * height).map(|_| 0u8).collect();
    let rows = Arc::get_mut(&mut packed)?;
    for (y, out) in rows.chunks_exact_mut(row).enumerate() {
        let start = y * stride;
        out.copy_from_slice(&data[start..start + row]);
    }
    Some(packed)
}

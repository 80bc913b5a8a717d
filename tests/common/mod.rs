// SPDX-License-Identifier: GPL-3.0-only

//! In-memory fakes shared by the integration tests

#![allow(dead_code)]

use live_preview::backends::camera::{
    BackendError, BackendResult, BufferRing, CameraDevice, CameraHal, CameraInfo,
    CameraParameters, Facing, FpsRange, PixelFormat, Size,
};
use live_preview::errors::{ErrorCode, PipelineError, PipelineResult};
use live_preview::gpu::{
    ContextFactory, FramebufferId, GlApi, GpuContext, ProgramId, RenderTarget, ShaderId,
    ShaderStage, TargetSurface, TextureId, TransformMatrix, UniformLocation,
};
use live_preview::render::{CameraSurface, FrameSignal, TextureFrame};
use live_preview::status::{CameraStatusListener, RenderStatusListener, Source, StatusEvent};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Records every status callback and lets tests wait for them
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<StatusEvent>>,
    changed: Condvar,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, event: StatusEvent) {
        self.events.lock().unwrap().push(event);
        self.changed.notify_all();
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Error codes reported so far, in order
    pub fn error_codes(&self) -> Vec<ErrorCode> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                StatusEvent::Error { code, .. } => Some(code),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: &StatusEvent) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    /// Block until `pred` holds for the recorded events or `WAIT` elapses
    pub fn wait_for(&self, pred: impl Fn(&[StatusEvent]) -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        let mut events = self.events.lock().unwrap();
        while !pred(&events) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            events = self.changed.wait_timeout(events, deadline - now).unwrap().0;
        }
        true
    }

    pub fn wait_for_event(&self, event: StatusEvent) -> bool {
        self.wait_for(|events| events.contains(&event))
    }

    pub fn wait_for_error(&self, code: ErrorCode) -> bool {
        self.wait_for(|events| {
            events
                .iter()
                .any(|e| matches!(e, StatusEvent::Error { code: c, .. } if *c == code))
        })
    }
}

impl CameraStatusListener for EventLog {
    fn on_opened(&self) {
        self.push(StatusEvent::Opened);
    }

    fn on_previewing(&self) {
        self.push(StatusEvent::Previewing);
    }

    fn on_stopped(&self) {
        self.push(StatusEvent::Stopped);
    }

    fn on_error(&self, code: ErrorCode, message: &str) {
        self.push(StatusEvent::Error {
            source: Source::Camera,
            code,
            message: message.to_string(),
        });
    }
}

impl RenderStatusListener for EventLog {
    fn on_error(&self, code: ErrorCode, message: &str) {
        self.push(StatusEvent::Error {
            source: Source::Render,
            code,
            message: message.to_string(),
        });
    }
}

/// Poll `pred` until it holds or `WAIT` elapses
pub fn eventually(pred: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    pred()
}

// ---------------------------------------------------------------------------
// Camera HAL
// ---------------------------------------------------------------------------

/// A latch the fake device blocks on
#[derive(Default)]
pub struct Gate {
    closed: Mutex<bool>,
    changed: Condvar,
    waiting: AtomicUsize,
}

impl Gate {
    pub fn close(&self) {
        *self.closed.lock().unwrap() = true;
    }

    pub fn open(&self) {
        *self.closed.lock().unwrap() = false;
        self.changed.notify_all();
    }

    /// Threads currently blocked in [`Gate::pass`]
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    fn pass(&self) {
        let mut closed = self.closed.lock().unwrap();
        self.waiting.fetch_add(1, Ordering::SeqCst);
        while *closed {
            closed = self.changed.wait(closed).unwrap();
        }
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Which fake device calls fail
#[derive(Debug, Clone, Copy, Default)]
pub struct Failures {
    pub open: bool,
    pub panic_on_open: bool,
    pub set_parameters: bool,
    pub start: bool,
    pub stop: bool,
    pub panic_on_ring_attach: bool,
    pub panic_on_ring_detach: bool,
}

/// What the fake device observed, shared with the test
#[derive(Default)]
pub struct DeviceLog {
    pub opens: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub releases: AtomicUsize,
    pub applied: Mutex<Option<CameraParameters>>,
    pub orientation: Mutex<Option<u32>>,
    pub surface: Mutex<Option<Arc<CameraSurface>>>,
    pub ring: Mutex<Option<BufferRing>>,
    pub previewing: AtomicBool,
}

impl DeviceLog {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn is_previewing(&self) -> bool {
        self.previewing.load(Ordering::SeqCst)
    }

    /// Push one raw buffer through the attached ring, as a capture thread would
    pub fn deliver_raw(&self, fill: u8) -> bool {
        let ring = self.ring.lock().unwrap().clone();
        let Some(ring) = ring else {
            return false;
        };
        match ring.acquire() {
            Some(mut buffer) => {
                buffer.fill(fill);
                ring.deliver(buffer);
                true
            }
            None => false,
        }
    }

    /// Publish a frame into the attached surface
    pub fn publish(&self, frame: TextureFrame) -> bool {
        let surface = self.surface.lock().unwrap().clone();
        surface.map(|s| s.publish(frame)).unwrap_or(false)
    }
}

pub fn camera_info(id: &str, facing: Facing, orientation: u32) -> CameraInfo {
    CameraInfo {
        id: id.to_string(),
        name: format!("Fake {}", id),
        facing,
        orientation,
    }
}

/// Typical phone sensor modes
pub fn default_parameters() -> CameraParameters {
    CameraParameters {
        supported_sizes: vec![
            Size::new(1920, 1080),
            Size::new(1280, 720),
            Size::new(640, 480),
            Size::new(320, 240),
        ],
        supported_formats: vec![PixelFormat::Nv21, PixelFormat::I420],
        supported_fps_ranges: vec![FpsRange { min: 15, max: 30 }, FpsRange::fixed(30)],
        ..Default::default()
    }
}

pub struct FakeHal {
    cameras: Vec<CameraInfo>,
    params: CameraParameters,
    pub failures: Mutex<Failures>,
    pub log: Arc<DeviceLog>,
    pub open_gate: Arc<Gate>,
    pub scan_gate: Arc<Gate>,
}

impl FakeHal {
    pub fn new(cameras: Vec<CameraInfo>) -> Self {
        Self::with_parameters(cameras, default_parameters())
    }

    pub fn with_parameters(cameras: Vec<CameraInfo>, params: CameraParameters) -> Self {
        Self {
            cameras,
            params,
            failures: Mutex::new(Failures::default()),
            log: Arc::new(DeviceLog::default()),
            open_gate: Arc::new(Gate::default()),
            scan_gate: Arc::new(Gate::default()),
        }
    }

    /// One front camera mounted at 270°
    pub fn front() -> Arc<Self> {
        Arc::new(Self::new(vec![camera_info("front", Facing::Front, 270)]))
    }

    pub fn fail(&self, update: impl FnOnce(&mut Failures)) {
        update(&mut self.failures.lock().unwrap());
    }
}

impl CameraHal for FakeHal {
    fn name(&self) -> &str {
        "fake"
    }

    fn cameras(&self) -> Vec<CameraInfo> {
        self.scan_gate.pass();
        self.cameras.clone()
    }

    fn open(&self, camera: &CameraInfo) -> BackendResult<Box<dyn CameraDevice>> {
        self.open_gate.pass();
        let failures = *self.failures.lock().unwrap();
        if failures.panic_on_open {
            panic!("driver fault opening {}", camera.id);
        }
        if failures.open {
            return Err(BackendError::Busy(camera.id.clone()));
        }
        self.log.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeDevice {
            params: self.params.clone(),
            failures,
            log: Arc::clone(&self.log),
        }))
    }
}

struct FakeDevice {
    params: CameraParameters,
    failures: Failures,
    log: Arc<DeviceLog>,
}

impl CameraDevice for FakeDevice {
    fn parameters(&self) -> BackendResult<CameraParameters> {
        Ok(self.params.clone())
    }

    fn set_parameters(&mut self, params: &CameraParameters) -> BackendResult<()> {
        if self.failures.set_parameters {
            return Err(BackendError::ParametersRejected("fake rejection".into()));
        }
        *self.log.applied.lock().unwrap() = Some(params.clone());
        Ok(())
    }

    fn set_display_orientation(&mut self, degrees: u32) -> BackendResult<()> {
        *self.log.orientation.lock().unwrap() = Some(degrees);
        Ok(())
    }

    fn set_preview_surface(&mut self, surface: Option<Arc<CameraSurface>>) -> BackendResult<()> {
        *self.log.surface.lock().unwrap() = surface;
        Ok(())
    }

    fn set_buffer_ring(&mut self, ring: Option<BufferRing>) {
        match ring {
            Some(_) if self.failures.panic_on_ring_attach => panic!("ring attach fault"),
            None if self.failures.panic_on_ring_detach => panic!("ring detach fault"),
            _ => {}
        }
        *self.log.ring.lock().unwrap() = ring;
    }

    fn start_preview(&mut self) -> BackendResult<()> {
        if self.failures.start {
            return Err(BackendError::PreviewFailed("fake start failure".into()));
        }
        self.log.starts.fetch_add(1, Ordering::SeqCst);
        self.log.previewing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_preview(&mut self) -> BackendResult<()> {
        self.log.stops.fetch_add(1, Ordering::SeqCst);
        self.log.previewing.store(false, Ordering::SeqCst);
        if self.failures.stop {
            return Err(BackendError::StopFailed("fake stop failure".into()));
        }
        Ok(())
    }

    fn release(&mut self) {
        self.log.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// A surface whose signal always accepts
pub fn standalone_surface() -> Arc<CameraSurface> {
    Arc::new(CameraSurface::new(Arc::new(FrameSignal::new(|| true))))
}

pub fn solid_frame(width: u32, height: u32, value: u8) -> TextureFrame {
    TextureFrame {
        width,
        height,
        pixels: vec![value; (width * height * 4) as usize].into(),
        transform: TransformMatrix::IDENTITY,
    }
}

// ---------------------------------------------------------------------------
// GL
// ---------------------------------------------------------------------------

/// Shader source marker that makes the fake compiler fail
pub const COMPILE_ERROR_MARKER: &str = "#error";

/// Shader source marker that makes the fake linker fail
pub const LINK_ERROR_MARKER: &str = "// link-error";

/// Bound state, compared before and after draws
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    pub program: Option<ProgramId>,
    pub texture: Option<TextureId>,
    pub active_unit: u32,
    pub framebuffer: Option<FramebufferId>,
    pub attribs: BTreeSet<u32>,
}

/// State at the moment of one draw call
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub program: Option<ProgramId>,
    pub texture: Option<TextureId>,
    pub framebuffer: Option<FramebufferId>,
    pub transform: Option<TransformMatrix>,
}

/// Everything the recording GL saw
#[derive(Debug, Default)]
pub struct GlLog {
    pub bindings: Bindings,
    pub calls: usize,
    pub draws: usize,
    pub clears: usize,
    pub uploads: Vec<(u32, u32)>,
    pub viewport: Option<(i32, i32)>,
    pub last_transform: Option<TransformMatrix>,
    pub shaders: HashMap<u32, String>,
    pub programs: HashMap<u32, String>,
    pub textures: HashSet<u32>,
    /// Framebuffer id to the texture attached to it
    pub render_targets: HashMap<u32, u32>,
    pub draw_log: Vec<DrawRecord>,
    pub fail_draw: bool,
    pub fail_attrib: bool,
    pub fail_render_target: bool,
    next_id: u32,
}

impl GlLog {
    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

pub type SharedGlLog = Arc<Mutex<GlLog>>;

/// `GlApi` that records calls instead of talking to a GPU
pub struct RecordingGl {
    log: SharedGlLog,
}

impl RecordingGl {
    pub fn new() -> (Self, SharedGlLog) {
        let log = SharedGlLog::default();
        (
            Self {
                log: Arc::clone(&log),
            },
            log,
        )
    }

    pub fn with_log(log: SharedGlLog) -> Self {
        Self { log }
    }

    fn record<T>(&self, f: impl FnOnce(&mut GlLog) -> T) -> T {
        let mut log = self.log.lock().unwrap();
        log.calls += 1;
        f(&mut log)
    }
}

impl GlApi for RecordingGl {
    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<ShaderId, String> {
        self.record(|log| {
            if source.contains(COMPILE_ERROR_MARKER) {
                return Err(format!("{} shader: syntax error", stage));
            }
            let id = log.next();
            log.shaders.insert(id, source.to_string());
            Ok(ShaderId(id))
        })
    }

    fn delete_shader(&self, shader: ShaderId) {
        self.record(|log| {
            log.shaders.remove(&shader.0);
        })
    }

    fn link_program(&self, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId, String> {
        self.record(|log| {
            let (Some(vs), Some(fs)) = (log.shaders.get(&vertex.0), log.shaders.get(&fragment.0))
            else {
                return Err("unknown shader".to_string());
            };
            let combined = format!("{}\n{}", vs, fs);
            if combined.contains(LINK_ERROR_MARKER) {
                return Err("varying mismatch".to_string());
            }
            let id = log.next();
            log.programs.insert(id, combined);
            Ok(ProgramId(id))
        })
    }

    fn delete_program(&self, program: ProgramId) {
        self.record(|log| {
            log.programs.remove(&program.0);
        })
    }

    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        self.record(|log| {
            let source = log.programs.get(&program.0)?;
            source
                .contains(&format!("attribute vec4 {}", name))
                .then(|| if name == "aPosition" { 0 } else { 1 })
        })
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.record(|log| {
            let source = log.programs.get(&program.0)?;
            source
                .contains(name)
                .then(|| UniformLocation(name.len() as u32))
        })
    }

    fn use_program(&self, program: Option<ProgramId>) {
        self.record(|log| log.bindings.program = program)
    }

    fn create_texture(&self) -> Result<TextureId, String> {
        self.record(|log| {
            let id = log.next();
            log.textures.insert(id);
            Ok(TextureId(id))
        })
    }

    fn delete_texture(&self, texture: TextureId) {
        self.record(|log| {
            log.textures.remove(&texture.0);
        })
    }

    fn bind_texture(&self, unit: u32, texture: Option<TextureId>) {
        self.record(|log| {
            log.bindings.active_unit = unit;
            log.bindings.texture = texture;
        })
    }

    fn active_texture_unit(&self) -> u32 {
        self.record(|log| log.bindings.active_unit)
    }

    fn set_active_texture_unit(&self, unit: u32) {
        self.record(|log| log.bindings.active_unit = unit)
    }

    fn upload_rgba(
        &self,
        texture: TextureId,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<(), String> {
        self.record(|log| {
            if !log.textures.contains(&texture.0) {
                return Err("no such texture".to_string());
            }
            if pixels.len() < (width * height * 4) as usize {
                return Err("short pixel buffer".to_string());
            }
            log.uploads.push((width, height));
            Ok(())
        })
    }

    fn set_uniform_i32(&self, _location: UniformLocation, _value: i32) {
        self.record(|_| ())
    }

    fn set_uniform_mat4(&self, _location: UniformLocation, matrix: &TransformMatrix) {
        self.record(|log| log.last_transform = Some(*matrix))
    }

    fn enable_attrib(
        &self,
        location: u32,
        _components: i32,
        _data: &[f32],
    ) -> Result<(), String> {
        self.record(|log| {
            if log.fail_attrib {
                return Err("out of memory".to_string());
            }
            log.bindings.attribs.insert(location);
            Ok(())
        })
    }

    fn disable_attrib(&self, location: u32) {
        self.record(|log| {
            log.bindings.attribs.remove(&location);
        })
    }

    fn draw_triangle_strip(&self, _first: i32, _count: i32) -> Result<(), String> {
        self.record(|log| {
            if log.fail_draw {
                return Err("GL_INVALID_OPERATION".to_string());
            }
            log.draws += 1;
            let record = DrawRecord {
                program: log.bindings.program,
                texture: log.bindings.texture,
                framebuffer: log.bindings.framebuffer,
                transform: log.last_transform,
            };
            log.draw_log.push(record);
            Ok(())
        })
    }

    fn viewport(&self, width: i32, height: i32) {
        self.record(|log| log.viewport = Some((width, height)))
    }

    fn clear(&self, _color: [f32; 4]) {
        self.record(|log| log.clears += 1)
    }

    fn create_render_target(&self, width: i32, height: i32) -> Result<RenderTarget, String> {
        self.record(|log| {
            if log.fail_render_target {
                return Err("GL_FRAMEBUFFER_UNSUPPORTED".to_string());
            }
            let texture = log.next();
            let framebuffer = log.next();
            log.textures.insert(texture);
            log.render_targets.insert(framebuffer, texture);
            Ok(RenderTarget {
                framebuffer: FramebufferId(framebuffer),
                texture: TextureId(texture),
                width,
                height,
            })
        })
    }

    fn delete_render_target(&self, target: &RenderTarget) {
        self.record(|log| {
            log.render_targets.remove(&target.framebuffer.0);
            log.textures.remove(&target.texture.0);
        })
    }

    fn bind_render_target(&self, framebuffer: Option<FramebufferId>) {
        self.record(|log| log.bindings.framebuffer = framebuffer)
    }
}

/// Counters for contexts handed out by [`FakeContextFactory`]
#[derive(Debug, Default)]
pub struct ContextLog {
    pub created: AtomicUsize,
    pub released: AtomicUsize,
    pub swaps: AtomicUsize,
    pub swap_fails: AtomicBool,
    pub create_fails: AtomicBool,
}

pub struct FakeContextFactory {
    pub gl: SharedGlLog,
    pub contexts: Arc<ContextLog>,
    /// Holds the render worker inside context creation while closed
    pub gate: Gate,
}

impl FakeContextFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gl: SharedGlLog::default(),
            contexts: Arc::new(ContextLog::default()),
            gate: Gate::default(),
        })
    }

    pub fn gl_calls(&self) -> usize {
        self.gl.lock().unwrap().calls
    }

    pub fn draws(&self) -> usize {
        self.gl.lock().unwrap().draws
    }

    pub fn bindings(&self) -> Bindings {
        self.gl.lock().unwrap().bindings.clone()
    }
}

impl ContextFactory for FakeContextFactory {
    fn create_context(&self, target: &TargetSurface) -> PipelineResult<Box<dyn GpuContext>> {
        self.gate.pass();
        if self.contexts.create_fails.load(Ordering::SeqCst) {
            return Err(PipelineError::ContextCreationFailed(
                "no EGL display".to_string(),
            ));
        }
        self.contexts.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            gl: RecordingGl::with_log(Arc::clone(&self.gl)),
            size: target.size(),
            log: Arc::clone(&self.contexts),
            released: false,
        }))
    }
}

struct FakeContext {
    gl: RecordingGl,
    size: (i32, i32),
    log: Arc<ContextLog>,
    released: bool,
}

impl GpuContext for FakeContext {
    fn gl(&self) -> &dyn GlApi {
        &self.gl
    }

    fn surface_size(&self) -> (i32, i32) {
        self.size
    }

    fn swap_buffers(&self) -> Result<(), String> {
        if self.log.swap_fails.load(Ordering::SeqCst) {
            return Err("EGL_BAD_SURFACE".to_string());
        }
        self.log.swaps.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.log.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Camera session controller
//!
//! [`CameraController`] owns one camera for its whole lifecycle. Every
//! operation posts a [`CameraCommand`] to the controller's worker and returns
//! immediately; results arrive through the [`CameraStatusListener`].
//!
//! HAL calls are isolated: an `Err` or a panic inside a HAL method becomes a
//! [`PipelineError`] reported to the listener, never a crash of the worker.

use super::buffer_ring::{BufferRing, ConsumerSlot, PreviewConsumer};
use super::negotiation;
use super::types::{
    BackendError, BackendResult, CameraInfo, CameraState, Facing, PreviewConfig, Size,
};
use super::{CameraDevice, CameraHal};
use crate::config::CameraSettings;
use crate::constants::threads::CAMERA_THREAD;
use crate::errors::PipelineError;
use crate::render::CameraSurface;
use crate::status::CameraStatusListener;
use crate::worker::{CommandQueue, CommandWorker, WorkerAction};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Commands processed by the camera worker
#[derive(Clone)]
pub enum CameraCommand {
    Open,
    StartPreview(Arc<CameraSurface>),
    StopPreview,
    Close { full: bool },
}

impl CameraCommand {
    fn is_start_preview(&self) -> bool {
        matches!(self, CameraCommand::StartPreview(_))
    }
}

impl fmt::Debug for CameraCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraCommand::Open => write!(f, "Open"),
            CameraCommand::StartPreview(_) => write!(f, "StartPreview"),
            CameraCommand::StopPreview => write!(f, "StopPreview"),
            CameraCommand::Close { full } => write!(f, "Close {{ full: {} }}", full),
        }
    }
}

/// Pick the camera to use
///
/// An explicit `device` (matched against id, then name) wins; otherwise the
/// first camera with the preferred facing; otherwise the first camera.
pub fn select_camera(
    cameras: &[CameraInfo],
    facing: Facing,
    device: Option<&str>,
) -> Option<CameraInfo> {
    if let Some(wanted) = device {
        let by_id = cameras.iter().find(|c| c.id == wanted);
        if let Some(camera) = by_id.or_else(|| cameras.iter().find(|c| c.name == wanted)) {
            return Some(camera.clone());
        }
        warn!(device = %wanted, "Configured camera not found, falling back to facing");
    }
    cameras
        .iter()
        .find(|c| c.facing == facing)
        .or_else(|| cameras.first())
        .cloned()
}

/// State written by the worker, readable from any thread
#[derive(Debug, Clone, Default)]
struct Snapshot {
    state: CameraState,
    config: Option<PreviewConfig>,
    camera: Option<CameraInfo>,
}

#[derive(Debug, Default)]
struct SharedStatus(Mutex<Snapshot>);

impl SharedStatus {
    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run a HAL call, turning a panic into [`BackendError::Crashed`]
fn guarded<T>(operation: &str, f: impl FnOnce() -> BackendResult<T>) -> BackendResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(operation, panic = %message, "Camera HAL panicked");
            Err(BackendError::Crashed(format!(
                "{} panicked: {}",
                operation, message
            )))
        }
    }
}

/// The open device and what was negotiated for it
struct Session {
    device: Box<dyn CameraDevice>,
    config: PreviewConfig,
    ring: BufferRing,
    previewing: bool,
}

/// The camera state machine, without a thread
///
/// [`CameraController`] runs one of these on its worker; tests and embedders
/// can drive it synchronously through [`CameraCore::handle`].
pub struct CameraCore {
    hal: Arc<dyn CameraHal>,
    listener: Arc<dyn CameraStatusListener>,
    settings: CameraSettings,
    camera: Option<CameraInfo>,
    session: Option<Session>,
    consumer: ConsumerSlot,
    status: Arc<SharedStatus>,
    queue: Option<Arc<CommandQueue<CameraCommand>>>,
}

impl CameraCore {
    /// Scan cameras and select one according to `settings`
    pub fn new(
        hal: Arc<dyn CameraHal>,
        listener: Arc<dyn CameraStatusListener>,
        settings: CameraSettings,
    ) -> Self {
        Self::with_shared(
            hal,
            listener,
            settings,
            ConsumerSlot::default(),
            Arc::default(),
            None,
        )
    }

    fn with_shared(
        hal: Arc<dyn CameraHal>,
        listener: Arc<dyn CameraStatusListener>,
        settings: CameraSettings,
        consumer: ConsumerSlot,
        status: Arc<SharedStatus>,
        queue: Option<Arc<CommandQueue<CameraCommand>>>,
    ) -> Self {
        let cameras = guarded("cameras", || Ok(hal.cameras())).unwrap_or_default();
        let camera = select_camera(&cameras, settings.facing, settings.device.as_deref());
        match &camera {
            Some(camera) => info!(
                backend = hal.name(),
                camera = %camera,
                available = cameras.len(),
                "Camera selected"
            ),
            None => warn!(backend = hal.name(), "No camera available"),
        }
        status.lock().camera = camera.clone();

        Self {
            hal,
            listener,
            settings,
            camera,
            session: None,
            consumer,
            status,
            queue,
        }
    }

    /// Process one command
    pub fn handle(&mut self, command: CameraCommand) -> WorkerAction {
        debug!(?command, "Camera command");
        match command {
            CameraCommand::Open => self.open(),
            CameraCommand::StartPreview(surface) => self.start_preview(surface),
            CameraCommand::StopPreview => self.stop_preview(),
            CameraCommand::Close { full } => {
                self.close(full);
                if full {
                    return WorkerAction::Stop;
                }
            }
        }
        WorkerAction::Continue
    }

    pub fn state(&self) -> CameraState {
        self.status.lock().state
    }

    pub fn preview_config(&self) -> Option<PreviewConfig> {
        self.session.as_ref().map(|s| s.config)
    }

    /// Selected camera, if any
    pub fn camera(&self) -> Option<&CameraInfo> {
        self.camera.as_ref()
    }

    pub fn set_preview_consumer(&self, consumer: Option<PreviewConsumer>) {
        self.consumer.set(consumer);
    }

    fn set_state(&self, state: CameraState) {
        let mut snapshot = self.status.lock();
        debug!(from = %snapshot.state, to = %state, "Camera state");
        snapshot.state = state;
        snapshot.config = self.session.as_ref().map(|s| s.config);
    }

    fn report(&self, err: PipelineError) {
        error!(code = %err.code(), error = %err, "Camera error");
        self.listener.on_error(err.code(), err.message());
    }

    /// Previews requested behind a failed open have nothing to run on
    fn discard_pending_previews(&self) {
        if let Some(queue) = &self.queue {
            let dropped = queue.remove_where(CameraCommand::is_start_preview);
            if dropped > 0 {
                debug!(dropped, "Discarded preview requests after failed open");
            }
        }
    }

    fn open(&mut self) {
        if self.session.is_some() {
            debug_assert!(false, "camera already open");
            error!("Open requested while a camera is already open");
            self.report(PipelineError::HardwareOpenFailed(
                "camera already open".to_string(),
            ));
            return;
        }

        let Some(camera) = self.camera.clone() else {
            self.report(PipelineError::HardwareOpenFailed(
                "no camera available".to_string(),
            ));
            self.discard_pending_previews();
            return;
        };

        info!(camera = %camera, "Opening camera");
        let hal = Arc::clone(&self.hal);
        let mut device = match guarded("open", || hal.open(&camera)) {
            Ok(device) => device,
            Err(e) => {
                self.report(PipelineError::HardwareOpenFailed(e.to_string()));
                self.discard_pending_previews();
                return;
            }
        };

        match self.configure(device.as_mut(), &camera) {
            Ok((config, ring)) => {
                info!(camera = %camera.name, config = %config, "Camera opened");
                self.session = Some(Session {
                    device,
                    config,
                    ring,
                    previewing: false,
                });
                self.set_state(CameraState::Opened);
                self.listener.on_opened();
            }
            Err(e) => {
                let _ = guarded("release", || {
                    device.release();
                    Ok(())
                });
                self.set_state(CameraState::Closed);
                self.report(e);
                self.discard_pending_previews();
            }
        }
    }

    /// Negotiate and apply preview parameters, then attach the buffer ring
    fn configure(
        &self,
        device: &mut dyn CameraDevice,
        camera: &CameraInfo,
    ) -> Result<(PreviewConfig, BufferRing), PipelineError> {
        let rejected = |e: BackendError| PipelineError::ParameterRejected(e.to_string());

        let mut params = guarded("parameters", || device.parameters()).map_err(rejected)?;
        let requested = Size::new(self.settings.preview_width, self.settings.preview_height);
        let config = negotiation::negotiate(
            &mut params,
            camera.facing,
            camera.orientation,
            self.settings.display_rotation,
            requested,
            self.settings.target_fps,
        )
        .ok_or_else(|| {
            PipelineError::ParameterRejected(format!(
                "no usable preview size or format ({} sizes, {} formats)",
                params.supported_sizes.len(),
                params.supported_formats.len()
            ))
        })?;

        guarded("set_parameters", || device.set_parameters(&params)).map_err(rejected)?;
        guarded("set_display_orientation", || {
            device.set_display_orientation(config.orientation)
        })
        .map_err(rejected)?;

        let ring = BufferRing::new(
            self.settings.buffer_count,
            config.buffer_size,
            self.consumer.clone(),
        );
        guarded("set_buffer_ring", || {
            device.set_buffer_ring(Some(ring.clone()));
            Ok(())
        })
        .map_err(rejected)?;
        debug!(
            buffers = ring.capacity(),
            buffer_size = ring.buffer_size(),
            "Preview buffers allocated"
        );
        Ok((config, ring))
    }

    fn start_preview(&mut self, surface: Arc<CameraSurface>) {
        let Some(session) = self.session.as_mut() else {
            self.report(PipelineError::PreviewFailed(
                "camera not opened".to_string(),
            ));
            return;
        };
        if session.previewing {
            self.report(PipelineError::PreviewFailed(
                "preview already running".to_string(),
            ));
            return;
        }
        if !surface.is_valid() {
            self.report(PipelineError::PreviewFailed(
                "surface not valid".to_string(),
            ));
            return;
        }

        let device = session.device.as_mut();
        let started = guarded("set_preview_surface", || {
            device.set_preview_surface(Some(surface))
        })
        .and_then(|()| guarded("start_preview", || device.start_preview()));

        match started {
            Ok(()) => {
                session.previewing = true;
                info!(buffers = session.ring.capacity(), "Preview started");
                self.set_state(CameraState::Previewing);
                self.listener.on_previewing();
            }
            Err(e) => {
                let _ = guarded("set_preview_surface", || device.set_preview_surface(None));
                self.report(PipelineError::PreviewFailed(e.to_string()));
            }
        }
    }

    fn stop_preview(&mut self) {
        let Some(session) = self.session.as_mut() else {
            debug!("Stop preview without an open camera");
            return;
        };
        if !session.previewing {
            debug!("Stop preview while not previewing");
            return;
        }

        session.previewing = false;
        let device = session.device.as_mut();
        let stopped = guarded("stop_preview", || device.stop_preview());
        if let Err(e) = guarded("set_preview_surface", || device.set_preview_surface(None)) {
            warn!(error = %e, "Failed to detach preview surface");
        }
        info!(
            delivered = session.ring.frames_delivered(),
            dropped = session.ring.frames_dropped(),
            "Preview stopped"
        );
        self.set_state(CameraState::Opened);

        if let Err(e) = stopped {
            self.report(PipelineError::StopFailed(e.to_string()));
        }
    }

    fn close(&mut self, full: bool) {
        if self.session.is_some() {
            self.stop_preview();
        }

        if let Some(mut session) = self.session.take() {
            let device = session.device.as_mut();
            let detached = guarded("set_buffer_ring", || {
                device.set_buffer_ring(None);
                Ok(())
            });
            if let Err(e) = detached {
                warn!(error = %e, "Failed to detach preview buffers");
            }
            let released = guarded("release", || {
                device.release();
                Ok(())
            });
            if let Err(e) = released {
                warn!(error = %e, "Camera release failed");
            }
            info!("Camera closed");
        }

        if full {
            self.camera = None;
            let mut snapshot = self.status.lock();
            snapshot.camera = None;
            snapshot.config = None;
            snapshot.state = CameraState::Released;
        } else {
            self.set_state(CameraState::Closed);
        }
        self.listener.on_stopped();
    }
}

/// Camera controller running on its own worker thread
pub struct CameraController {
    worker: CommandWorker<CameraCommand>,
    status: Arc<SharedStatus>,
    consumer: ConsumerSlot,
    released: AtomicBool,
}

impl CameraController {
    /// Start the camera worker. Cameras are scanned on the worker.
    pub fn new(
        hal: Arc<dyn CameraHal>,
        listener: Arc<dyn CameraStatusListener>,
        settings: CameraSettings,
    ) -> std::io::Result<Self> {
        let queue = Arc::new(CommandQueue::new());
        let status = Arc::new(SharedStatus::default());
        let consumer = ConsumerSlot::default();

        let core_queue = Arc::clone(&queue);
        let core_status = Arc::clone(&status);
        let core_consumer = consumer.clone();
        let worker = CommandWorker::start_on_queue(
            CAMERA_THREAD,
            queue,
            move || {
                CameraCore::with_shared(
                    hal,
                    listener,
                    settings,
                    core_consumer,
                    core_status,
                    Some(core_queue),
                )
            },
            |core, command| core.handle(command),
        )?;

        Ok(Self {
            worker,
            status,
            consumer,
            released: AtomicBool::new(false),
        })
    }

    /// Open the selected camera and negotiate preview parameters
    pub fn open(&self) {
        self.worker.post(CameraCommand::Open);
    }

    /// Start preview into `surface`. Post after `on_opened`.
    pub fn start_preview(&self, surface: Arc<CameraSurface>) {
        self.worker.post(CameraCommand::StartPreview(surface));
    }

    /// Stop preview. Any preview start still queued is cancelled.
    pub fn stop_preview(&self) {
        if let Some(cancelled) = self
            .worker
            .post_replacing(CameraCommand::is_start_preview, CameraCommand::StopPreview)
        {
            if cancelled > 0 {
                debug!(cancelled, "Pending preview start cancelled by stop");
            }
        }
    }

    /// Drop pending commands and close the camera
    ///
    /// With `full`, the worker exits and the cached camera selection is
    /// cleared; the controller cannot be used afterwards.
    pub fn close_camera(&self, full: bool) {
        if full && self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let dropped = self.worker.clear();
        debug!(dropped, full, "Camera queue cleared for close");
        self.worker.post(CameraCommand::Close { full });
    }

    /// `close_camera(true)`
    pub fn release(&self) {
        self.close_camera(true);
    }

    /// [`CameraController::release`], then wait for the worker to exit
    pub fn release_and_wait(&mut self) {
        self.release();
        self.worker.join();
    }

    pub fn state(&self) -> CameraState {
        self.status.lock().state
    }

    /// Negotiated configuration of the open camera
    pub fn preview_config(&self) -> Option<PreviewConfig> {
        self.status.lock().config
    }

    /// Camera chosen at construction; `None` until the worker has scanned,
    /// or if nothing was found
    pub fn device(&self) -> Option<CameraInfo> {
        self.status.lock().camera.clone()
    }

    /// Receive every raw preview buffer before it is re-queued
    pub fn set_preview_consumer(&self, consumer: Option<PreviewConsumer>) {
        self.consumer.set(consumer);
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }
}

impl Drop for CameraController {
    fn drop(&mut self) {
        self.release();
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Render engine: GPU context, frame texture and filter chain on one thread
//!
//! [`RenderEngine`] owns a dedicated worker. Every GL call happens inside
//! [`RenderCore::handle`] on that worker, so the context never leaves the
//! thread that created it. Callers post `init`/`release` and the camera
//! surface posts renders through the engine's [`FrameSignal`].

use super::frame_texture::FrameTexture;
use super::surface::{CameraSurface, FrameSignal};
use crate::config::RenderSettings;
use crate::constants::threads::RENDER_THREAD;
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::errors::PipelineError;
use crate::gpu::{ContextFactory, GpuContext, TargetSurface};
use crate::shaders::{FilterChain, FilterSource};
use crate::status::RenderStatusListener;
use crate::worker::{CommandQueue, CommandWorker, WorkerAction};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Commands processed by the render worker
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    Init(TargetSurface),
    Render,
    Release,
}

/// Counters shared between the worker and observers
#[derive(Debug, Default)]
struct StatCounters {
    rendered: AtomicU64,
    presented: AtomicU64,
    present_failures: AtomicU64,
    draw_failures: AtomicU64,
}

/// Snapshot of render counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Render commands that drew a frame
    pub frames_rendered: u64,
    /// Frames successfully presented to the target surface
    pub frames_presented: u64,
    /// Presents that failed (target surface gone or invalid)
    pub present_failures: u64,
    /// Renders whose filter chain failed to draw
    pub draw_failures: u64,
    /// Frame signals dropped because a render was already pending
    pub signals_coalesced: u64,
}

/// Live GPU resources, present between a successful init and release
struct GpuState {
    context: Box<dyn GpuContext>,
    texture: FrameTexture,
    chain: FilterChain,
}

/// The render state machine, without a thread
///
/// Hosts that already run a GL thread can drive this directly instead of
/// going through [`RenderEngine`].
pub struct RenderCore {
    factory: Arc<dyn ContextFactory>,
    listener: Arc<dyn RenderStatusListener>,
    filters: Vec<FilterSource>,
    clear_color: [f32; 4],
    surface: Arc<CameraSurface>,
    stats: Arc<StatCounters>,
    gpu: Option<GpuState>,
    released: bool,
}

impl RenderCore {
    pub fn new(
        factory: Arc<dyn ContextFactory>,
        listener: Arc<dyn RenderStatusListener>,
        settings: &RenderSettings,
        surface: Arc<CameraSurface>,
    ) -> Self {
        Self::with_stats(factory, listener, settings, surface, Arc::default())
    }

    fn with_stats(
        factory: Arc<dyn ContextFactory>,
        listener: Arc<dyn RenderStatusListener>,
        settings: &RenderSettings,
        surface: Arc<CameraSurface>,
        stats: Arc<StatCounters>,
    ) -> Self {
        Self {
            factory,
            listener,
            filters: settings.filters.clone(),
            clear_color: settings.clear_color,
            surface,
            stats,
            gpu: None,
            released: false,
        }
    }

    /// Process one command
    pub fn handle(&mut self, command: RenderCommand) -> WorkerAction {
        match command {
            RenderCommand::Init(target) => {
                self.init(target);
                WorkerAction::Continue
            }
            RenderCommand::Render => {
                self.render();
                WorkerAction::Continue
            }
            RenderCommand::Release => {
                self.release();
                WorkerAction::Stop
            }
        }
    }

    /// Whether a context and filter chain are live
    pub fn is_initialized(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn stats(&self) -> RenderStats {
        snapshot(&self.stats, self.surface.signal())
    }

    fn report(&self, err: &PipelineError) {
        error!(code = %err.code(), error = %err, "Render engine error");
        self.listener.on_error(err.code(), err.message());
    }

    fn init(&mut self, target: TargetSurface) {
        if self.released {
            warn!("Init after release ignored");
            return;
        }
        if self.gpu.is_some() {
            warn!(surface = ?target, "Render engine already initialized, init ignored");
            return;
        }

        let mut context = match self.factory.create_context(&target) {
            Ok(context) => context,
            Err(e) => {
                self.report(&e);
                return;
            }
        };

        let texture = match FrameTexture::new(context.gl()) {
            Ok(texture) => texture,
            Err(e) => {
                context.release();
                self.report(&e);
                return;
            }
        };

        let chain = match FilterChain::build(context.gl(), &self.filters) {
            Ok(chain) => chain,
            Err(e) => {
                texture.release(context.gl());
                context.release();
                self.report(&e);
                return;
            }
        };

        let (width, height) = context.surface_size();
        context.gl().viewport(width, height);
        info!(width, height, stages = chain.len(), "Render engine initialized");

        self.gpu = Some(GpuState {
            context,
            texture,
            chain,
        });
    }

    fn render(&mut self) {
        // Frames published from here on schedule another render
        self.surface.signal().begin_render();

        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        let gl = gpu.context.gl();

        if let Some(frame) = self.surface.take_latest() {
            if let Err(e) = gpu.texture.update(gl, &frame) {
                warn!(error = %e, "Frame upload failed");
            }
        }
        if !gpu.texture.has_frame() {
            debug!("No frame uploaded yet, skipping render");
            return;
        }

        let (width, height) = gpu.context.surface_size();
        gl.viewport(width, height);
        gl.clear(self.clear_color);
        if let Err(e) = gpu.chain.draw(
            gl,
            gpu.texture.id(),
            gpu.texture.transform(),
            (width, height),
        ) {
            self.stats.draw_failures.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "Filter chain draw failed");
        }

        let rendered = self.stats.rendered.fetch_add(1, Ordering::Relaxed) + 1;

        match gpu.context.swap_buffers() {
            Ok(()) => {
                self.stats.presented.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                // The target is owned by the caller and may already be gone
                self.stats.present_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Present failed");
            }
        }

        if rendered % FRAME_LOG_INTERVAL == 0 {
            let (frame_width, frame_height) = gpu.texture.size();
            debug!(
                rendered,
                frame_width,
                frame_height,
                coalesced = self.surface.signal().coalesced(),
                "Render statistics"
            );
        }
    }

    fn release(&mut self) {
        self.surface.signal().finish();

        if let Some(gpu) = self.gpu.take() {
            let GpuState {
                mut context,
                texture,
                mut chain,
            } = gpu;
            chain.release(context.gl());
            texture.release(context.gl());
            context.release();
        }

        self.surface.abandon();
        self.released = true;
        info!("Render engine released");
    }
}

fn snapshot(stats: &StatCounters, signal: &FrameSignal) -> RenderStats {
    RenderStats {
        frames_rendered: stats.rendered.load(Ordering::Relaxed),
        frames_presented: stats.presented.load(Ordering::Relaxed),
        present_failures: stats.present_failures.load(Ordering::Relaxed),
        draw_failures: stats.draw_failures.load(Ordering::Relaxed),
        signals_coalesced: signal.coalesced(),
    }
}

/// Render engine running on its own worker thread
pub struct RenderEngine {
    worker: CommandWorker<RenderCommand>,
    surface: Arc<CameraSurface>,
    stats: Arc<StatCounters>,
    released: AtomicBool,
}

impl RenderEngine {
    /// Start the render worker. No GPU work happens until [`RenderEngine::init`].
    pub fn new(
        factory: Arc<dyn ContextFactory>,
        listener: Arc<dyn RenderStatusListener>,
        settings: RenderSettings,
    ) -> std::io::Result<Self> {
        let queue = Arc::new(CommandQueue::new());
        let render_queue = Arc::clone(&queue);
        let signal = Arc::new(FrameSignal::new(move || {
            render_queue.post(RenderCommand::Render)
        }));
        let surface = Arc::new(CameraSurface::new(signal));

        let stats = Arc::new(StatCounters::default());

        // The core holds the GPU context, so it is built on the worker itself
        let core_surface = Arc::clone(&surface);
        let core_stats = Arc::clone(&stats);
        let worker = CommandWorker::start_on_queue(
            RENDER_THREAD,
            queue,
            move || RenderCore::with_stats(factory, listener, &settings, core_surface, core_stats),
            |core, command| core.handle(command),
        )?;

        Ok(Self {
            worker,
            surface,
            stats,
            released: AtomicBool::new(false),
        })
    }

    /// Create the GPU context for `target` and build the filter chain
    pub fn init(&self, target: TargetSurface) {
        self.worker.post(RenderCommand::Init(target));
    }

    /// The surface to hand to the camera as its preview target
    pub fn camera_surface(&self) -> Arc<CameraSurface> {
        Arc::clone(&self.surface)
    }

    /// Ask for a render of the newest frame, coalesced like a frame signal
    pub fn request_render(&self) -> bool {
        self.surface.signal().notify()
    }

    /// Tear everything down. Frame signals are dropped from this point on and
    /// queued commands are discarded.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.surface.signal().finish();
        let dropped = self.worker.clear();
        debug!(dropped, "Render queue cleared for release");
        self.worker.post(RenderCommand::Release);
    }

    /// [`RenderEngine::release`], then wait for the worker to exit
    pub fn release_and_wait(&mut self) {
        self.release();
        self.worker.join();
    }

    pub fn stats(&self) -> RenderStats {
        snapshot(&self.stats, self.surface.signal())
    }

    /// Whether the worker thread is still alive
    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        self.release();
    }
}

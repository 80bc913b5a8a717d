// SPDX-License-Identifier: GPL-3.0-only

//! EGL context creation for OpenGL ES 2
//!
//! libEGL is loaded at runtime, so the binary starts (and `list` works) on
//! machines without a GPU stack; only `init` of the render engine fails.

use super::glow_api::GlowApi;
use super::{ContextFactory, GlApi, GpuContext, TargetSurface};
use crate::errors::{PipelineError, PipelineResult};
use khronos_egl as egl;
use tracing::{debug, info, warn};

type EglInstance = egl::DynamicInstance<egl::EGL1_4>;

/// Creates an EGL display, GLES 2 context and surface per [`TargetSurface`]
#[derive(Debug, Clone, Copy, Default)]
pub struct EglContextFactory;

impl EglContextFactory {
    pub fn new() -> Self {
        Self
    }
}

fn context_error(step: &str, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::ContextCreationFailed(format!("{}: {}", step, err))
}

impl ContextFactory for EglContextFactory {
    fn create_context(&self, target: &TargetSurface) -> PipelineResult<Box<dyn GpuContext>> {
        let egl = unsafe { EglInstance::load_required() }
            .map_err(|e| context_error("load libEGL", e))?;

        let display = unsafe { egl.get_display(egl::DEFAULT_DISPLAY) }
            .ok_or_else(|| context_error("eglGetDisplay", "no default display"))?;
        let (major, minor) = egl
            .initialize(display)
            .map_err(|e| context_error("eglInitialize", e))?;
        debug!(major, minor, "EGL initialized");

        let (context, surface) = match create_on_display(&egl, display, target) {
            Ok(parts) => parts,
            Err(e) => {
                let _ = egl.terminate(display);
                return Err(e);
            }
        };

        let gl = unsafe {
            glow::Context::from_loader_function(|name| {
                egl.get_proc_address(name)
                    .map_or(std::ptr::null(), |f| f as *const std::ffi::c_void)
            })
        };

        info!(surface = ?target, "EGL context created");

        Ok(Box::new(EglContext {
            gl: GlowApi::new(gl),
            egl,
            display,
            context,
            surface,
            released: false,
        }))
    }
}

/// Choose a config, create the context and its surface, and make them current
fn create_on_display(
    egl: &EglInstance,
    display: egl::Display,
    target: &TargetSurface,
) -> PipelineResult<(egl::Context, egl::Surface)> {
    egl.bind_api(egl::OPENGL_ES_API)
        .map_err(|e| context_error("eglBindAPI", e))?;

    let surface_bit = match target {
        TargetSurface::Window { .. } => egl::WINDOW_BIT,
        TargetSurface::Offscreen { .. } => egl::PBUFFER_BIT,
    };
    let config_attribs = [
        egl::RED_SIZE,
        8,
        egl::GREEN_SIZE,
        8,
        egl::BLUE_SIZE,
        8,
        egl::ALPHA_SIZE,
        8,
        egl::RENDERABLE_TYPE,
        egl::OPENGL_ES2_BIT,
        egl::SURFACE_TYPE,
        surface_bit,
        egl::NONE,
    ];
    let config = egl
        .choose_first_config(display, &config_attribs)
        .map_err(|e| context_error("eglChooseConfig", e))?
        .ok_or_else(|| context_error("eglChooseConfig", "no matching config"))?;

    let context_attribs = [egl::CONTEXT_CLIENT_VERSION, 2, egl::NONE];
    let context = egl
        .create_context(display, config, None, &context_attribs)
        .map_err(|e| context_error("eglCreateContext", e))?;

    let surface = match *target {
        TargetSurface::Window { handle, .. } => unsafe {
            egl.create_window_surface(display, config, handle.0 as egl::NativeWindowType, None)
        },
        TargetSurface::Offscreen { width, height } => {
            let attribs = [egl::WIDTH, width, egl::HEIGHT, height, egl::NONE];
            egl.create_pbuffer_surface(display, config, &attribs)
        }
    };
    let surface = match surface {
        Ok(surface) => surface,
        Err(e) => {
            let _ = egl.destroy_context(display, context);
            return Err(context_error("create surface", e));
        }
    };

    if let Err(e) = egl.make_current(display, Some(surface), Some(surface), Some(context)) {
        let _ = egl.destroy_surface(display, surface);
        let _ = egl.destroy_context(display, context);
        return Err(context_error("eglMakeCurrent", e));
    }

    Ok((context, surface))
}

/// A current GLES 2 context plus the surface it renders to
pub struct EglContext {
    gl: GlowApi,
    egl: EglInstance,
    display: egl::Display,
    context: egl::Context,
    surface: egl::Surface,
    released: bool,
}

impl EglContext {
    fn query(&self, attribute: egl::Int) -> i32 {
        match self
            .egl
            .query_surface(self.display, self.surface, attribute)
        {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "eglQuerySurface failed");
                0
            }
        }
    }
}

impl GpuContext for EglContext {
    fn gl(&self) -> &dyn GlApi {
        &self.gl
    }

    fn surface_size(&self) -> (i32, i32) {
        (self.query(egl::WIDTH), self.query(egl::HEIGHT))
    }

    fn swap_buffers(&self) -> Result<(), String> {
        self.egl
            .swap_buffers(self.display, self.surface)
            .map_err(|e| e.to_string())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        self.gl.release_buffers();
        if let Err(e) = self.egl.make_current(self.display, None, None, None) {
            warn!(error = %e, "Failed to unbind EGL context");
        }
        if let Err(e) = self.egl.destroy_surface(self.display, self.surface) {
            warn!(error = %e, "Failed to destroy EGL surface");
        }
        if let Err(e) = self.egl.destroy_context(self.display, self.context) {
            warn!(error = %e, "Failed to destroy EGL context");
        }
        if let Err(e) = self.egl.terminate(self.display) {
            warn!(error = %e, "Failed to terminate EGL display");
        }
        info!("EGL context released");
    }
}

impl Drop for EglContext {
    fn drop(&mut self) {
        self.release();
    }
}

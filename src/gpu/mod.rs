// SPDX-License-Identifier: GPL-3.0-only

//! GPU abstraction for the render engine
//!
//! The render engine and filter stages only talk to the GPU through
//! [`GlApi`], a narrow GL-style interface, and obtain it from a
//! [`GpuContext`] created by a [`ContextFactory`]. The shipped
//! implementation is EGL + OpenGL ES 2 through `glow` ([`egl`],
//! [`glow_api`]); tests substitute recording fakes.
//!
//! A context and everything created from it belong to the thread that
//! created the context. None of these types are required to be `Send`.

pub mod egl;
pub mod glow_api;
pub mod transform;

pub use transform::TransformMatrix;

use crate::errors::PipelineResult;

/// Shader object handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u32);

/// Linked program handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Texture object handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// Framebuffer object handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u32);

/// Offscreen color target: a framebuffer with an RGBA texture attached
///
/// A filter stage draws into one of these so the next stage can sample
/// `texture`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub framebuffer: FramebufferId,
    pub texture: TextureId,
    pub width: i32,
    pub height: i32,
}

/// Uniform location inside a linked program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Shader pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// The GL calls used by filter stages and the render engine
///
/// Every method must be called on the thread that owns the context the
/// implementation belongs to.
pub trait GlApi {
    /// Create and compile a shader. `Err` carries the compile log.
    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<ShaderId, String>;

    fn delete_shader(&self, shader: ShaderId);

    /// Link two compiled shaders into a program. `Err` carries the link log.
    fn link_program(&self, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId, String>;

    fn delete_program(&self, program: ProgramId);

    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32>;

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    /// Bind a program, or unbind with `None`
    fn use_program(&self, program: Option<ProgramId>);

    /// Create a 2D texture with clamp-to-edge wrapping and linear sampling
    fn create_texture(&self) -> Result<TextureId, String>;

    fn delete_texture(&self, texture: TextureId);

    /// Make `unit` active and bind a 2D texture to it, or unbind with `None`
    fn bind_texture(&self, unit: u32, texture: Option<TextureId>);

    /// Index of the active texture unit
    fn active_texture_unit(&self) -> u32;

    fn set_active_texture_unit(&self, unit: u32);

    /// Replace the contents of a 2D texture with tightly packed RGBA pixels
    fn upload_rgba(
        &self,
        texture: TextureId,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<(), String>;

    fn set_uniform_i32(&self, location: UniformLocation, value: i32);

    fn set_uniform_mat4(&self, location: UniformLocation, matrix: &TransformMatrix);

    /// Enable a vertex attribute and point it at `data` (`components` floats per vertex)
    fn enable_attrib(&self, location: u32, components: i32, data: &[f32]) -> Result<(), String>;

    fn disable_attrib(&self, location: u32);

    /// Draw `count` vertices as a triangle strip. `Err` if the GPU reported an error.
    fn draw_triangle_strip(&self, first: i32, count: i32) -> Result<(), String>;

    fn viewport(&self, width: i32, height: i32);

    /// Allocate a `width` x `height` framebuffer backed by an RGBA texture
    fn create_render_target(&self, width: i32, height: i32) -> Result<RenderTarget, String>;

    fn delete_render_target(&self, target: &RenderTarget);

    /// Direct draws into an offscreen target, or back to the surface with `None`
    fn bind_render_target(&self, framebuffer: Option<FramebufferId>);

    /// Clear the color buffer of the bound target
    fn clear(&self, color: [f32; 4]);
}

/// Opaque native window handle supplied by the UI shell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeWindowHandle(pub usize);

/// Presentation surface the render engine draws into
///
/// The engine never owns the surface; it only binds a context to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSurface {
    /// An on-screen window owned by the caller
    Window {
        handle: NativeWindowHandle,
        width: i32,
        height: i32,
    },
    /// An offscreen buffer, for headless runs
    Offscreen { width: i32, height: i32 },
}

impl TargetSurface {
    pub fn size(&self) -> (i32, i32) {
        match *self {
            TargetSurface::Window { width, height, .. } => (width, height),
            TargetSurface::Offscreen { width, height } => (width, height),
        }
    }
}

/// A GPU context bound to one [`TargetSurface`]
pub trait GpuContext {
    /// GL entry points for this context
    fn gl(&self) -> &dyn GlApi;

    /// Current drawable size in pixels
    fn surface_size(&self) -> (i32, i32);

    /// Present the back buffer. Fails if the surface became invalid.
    fn swap_buffers(&self) -> Result<(), String>;

    /// Unbind and destroy the context and its surface binding
    fn release(&mut self);
}

/// Creates GPU contexts; called on the render worker thread
pub trait ContextFactory: Send + Sync {
    /// Create a context bound to `target` and make it current on this thread
    fn create_context(&self, target: &TargetSurface) -> PipelineResult<Box<dyn GpuContext>>;
}

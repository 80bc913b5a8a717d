// SPDX-License-Identifier: GPL-3.0-only

//! Compiled filter stages
//!
//! A [`FilterProgram`] is built once on the render thread and is immutable
//! afterwards. A program that failed to compile or link is still a value: it
//! keeps the error and returns it from every [`FilterProgram::draw`] without
//! touching the GPU.

use super::{
    ATTRIB_POSITION, ATTRIB_TEXTURE_COORD, COORDS_PER_VERTEX, FilterSource, QUAD_TEXTURE_COORDS,
    QUAD_VERTICES, UNIFORM_INPUT_TEXTURE, UNIFORM_TRANSFORM_MATRIX,
};
use crate::constants::render::{INPUT_TEXTURE_UNIT, QUAD_VERTEX_COUNT};
use crate::errors::{PipelineError, PipelineResult};
use crate::gpu::{
    GlApi, ProgramId, RenderTarget, ShaderStage, TextureId, TransformMatrix, UniformLocation,
};
use tracing::{debug, info, warn};

/// Resolved handles of a linked program
#[derive(Debug, Clone, Copy)]
struct Linked {
    program: ProgramId,
    position: u32,
    texture_coord: u32,
    input_texture: Option<UniformLocation>,
    transform: Option<UniformLocation>,
}

#[derive(Debug)]
enum ProgramState {
    Ready(Linked),
    Invalid(PipelineError),
    Released,
}

/// One shader stage: a linked program and its location table
#[derive(Debug)]
pub struct FilterProgram {
    name: String,
    state: ProgramState,
}

impl FilterProgram {
    /// Compile and link `vertex` + `fragment`
    ///
    /// Never fails outright; check [`FilterProgram::error`] for the outcome.
    pub fn new(gl: &dyn GlApi, name: &str, vertex: &str, fragment: &str) -> Self {
        let state = match link(gl, vertex, fragment) {
            Ok(linked) => {
                info!(filter = %name, program = linked.program.0, "Filter program linked");
                ProgramState::Ready(linked)
            }
            Err(e) => {
                warn!(filter = %name, error = %e, "Filter program unusable");
                ProgramState::Invalid(e)
            }
        };
        Self {
            name: name.to_string(),
            state,
        }
    }

    /// Build a program from configured sources
    pub fn from_source(gl: &dyn GlApi, source: &FilterSource) -> Self {
        Self::new(
            gl,
            source.name(),
            source.vertex_source(),
            source.fragment_source(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.state, ProgramState::Ready(_))
    }

    /// The compile/link error, if construction failed
    pub fn error(&self) -> Option<&PipelineError> {
        match &self.state {
            ProgramState::Invalid(e) => Some(e),
            _ => None,
        }
    }

    /// Linked program handle
    pub fn program(&self) -> Option<ProgramId> {
        match &self.state {
            ProgramState::Ready(linked) => Some(linked.program),
            _ => None,
        }
    }

    /// Draw one textured quad
    ///
    /// Binds program and texture, uploads the transform, draws a 4-vertex
    /// triangle strip. Attributes, texture and program are unbound and the
    /// previously active texture unit restored, whether or not the draw
    /// succeeded.
    pub fn draw(
        &self,
        gl: &dyn GlApi,
        texture: TextureId,
        transform: &TransformMatrix,
        vertex_coords: &[f32],
        texture_coords: &[f32],
    ) -> PipelineResult<()> {
        let linked = match &self.state {
            ProgramState::Ready(linked) => *linked,
            ProgramState::Invalid(e) => return Err(e.clone()),
            ProgramState::Released => {
                return Err(PipelineError::ProgramLinkFailed(format!(
                    "filter '{}' was released",
                    self.name
                )));
            }
        };

        let _restore = BindingGuard {
            gl,
            attribs: [linked.position, linked.texture_coord],
            active_unit: gl.active_texture_unit(),
        };
        let failed =
            |e: String| PipelineError::RenderFailed(format!("filter '{}': {}", self.name, e));

        gl.use_program(Some(linked.program));
        gl.bind_texture(INPUT_TEXTURE_UNIT, Some(texture));
        if let Some(location) = linked.input_texture {
            gl.set_uniform_i32(location, INPUT_TEXTURE_UNIT as i32);
        }
        if let Some(location) = linked.transform {
            gl.set_uniform_mat4(location, transform);
        }
        gl.enable_attrib(linked.position, COORDS_PER_VERTEX, vertex_coords)
            .map_err(failed)?;
        gl.enable_attrib(linked.texture_coord, COORDS_PER_VERTEX, texture_coords)
            .map_err(failed)?;

        gl.draw_triangle_strip(0, QUAD_VERTEX_COUNT).map_err(failed)
    }

    /// Delete the program. Must run on the thread that owns the context.
    pub fn release(&mut self, gl: &dyn GlApi) {
        if let ProgramState::Ready(linked) = &self.state {
            gl.delete_program(linked.program);
            debug!(filter = %self.name, "Filter program deleted");
        }
        self.state = ProgramState::Released;
    }
}

/// Unbinds everything a draw bound, on every exit path
struct BindingGuard<'a> {
    gl: &'a dyn GlApi,
    attribs: [u32; 2],
    active_unit: u32,
}

impl Drop for BindingGuard<'_> {
    fn drop(&mut self) {
        for location in self.attribs {
            self.gl.disable_attrib(location);
        }
        self.gl.bind_texture(INPUT_TEXTURE_UNIT, None);
        self.gl.set_active_texture_unit(self.active_unit);
        self.gl.use_program(None);
    }
}

/// Points drawing back at the surface when the chain returns
struct SurfaceGuard<'a> {
    gl: &'a dyn GlApi,
}

impl Drop for SurfaceGuard<'_> {
    fn drop(&mut self) {
        self.gl.bind_render_target(None);
    }
}

fn link(gl: &dyn GlApi, vertex: &str, fragment: &str) -> PipelineResult<Linked> {
    let vs = gl
        .compile_shader(ShaderStage::Vertex, vertex)
        .map_err(PipelineError::ShaderCompileFailed)?;
    let fs = match gl.compile_shader(ShaderStage::Fragment, fragment) {
        Ok(fs) => fs,
        Err(e) => {
            gl.delete_shader(vs);
            return Err(PipelineError::ShaderCompileFailed(e));
        }
    };

    let linked = gl.link_program(vs, fs);
    // The program keeps what it needs; shader objects are no longer referenced
    gl.delete_shader(vs);
    gl.delete_shader(fs);
    let program = linked.map_err(PipelineError::ProgramLinkFailed)?;

    let attrib = |name: &str| {
        gl.attrib_location(program, name).ok_or_else(|| {
            PipelineError::ProgramLinkFailed(format!("attribute '{}' not found", name))
        })
    };
    let locations = attrib(ATTRIB_POSITION).and_then(|position| {
        attrib(ATTRIB_TEXTURE_COORD).map(|texture_coord| (position, texture_coord))
    });
    let (position, texture_coord) = match locations {
        Ok(found) => found,
        Err(e) => {
            gl.delete_program(program);
            return Err(e);
        }
    };

    Ok(Linked {
        program,
        position,
        texture_coord,
        input_texture: gl.uniform_location(program, UNIFORM_INPUT_TEXTURE),
        transform: gl.uniform_location(program, UNIFORM_TRANSFORM_MATRIX),
    })
}

/// Filter stages composed in order
///
/// Every stage but the last draws into an offscreen target that the next
/// stage samples; the last stage draws onto the surface. Two targets are
/// enough for any chain length, they are used alternately.
#[derive(Debug, Default)]
pub struct FilterChain {
    stages: Vec<FilterProgram>,
    targets: Vec<RenderTarget>,
}

impl FilterChain {
    /// Build every stage. On the first failure the stages already built are
    /// deleted and that failure is returned.
    ///
    /// An empty source list gets a single pass-through stage.
    pub fn build(gl: &dyn GlApi, sources: &[FilterSource]) -> PipelineResult<Self> {
        let fallback = [FilterSource::default()];
        let sources = if sources.is_empty() {
            &fallback[..]
        } else {
            sources
        };

        let mut chain = FilterChain::default();
        for source in sources {
            let stage = FilterProgram::from_source(gl, source);
            if let Some(e) = stage.error().cloned() {
                chain.release(gl);
                return Err(e);
            }
            chain.stages.push(stage);
        }
        debug!(stages = chain.stages.len(), "Filter chain built");
        Ok(chain)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[FilterProgram] {
        &self.stages
    }

    /// Offscreen targets currently allocated
    pub fn targets(&self) -> &[RenderTarget] {
        &self.targets
    }

    /// Run the chain over the full-screen quad
    ///
    /// The first stage samples `texture` through `transform`. Later stages
    /// sample the previous stage's output with the identity transform. The
    /// surface is the bound target again when this returns.
    pub fn draw(
        &mut self,
        gl: &dyn GlApi,
        texture: TextureId,
        transform: &TransformMatrix,
        size: (i32, i32),
    ) -> PipelineResult<()> {
        self.ensure_targets(gl, size)?;

        let _surface = SurfaceGuard { gl };
        let last = self.stages.len().saturating_sub(1);
        let mut input = texture;
        let mut input_transform = *transform;

        for (index, stage) in self.stages.iter().enumerate() {
            let output = (index < last).then(|| self.targets[index % self.targets.len()]);
            gl.bind_render_target(output.map(|target| target.framebuffer));
            stage.draw(
                gl,
                input,
                &input_transform,
                &QUAD_VERTICES,
                &QUAD_TEXTURE_COORDS,
            )?;
            if let Some(target) = output {
                input = target.texture;
                input_transform = TransformMatrix::IDENTITY;
            }
        }
        Ok(())
    }

    /// Allocate intermediate targets for `size`, replacing stale ones
    fn ensure_targets(&mut self, gl: &dyn GlApi, size: (i32, i32)) -> PipelineResult<()> {
        let needed = self.stages.len().saturating_sub(1).min(2);
        let (width, height) = size;
        let current = self.targets.len() == needed
            && self
                .targets
                .iter()
                .all(|t| t.width == width && t.height == height);
        if current {
            return Ok(());
        }

        self.release_targets(gl);
        for _ in 0..needed {
            match gl.create_render_target(width, height) {
                Ok(target) => self.targets.push(target),
                Err(e) => {
                    self.release_targets(gl);
                    return Err(PipelineError::RenderFailed(format!(
                        "offscreen target {}x{}: {}",
                        width, height, e
                    )));
                }
            }
        }
        if needed > 0 {
            debug!(targets = needed, width, height, "Filter chain targets allocated");
        }
        Ok(())
    }

    fn release_targets(&mut self, gl: &dyn GlApi) {
        for target in self.targets.drain(..) {
            gl.delete_render_target(&target);
        }
    }

    /// Delete every program and offscreen target and empty the chain
    pub fn release(&mut self, gl: &dyn GlApi) {
        for stage in &mut self.stages {
            stage.release(gl);
        }
        self.stages.clear();
        self.release_targets(gl);
    }
}

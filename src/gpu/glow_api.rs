// SPDX-License-Identifier: GPL-3.0-only

//! [`GlApi`] implemented on top of `glow`
//!
//! OpenGL ES 2 has no vertex array objects, so each enabled attribute gets its
//! own array buffer, kept per attribute location and refilled on every
//! [`GlApi::enable_attrib`].

use super::{
    FramebufferId, GlApi, ProgramId, RenderTarget, ShaderId, ShaderStage, TextureId,
    TransformMatrix, UniformLocation,
};
use glow::HasContext;
use std::cell::RefCell;
use std::collections::HashMap;
use std::num::NonZeroU32;
use tracing::{debug, warn};

fn native_shader(id: ShaderId) -> Option<glow::NativeShader> {
    NonZeroU32::new(id.0).map(glow::NativeShader)
}

fn native_program(id: ProgramId) -> Option<glow::NativeProgram> {
    NonZeroU32::new(id.0).map(glow::NativeProgram)
}

fn native_texture(id: TextureId) -> Option<glow::NativeTexture> {
    NonZeroU32::new(id.0).map(glow::NativeTexture)
}

fn native_framebuffer(id: FramebufferId) -> Option<glow::NativeFramebuffer> {
    NonZeroU32::new(id.0).map(glow::NativeFramebuffer)
}

/// GL entry points of one context, loaded through a proc-address loader
pub struct GlowApi {
    gl: glow::Context,
    /// Array buffer per attribute location
    attrib_buffers: RefCell<HashMap<u32, glow::NativeBuffer>>,
}

impl GlowApi {
    /// Wrap an already loaded `glow` context. The context must be current.
    pub fn new(gl: glow::Context) -> Self {
        Self {
            gl,
            attrib_buffers: RefCell::new(HashMap::new()),
        }
    }

    /// Delete the attribute buffers. Must run while the context is still current.
    pub fn release_buffers(&self) {
        let mut buffers = self.attrib_buffers.borrow_mut();
        for (_, buffer) in buffers.drain() {
            unsafe { self.gl.delete_buffer(buffer) };
        }
    }

    fn attrib_buffer(&self, location: u32) -> Result<glow::NativeBuffer, String> {
        let mut buffers = self.attrib_buffers.borrow_mut();
        if let Some(buffer) = buffers.get(&location) {
            return Ok(*buffer);
        }
        match unsafe { self.gl.create_buffer() } {
            Ok(buffer) => {
                buffers.insert(location, buffer);
                Ok(buffer)
            }
            Err(e) => {
                warn!(location, error = %e, "Failed to create attribute buffer");
                Err(format!("attribute {} buffer: {}", location, e))
            }
        }
    }
}

impl GlApi for GlowApi {
    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<ShaderId, String> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe {
            let shader = self.gl.create_shader(kind)?;
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if !self.gl.get_shader_compile_status(shader) {
                let log = self.gl.get_shader_info_log(shader);
                self.gl.delete_shader(shader);
                return Err(format!("{} shader: {}", stage, log.trim()));
            }
            Ok(ShaderId(shader.0.get()))
        }
    }

    fn delete_shader(&self, shader: ShaderId) {
        if let Some(shader) = native_shader(shader) {
            unsafe { self.gl.delete_shader(shader) };
        }
    }

    fn link_program(&self, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId, String> {
        let (Some(vs), Some(fs)) = (native_shader(vertex), native_shader(fragment)) else {
            return Err("invalid shader handle".to_string());
        };
        unsafe {
            let program = self.gl.create_program()?;
            self.gl.attach_shader(program, vs);
            self.gl.attach_shader(program, fs);
            self.gl.link_program(program);
            self.gl.detach_shader(program, vs);
            self.gl.detach_shader(program, fs);
            if !self.gl.get_program_link_status(program) {
                let log = self.gl.get_program_info_log(program);
                self.gl.delete_program(program);
                return Err(log.trim().to_string());
            }
            Ok(ProgramId(program.0.get()))
        }
    }

    fn delete_program(&self, program: ProgramId) {
        if let Some(program) = native_program(program) {
            unsafe { self.gl.delete_program(program) };
        }
    }

    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        let program = native_program(program)?;
        unsafe { self.gl.get_attrib_location(program, name) }
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let program = native_program(program)?;
        unsafe { self.gl.get_uniform_location(program, name) }.map(|loc| UniformLocation(loc.0))
    }

    fn use_program(&self, program: Option<ProgramId>) {
        unsafe { self.gl.use_program(program.and_then(native_program)) };
    }

    fn create_texture(&self) -> Result<TextureId, String> {
        let target = glow::TEXTURE_2D;
        unsafe {
            let texture = self.gl.create_texture()?;
            self.gl.bind_texture(target, Some(texture));
            self.gl
                .tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            self.gl
                .tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            self.gl
                .tex_parameter_i32(target, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            self.gl
                .tex_parameter_i32(target, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
            self.gl.bind_texture(target, None);
            Ok(TextureId(texture.0.get()))
        }
    }

    fn delete_texture(&self, texture: TextureId) {
        if let Some(texture) = native_texture(texture) {
            unsafe { self.gl.delete_texture(texture) };
        }
    }

    fn bind_texture(&self, unit: u32, texture: Option<TextureId>) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl
                .bind_texture(glow::TEXTURE_2D, texture.and_then(native_texture));
        }
    }

    fn active_texture_unit(&self) -> u32 {
        let active = unsafe { self.gl.get_parameter_i32(glow::ACTIVE_TEXTURE) };
        (active as u32).saturating_sub(glow::TEXTURE0)
    }

    fn set_active_texture_unit(&self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) };
    }

    fn upload_rgba(
        &self,
        texture: TextureId,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<(), String> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() < expected {
            return Err(format!(
                "frame too short: {} bytes for {}x{} RGBA",
                pixels.len(),
                width,
                height
            ));
        }
        let texture = native_texture(texture).ok_or("invalid texture handle")?;
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                width as i32,
                height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                Some(&pixels[..expected]),
            );
            self.gl.bind_texture(glow::TEXTURE_2D, None);
            match self.gl.get_error() {
                glow::NO_ERROR => Ok(()),
                code => Err(format!("texture upload failed: GL error 0x{:04X}", code)),
            }
        }
    }

    fn set_uniform_i32(&self, location: UniformLocation, value: i32) {
        let location = glow::NativeUniformLocation(location.0);
        unsafe { self.gl.uniform_1_i32(Some(&location), value) };
    }

    fn set_uniform_mat4(&self, location: UniformLocation, matrix: &TransformMatrix) {
        let location = glow::NativeUniformLocation(location.0);
        unsafe {
            self.gl
                .uniform_matrix_4_f32_slice(Some(&location), false, matrix.as_slice())
        };
    }

    fn enable_attrib(&self, location: u32, components: i32, data: &[f32]) -> Result<(), String> {
        let buffer = self.attrib_buffer(location)?;
        unsafe {
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            self.gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(data),
                glow::STREAM_DRAW,
            );
            self.gl
                .vertex_attrib_pointer_f32(location, components, glow::FLOAT, false, 0, 0);
            self.gl.enable_vertex_attrib_array(location);
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
        Ok(())
    }

    fn disable_attrib(&self, location: u32) {
        unsafe { self.gl.disable_vertex_attrib_array(location) };
    }

    fn draw_triangle_strip(&self, first: i32, count: i32) -> Result<(), String> {
        unsafe {
            self.gl.draw_arrays(glow::TRIANGLE_STRIP, first, count);
            match self.gl.get_error() {
                glow::NO_ERROR => Ok(()),
                code => {
                    debug!(code, "glDrawArrays reported an error");
                    Err(format!("draw failed: GL error 0x{:04X}", code))
                }
            }
        }
    }

    fn viewport(&self, width: i32, height: i32) {
        unsafe { self.gl.viewport(0, 0, width, height) };
    }

    fn create_render_target(&self, width: i32, height: i32) -> Result<RenderTarget, String> {
        let texture = self.create_texture()?;
        let native = native_texture(texture).ok_or("invalid texture handle")?;
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(native));
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                width,
                height,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                None,
            );
            self.gl.bind_texture(glow::TEXTURE_2D, None);

            let framebuffer = match self.gl.create_framebuffer() {
                Ok(framebuffer) => framebuffer,
                Err(e) => {
                    self.gl.delete_texture(native);
                    return Err(format!("framebuffer: {}", e));
                }
            };
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(native),
                0,
            );
            let status = self.gl.check_framebuffer_status(glow::FRAMEBUFFER);
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);

            if status != glow::FRAMEBUFFER_COMPLETE {
                self.gl.delete_framebuffer(framebuffer);
                self.gl.delete_texture(native);
                return Err(format!("framebuffer incomplete: 0x{:04X}", status));
            }
            debug!(width, height, framebuffer = framebuffer.0.get(), "Render target created");
            Ok(RenderTarget {
                framebuffer: FramebufferId(framebuffer.0.get()),
                texture,
                width,
                height,
            })
        }
    }

    fn delete_render_target(&self, target: &RenderTarget) {
        if let Some(framebuffer) = native_framebuffer(target.framebuffer) {
            unsafe { self.gl.delete_framebuffer(framebuffer) };
        }
        self.delete_texture(target.texture);
    }

    fn bind_render_target(&self, framebuffer: Option<FramebufferId>) {
        unsafe {
            self.gl
                .bind_framebuffer(glow::FRAMEBUFFER, framebuffer.and_then(native_framebuffer))
        };
    }

    fn clear(&self, color: [f32; 4]) {
        unsafe {
            self.gl.clear_color(color[0], color[1], color[2], color[3]);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }
}

//! `glow` implementation of [`GpuContext`].
//!
//! Every call here is a thin `unsafe` wrapper: the only precondition glow imposes is that the
//! context is current on the calling thread, which the owner of `GlowContext` guarantees by
//! constructing and driving it on the render thread only.

use std::borrow::Cow;

use glow::HasContext;

use super::{GpuContext, ShaderStage};
use crate::logi;

// A lost context can report the same error forever.
const MAX_STALE_ERRORS: usize = 32;

pub struct GlowContext {
    gl: glow::Context,
    // Desktop GLSL without `#version` is 1.10, which has no precision qualifiers.
    desktop: bool,
    // Core profiles refuse to draw without a bound VAO; GLES2 / GL2.1 have none to bind.
    vao: Option<glow::NativeVertexArray>,
}

impl GlowContext {
    /// Wrap an already-current context and put it in the fixed pipeline state the
    /// preview expects (no depth test, no culling, no blending, black clear color).
    pub fn new(gl: glow::Context) -> Self {
        let (major, desktop) = {
            let version = gl.version();
            logi!(
                "GPU",
                "context {}.{}{} ({})",
                version.major,
                version.minor,
                if version.is_embedded { " ES" } else { "" },
                version.vendor_info
            );
            (version.major, !version.is_embedded)
        };

        let vao = unsafe {
            let vao = if major >= 3 {
                gl.create_vertex_array().ok()
            } else {
                None
            };
            if vao.is_some() {
                gl.bind_vertex_array(vao);
            }

            gl.disable(glow::DEPTH_TEST);
            gl.disable(glow::CULL_FACE);
            gl.disable(glow::BLEND);
            gl.clear_color(0.0, 0.0, 0.0, 1.0);
            vao
        };

        Self { gl, desktop, vao }
    }

    // Errors left over from earlier calls (a mistyped uniform write, say) must not be
    // blamed on the next allocation.
    fn clear_stale_errors(&self) {
        let drained = drain_errors(|| unsafe { self.gl.get_error() });
        if drained > 0 {
            logi!("GPU", "cleared {drained} stale GL error(s) before allocating");
        }
    }

    // GL reports OOM only through glGetError.
    fn take_alloc_error(&self, what: &str) -> Result<(), String> {
        alloc_status(what, unsafe { self.gl.get_error() })
    }
}

/// Pull error codes until `NO_ERROR`, giving up after [`MAX_STALE_ERRORS`]. Returns how many
/// were discarded.
fn drain_errors(mut next: impl FnMut() -> u32) -> usize {
    (0..MAX_STALE_ERRORS).take_while(|_| next() != glow::NO_ERROR).count()
}

fn alloc_status(what: &str, err: u32) -> Result<(), String> {
    match err {
        glow::NO_ERROR => Ok(()),
        glow::OUT_OF_MEMORY => Err(format!("{what}: out of GPU memory")),
        other => Err(format!("{what}: GL error 0x{other:x}")),
    }
}

/// Blank out `precision <qualifier> <type>;` statements for GLSL 1.10/1.20 compilers.
/// Statements become spaces so driver line and column numbers still match the source.
/// Sources that pick a `#version` are left alone.
fn strip_precision(source: &str) -> Cow<'_, str> {
    if !source.contains("precision") || source.lines().any(|l| l.trim_start().starts_with("#version")) {
        return Cow::Borrowed(source);
    }
    Cow::Owned(source.split_inclusive('\n').map(blank_precision_statements).collect())
}

fn blank_precision_statements(line: &str) -> String {
    let mut out = line.to_string();
    let mut from = 0;
    while let Some(rel) = out[from..].find("precision") {
        let start = from + rel;
        let Some(semi) = out[start..].find(';').map(|i| start + i) else {
            break;
        };
        let at_statement_start = out[..start]
            .chars()
            .next_back()
            .map_or(true, |c| c == ';' || c.is_whitespace());
        let words = out[start..semi].split_whitespace().count();
        if at_statement_start && words == 3 {
            out.replace_range(start..=semi, &" ".repeat(semi - start + 1));
        }
        from = semi + 1;
    }
    out
}

impl Drop for GlowContext {
    fn drop(&mut self) {
        if let Some(vao) = self.vao.take() {
            unsafe { self.gl.delete_vertex_array(vao) };
        }
    }
}

impl GpuContext for GlowContext {
    type Shader = glow::NativeShader;
    type Program = glow::NativeProgram;
    type Texture = glow::NativeTexture;
    type Renderbuffer = glow::NativeRenderbuffer;
    type Framebuffer = glow::NativeFramebuffer;
    type Buffer = glow::NativeBuffer;
    type UniformLocation = glow::NativeUniformLocation;

    fn create_shader(&self, stage: ShaderStage) -> Result<Self::Shader, String> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe { self.gl.create_shader(kind) }
    }

    fn compile_shader(&self, shader: Self::Shader, source: &str) -> bool {
        let source = if self.desktop { strip_precision(source) } else { Cow::Borrowed(source) };
        unsafe {
            self.gl.shader_source(shader, &source);
            self.gl.compile_shader(shader);
            self.gl.get_shader_compile_status(shader)
        }
    }

    fn shader_info_log(&self, shader: Self::Shader) -> String {
        unsafe { self.gl.get_shader_info_log(shader) }
    }

    fn delete_shader(&self, shader: Self::Shader) {
        unsafe { self.gl.delete_shader(shader) }
    }

    fn create_program(&self) -> Result<Self::Program, String> {
        unsafe { self.gl.create_program() }
    }

    fn attach_shader(&self, program: Self::Program, shader: Self::Shader) {
        unsafe { self.gl.attach_shader(program, shader) }
    }

    fn detach_shader(&self, program: Self::Program, shader: Self::Shader) {
        unsafe { self.gl.detach_shader(program, shader) }
    }

    fn link_program(&self, program: Self::Program) -> bool {
        unsafe {
            self.gl.link_program(program);
            self.gl.get_program_link_status(program)
        }
    }

    fn program_info_log(&self, program: Self::Program) -> String {
        unsafe { self.gl.get_program_info_log(program) }
    }

    fn delete_program(&self, program: Self::Program) {
        unsafe { self.gl.delete_program(program) }
    }

    fn use_program(&self, program: Option<Self::Program>) {
        unsafe { self.gl.use_program(program) }
    }

    fn uniform_location(&self, program: Self::Program, name: &str) -> Option<Self::UniformLocation> {
        unsafe { self.gl.get_uniform_location(program, name) }
    }

    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32> {
        unsafe { self.gl.get_attrib_location(program, name) }
    }

    fn uniform_1f(&self, location: &Self::UniformLocation, v: f32) {
        unsafe { self.gl.uniform_1_f32(Some(location), v) }
    }

    fn uniform_2f(&self, location: &Self::UniformLocation, x: f32, y: f32) {
        unsafe { self.gl.uniform_2_f32(Some(location), x, y) }
    }

    fn uniform_1i(&self, location: &Self::UniformLocation, v: i32) {
        unsafe { self.gl.uniform_1_i32(Some(location), v) }
    }

    fn create_color_texture(&self, width: i32, height: i32) -> Result<Self::Texture, String> {
        self.clear_stale_errors();
        unsafe {
            let tex = self.gl.create_texture()?;
            self.gl.bind_texture(glow::TEXTURE_2D, Some(tex));
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                width,
                height,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(None),
            );
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::NEAREST as i32);
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::NEAREST as i32);
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
            self.gl.bind_texture(glow::TEXTURE_2D, None);

            if let Err(e) = self.take_alloc_error("color texture") {
                self.gl.delete_texture(tex);
                return Err(e);
            }
            Ok(tex)
        }
    }

    fn delete_texture(&self, texture: Self::Texture) {
        unsafe { self.gl.delete_texture(texture) }
    }

    fn create_depth_buffer(&self, width: i32, height: i32) -> Result<Self::Renderbuffer, String> {
        self.clear_stale_errors();
        unsafe {
            let rb = self.gl.create_renderbuffer()?;
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, Some(rb));
            self.gl
                .renderbuffer_storage(glow::RENDERBUFFER, glow::DEPTH_COMPONENT16, width, height);
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, None);

            if let Err(e) = self.take_alloc_error("depth buffer") {
                self.gl.delete_renderbuffer(rb);
                return Err(e);
            }
            Ok(rb)
        }
    }

    fn delete_renderbuffer(&self, renderbuffer: Self::Renderbuffer) {
        unsafe { self.gl.delete_renderbuffer(renderbuffer) }
    }

    fn create_framebuffer(
        &self,
        color: Self::Texture,
        depth: Self::Renderbuffer,
    ) -> Result<Self::Framebuffer, String> {
        unsafe {
            let fbo = self.gl.create_framebuffer()?;
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
            self.gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                glow::DEPTH_ATTACHMENT,
                glow::RENDERBUFFER,
                Some(depth),
            );
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(color),
                0,
            );

            let status = self.gl.check_framebuffer_status(glow::FRAMEBUFFER);
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);

            if status != glow::FRAMEBUFFER_COMPLETE {
                self.gl.delete_framebuffer(fbo);
                return Err(format!("framebuffer incomplete: 0x{status:x}"));
            }
            Ok(fbo)
        }
    }

    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer) {
        unsafe { self.gl.delete_framebuffer(framebuffer) }
    }

    fn bind_framebuffer(&self, framebuffer: Option<Self::Framebuffer>) {
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, framebuffer) }
    }

    fn bind_texture(&self, unit: u32, texture: Option<Self::Texture>) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(glow::TEXTURE_2D, texture);
        }
    }

    fn viewport(&self, width: i32, height: i32) {
        unsafe { self.gl.viewport(0, 0, width, height) }
    }

    fn clear(&self, rgba: [f32; 4]) {
        unsafe {
            self.gl.clear_color(rgba[0], rgba[1], rgba[2], rgba[3]);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn create_vertex_buffer(&self, data: &[f32]) -> Result<Self::Buffer, String> {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_ne_bytes()).collect();
        self.clear_stale_errors();
        unsafe {
            let buf = self.gl.create_buffer()?;
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(buf));
            self.gl
                .buffer_data_u8_slice(glow::ARRAY_BUFFER, &bytes, glow::STATIC_DRAW);
            if let Err(e) = self.take_alloc_error("vertex buffer") {
                self.gl.delete_buffer(buf);
                return Err(e);
            }
            Ok(buf)
        }
    }

    fn delete_buffer(&self, buffer: Self::Buffer) {
        unsafe { self.gl.delete_buffer(buffer) }
    }

    fn bind_vertex_attrib(&self, buffer: Self::Buffer, index: u32, components: i32) {
        unsafe {
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            self.gl.enable_vertex_attrib_array(index);
            self.gl
                .vertex_attrib_pointer_f32(index, components, glow::FLOAT, false, 0, 0);
        }
    }

    fn draw_triangle_strip(&self, count: i32) {
        unsafe { self.gl.draw_arrays(glow::TRIANGLE_STRIP, 0, count) }
    }

    fn flush(&self) {
        unsafe { self.gl.flush() }
    }

    fn supports_extension(&self, name: &str) -> bool {
        // Desktop GL spells ES extensions with a GL_ prefix.
        let ext = self.gl.supported_extensions();
        ext.contains(name) || ext.contains(&format!("GL_{name}"))
    }

    fn read_pixel(&self, x: i32, y: i32) -> [u8; 4] {
        let mut px = [0u8; 4];
        unsafe {
            self.gl.read_pixels(
                x,
                y,
                1,
                1,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(Some(&mut px)),
            );
        }
        px
    }
}

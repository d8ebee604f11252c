//! GPU context collaborator
//!
//! The engine never creates a context. It is handed something that already has a current,
//! drawable-bound context and talks to it through [`GpuContext`]. The production
//! implementation is [`GlowContext`] over `glow`; tests use a recording
//! fake.
//!
//! Methods are deliberately close to the GL calls they wrap. Resource lifetime policy
//! (what is released when, on which failure) lives in the callers, not here.

use std::fmt;

pub mod gl;

#[cfg(test)]
pub(crate) mod fake;

pub use self::gl::GlowContext;

/// Texture unit the feedback (previous frame) texture is bound to.
pub const FEEDBACK_UNIT: u32 = 0;
/// Texture unit the post-process blit samples from.
pub const PRESENT_UNIT: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

pub trait GpuContext {
    type Shader: Copy + fmt::Debug;
    type Program: Copy + PartialEq + fmt::Debug;
    type Texture: Copy + PartialEq + fmt::Debug;
    type Renderbuffer: Copy + PartialEq + fmt::Debug;
    type Framebuffer: Copy + PartialEq + fmt::Debug;
    type Buffer: Copy + fmt::Debug;
    type UniformLocation: Clone + fmt::Debug;

    // --- shaders / programs ---
    fn create_shader(&self, stage: ShaderStage) -> Result<Self::Shader, String>;
    /// Upload source and compile; returns the compile status.
    fn compile_shader(&self, shader: Self::Shader, source: &str) -> bool;
    fn shader_info_log(&self, shader: Self::Shader) -> String;
    fn delete_shader(&self, shader: Self::Shader);

    fn create_program(&self) -> Result<Self::Program, String>;
    fn attach_shader(&self, program: Self::Program, shader: Self::Shader);
    fn detach_shader(&self, program: Self::Program, shader: Self::Shader);
    /// Link; returns the link status.
    fn link_program(&self, program: Self::Program) -> bool;
    fn program_info_log(&self, program: Self::Program) -> String;
    fn delete_program(&self, program: Self::Program);
    fn use_program(&self, program: Option<Self::Program>);

    fn uniform_location(&self, program: Self::Program, name: &str) -> Option<Self::UniformLocation>;
    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32>;
    fn uniform_1f(&self, location: &Self::UniformLocation, v: f32);
    fn uniform_2f(&self, location: &Self::UniformLocation, x: f32, y: f32);
    fn uniform_1i(&self, location: &Self::UniformLocation, v: i32);

    // --- render targets ---
    /// RGBA8, nearest filtering, clamp-to-edge, no initial data.
    fn create_color_texture(&self, width: i32, height: i32) -> Result<Self::Texture, String>;
    fn delete_texture(&self, texture: Self::Texture);
    /// 16-bit depth renderbuffer.
    fn create_depth_buffer(&self, width: i32, height: i32) -> Result<Self::Renderbuffer, String>;
    fn delete_renderbuffer(&self, renderbuffer: Self::Renderbuffer);
    /// Framebuffer with `color` on attachment 0 and `depth` as depth; checked for completeness.
    fn create_framebuffer(
        &self,
        color: Self::Texture,
        depth: Self::Renderbuffer,
    ) -> Result<Self::Framebuffer, String>;
    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer);

    /// `None` binds the visible surface.
    fn bind_framebuffer(&self, framebuffer: Option<Self::Framebuffer>);
    fn bind_texture(&self, unit: u32, texture: Option<Self::Texture>);
    fn viewport(&self, width: i32, height: i32);
    fn clear(&self, rgba: [f32; 4]);

    // --- geometry / submission ---
    fn create_vertex_buffer(&self, data: &[f32]) -> Result<Self::Buffer, String>;
    fn delete_buffer(&self, buffer: Self::Buffer);
    fn bind_vertex_attrib(&self, buffer: Self::Buffer, index: u32, components: i32);
    fn draw_triangle_strip(&self, count: i32);
    fn flush(&self);

    /// Best-effort extension query and enable. Absence is never an error.
    fn supports_extension(&self, name: &str) -> bool;
    /// Read one RGBA8 pixel from the currently bound framebuffer.
    fn read_pixel(&self, x: i32, y: i32) -> [u8; 4];
}

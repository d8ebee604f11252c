//! Ping-pong render targets
//!
//! Two offscreen targets sized to the viewport. Each frame draws into `front`, samples
//! `back` as the previous frame, then the two trade places.

use crate::error::EngineError;
use crate::gpu::GpuContext;
use crate::logi;

pub struct RenderTarget<G: GpuContext> {
    pub color: G::Texture,
    pub depth: G::Renderbuffer,
    pub framebuffer: G::Framebuffer,
    pub width: u32,
    pub height: u32,
}

impl<G: GpuContext> RenderTarget<G> {
    fn create(gpu: &G, width: u32, height: u32) -> Result<Self, String> {
        let dim = |v: u32| i32::try_from(v).map_err(|_| format!("{v} exceeds the GL size range"));
        let (w, h) = (dim(width)?, dim(height)?);
        let depth = gpu.create_depth_buffer(w, h)?;
        let color = match gpu.create_color_texture(w, h) {
            Ok(t) => t,
            Err(e) => {
                gpu.delete_renderbuffer(depth);
                return Err(e);
            }
        };
        let framebuffer = match gpu.create_framebuffer(color, depth) {
            Ok(fb) => fb,
            Err(e) => {
                gpu.delete_texture(color);
                gpu.delete_renderbuffer(depth);
                return Err(e);
            }
        };
        Ok(Self { color, depth, framebuffer, width, height })
    }

    fn destroy(self, gpu: &G) {
        gpu.delete_framebuffer(self.framebuffer);
        gpu.delete_texture(self.color);
        gpu.delete_renderbuffer(self.depth);
    }
}

pub struct FramebufferPair<G: GpuContext> {
    front: Option<RenderTarget<G>>,
    back: Option<RenderTarget<G>>,
    // Only occupied for the duration of `swap`.
    temp: Option<RenderTarget<G>>,
}

impl<G: GpuContext> Default for FramebufferPair<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: GpuContext> FramebufferPair<G> {
    pub fn new() -> Self {
        Self { front: None, back: None, temp: None }
    }

    /// Replace both targets with fresh ones at `width`x`height`.
    ///
    /// Prior targets are released first. On failure nothing stays allocated.
    pub fn allocate(&mut self, gpu: &G, width: u32, height: u32) -> Result<(), EngineError> {
        self.release(gpu);

        let fail = |reason: String| EngineError::AllocationFailure { width, height, reason };
        let front = RenderTarget::create(gpu, width, height).map_err(fail)?;
        let back = match RenderTarget::create(gpu, width, height) {
            Ok(t) => t,
            Err(reason) => {
                front.destroy(gpu);
                return Err(fail(reason));
            }
        };

        self.front = Some(front);
        self.back = Some(back);
        logi!("TARGETS", "allocated ping-pong targets {width}x{height}");
        Ok(())
    }

    pub fn release(&mut self, gpu: &G) {
        for t in [self.front.take(), self.back.take(), self.temp.take()].into_iter().flatten() {
            t.destroy(gpu);
        }
    }

    /// Draw destination for the current frame.
    pub fn front(&self) -> Option<&RenderTarget<G>> {
        self.front.as_ref()
    }

    /// Previous frame's output, sampled as feedback.
    pub fn back(&self) -> Option<&RenderTarget<G>> {
        self.back.as_ref()
    }

    /// Exchange front and back identities. Nothing is copied.
    pub fn swap(&mut self) {
        self.temp = self.front.take();
        self.front = self.back.take();
        self.back = self.temp.take();
    }

    /// Clear both color buffers, leaving the visible surface bound.
    pub fn clear(&self, gpu: &G, rgba: [f32; 4]) {
        for t in [&self.front, &self.back].into_iter().flatten() {
            gpu.bind_framebuffer(Some(t.framebuffer));
            gpu.viewport(t.width as i32, t.height as i32);
            gpu.clear(rgba);
        }
        gpu.bind_framebuffer(None);
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.front.as_ref().map(|t| (t.width, t.height))
    }

    pub fn is_allocated(&self) -> bool {
        self.front.is_some() && self.back.is_some()
    }
}

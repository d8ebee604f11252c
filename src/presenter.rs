use std::num::NonZeroU32;

use glutin::context::PossiblyCurrentContext;
use glutin::prelude::*;
use glutin::surface::{Surface, WindowSurface};
use winit::window::Window;

/// Window-side half of the preview: owns the window, its GL surface and the current
/// context, and knows how to resize and present them.
///
/// The engine has already drawn into the default framebuffer by the time `present` runs;
/// presenting is just the buffer swap.
pub struct WindowPresenter {
    window: Window,
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
}

impl WindowPresenter {
    pub fn new(window: Window, surface: Surface<WindowSurface>, context: PossiblyCurrentContext) -> Self {
        Self { window, surface, context }
    }

    /// Physical size of the drawable in pixels.
    pub fn drawable_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    /// Resize the GL surface. Zero-sized requests (minimized windows) are ignored.
    pub fn resize_surface(&self, w: u32, h: u32) {
        if let (Some(w), Some(h)) = (NonZeroU32::new(w), NonZeroU32::new(h)) {
            self.surface.resize(&self.context, w, h);
        }
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    pub fn set_title(&self, title: &str) {
        self.window.set_title(title);
    }

    pub fn present(&self) -> anyhow::Result<()> {
        self.surface.swap_buffers(&self.context)?;
        Ok(())
    }
}

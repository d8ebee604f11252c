//! Preview engine facade
//!
//! Owns the dialect, the shader builder, the ping-pong targets and the render loop, and
//! is the only thing callers talk to. All GPU work happens on the thread that owns the
//! engine; other threads go through an [`EngineHandle`], whose commands are applied at the
//! start of the next [`PreviewEngine::pump`] / [`PreviewEngine::tick`].

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::builder::{ShaderBuilder, ShaderProgram, USER_VERTEX_SRC};
use crate::dialect::RenderMode;
use crate::error::EngineError;
use crate::events::BuildResult;
use crate::gpu::GpuContext;
use crate::render_loop::{FrameState, RenderLoop};
use crate::targets::FramebufferPair;
use crate::{logi, logw, loge};

const DERIVATIVES_EXT: &str = "OES_standard_derivatives";
const FEEDBACK_CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub mode: RenderMode,
    pub width: u32,
    pub height: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { mode: RenderMode::Classic, width: 512, height: 512 }
    }
}

/// Work queued by an [`EngineHandle`] for the render thread.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    SetSource(String),
    SetMode(RenderMode),
    Resize(u32, u32),
    Start,
    Stop,
}

/// Cross-thread control surface. Cheap to clone; never blocks on the render thread.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: Sender<EngineCommand>,
    mouse: Arc<Mutex<[f32; 2]>>,
}

impl EngineHandle {
    fn send(&self, cmd: EngineCommand) {
        if self.tx.send(cmd).is_err() {
            logw!("ENGINE", "command dropped: engine is gone");
        }
    }

    pub fn set_source(&self, source: impl Into<String>) {
        self.send(EngineCommand::SetSource(source.into()));
    }

    pub fn set_mode(&self, mode: RenderMode) {
        self.send(EngineCommand::SetMode(mode));
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.send(EngineCommand::Resize(width, height));
    }

    pub fn start(&self) {
        self.send(EngineCommand::Start);
    }

    pub fn stop(&self) {
        self.send(EngineCommand::Stop);
    }

    /// Normalized, origin bottom-left. Visible to the very next frame.
    pub fn set_mouse_position(&self, x: f32, y: f32) {
        if let Ok(mut m) = self.mouse.lock() {
            *m = [x, y];
        }
    }
}

type BuildObserver = Box<dyn FnMut(&BuildResult)>;
type FrameObserver = Box<dyn FnMut(&FrameState)>;

pub struct PreviewEngine<G: GpuContext> {
    gpu: G,
    mode: RenderMode,
    builder: ShaderBuilder<G>,
    targets: FramebufferPair<G>,
    render_loop: RenderLoop<G>,
    viewport: (u32, u32),
    // Set when target allocation fails; cleared by the next successful allocation.
    session_failed: bool,
    derivatives: bool,
    mouse: Arc<Mutex<[f32; 2]>>,
    tx: Sender<EngineCommand>,
    rx: Receiver<EngineCommand>,
    on_build: Option<BuildObserver>,
    on_frame: Option<FrameObserver>,
}

impl<G: GpuContext> PreviewEngine<G> {
    /// Take ownership of an already-current context and create the fixed resources.
    ///
    /// Fails only with [`EngineError::ContextUnavailable`]. A first target allocation that
    /// fails leaves the engine in the failed-session state instead.
    pub fn new(gpu: G, options: EngineOptions) -> Result<Self, EngineError> {
        let derivatives = gpu.supports_extension(DERIVATIVES_EXT);
        if derivatives {
            logi!("ENGINE", "{DERIVATIVES_EXT} available");
        } else {
            logi!("ENGINE", "{DERIVATIVES_EXT} not available (dFdx/dFdy shaders may not compile)");
        }

        let render_loop = RenderLoop::new(&gpu)?;
        let (tx, rx) = unbounded();
        let mut engine = Self {
            gpu,
            mode: options.mode,
            builder: ShaderBuilder::new(),
            targets: FramebufferPair::new(),
            render_loop,
            viewport: (0, 0),
            session_failed: false,
            derivatives,
            mouse: Arc::new(Mutex::new([0.0, 0.0])),
            tx,
            rx,
            on_build: None,
            on_frame: None,
        };

        if let Err(e) = engine.resize(options.width, options.height) {
            loge!("ENGINE", "initial render targets unavailable: {e}");
        }
        logi!("ENGINE", "ready ({} mode, {}x{})", engine.mode, engine.viewport.0, engine.viewport.1);
        Ok(engine)
    }

    /// Called with every build outcome, on the render thread.
    pub fn on_build_result(&mut self, f: impl FnMut(&BuildResult) + 'static) {
        self.on_build = Some(Box::new(f));
    }

    /// Called after every completed frame, on the render thread.
    pub fn on_frame(&mut self, f: impl FnMut(&FrameState) + 'static) {
        self.on_frame = Some(Box::new(f));
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle { tx: self.tx.clone(), mouse: Arc::clone(&self.mouse) }
    }

    /// Build `source` under the current mode.
    ///
    /// Returns `None` without building when `source` is empty, identical to the last attempt
    /// under this mode, or what the running program was built from.
    pub fn set_source(&mut self, source: &str) -> Option<BuildResult> {
        if source.is_empty() {
            return None;
        }
        if self.builder.last_attempt_matches(source, self.mode) || self.builder.built_matches(source, self.mode) {
            return None;
        }
        Some(self.build(source))
    }

    /// Switch dialect. The last source, if any, is rebuilt under the new one.
    pub fn set_mode(&mut self, mode: RenderMode) -> Option<BuildResult> {
        if mode == self.mode {
            return None;
        }
        logi!("ENGINE", "mode {} -> {mode}", self.mode);
        self.mode = mode;

        let source = self.builder.attempted_source().map(str::to_string)?;
        Some(self.build(&source))
    }

    fn build(&mut self, source: &str) -> BuildResult {
        let result = self.builder.build(&self.gpu, USER_VERTEX_SRC, source, self.mode);
        if result.is_success() {
            self.targets.clear(&self.gpu, FEEDBACK_CLEAR);
            if !self.render_loop.is_running() && !self.session_failed {
                self.start_loop();
            }
        }
        if let Some(cb) = self.on_build.as_mut() {
            cb(&result);
        }
        result
    }

    /// Match the targets to a new viewport. Dimensions clamp to at least 1.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        let size = (width.max(1), height.max(1));
        if size == self.viewport && self.targets.is_allocated() {
            return Ok(());
        }
        self.viewport = size;

        match self.targets.allocate(&self.gpu, size.0, size.1) {
            Ok(()) => {
                self.targets.clear(&self.gpu, FEEDBACK_CLEAR);
                if self.session_failed {
                    self.session_failed = false;
                    logi!("ENGINE", "render targets recovered at {}x{}", size.0, size.1);
                    if self.builder.current().is_some() {
                        self.start_loop();
                    }
                }
                Ok(())
            }
            Err(e) => {
                self.render_loop.stop();
                self.session_failed = true;
                loge!("ENGINE", "{e}; loop stopped");
                Err(e)
            }
        }
    }

    pub fn set_mouse_position(&self, x: f32, y: f32) {
        if let Ok(mut m) = self.mouse.lock() {
            *m = [x, y];
        }
    }

    /// Refused without a current program or while render targets are unavailable.
    pub fn start(&mut self) -> bool {
        if self.builder.current().is_none() {
            logw!("ENGINE", "start refused: no shader program");
            return false;
        }
        if self.session_failed {
            logw!("ENGINE", "start refused: render targets unavailable");
            return false;
        }
        self.start_loop()
    }

    // Every Stopped -> Running transition starts from a fresh clock and a zeroed mouse.
    fn start_loop(&mut self) -> bool {
        let started = self.render_loop.start(Instant::now());
        if started {
            self.set_mouse_position(0.0, 0.0);
        }
        started
    }

    pub fn stop(&mut self) -> bool {
        self.render_loop.stop()
    }

    /// Apply queued handle commands. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(cmd) = self.rx.try_recv() {
            self.apply(cmd);
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::SetSource(src) => {
                self.set_source(&src);
            }
            EngineCommand::SetMode(mode) => {
                self.set_mode(mode);
            }
            EngineCommand::Resize(w, h) => {
                // Failure is logged and reflected in the session state.
                let _ = self.resize(w, h);
            }
            EngineCommand::Start => {
                self.start();
            }
            EngineCommand::Stop => {
                self.stop();
            }
        }
    }

    /// Apply queued commands, then draw one frame if one is scheduled.
    pub fn tick(&mut self) -> bool {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> bool {
        self.pump();
        if !self.render_loop.wants_frame() {
            return false;
        }
        let Some(program) = self.builder.current() else {
            return false;
        };
        let mouse = self.mouse.lock().map(|m| *m).unwrap_or_default();

        match self.render_loop.frame(&self.gpu, program, &mut self.targets, mouse, now) {
            Some(fs) => {
                if let Some(cb) = self.on_frame.as_mut() {
                    cb(fs);
                }
                true
            }
            None => false,
        }
    }

    /// One RGBA8 pixel of the visible surface.
    pub fn read_pixel(&self, x: i32, y: i32) -> [u8; 4] {
        self.gpu.bind_framebuffer(None);
        self.gpu.read_pixel(x, y)
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.render_loop.is_running()
    }

    pub fn wants_frame(&self) -> bool {
        self.render_loop.wants_frame()
    }

    pub fn is_session_failed(&self) -> bool {
        self.session_failed
    }

    pub fn has_derivatives(&self) -> bool {
        self.derivatives
    }

    pub fn frame_state(&self) -> &FrameState {
        self.render_loop.frame_state()
    }

    pub fn targets(&self) -> &FramebufferPair<G> {
        &self.targets
    }

    pub fn program(&self) -> Option<&ShaderProgram<G>> {
        self.builder.current()
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }
}

impl<G: GpuContext> Drop for PreviewEngine<G> {
    fn drop(&mut self) {
        self.builder.release(&self.gpu);
        self.targets.release(&self.gpu);
        self.render_loop.release(&self.gpu);
    }
}

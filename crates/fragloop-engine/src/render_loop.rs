//! Per-frame draw/swap loop
//!
//! One frame: draw the user program into the front target with the back target bound as
//! feedback, blit the front target to the visible surface through a fixed post-process
//! program, flush, swap. The loop never schedules itself; the display-sync driver polls
//! [`RenderLoop::wants_frame`] and calls [`RenderLoop::frame`].

use std::time::Instant;

use crate::builder::{self, Linked, ShaderProgram};
use crate::error::EngineError;
use crate::gpu::{GpuContext, FEEDBACK_UNIT, PRESENT_UNIT};
use crate::logi;
use crate::targets::FramebufferPair;

/// Full-screen quad in NDC, drawn as a 4-vertex triangle strip.
pub const QUAD_VERTICES: [f32; 12] = [-1.0, 1.0, 0.0, -1.0, -1.0, 0.0, 1.0, 1.0, 0.0, 1.0, -1.0, 0.0];
const QUAD_VERTEX_COUNT: i32 = 4;

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

const POST_VERTEX_SRC: &str = "attribute vec3 position;\nvarying vec2 vTexCoord;\nvoid main(){\n  vTexCoord = (position.xy + 1.0) * 0.5;\n  gl_Position = vec4(position, 1.0);\n}\n";
// GLSL 1.10/1.20 reject precision qualifiers; only ES gets one.
const POST_FRAGMENT_SRC: &str = "#ifdef GL_ES\nprecision mediump float;\n#endif\nuniform sampler2D u_frame;\nvarying vec2 vTexCoord;\nvoid main(){\n  gl_FragColor = texture2D(u_frame, vTexCoord);\n}\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Stopped,
    Running,
}

/// What the frame observer sees after each completed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameState {
    pub start: Option<Instant>,
    /// Seconds since `start`.
    pub elapsed: f32,
    /// Normalized, origin bottom-left.
    pub mouse: [f32; 2],
    pub viewport: (u32, u32),
    pub frame_index: u64,
}

impl Default for FrameState {
    fn default() -> Self {
        Self { start: None, elapsed: 0.0, mouse: [0.0, 0.0], viewport: (0, 0), frame_index: 0 }
    }
}

pub struct RenderLoop<G: GpuContext> {
    state: LoopState,
    scheduled: bool,
    frame: FrameState,
    quad: Option<G::Buffer>,
    post: Option<Linked<G>>,
    post_sampler: Option<G::UniformLocation>,
    post_position: Option<u32>,
}

impl<G: GpuContext> RenderLoop<G> {
    /// Create the quad buffer and the post-process program.
    pub fn new(gpu: &G) -> Result<Self, EngineError> {
        let post = builder::compile_fixed(gpu, POST_VERTEX_SRC, POST_FRAGMENT_SRC)?;
        let quad = match gpu.create_vertex_buffer(&QUAD_VERTICES) {
            Ok(b) => b,
            Err(reason) => {
                post.destroy(gpu);
                return Err(EngineError::ContextUnavailable { reason: format!("quad buffer: {reason}") });
            }
        };
        let post_sampler = gpu.uniform_location(post.program(), "u_frame");
        let post_position = gpu.attrib_location(post.program(), "position");

        Ok(Self {
            state: LoopState::Stopped,
            scheduled: false,
            frame: FrameState::default(),
            quad: Some(quad),
            post: Some(post),
            post_sampler,
            post_position,
        })
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    /// True when a frame is scheduled for the next display-sync tick.
    pub fn wants_frame(&self) -> bool {
        self.scheduled
    }

    pub fn frame_state(&self) -> &FrameState {
        &self.frame
    }

    /// Stopped → Running. Restarts the clock and zeroes the mouse; a no-op while already
    /// running. The caller owns the live mouse value and resets it when this returns true.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.state == LoopState::Running {
            return false;
        }
        self.state = LoopState::Running;
        self.frame.start = Some(now);
        self.frame.elapsed = 0.0;
        self.frame.mouse = [0.0, 0.0];
        self.frame.frame_index = 0;
        self.scheduled = true;
        logi!("LOOP", "started");
        true
    }

    /// Running → Stopped. Cancels the scheduled frame.
    pub fn stop(&mut self) -> bool {
        self.scheduled = false;
        if self.state == LoopState::Stopped {
            return false;
        }
        self.state = LoopState::Stopped;
        logi!("LOOP", "stopped after {} frames ({:.2}s)", self.frame.frame_index, self.frame.elapsed);
        true
    }

    /// Run one frame. Returns `None` (drawing nothing) unless running with allocated targets.
    pub fn frame(
        &mut self,
        gpu: &G,
        program: &ShaderProgram<G>,
        targets: &mut FramebufferPair<G>,
        mouse: [f32; 2],
        now: Instant,
    ) -> Option<&FrameState> {
        if self.state != LoopState::Running {
            return None;
        }
        let (Some(post), Some(quad)) = (self.post.as_ref(), self.quad) else {
            return None;
        };
        let (front, back) = match (targets.front(), targets.back()) {
            (Some(f), Some(b)) => (f, b),
            _ => return None,
        };
        let (w, h) = (front.width, front.height);

        let start = *self.frame.start.get_or_insert(now);
        self.frame.elapsed = now.saturating_duration_since(start).as_secs_f32();
        self.frame.mouse = mouse;
        self.frame.viewport = (w, h);

        // Feedback pass: user program into front, previous frame on the feedback unit.
        gpu.use_program(Some(program.handle()));
        gpu.bind_framebuffer(Some(front.framebuffer));
        gpu.viewport(w as i32, h as i32);
        gpu.bind_texture(FEEDBACK_UNIT, Some(back.color));

        let u = program.uniforms();
        if let Some(loc) = &u.resolution {
            gpu.uniform_2f(loc, w as f32, h as f32);
        }
        if let Some(loc) = &u.mouse {
            gpu.uniform_2f(loc, mouse[0], mouse[1]);
        }
        if let Some(loc) = &u.time {
            gpu.uniform_1f(loc, self.frame.elapsed);
        }
        if let Some(loc) = &u.feedback_sampler {
            gpu.uniform_1i(loc, FEEDBACK_UNIT as i32);
        }

        gpu.clear(CLEAR_COLOR);
        if let Some(attrib) = u.position_attrib {
            gpu.bind_vertex_attrib(quad, attrib, 3);
        }
        gpu.draw_triangle_strip(QUAD_VERTEX_COUNT);

        // Present pass: front color to the visible surface.
        gpu.bind_framebuffer(None);
        gpu.viewport(w as i32, h as i32);
        gpu.use_program(Some(post.program()));
        gpu.bind_texture(PRESENT_UNIT, Some(front.color));
        if let Some(loc) = &self.post_sampler {
            gpu.uniform_1i(loc, PRESENT_UNIT as i32);
        }
        if let Some(attrib) = self.post_position {
            gpu.bind_vertex_attrib(quad, attrib, 3);
        }
        gpu.draw_triangle_strip(QUAD_VERTEX_COUNT);

        gpu.flush();
        targets.swap();

        self.frame.frame_index += 1;
        self.scheduled = true;
        Some(&self.frame)
    }

    /// Release the post-process program and the quad. The loop cannot draw afterwards.
    pub fn release(&mut self, gpu: &G) {
        self.stop();
        gpu.use_program(None);
        if let Some(quad) = self.quad.take() {
            gpu.delete_buffer(quad);
        }
        if let Some(post) = self.post.take() {
            post.destroy(gpu);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::builder::{ShaderBuilder, USER_VERTEX_SRC};
    use crate::dialect::RenderMode;
    use crate::gpu::fake::FakeGpu;

    const FEEDBACK_SHADER: &str = "precision mediump float;\nuniform vec2 resolution;\nuniform vec2 mouse;\nuniform float time;\nuniform sampler2D backbuffer;\nvoid main(){gl_FragColor = vec4(0.0, 0.0, 1.0, 1.0);}\n";

    struct Rig {
        gpu: FakeGpu,
        builder: ShaderBuilder<FakeGpu>,
        targets: FramebufferPair<FakeGpu>,
        rl: RenderLoop<FakeGpu>,
    }

    fn rig(fragment: &str, mode: RenderMode) -> Rig {
        let gpu = FakeGpu::new();
        let mut builder = ShaderBuilder::new();
        assert!(builder.build(&gpu, USER_VERTEX_SRC, fragment, mode).is_success());
        let mut targets = FramebufferPair::new();
        targets.allocate(&gpu, 320, 240).expect("allocate");
        let rl = RenderLoop::new(&gpu).expect("loop");
        Rig { gpu, builder, targets, rl }
    }

    impl Rig {
        fn frame(&mut self, mouse: [f32; 2], now: Instant) -> Option<FrameState> {
            let program = self.builder.current().expect("program");
            self.rl.frame(&self.gpu, program, &mut self.targets, mouse, now).cloned()
        }
    }

    #[test]
    fn stopped_loop_draws_nothing() {
        let mut r = rig(FEEDBACK_SHADER, RenderMode::Classic);
        assert!(!r.rl.wants_frame());
        assert!(r.frame([0.0, 0.0], Instant::now()).is_none());
        assert!(r.gpu.state().draws.is_empty());
    }

    #[test]
    fn frame_draws_feedback_pass_then_present_pass_and_swaps() {
        let mut r = rig(FEEDBACK_SHADER, RenderMode::Classic);
        let t0 = Instant::now();
        r.rl.start(t0);

        let front = r.targets.front().map(|t| (t.framebuffer, t.color)).expect("front");
        let back = r.targets.back().map(|t| (t.framebuffer, t.color)).expect("back");

        let fs = r.frame([0.25, 0.75], t0 + Duration::from_millis(1500)).expect("frame");
        assert_eq!(fs.frame_index, 1);
        assert_eq!(fs.viewport, (320, 240));
        assert!((fs.elapsed - 1.5).abs() < 1e-3);

        let s = r.gpu.state();
        assert_eq!(s.draws.len(), 2);
        let (feedback, present) = (&s.draws[0], &s.draws[1]);
        assert_eq!(feedback.target, Some(front.0));
        assert_eq!(feedback.feedback, Some(back.1));
        assert_eq!(feedback.color, [0, 0, 255, 255]);
        assert_eq!(present.target, None);
        assert_eq!(present.present, Some(front.1));
        assert_eq!(s.screen, [0, 0, 255, 255]);
        assert_eq!(s.flushes, 1);

        assert_eq!(s.last_uniform("resolution"), Some(&[320.0, 240.0][..]));
        assert_eq!(s.last_uniform("mouse"), Some(&[0.25, 0.75][..]));
        assert_eq!(s.last_uniform("backbuffer"), Some(&[0.0][..]));
        assert_eq!(s.last_uniform("u_frame"), Some(&[1.0][..]));
        drop(s);

        assert_eq!(r.targets.front().map(|t| t.framebuffer), Some(back.0));
        assert_eq!(r.targets.back().map(|t| t.framebuffer), Some(front.0));
        assert!(r.rl.wants_frame());
    }

    #[test]
    fn absent_uniforms_are_skipped() {
        let src = "precision mediump float;\nvoid main(){gl_FragColor = vec4(1.0, 1.0, 1.0, 1.0);}\n";
        let mut r = rig(src, RenderMode::Geek);
        r.rl.start(Instant::now());
        r.frame([0.5, 0.5], Instant::now()).expect("frame");

        let s = r.gpu.state();
        for name in ["r", "m", "t", "b"] {
            assert!(s.last_uniform(name).is_none(), "{name} written");
        }
        assert_eq!(s.screen, [255, 255, 255, 255]);
    }

    #[test]
    fn stop_then_start_resets_the_clock() {
        let mut r = rig(FEEDBACK_SHADER, RenderMode::Classic);
        let t0 = Instant::now();
        r.rl.start(t0);
        r.frame([0.0, 0.0], t0 + Duration::from_secs(3)).expect("frame");
        assert!(r.rl.stop());
        assert!(!r.rl.wants_frame());
        assert!(!r.rl.stop(), "stop is idempotent");

        let t1 = t0 + Duration::from_secs(10);
        assert!(r.rl.start(t1));
        assert!(!r.rl.start(t1), "start is idempotent while running");
        let fs = r.frame([0.0, 0.0], t1 + Duration::from_millis(5)).expect("frame");
        assert!(fs.elapsed < 0.01, "elapsed={}", fs.elapsed);
        assert_eq!(fs.frame_index, 1);
        assert_eq!(r.gpu.state().last_uniform("time").map(|v| v[0] < 0.01), Some(true));
    }

    #[test]
    fn post_program_builds_on_desktop_glsl() {
        let gpu = FakeGpu::new();
        gpu.state_mut().desktop_glsl = true;
        let mut rl = RenderLoop::new(&gpu).expect("post program compiles without ES precision");
        rl.release(&gpu);
        assert_eq!(gpu.state().live_gpu_objects(), 0);
    }

    #[test]
    fn start_zeroes_the_recorded_mouse() {
        let mut r = rig(FEEDBACK_SHADER, RenderMode::Classic);
        let t0 = Instant::now();
        r.rl.start(t0);
        let fs = r.frame([0.6, 0.4], t0).expect("frame");
        assert_eq!(fs.mouse, [0.6, 0.4]);
        r.rl.stop();
        r.rl.start(t0);
        assert_eq!(r.rl.frame_state().mouse, [0.0, 0.0]);
    }

    #[test]
    fn destroy_releases_internal_resources() {
        let r = rig(FEEDBACK_SHADER, RenderMode::Classic);
        let Rig { gpu, mut builder, mut targets, mut rl } = r;
        rl.release(&gpu);
        builder.release(&gpu);
        targets.release(&gpu);
        assert_eq!(gpu.state().live_gpu_objects(), 0);
        assert!(gpu.state().buffers.is_empty());
    }
}

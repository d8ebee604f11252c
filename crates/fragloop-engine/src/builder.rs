//! Shader build pipeline
//!
//! Turns user fragment text into a linked program without ever disturbing the program that
//! is currently on screen. The previous program is released only after its replacement
//! has linked; any failure releases exactly what that attempt allocated and hands back the
//! driver log, shifted onto the user's line numbers for the active dialect.

use crate::dialect::{self, RenderMode};
use crate::error::EngineError;
use crate::events::BuildResult;
use crate::gpu::{GpuContext, ShaderStage};
use crate::{logi, logw};

/// Vertex stage every user program is linked against.
pub const USER_VERTEX_SRC: &str = "attribute vec3 p;void main(){gl_Position=vec4(p,1.);}";

/// Vertex + fragment + program objects that linked together.
pub(crate) struct Linked<G: GpuContext> {
    vertex: G::Shader,
    fragment: G::Shader,
    program: G::Program,
}

impl<G: GpuContext> Linked<G> {
    pub(crate) fn program(&self) -> G::Program {
        self.program
    }

    pub(crate) fn destroy(self, gpu: &G) {
        gpu.detach_shader(self.program, self.vertex);
        gpu.detach_shader(self.program, self.fragment);
        gpu.delete_shader(self.vertex);
        gpu.delete_shader(self.fragment);
        gpu.delete_program(self.program);
    }
}

/// Compile both stages and link them. Logs in the returned error are the driver's own.
pub(crate) fn compile_and_link<G: GpuContext>(
    gpu: &G,
    vertex_src: &str,
    fragment_src: &str,
) -> Result<Linked<G>, EngineError> {
    let vertex = compile_stage(gpu, ShaderStage::Vertex, vertex_src)?;
    let fragment = match compile_stage(gpu, ShaderStage::Fragment, fragment_src) {
        Ok(fs) => fs,
        Err(e) => {
            gpu.delete_shader(vertex);
            return Err(e);
        }
    };

    let program = match gpu.create_program() {
        Ok(p) => p,
        Err(e) => {
            gpu.delete_shader(vertex);
            gpu.delete_shader(fragment);
            return Err(EngineError::Link { log: format!("create program: {e}") });
        }
    };
    gpu.attach_shader(program, vertex);
    gpu.attach_shader(program, fragment);

    if !gpu.link_program(program) {
        let log = gpu.program_info_log(program);
        Linked::<G> { vertex, fragment, program }.destroy(gpu);
        return Err(EngineError::Link { log });
    }

    Ok(Linked { vertex, fragment, program })
}

/// Internal programs (the post-process blit): no prelude, no remapping. A driver that
/// cannot build these is not usable at all.
pub(crate) fn compile_fixed<G: GpuContext>(
    gpu: &G,
    vertex_src: &str,
    fragment_src: &str,
) -> Result<Linked<G>, EngineError> {
    compile_and_link(gpu, vertex_src, fragment_src).map_err(|e| EngineError::ContextUnavailable {
        reason: format!("internal program failed to build: {e}"),
    })
}

fn compile_stage<G: GpuContext>(
    gpu: &G,
    stage: ShaderStage,
    source: &str,
) -> Result<G::Shader, EngineError> {
    let shader = gpu.create_shader(stage).map_err(|e| EngineError::Compile {
        stage,
        log: format!("create {stage} shader: {e}"),
    })?;

    if !gpu.compile_shader(shader, source) {
        let log = gpu.shader_info_log(shader);
        gpu.delete_shader(shader);
        return Err(EngineError::Compile { stage, log });
    }

    let info = gpu.shader_info_log(shader);
    if !info.trim().is_empty() {
        logi!("BUILD", "{stage} shader info: {}", info.trim_end());
    }
    Ok(shader)
}

/// Resolved locations by role. `None` is the absent sentinel: the program does not use
/// that input and per-frame updates skip it.
pub struct UniformTable<G: GpuContext> {
    pub resolution: Option<G::UniformLocation>,
    pub mouse: Option<G::UniformLocation>,
    pub time: Option<G::UniformLocation>,
    pub feedback_sampler: Option<G::UniformLocation>,
    pub position_attrib: Option<u32>,
}

impl<G: GpuContext> UniformTable<G> {
    fn resolve(gpu: &G, program: G::Program, mode: RenderMode) -> Self {
        let names = dialect::names_for(mode);
        Self {
            resolution: gpu.uniform_location(program, names.resolution),
            mouse: gpu.uniform_location(program, names.mouse),
            time: gpu.uniform_location(program, names.time),
            feedback_sampler: gpu.uniform_location(program, names.backbuffer),
            position_attrib: gpu.attrib_location(program, names.position_attrib),
        }
    }
}

/// A linked user program plus its location table.
pub struct ShaderProgram<G: GpuContext> {
    linked: Linked<G>,
    uniforms: UniformTable<G>,
    mode: RenderMode,
}

impl<G: GpuContext> ShaderProgram<G> {
    pub fn handle(&self) -> G::Program {
        self.linked.program()
    }

    pub fn uniforms(&self) -> &UniformTable<G> {
        &self.uniforms
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    fn destroy(self, gpu: &G) {
        self.linked.destroy(gpu);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceKey {
    fragment: String,
    mode: RenderMode,
}

/// Owns the current program and builds replacements for it.
pub struct ShaderBuilder<G: GpuContext> {
    current: Option<ShaderProgram<G>>,
    built: Option<SourceKey>,
    attempted: Option<SourceKey>,
    builds: usize,
}

impl<G: GpuContext> Default for ShaderBuilder<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: GpuContext> ShaderBuilder<G> {
    pub fn new() -> Self {
        Self { current: None, built: None, attempted: None, builds: 0 }
    }

    pub fn current(&self) -> Option<&ShaderProgram<G>> {
        self.current.as_ref()
    }

    /// Fragment text (without prelude) of the current program.
    pub fn built_source(&self) -> Option<&str> {
        self.built.as_ref().map(|k| k.fragment.as_str())
    }

    /// Fragment text of the most recent build attempt, successful or not.
    pub fn attempted_source(&self) -> Option<&str> {
        self.attempted.as_ref().map(|k| k.fragment.as_str())
    }

    /// True when `fragment` under `mode` is exactly what the last build attempt used.
    pub fn last_attempt_matches(&self, fragment: &str, mode: RenderMode) -> bool {
        self.attempted
            .as_ref()
            .is_some_and(|k| k.mode == mode && k.fragment == fragment)
    }

    /// True when `fragment` under `mode` is what the current program was built from.
    pub fn built_matches(&self, fragment: &str, mode: RenderMode) -> bool {
        self.current.is_some()
            && self.built.as_ref().is_some_and(|k| k.mode == mode && k.fragment == fragment)
    }

    /// Number of build attempts made so far.
    pub fn build_count(&self) -> usize {
        self.builds
    }

    /// Build `fragment_src` (plus the dialect prelude) against `vertex_src`.
    ///
    /// On success the new program becomes current and the old one is released; on failure
    /// the current program is left exactly as it was.
    pub fn build(
        &mut self,
        gpu: &G,
        vertex_src: &str,
        fragment_src: &str,
        mode: RenderMode,
    ) -> BuildResult {
        self.builds += 1;
        self.attempted = Some(SourceKey { fragment: fragment_src.to_string(), mode });

        let full_fragment = dialect::apply_prelude(mode, fragment_src);
        let linked = match compile_and_link(gpu, vertex_src, &full_fragment) {
            Ok(l) => l,
            Err(e) => {
                let log = dialect::remap_diagnostics(e.diagnostic().unwrap_or_default(), mode);
                let err = match e {
                    EngineError::Compile { stage, .. } => EngineError::Compile { stage, log },
                    _ => EngineError::Link { log },
                };
                logw!("BUILD", "{err} (keeping previous program)");
                return BuildResult::Failure(err.diagnostic().unwrap_or_default().to_string());
            }
        };

        let uniforms = UniformTable::resolve(gpu, linked.program(), mode);
        let absent: Vec<&str> = {
            let names = dialect::names_for(mode);
            [
                (uniforms.resolution.is_none(), names.resolution),
                (uniforms.mouse.is_none(), names.mouse),
                (uniforms.time.is_none(), names.time),
                (uniforms.feedback_sampler.is_none(), names.backbuffer),
            ]
            .into_iter()
            .filter_map(|(missing, name)| missing.then_some(name))
            .collect()
        };
        if !absent.is_empty() {
            logi!("BUILD", "unused inputs (skipped per frame): {}", absent.join(", "));
        }

        let next = ShaderProgram { linked, uniforms, mode };
        if let Some(prev) = self.current.replace(next) {
            prev.destroy(gpu);
        }
        self.built = Some(SourceKey { fragment: fragment_src.to_string(), mode });
        logi!("BUILD", "shader compile succeeded ({mode} mode)");
        BuildResult::Success
    }

    /// Release the current program, if any.
    pub fn release(&mut self, gpu: &G) {
        if let Some(prev) = self.current.take() {
            prev.destroy(gpu);
        }
        self.built = None;
        self.attempted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::fake::FakeGpu;

    const CLASSIC_RED: &str = "precision mediump float;\nuniform vec2 resolution;\nuniform float time;\nvoid main(){gl_FragColor = vec4(1.0, 0.0, 0.0, 1.0);}\n";

    fn with_error_on_line_5() -> String {
        "precision mediump float;\nuniform vec2 r;\n\nvoid main(){\n  SYNTAX_ERROR\n}\n".to_string()
    }

    #[test]
    fn valid_pair_links_and_resolves_roles() {
        let gpu = FakeGpu::new();
        let mut b = ShaderBuilder::new();
        assert_eq!(b.build(&gpu, USER_VERTEX_SRC, CLASSIC_RED, RenderMode::Classic), BuildResult::Success);

        let prog = b.current().expect("current program");
        let u = prog.uniforms();
        assert!(u.resolution.is_some());
        assert!(u.time.is_some());
        assert!(u.mouse.is_none(), "undeclared uniform resolves to the absent sentinel");
        assert!(u.feedback_sampler.is_none());
        assert_eq!(u.position_attrib, Some(0));
        assert_eq!(b.built_source(), Some(CLASSIC_RED));
    }

    #[test]
    fn geeker_prelude_is_injected_into_fragment_only() {
        let gpu = FakeGpu::new();
        let mut b = ShaderBuilder::new();
        let src = "void main(){gl_FragColor=vec4(t,0.0,0.0,1.0);}";
        assert!(b.build(&gpu, USER_VERTEX_SRC, src, RenderMode::Geeker).is_success());

        let s = gpu.state();
        let mut stages: Vec<_> = s.shaders.values().collect();
        stages.sort_by_key(|r| r.stage == ShaderStage::Fragment);
        assert_eq!(stages[0].source, USER_VERTEX_SRC);
        assert!(stages[1].source.starts_with(dialect::GEEKER_PRELUDE));
        assert!(stages[1].source.ends_with(src));

        let u = b.current().map(|p| p.uniforms()).expect("program");
        assert!(u.resolution.is_some() && u.mouse.is_some() && u.time.is_some());
        assert!(u.feedback_sampler.is_none(), "geeker prelude does not declare b");
    }

    #[test]
    fn line_five_error_is_reported_per_dialect() {
        let gpu = FakeGpu::new();
        let mut b = ShaderBuilder::new();
        let src = with_error_on_line_5();

        for mode in [RenderMode::Classic, RenderMode::Geek] {
            let log = b.build(&gpu, USER_VERTEX_SRC, &src, mode);
            let diag = log.diagnostic().expect("failure");
            assert!(diag.starts_with("ERROR: 0:5:"), "{mode}: {diag}");
        }

        // The driver sees the prelude as line 1, so it reports line 6; the user sees 5.
        let diag = b.build(&gpu, USER_VERTEX_SRC, &src, RenderMode::Geeker);
        assert!(diag.diagnostic().unwrap_or_default().starts_with("ERROR: 0:5:"), "{diag:?}");
    }

    #[test]
    fn geeker_native_line_is_reported_one_less() {
        let gpu = FakeGpu::new();
        let mut b = ShaderBuilder::new();
        // Error on user line 4 → driver line 5 → reported 4.
        let src = "void main(){\n  float x = 1.0;\n  x += t;\n  SYNTAX_ERROR\n}\n";
        let raw = crate::builder::compile_and_link(&gpu, USER_VERTEX_SRC, &dialect::apply_prelude(RenderMode::Geeker, src));
        let raw_log = raw.err().and_then(|e| e.diagnostic().map(str::to_string)).unwrap_or_default();
        assert!(raw_log.starts_with("ERROR: 0:5:"), "{raw_log}");

        let r = b.build(&gpu, USER_VERTEX_SRC, src, RenderMode::Geeker);
        assert!(r.diagnostic().unwrap_or_default().starts_with("ERROR: 0:4:"), "{r:?}");
    }

    #[test]
    fn failures_release_everything_they_allocated() {
        let gpu = FakeGpu::new();
        let mut b = ShaderBuilder::new();

        // fragment compile failure
        assert!(!b.build(&gpu, USER_VERTEX_SRC, &with_error_on_line_5(), RenderMode::Classic).is_success());
        assert_eq!(gpu.state().live_gpu_objects(), 0);

        // vertex compile failure
        assert!(!b.build(&gpu, "SYNTAX_ERROR", CLASSIC_RED, RenderMode::Classic).is_success());
        assert_eq!(gpu.state().live_gpu_objects(), 0);

        // link failure
        let r = b.build(&gpu, USER_VERTEX_SRC, "uniform float time;", RenderMode::Classic);
        assert!(r.diagnostic().unwrap_or_default().contains("lacks `main'"));
        assert_eq!(gpu.state().live_gpu_objects(), 0);
        assert!(b.current().is_none());
    }

    #[test]
    fn failed_build_keeps_current_and_success_releases_previous() {
        let gpu = FakeGpu::new();
        let mut b = ShaderBuilder::new();
        assert!(b.build(&gpu, USER_VERTEX_SRC, CLASSIC_RED, RenderMode::Classic).is_success());
        let first = b.current().map(|p| p.handle());

        assert!(!b.build(&gpu, USER_VERTEX_SRC, &with_error_on_line_5(), RenderMode::Classic).is_success());
        assert_eq!(b.current().map(|p| p.handle()), first);
        assert_eq!(b.built_source(), Some(CLASSIC_RED));
        assert_eq!(gpu.state().programs.len(), 1);

        let green = CLASSIC_RED.replace("1.0, 0.0, 0.0", "0.0, 1.0, 0.0");
        assert!(b.build(&gpu, USER_VERTEX_SRC, &green, RenderMode::Classic).is_success());
        assert_ne!(b.current().map(|p| p.handle()), first);
        assert_eq!(gpu.state().programs.len(), 1, "previous program released");
        assert_eq!(gpu.state().shaders.len(), 2);

        b.release(&gpu);
        assert_eq!(gpu.state().live_gpu_objects(), 0);
    }

    #[test]
    fn attempts_are_tracked_per_mode() {
        let gpu = FakeGpu::new();
        let mut b = ShaderBuilder::new();
        b.build(&gpu, USER_VERTEX_SRC, CLASSIC_RED, RenderMode::Classic);
        assert!(b.last_attempt_matches(CLASSIC_RED, RenderMode::Classic));
        assert!(!b.last_attempt_matches(CLASSIC_RED, RenderMode::Geek));
        assert_eq!(b.build_count(), 1);
    }
}

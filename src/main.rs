mod hotreload;
mod input;
mod presenter;
mod validate;

use std::cell::Cell;
use std::ffi::CString;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, Context as _};
use clap::Parser;

use glutin::config::{ConfigTemplateBuilder, GlConfig};
use glutin::context::{ContextApi, ContextAttributes, ContextAttributesBuilder, NotCurrentContext, Version};
use glutin::display::{Display, GetGlDisplay};
use glutin::prelude::*;
use glutin::surface::{SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use glutin_winit::DisplayBuilder;
use raw_window_handle::HasRawWindowHandle;

use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::keyboard::PhysicalKey;

use fragloop_engine::assets::read_to_string_result;
use fragloop_engine::config::load_preview_config_at;
use fragloop_engine::logging::clock_hhmm;
use fragloop_engine::{
    load_preview_config, logi, loge, logw, AssetsRoot, ConfigMode, EngineOptions, FpsCounter, GlApi,
    GlowContext, PreviewEngine, PreviewSettings, RenderMode,
};

use crate::hotreload::{AppEvent, HotReload};
use crate::input::{action_for_key, normalized_mouse, InputAction};
use crate::presenter::WindowPresenter;

/// Live GLSL fragment-shader preview with frame feedback.
#[derive(Debug, Parser)]
#[command(name = "fragloop", version, about)]
struct Args {
    /// Assets directory (default: $FRAGLOOP_ASSETS, else the nearest `assets/` upward)
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Fragment shader to preview (overrides preview.json `shader`)
    #[arg(long)]
    shader: Option<PathBuf>,

    /// Uniform dialect: classic, geek, geeker (or 0, 1, 2)
    #[arg(long)]
    mode: Option<RenderMode>,

    /// Fail on unknown config keys and unsupported versions
    #[arg(long)]
    strict: bool,

    /// Append log lines to this file
    #[arg(long, env = "FRAGLOOP_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Initial window width (overrides preview.json)
    #[arg(long)]
    width: Option<u32>,

    /// Initial window height (overrides preview.json)
    #[arg(long)]
    height: Option<u32>,
}

impl Args {
    fn config_mode(&self) -> ConfigMode {
        if self.strict {
            ConfigMode::Strict
        } else {
            ConfigMode::Lenient
        }
    }

    /// Command-line values win over the config file.
    fn apply(&self, mut s: PreviewSettings) -> PreviewSettings {
        if let Some(p) = &self.shader {
            s.shader_path = p.clone();
        }
        if let Some(m) = self.mode {
            s.mode = m;
        }
        if let Some(w) = self.width {
            s.width = w.max(1);
        }
        if let Some(h) = self.height {
            s.height = h.max(1);
        }
        s
    }
}

fn window_title(base: &str, mode: RenderMode, running: bool, fps: Option<f32>) -> String {
    let state = match (running, fps) {
        (false, _) => "stopped".to_string(),
        (true, Some(f)) => format!("{f:.0} fps"),
        (true, None) => "running".to_string(),
    };
    format!("{base} - {mode} - {state} (1/2/3 = classic/geek/geeker, Esc = stop, Space = restart)")
}

fn run_validation(config_path: &Path, assets_dir: &Path) {
    match fragloop_engine::config::load_json_file(config_path) {
        Ok(loaded) => {
            let issues = validate::validate_preview_json(&loaded.value, assets_dir);
            validate::emit_summary("CONFIG", "preview.json", &issues);
            validate::emit_issues("CONFIG", &issues);
        }
        Err(e) => loge!("CONFIG", "{e}"),
    }
}

/// Highest multisample count wins.
fn pick_config(configs: impl Iterator<Item = glutin::config::Config>) -> Option<glutin::config::Config> {
    configs.reduce(|a, b| if a.num_samples() > b.num_samples() { a } else { b })
}

fn context_attempts(gl_api: GlApi, raw: raw_window_handle::RawWindowHandle) -> Vec<(&'static str, ContextAttributes)> {
    let gles = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::Gles(Some(Version::new(2, 0))))
        .build(Some(raw));
    let gl21 = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::OpenGl(Some(Version::new(2, 1))))
        .build(Some(raw));
    match gl_api {
        GlApi::Auto => vec![("GLES 2.0", gles), ("OpenGL 2.1", gl21)],
        GlApi::Gles => vec![("GLES 2.0", gles)],
        GlApi::Gl => vec![("OpenGL 2.1", gl21)],
    }
}

fn create_context(
    display: &Display,
    config: &glutin::config::Config,
    attempts: Vec<(&'static str, ContextAttributes)>,
) -> anyhow::Result<NotCurrentContext> {
    for (label, attrs) in attempts {
        match unsafe { display.create_context(config, &attrs) } {
            Ok(ctx) => {
                logi!("GL", "created {label} context");
                return Ok(ctx);
            }
            Err(e) => logw!("GL", "{label} context unavailable: {e}"),
        }
    }
    Err(anyhow!("no usable GL context (tried GLES 2.0 / OpenGL 2.1)"))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let run_id = fragloop_engine::logging::init(args.log_file.clone());
    logi!("INIT", "run_id={run_id}");

    let assets = match &args.assets {
        Some(p) => AssetsRoot::at(p)?,
        None => AssetsRoot::discover(&std::env::current_dir()?)?,
    };
    let config_mode = args.config_mode();
    let settings = args.apply(load_preview_config(&assets, config_mode)?);
    let config_path = settings
        .config_path
        .clone()
        .unwrap_or_else(|| assets.pick_platform_json("preview"));

    logi!("INIT", "assets base: {}", assets.path().display());
    logi!("INIT", "config: {} ({config_mode:?})", config_path.display());
    logi!("INIT", "shader: {}", settings.shader_path.display());
    if settings.config_path.is_some() {
        run_validation(&config_path, assets.path());
    }

    let initial_source = read_to_string_result(&settings.shader_path)?;

    let event_loop = EventLoopBuilder::<AppEvent>::with_user_event().build()?;
    let window_builder = winit::window::WindowBuilder::new()
        .with_title(&settings.title)
        .with_inner_size(PhysicalSize::new(settings.width, settings.height));

    let template = ConfigTemplateBuilder::new().with_alpha_size(8);
    let display_builder = DisplayBuilder::new().with_window_builder(Some(window_builder));
    let (window, gl_config) = display_builder
        .build(&event_loop, template, |configs| match pick_config(configs) {
            Some(config) => config,
            // The picker has to hand back a config; with none there is nothing to render to.
            None => {
                loge!("GL", "no framebuffer config matches this window");
                std::process::exit(1)
            }
        })
        .map_err(|e| anyhow!("failed to build display: {e}"))?;
    let window = window.ok_or_else(|| anyhow!("no window created"))?;

    let raw_window_handle = window.raw_window_handle();
    let gl_display = gl_config.display();
    let not_current = create_context(&gl_display, &gl_config, context_attempts(settings.gl_api, raw_window_handle))?;

    let size = window.inner_size();
    let attrs = SurfaceAttributesBuilder::<WindowSurface>::new().build(
        raw_window_handle,
        NonZeroU32::new(size.width).unwrap_or(NonZeroU32::MIN),
        NonZeroU32::new(size.height).unwrap_or(NonZeroU32::MIN),
    );
    let gl_surface = unsafe { gl_display.create_window_surface(&gl_config, &attrs) }
        .context("create_window_surface failed")?;
    let gl_context = not_current.make_current(&gl_surface).context("make_current failed")?;

    let interval = if settings.vsync {
        SwapInterval::Wait(NonZeroU32::MIN)
    } else {
        SwapInterval::DontWait
    };
    if let Err(e) = gl_surface.set_swap_interval(&gl_context, interval) {
        logw!("GL", "swap interval not applied: {e}");
    }

    let gl = unsafe {
        glow::Context::from_loader_function(|s| match CString::new(s) {
            Ok(c) => gl_display.get_proc_address(&c),
            Err(_) => std::ptr::null(),
        })
    };

    let presenter = WindowPresenter::new(window, gl_surface, gl_context);
    let (w, h) = presenter.drawable_size();
    let mut engine = PreviewEngine::new(
        GlowContext::new(gl),
        EngineOptions { mode: settings.mode, width: w, height: h },
    )?;

    engine.on_build_result(|r| println!("{}", r.summary_line(&clock_hhmm())));

    let fps_seen: Rc<Cell<Option<f32>>> = Rc::new(Cell::new(None));
    {
        let fps_seen = Rc::clone(&fps_seen);
        let mut fps = FpsCounter::default();
        engine.on_frame(move |_| {
            if let Some(v) = fps.tick(std::time::Instant::now()) {
                fps_seen.set(Some(v));
            }
        });
    }

    let hot = match HotReload::new(
        assets.path(),
        settings.shader_path.clone(),
        &config_path,
        engine.handle(),
        event_loop.create_proxy(),
    ) {
        Ok(h) => Some(h),
        Err(e) => {
            logw!("WATCH", "hot reload disabled: {e}");
            None
        }
    };

    engine.set_source(&initial_source);

    let mut settings = settings;
    let mut last_fps: Option<f32> = None;
    presenter.set_title(&window_title(&settings.title, engine.mode(), engine.is_running(), None));

    event_loop.run(move |event, target| {
        match event {
            Event::UserEvent(AppEvent::ShaderQueued) => {
                if engine.pump() > 0 && engine.wants_frame() {
                    presenter.request_redraw();
                }
            }

            Event::UserEvent(AppEvent::ConfigChanged(path)) => {
                run_validation(&path, &settings.assets_dir);
                match load_preview_config_at(&settings.assets_dir, &path, config_mode) {
                    Ok(next) => {
                        let next = args.apply(next);
                        if next.shader_path != settings.shader_path {
                            logi!("CONFIG", "shader -> {}", next.shader_path.display());
                            match read_to_string_result(&next.shader_path) {
                                Ok(src) => {
                                    engine.set_source(&src);
                                }
                                Err(e) => loge!("CONFIG", "{e}"),
                            }
                            if let Some(h) = &hot {
                                h.set_shader_path(next.shader_path.clone());
                            }
                        }
                        engine.set_mode(next.mode);
                        if next.vsync != settings.vsync || next.gl_api != settings.gl_api {
                            logw!("CONFIG", "vsync/gl_api changes apply on next launch");
                        }
                        settings = next;
                        presenter.set_title(&window_title(&settings.title, engine.mode(), engine.is_running(), last_fps));
                    }
                    Err(e) => loge!("CONFIG", "{e} (keeping previous settings)"),
                }
            }

            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => target.exit(),

                WindowEvent::KeyboardInput { event, .. } => {
                    if !event.state.is_pressed() || event.repeat {
                        return;
                    }
                    let PhysicalKey::Code(code) = event.physical_key else {
                        return;
                    };
                    match action_for_key(code, &settings.input) {
                        Some(InputAction::Stop) => {
                            engine.stop();
                        }
                        Some(InputAction::Restart) => {
                            engine.stop();
                            engine.start();
                        }
                        Some(InputAction::SetMode(m)) => {
                            engine.set_mode(m);
                        }
                        None => return,
                    }
                    presenter.set_title(&window_title(&settings.title, engine.mode(), engine.is_running(), last_fps));
                }

                WindowEvent::CursorMoved { position, .. } => {
                    if settings.input.mouse {
                        if let Some([x, y]) = normalized_mouse(position.x, position.y, presenter.drawable_size()) {
                            engine.set_mouse_position(x, y);
                        }
                    }
                }

                WindowEvent::Resized(new_size) => {
                    presenter.resize_surface(new_size.width, new_size.height);
                    if settings.input.resize {
                        if let Err(e) = engine.resize(new_size.width, new_size.height) {
                            loge!("RENDER", "{e}");
                        }
                    }
                }

                WindowEvent::RedrawRequested => {
                    if engine.tick() {
                        if let Err(e) = presenter.present() {
                            loge!("RENDER", "present failed: {e}");
                        }
                    }
                    if let Some(v) = fps_seen.take() {
                        last_fps = Some(v);
                        presenter.set_title(&window_title(&settings.title, engine.mode(), engine.is_running(), last_fps));
                    }
                }

                _ => {}
            },

            Event::AboutToWait => {
                if engine.wants_frame() {
                    presenter.request_redraw();
                    target.set_control_flow(ControlFlow::Poll);
                } else {
                    target.set_control_flow(ControlFlow::Wait);
                }
            }

            _ => {}
        }
    })?;

    Ok(())
}

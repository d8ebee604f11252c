//! Hot-reload watcher
//!
//! We watch **directories** (not individual files) because file replacement on save is often
//! implemented as: write temp → rename/replace → delete old. Directory watching is the most
//! reliable cross-platform approach.
//!
//! Shader edits are read on the watcher thread and queued straight into the engine through
//! its handle; the compile itself still happens on the render thread. Config edits are
//! forwarded to the event loop, which owns the settings.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fragloop_engine::assets::read_to_string_result;
use fragloop_engine::{logi, logw, EngineHandle};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use winit::event_loop::EventLoopProxy;

/// Wakes the event loop from the watcher thread.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// New shader text is queued on the engine handle.
    ShaderQueued,
    /// `preview.json` (or its OS override) changed on disk.
    ConfigChanged(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Shader(PathBuf),
    Config(PathBuf),
}

/// Decide what a file system event path means. The shader is matched by full path, the
/// config by file name (`preview.json`, `preview.<os>.json`).
pub fn classify(path: &Path, shader: &Path, config_file_name: &str) -> Option<Change> {
    let same_name = path.file_name().is_some() && path.file_name() == shader.file_name();
    if path == shader || (same_name && same_parent(path, shader)) {
        return Some(Change::Shader(path.to_path_buf()));
    }
    if path.file_name().and_then(|n| n.to_str()) == Some(config_file_name) {
        return Some(Change::Config(path.to_path_buf()));
    }
    None
}

// Watchers may report canonicalized paths while the config holds relative ones.
fn same_parent(a: &Path, b: &Path) -> bool {
    match (a.parent().and_then(|p| p.canonicalize().ok()), b.parent().and_then(|p| p.canonicalize().ok())) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

pub struct HotReload {
    _watcher: RecommendedWatcher,
    shader: Arc<Mutex<PathBuf>>,
}

impl HotReload {
    pub fn new(
        assets_dir: &Path,
        shader_path: PathBuf,
        config_path: &Path,
        engine: EngineHandle,
        proxy: EventLoopProxy<AppEvent>,
    ) -> anyhow::Result<Self> {
        let shader = Arc::new(Mutex::new(shader_path.clone()));
        let shader_for_cb = Arc::clone(&shader);
        let config_name = config_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("preview.json")
            .to_string();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                let ev = match res {
                    Ok(ev) => ev,
                    Err(e) => {
                        logw!("WATCH", "notify error: {e}");
                        return;
                    }
                };
                // Editors often emit multiple events (modify/create/remove/rename).
                if !matches!(ev.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    return;
                }

                let current = match shader_for_cb.lock() {
                    Ok(p) => p.clone(),
                    Err(_) => return,
                };
                for p in &ev.paths {
                    match classify(p, &current, &config_name) {
                        Some(Change::Shader(path)) => match read_to_string_result(&path) {
                            // Empty reads happen mid-save; the engine ignores them.
                            Ok(src) => {
                                logi!("WATCH", "shader changed: {}", path.display());
                                engine.set_source(src);
                                let _ = proxy.send_event(AppEvent::ShaderQueued);
                            }
                            Err(e) => logw!("WATCH", "{e}"),
                        },
                        Some(Change::Config(path)) => {
                            logi!("WATCH", "config changed: {}", path.display());
                            let _ = proxy.send_event(AppEvent::ConfigChanged(path));
                        }
                        None => {}
                    }
                }
            },
            Config::default().with_poll_interval(Duration::from_millis(250)),
        )?;

        watcher.watch(assets_dir, RecursiveMode::Recursive)?;
        // Shaders may live outside assets/ when given by absolute path.
        if let Some(parent) = shader_path.parent() {
            if !parent.starts_with(assets_dir) {
                watch_dir(&mut watcher, parent);
            }
        }

        Ok(Self { _watcher: watcher, shader })
    }

    /// Follow a different shader file (after a config edit changed `shader`).
    pub fn set_shader_path(&self, path: PathBuf) {
        if let Ok(mut p) = self.shader.lock() {
            *p = path;
        }
    }
}

fn watch_dir(w: &mut RecommendedWatcher, dir: &Path) {
    if let Err(e) = w.watch(dir, RecursiveMode::NonRecursive) {
        logw!("WATCH", "failed to watch {}: {e}", dir.display());
    }
}

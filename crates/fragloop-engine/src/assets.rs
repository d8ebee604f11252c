use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// Env var that pins the assets directory, skipping the upward search.
pub const ASSETS_ENV: &str = "FRAGLOOP_ASSETS";

/// A located `assets/` directory holding `preview.json` and the shader files it names.
#[derive(Debug, Clone)]
pub struct AssetsRoot {
    path: PathBuf,
}

impl AssetsRoot {
    /// `$FRAGLOOP_ASSETS` when it names a directory, else the nearest `assets/` found
    /// walking up from `start_dir`.
    pub fn discover(start_dir: &Path) -> Result<Self, EngineError> {
        let pinned = std::env::var_os(ASSETS_ENV).map(PathBuf::from).filter(|p| p.is_dir());
        pinned
            .or_else(|| start_dir.ancestors().map(|d| d.join("assets")).find(|c| c.is_dir()))
            .map(|path| Self { path })
            .ok_or_else(|| EngineError::AssetsNotFound { start_dir: start_dir.to_path_buf() })
    }

    /// Use `path` as-is (e.g. from `--assets`). It must be an existing directory.
    pub fn at(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let path = path.into();
        if path.is_dir() {
            Ok(Self { path })
        } else {
            Err(EngineError::AssetsNotFound { start_dir: path })
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.path.join(rel)
    }

    /// `preview.linux.json` beats `preview.json` on Linux, and so on per OS.
    pub fn pick_platform_json(&self, stem: &str) -> PathBuf {
        pick_platform_json(&self.path, stem)
    }
}

pub fn current_os() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "other"
    }
}

pub fn pick_platform_json(assets: &Path, stem: &str) -> PathBuf {
    let per_os = assets.join(format!("{stem}.{}.json", current_os()));
    if per_os.is_file() {
        per_os
    } else {
        assets.join(format!("{stem}.json"))
    }
}

/// Config paths are relative to `assets/` unless absolute.
pub fn resolve_assets_path(assets_dir: &Path, s: &str) -> PathBuf {
    assets_dir.join(s)
}

pub fn read_to_string_result(path: &Path) -> Result<String, EngineError> {
    std::fs::read_to_string(path).map_err(|e| EngineError::Io { path: path.to_path_buf(), source: e })
}

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::assets::{read_to_string_result, resolve_assets_path, AssetsRoot};
use crate::dialect::RenderMode;
use crate::error::EngineError;

/// How strictly to interpret/validate config files.
///
/// - `Lenient` is forward-compatible: unknown fields are ignored and missing optional
///   keys fall back to defaults.
/// - `Strict` is fail-fast: unknown fields, an unsupported `version` and zero-sized
///   windows become errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
    Lenient,
    Strict,
}

/// Which GL flavor the window context should ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlApi {
    /// GLES 2.0 first, desktop GL 2.1 as fallback.
    #[default]
    Auto,
    Gles,
    Gl,
}

fn default_version() -> u32 {
    1
}

/// Typed view of `assets/preview.json`.
///
/// Versioning: `version` defaults to 1 when omitted.
/// Unknown fields are ignored (serde default behavior), keeping configs forward-compatible.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct PreviewJson {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub mode: Option<RenderMode>,
    /// Fragment shader, relative to the assets dir unless absolute.
    #[serde(default)]
    pub shader: Option<String>,
    #[serde(default)]
    pub window: WindowJson,
    #[serde(default)]
    pub gl_api: GlApi,
    #[serde(default)]
    pub input: InputJson,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct WindowJson {
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub vsync: Option<bool>,
}

/// Which input sources feed the engine.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct InputJson {
    #[serde(default)]
    pub mouse: Option<bool>,
    #[serde(default)]
    pub escape: Option<bool>,
    #[serde(default)]
    pub resize: Option<bool>,
}

/// Strict version of `PreviewJson` that fails on unknown fields (at every level).
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct PreviewJsonStrict {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    mode: Option<RenderMode>,
    #[serde(default)]
    shader: Option<String>,
    #[serde(default)]
    window: Option<WindowJsonStrict>,
    #[serde(default)]
    gl_api: GlApi,
    #[serde(default)]
    input: Option<InputJsonStrict>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct WindowJsonStrict {
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    vsync: Option<bool>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct InputJsonStrict {
    #[serde(default)]
    mouse: Option<bool>,
    #[serde(default)]
    escape: Option<bool>,
    #[serde(default)]
    resize: Option<bool>,
}

impl From<PreviewJsonStrict> for PreviewJson {
    fn from(s: PreviewJsonStrict) -> Self {
        let window = s
            .window
            .map(|w| WindowJson { width: w.width, height: w.height, title: w.title, vsync: w.vsync })
            .unwrap_or_default();
        let input = s
            .input
            .map(|i| InputJson { mouse: i.mouse, escape: i.escape, resize: i.resize })
            .unwrap_or_default();
        Self { version: s.version, mode: s.mode, shader: s.shader, window, gl_api: s.gl_api, input }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputOptions {
    /// Pointer moves update the mouse uniform.
    pub mouse: bool,
    /// Escape stops the loop.
    pub escape: bool,
    /// Window resizes reallocate the render targets.
    pub resize: bool,
}

impl Default for InputOptions {
    fn default() -> Self {
        Self { mouse: true, escape: true, resize: true }
    }
}

/// `preview.json` with every default applied and every path resolved.
#[derive(Debug, Clone)]
pub struct PreviewSettings {
    /// `None` when no `preview.json` exists.
    pub config_path: Option<PathBuf>,
    pub assets_dir: PathBuf,
    pub mode: RenderMode,
    pub shader_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub vsync: bool,
    pub gl_api: GlApi,
    pub input: InputOptions,
}

pub const DEFAULT_WIDTH: u32 = 512;
pub const DEFAULT_HEIGHT: u32 = 512;
pub const DEFAULT_TITLE: &str = "fragloop";

impl PreviewSettings {
    fn from_json(assets_dir: &Path, config_path: Option<PathBuf>, pj: PreviewJson) -> Self {
        let defaults = InputOptions::default();
        let shader_path = pj
            .shader
            .as_deref()
            .map(|s| resolve_assets_path(assets_dir, s))
            .unwrap_or_else(|| default_shader_path(assets_dir));

        Self {
            config_path,
            assets_dir: assets_dir.to_path_buf(),
            mode: pj.mode.unwrap_or_default(),
            shader_path,
            width: pj.window.width.unwrap_or(DEFAULT_WIDTH),
            height: pj.window.height.unwrap_or(DEFAULT_HEIGHT),
            title: pj.window.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            vsync: pj.window.vsync.unwrap_or(true),
            gl_api: pj.gl_api,
            input: InputOptions {
                mouse: pj.input.mouse.unwrap_or(defaults.mouse),
                escape: pj.input.escape.unwrap_or(defaults.escape),
                resize: pj.input.resize.unwrap_or(defaults.resize),
            },
        }
    }
}

fn default_shader_path(assets_dir: &Path) -> PathBuf {
    assets_dir.join("shaders").join("default.frag")
}

/// Load `preview(.<os>).json` and resolve it against the assets directory.
///
/// A missing file is not an error: every setting falls back to its default.
pub fn load_preview_config(assets: &AssetsRoot, mode: ConfigMode) -> Result<PreviewSettings, EngineError> {
    let path = assets.pick_platform_json("preview");
    if !path.exists() {
        return Ok(PreviewSettings::from_json(assets.path(), None, PreviewJson {
            version: default_version(),
            ..PreviewJson::default()
        }));
    }
    load_preview_config_at(assets.path(), &path, mode)
}

/// Load a specific config file (used by hot reload, which already knows the path).
pub fn load_preview_config_at(
    assets_dir: &Path,
    path: &Path,
    mode: ConfigMode,
) -> Result<PreviewSettings, EngineError> {
    let data = read_to_string_result(path)?;
    let json_err = |e| EngineError::Json { path: path.to_path_buf(), source: e };

    let pj: PreviewJson = match mode {
        ConfigMode::Lenient => serde_json::from_str(&data).map_err(json_err)?,
        ConfigMode::Strict => serde_json::from_str::<PreviewJsonStrict>(&data).map_err(json_err)?.into(),
    };

    if mode == ConfigMode::Strict {
        if pj.version != 1 {
            return Err(EngineError::InvalidConfig {
                path: path.to_path_buf(),
                msg: format!("unsupported preview.json version {} (expected 1)", pj.version),
            });
        }
        if pj.window.width == Some(0) || pj.window.height == Some(0) {
            return Err(EngineError::InvalidConfig {
                path: path.to_path_buf(),
                msg: "window width/height must be > 0".to_string(),
            });
        }
    }

    Ok(PreviewSettings::from_json(assets_dir, Some(path.to_path_buf()), pj))
}

/// A JSON file loaded from disk (path + raw text + parsed `serde_json::Value`).
///
/// Kept untyped so the friendly validator can walk it and point at exact keys.
#[derive(Debug, Clone)]
pub struct LoadedJson {
    pub path: PathBuf,
    pub src: String,
    pub value: Value,
}

/// Load any JSON file as `LoadedJson`.
pub fn load_json_file(path: &Path) -> Result<LoadedJson, EngineError> {
    let src = read_to_string_result(path)?;
    let value: Value =
        serde_json::from_str(&src).map_err(|e| EngineError::Json { path: path.to_path_buf(), source: e })?;
    Ok(LoadedJson { path: path.to_path_buf(), src, value })
}

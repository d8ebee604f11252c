//! Config validation (friendly errors)
//!
//! Purpose:
//! - Catch common misconfigurations early
//! - Explain *what* is wrong, *where* it lives, and *what to do*
//! - Keep the preview running where possible by falling back safely

use std::path::Path;

use fragloop_engine::{logi, loge, logw};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub level: IssueLevel,
    pub path: String,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueLevel {
    Warn,
    Error,
}

impl ValidationIssue {
    pub fn warn(path: impl Into<String>, message: impl Into<String>, hint: Option<String>) -> Self {
        Self { level: IssueLevel::Warn, path: path.into(), message: message.into(), hint }
    }
    pub fn error(path: impl Into<String>, message: impl Into<String>, hint: Option<String>) -> Self {
        Self { level: IssueLevel::Error, path: path.into(), message: message.into(), hint }
    }
}

pub fn emit_issues(tag: &str, issues: &[ValidationIssue]) {
    for it in issues {
        let line = match &it.hint {
            Some(h) => format!("{}: {} (hint: {})", it.path, it.message, h),
            None => format!("{}: {}", it.path, it.message),
        };
        match it.level {
            IssueLevel::Warn => logw!(tag, "{line}"),
            IssueLevel::Error => loge!(tag, "{line}"),
        }
    }
}

/// Emit a one-line summary even when there are zero issues.
pub fn emit_summary(tag: &str, label: &str, issues: &[ValidationIssue]) {
    let warns = issues.iter().filter(|i| i.level == IssueLevel::Warn).count();
    let errs = issues.iter().filter(|i| i.level == IssueLevel::Error).count();
    if errs == 0 && warns == 0 {
        logi!(tag, "validation: {label} OK (0 issues)");
    } else {
        logw!(tag, "validation: {label} issues found (errors={errs} warnings={warns})");
    }
}

const TOP_KEYS: [&str; 6] = ["version", "mode", "shader", "window", "gl_api", "input"];
const WINDOW_KEYS: [&str; 4] = ["width", "height", "title", "vsync"];
const INPUT_KEYS: [&str; 3] = ["mouse", "escape", "resize"];
const MODES: [&str; 3] = ["classic", "geek", "geeker"];
const GL_APIS: [&str; 3] = ["auto", "gles", "gl"];
const MAX_DIM: u64 = 16384;

/// Validate `preview.json` shape and references:
/// - unknown keys (likely typos)
/// - `mode` / `gl_api` spelled as one of the known values
/// - window dimensions positive and sane
/// - `shader` points at an existing file
pub fn validate_preview_json(preview: &Value, assets_dir: &Path) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let Some(obj) = preview.as_object() else {
        issues.push(ValidationIssue::error(
            "preview.json:/",
            "top level must be a JSON object",
            Some("expected: { \"mode\": \"classic\", \"shader\": \"shaders/default.frag\" }".into()),
        ));
        return issues;
    };

    unknown_keys(&mut issues, "preview.json:", obj, &TOP_KEYS);

    match obj.get("version") {
        None => issues.push(ValidationIssue::warn(
            "preview.json:/version",
            "missing version (assuming 1)",
            Some("add \"version\": 1".into()),
        )),
        Some(v) if v.as_u64() == Some(1) => {}
        Some(v) => issues.push(ValidationIssue::error(
            "preview.json:/version",
            format!("unsupported version {v}"),
            Some("this build understands version 1".into()),
        )),
    }

    one_of(&mut issues, obj.get("mode"), "preview.json:/mode", &MODES);
    one_of(&mut issues, obj.get("gl_api"), "preview.json:/gl_api", &GL_APIS);

    match obj.get("shader") {
        None => {}
        Some(Value::String(s)) => {
            let p = fragloop_engine::assets::resolve_assets_path(assets_dir, s);
            if !p.is_file() {
                issues.push(ValidationIssue::error(
                    "preview.json:/shader",
                    format!("shader file not found: {}", p.display()),
                    Some("paths are relative to the assets/ folder unless absolute".into()),
                ));
            }
        }
        Some(_) => issues.push(ValidationIssue::error(
            "preview.json:/shader",
            "shader must be a string path",
            None,
        )),
    }

    if let Some(w) = obj.get("window") {
        match w.as_object() {
            Some(wo) => {
                unknown_keys(&mut issues, "preview.json:/window", wo, &WINDOW_KEYS);
                for key in ["width", "height"] {
                    let path = format!("preview.json:/window/{key}");
                    match wo.get(key) {
                        None => {}
                        Some(v) => match v.as_u64() {
                            Some(n) if (1..=MAX_DIM).contains(&n) => {}
                            _ => issues.push(ValidationIssue::error(
                                path,
                                format!("{key} must be an integer in 1..={MAX_DIM}, got {v}"),
                                None,
                            )),
                        },
                    }
                }
                bool_field(&mut issues, wo.get("vsync"), "preview.json:/window/vsync");
                if wo.get("title").is_some_and(|t| !t.is_string()) {
                    issues.push(ValidationIssue::warn("preview.json:/window/title", "title must be a string", None));
                }
            }
            None => issues.push(ValidationIssue::error("preview.json:/window", "window must be an object", None)),
        }
    }

    if let Some(i) = obj.get("input") {
        match i.as_object() {
            Some(io) => {
                unknown_keys(&mut issues, "preview.json:/input", io, &INPUT_KEYS);
                for key in INPUT_KEYS {
                    bool_field(&mut issues, io.get(key), &format!("preview.json:/input/{key}"));
                }
            }
            None => issues.push(ValidationIssue::error("preview.json:/input", "input must be an object", None)),
        }
    }

    issues
}

fn unknown_keys(
    issues: &mut Vec<ValidationIssue>,
    base: &str,
    obj: &serde_json::Map<String, Value>,
    known: &[&str],
) {
    for k in obj.keys() {
        if !known.contains(&k.as_str()) {
            issues.push(ValidationIssue::warn(
                format!("{base}/{}", escape_ptr(k)),
                format!("unknown key '{k}' (ignored)"),
                Some(format!("known keys: {}", known.join(", "))),
            ));
        }
    }
}

fn one_of(issues: &mut Vec<ValidationIssue>, v: Option<&Value>, path: &str, allowed: &[&str]) {
    let Some(v) = v else { return };
    if !v.as_str().is_some_and(|s| allowed.contains(&s)) {
        issues.push(ValidationIssue::error(
            path,
            format!("unexpected value {v}"),
            Some(format!("use one of: {}", allowed.join(", "))),
        ));
    }
}

fn bool_field(issues: &mut Vec<ValidationIssue>, v: Option<&Value>, path: &str) {
    if v.is_some_and(|v| !v.is_boolean()) {
        issues.push(ValidationIssue::error(path, "expected true or false", None));
    }
}

// JSON Pointer escaping for friendly paths
fn escape_ptr(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

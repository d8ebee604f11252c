//! Uniform naming dialects
//!
//! A shader written for the preview declares its inputs under one of three conventions.
//! The dialect decides which uniform names are looked up after linking, whether a prelude
//! is injected ahead of the user's fragment source, and how driver diagnostics are shifted
//! back onto the user's own line numbers.
//!
//! | Mode     | resolution | mouse   | time  | feedback     | prelude |
//! |----------|------------|---------|-------|--------------|---------|
//! | Classic  | resolution | mouse   | time  | backbuffer   | none    |
//! | Geek     | r          | m       | t     | b            | none    |
//! | Geeker   | r          | m       | t     | b            | 1 line  |

use std::fmt;
use std::str::FromStr;

/// One line: precision plus `r`, `m`, `t`. The feedback sampler `b` is deliberately not
/// declared; Geeker shaders that read it declare it themselves.
pub const GEEKER_PRELUDE: &str =
    "precision highp float;uniform vec2 r;uniform vec2 m;uniform float t;\n";

/// Vertex attribute carrying the full-screen quad positions (same in every dialect).
pub const POSITION_ATTRIB: &str = "p";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Classic,
    Geek,
    Geeker,
}

impl RenderMode {
    pub const ALL: [RenderMode; 3] = [RenderMode::Classic, RenderMode::Geek, RenderMode::Geeker];

    pub fn as_str(self) -> &'static str {
        match self {
            RenderMode::Classic => "classic",
            RenderMode::Geek => "geek",
            RenderMode::Geeker => "geeker",
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classic" | "0" => Ok(RenderMode::Classic),
            "geek" | "1" => Ok(RenderMode::Geek),
            "geeker" | "2" => Ok(RenderMode::Geeker),
            other => Err(format!(
                "unknown render mode '{other}' (expected classic, geek or geeker)"
            )),
        }
    }
}

/// Names a linked program is queried for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformNames {
    pub resolution: &'static str,
    pub mouse: &'static str,
    pub time: &'static str,
    pub backbuffer: &'static str,
    pub position_attrib: &'static str,
}

impl UniformNames {
    pub fn uniforms(&self) -> [&'static str; 4] {
        [self.resolution, self.mouse, self.time, self.backbuffer]
    }
}

pub fn names_for(mode: RenderMode) -> UniformNames {
    match mode {
        RenderMode::Classic => UniformNames {
            resolution: "resolution",
            mouse: "mouse",
            time: "time",
            backbuffer: "backbuffer",
            position_attrib: POSITION_ATTRIB,
        },
        RenderMode::Geek | RenderMode::Geeker => UniformNames {
            resolution: "r",
            mouse: "m",
            time: "t",
            backbuffer: "b",
            position_attrib: POSITION_ATTRIB,
        },
    }
}

pub fn prelude_for(mode: RenderMode) -> Option<&'static str> {
    match mode {
        RenderMode::Classic | RenderMode::Geek => None,
        RenderMode::Geeker => Some(GEEKER_PRELUDE),
    }
}

/// Number of injected lines ahead of the user's first line.
pub fn line_offset_for(mode: RenderMode) -> u32 {
    prelude_for(mode)
        .map(|p| p.matches('\n').count() as u32)
        .unwrap_or(0)
}

/// Fragment source as handed to the driver.
pub fn apply_prelude(mode: RenderMode, source: &str) -> String {
    match prelude_for(mode) {
        Some(prelude) => format!("{prelude}{source}"),
        None => source.to_string(),
    }
}

/// Shift every line-number token in a driver log back by the dialect's prelude length.
///
/// Recognized location tokens (at the start of a log line):
/// - `ERROR: 0:5: ...` / `WARNING: 0:5: ...` (ANGLE, Mesa GLES, WebGL)
/// - `0:5(12): error: ...` (Mesa desktop)
/// - `0(5) : error C0000: ...` (NVIDIA)
///
/// A line whose shifted number would fall below 1 passes through unchanged.
pub fn remap_diagnostics(log: &str, mode: RenderMode) -> String {
    let offset = line_offset_for(mode);
    if offset == 0 {
        return log.to_string();
    }

    let mut out = String::with_capacity(log.len());
    for line in log.split_inclusive('\n') {
        match line_token(line) {
            Some((start, end)) => {
                let shifted = line[start..end]
                    .parse::<u32>()
                    .ok()
                    .and_then(|n| n.checked_sub(offset))
                    .filter(|n| *n >= 1);
                match shifted {
                    Some(n) => {
                        out.push_str(&line[..start]);
                        out.push_str(&n.to_string());
                        out.push_str(&line[end..]);
                    }
                    None => out.push_str(line),
                }
            }
            None => out.push_str(line),
        }
    }
    out
}

/// Byte range of the line-number digits in a diagnostic line, if it carries one.
fn line_token(line: &str) -> Option<(usize, usize)> {
    let bytes = line.as_bytes();

    for prefix in ["ERROR: ", "WARNING: "] {
        if let Some(rest) = line.strip_prefix(prefix) {
            let base = line.len() - rest.len();
            let src_end = digits_end(bytes, base)?;
            if bytes.get(src_end) != Some(&b':') {
                return None;
            }
            let line_start = src_end + 1;
            let line_end = digits_end(bytes, line_start)?;
            return (bytes.get(line_end) == Some(&b':')).then_some((line_start, line_end));
        }
    }

    let src_end = digits_end(bytes, 0)?;
    match bytes.get(src_end) {
        // Mesa: 0:5(12):
        Some(b':') => {
            let line_start = src_end + 1;
            let line_end = digits_end(bytes, line_start)?;
            (bytes.get(line_end) == Some(&b'(')).then_some((line_start, line_end))
        }
        // NVIDIA: 0(5) :
        Some(b'(') => {
            let line_start = src_end + 1;
            let line_end = digits_end(bytes, line_start)?;
            (bytes.get(line_end) == Some(&b')')).then_some((line_start, line_end))
        }
        _ => None,
    }
}

/// End index of a non-empty ASCII digit run starting at `from`.
fn digits_end(bytes: &[u8], from: usize) -> Option<usize> {
    let len = bytes
        .get(from..)?
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    (len > 0).then_some(from + len)
}

use std::path::PathBuf;

use thiserror::Error;

use crate::gpu::ShaderStage;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A shader stage failed to compile. `log` is already remapped for the active dialect.
    #[error("{stage} shader compile error:\n{log}")]
    Compile { stage: ShaderStage, log: String },

    /// The program failed to link. `log` is already remapped for the active dialect.
    #[error("program link error:\n{log}")]
    Link { log: String },

    /// No usable GPU context (or the fixed internal resources could not be created on it).
    #[error("GPU context unavailable: {reason}")]
    ContextUnavailable { reason: String },

    /// Render target allocation failed; the current render session cannot continue.
    #[error("render target allocation failed at {width}x{height}: {reason}")]
    AllocationFailure { width: u32, height: u32, reason: String },

    /// The `assets/` folder could not be found or was invalid.
    #[error("could not locate assets/ starting from {}", start_dir.display())]
    AssetsNotFound { start_dir: PathBuf },

    /// I/O error reading a file.
    #[error("I/O error for {}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },

    /// JSON parse error for a file.
    #[error("JSON parse error for {}: {source}", path.display())]
    Json { path: PathBuf, source: serde_json::Error },

    /// Config is syntactically valid but semantically invalid.
    #[error("invalid config {}: {msg}", path.display())]
    InvalidConfig { path: PathBuf, msg: String },
}

impl EngineError {
    /// Compile and link errors leave the running program untouched; everything else does not.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::Compile { .. } | EngineError::Link { .. })
    }

    /// Diagnostic text for build errors, as handed to the build observer.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            EngineError::Compile { log, .. } | EngineError::Link { log } => Some(log),
            _ => None,
        }
    }
}

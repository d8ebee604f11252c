//! fragloop engine
//!
//! Live fragment-shader preview: builds user shader text under one of three uniform
//! dialects, renders it every display frame with the previous frame fed back as a texture,
//! and keeps the last good program on screen while broken edits report diagnostics.
//!
//! The engine does not create windows or contexts. Hand [`PreviewEngine::new`] a
//! [`GpuContext`] (normally [`GlowContext`]) and drive it from the display-sync callback.

pub mod logging;

pub mod assets;
pub mod builder;
pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod events;
pub mod gpu;
pub mod render_loop;
pub mod targets;

pub use assets::AssetsRoot;
pub use config::{load_preview_config, ConfigMode, GlApi, InputOptions, PreviewSettings};
pub use dialect::RenderMode;
pub use engine::{EngineCommand, EngineHandle, EngineOptions, PreviewEngine};
pub use error::EngineError;
pub use events::{BuildResult, FpsCounter};
pub use gpu::{GlowContext, GpuContext};
pub use render_loop::FrameState;

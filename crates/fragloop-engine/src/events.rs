use std::time::{Duration, Instant};

/// Outcome of one shader build, as delivered to the build observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildResult {
    Success,
    /// Driver diagnostics, already remapped onto the user's line numbers.
    Failure(String),
}

impl BuildResult {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildResult::Success)
    }

    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            BuildResult::Success => None,
            BuildResult::Failure(log) => Some(log),
        }
    }

    /// Editor-facing one-liner: ` > [ HH:MM ] <message>`.
    pub fn summary_line(&self, hhmm: &str) -> String {
        match self {
            BuildResult::Success => format!(" > [ {hhmm} ] shader compile succeeded"),
            BuildResult::Failure(log) => format!(" > [ {hhmm} ] {}", log.trim_end()),
        }
    }
}

/// Frames-per-second over a sliding window, fed from the frame observer.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    window: Duration,
    window_start: Option<Instant>,
    frames: u32,
    fps: f32,
}

impl FpsCounter {
    pub fn new(window: Duration) -> Self {
        Self { window, window_start: None, frames: 0, fps: 0.0 }
    }

    /// Count one frame. Returns the fresh value whenever a window completes.
    pub fn tick(&mut self, now: Instant) -> Option<f32> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;

        let elapsed = now.saturating_duration_since(start);
        if elapsed < self.window || elapsed.is_zero() {
            return None;
        }
        self.fps = self.frames as f32 / elapsed.as_secs_f32();
        self.frames = 0;
        self.window_start = Some(now);
        Some(self.fps)
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

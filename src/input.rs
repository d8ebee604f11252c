//! Window input → engine actions
//!
//! Keys:
//! - Escape: stop the loop (when `input.escape` is enabled)
//! - Space / Enter: restart the loop
//! - 1 / 2 / 3: classic / geek / geeker dialect

use fragloop_engine::{InputOptions, RenderMode};
use winit::keyboard::KeyCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    Stop,
    Restart,
    SetMode(RenderMode),
}

pub fn action_for_key(code: KeyCode, opts: &InputOptions) -> Option<InputAction> {
    match code {
        KeyCode::Escape if opts.escape => Some(InputAction::Stop),
        KeyCode::Space | KeyCode::Enter | KeyCode::NumpadEnter => Some(InputAction::Restart),
        KeyCode::Digit1 | KeyCode::Numpad1 => Some(InputAction::SetMode(RenderMode::Classic)),
        KeyCode::Digit2 | KeyCode::Numpad2 => Some(InputAction::SetMode(RenderMode::Geek)),
        KeyCode::Digit3 | KeyCode::Numpad3 => Some(InputAction::SetMode(RenderMode::Geeker)),
        _ => None,
    }
}

/// Window pixel position → normalized mouse, origin bottom-left.
///
/// Not clamped: a pointer dragged outside the window reports values outside [0, 1].
pub fn normalized_mouse(x: f64, y: f64, size: (u32, u32)) -> Option<[f32; 2]> {
    let (w, h) = size;
    if w == 0 || h == 0 {
        return None;
    }
    Some([(x / w as f64) as f32, (1.0 - y / h as f64) as f32])
}

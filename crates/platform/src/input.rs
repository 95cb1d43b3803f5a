//! Keyboard state and raw mouse motion.

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

/// Tracks pressed keys and accumulates raw mouse motion between frames.
#[derive(Debug, Default)]
pub struct InputState {
    /// Currently pressed keys
    pressed_keys: HashSet<KeyCode>,
    /// Keys that were just pressed this frame
    just_pressed_keys: HashSet<KeyCode>,
    /// Raw motion since the last `take_mouse_delta`
    mouse_delta: (f64, f64),
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call at the end of each frame to clear per-frame key state.
    pub fn end_frame(&mut self) {
        self.just_pressed_keys.clear();
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    /// Adds a raw (unaccelerated, unclamped) motion event.
    pub fn on_raw_mouse_motion(&mut self, dx: f64, dy: f64) {
        self.mouse_delta.0 += dx;
        self.mouse_delta.1 += dy;
    }

    /// Returns the motion accumulated since the previous call and clears it.
    pub fn take_mouse_delta(&mut self) -> (f64, f64) {
        std::mem::take(&mut self.mouse_delta)
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    pub fn alt_held(&self) -> bool {
        self.is_key_pressed(KeyCode::AltLeft) || self.is_key_pressed(KeyCode::AltRight)
    }

    /// True on the frame Enter goes down while Alt is held.
    pub fn borderless_toggle_requested(&self) -> bool {
        self.alt_held()
            && (self.is_key_just_pressed(KeyCode::Enter)
                || self.is_key_just_pressed(KeyCode::NumpadEnter))
    }
}

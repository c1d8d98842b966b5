//! Input handling for keyboard and mouse.
//!
//! Events are folded into an [`InputState`] as they arrive; the frame loop
//! reads it once per frame and then calls [`InputState::begin_frame`].

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other,
}

impl From<winit::event::MouseButton> for MouseButton {
    fn from(button: winit::event::MouseButton) -> Self {
        match button {
            winit::event::MouseButton::Left => MouseButton::Left,
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            _ => MouseButton::Other,
        }
    }
}

#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed_keys: HashSet<KeyCode>,

    pressed_buttons: HashSet<MouseButton>,

    /// None until the first cursor event, so the first move yields no delta.
    mouse_position: Option<(f32, f32)>,
    /// Accumulated since the last `begin_frame`. +y is up.
    mouse_delta: (f32, f32),
    /// Accumulated vertical scroll since the last `begin_frame`.
    scroll_delta: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears per-frame state.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.mouse_delta = (0.0, 0.0);
        self.scroll_delta = 0.0;
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    pub fn on_mouse_pressed(&mut self, button: MouseButton) {
        self.pressed_buttons.insert(button);
    }

    pub fn on_mouse_released(&mut self, button: MouseButton) {
        self.pressed_buttons.remove(&button);
    }

    /// Cursor position in window pixels (y grows downward).
    pub fn on_mouse_moved(&mut self, x: f32, y: f32) {
        if let Some((old_x, old_y)) = self.mouse_position {
            self.mouse_delta.0 += x - old_x;
            self.mouse_delta.1 += old_y - y;
        }
        self.mouse_position = Some((x, y));
    }

    /// Forgets the last cursor position, e.g. when the cursor leaves the window.
    pub fn on_mouse_left(&mut self) {
        self.mouse_position = None;
    }

    pub fn on_scroll(&mut self, delta_y: f32) {
        self.scroll_delta += delta_y;
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// True only in the frame the key went down; key repeat does not count.
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    pub fn mouse_delta(&self) -> (f32, f32) {
        self.mouse_delta
    }

    pub fn scroll_delta(&self) -> f32 {
        self.scroll_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_just_pressed_once() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Space);
        assert!(input.is_key_just_pressed(KeyCode::Space));

        // Repeat while held
        input.begin_frame();
        input.on_key_pressed(KeyCode::Space);
        assert!(!input.is_key_just_pressed(KeyCode::Space));
        assert!(input.is_key_pressed(KeyCode::Space));

        input.on_key_released(KeyCode::Space);
        assert!(!input.is_key_pressed(KeyCode::Space));
    }

    #[test]
    fn test_first_move_has_no_delta() {
        let mut input = InputState::new();
        input.on_mouse_moved(400.0, 300.0);
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
    }

    #[test]
    fn test_mouse_delta_accumulates_with_y_up() {
        let mut input = InputState::new();
        input.on_mouse_moved(100.0, 100.0);
        input.on_mouse_moved(110.0, 95.0);
        input.on_mouse_moved(115.0, 90.0);
        assert_eq!(input.mouse_delta(), (15.0, 10.0));

        input.begin_frame();
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
    }

    #[test]
    fn test_mouse_left_resets_anchor() {
        let mut input = InputState::new();
        input.on_mouse_moved(0.0, 0.0);
        input.on_mouse_left();
        input.on_mouse_moved(500.0, 500.0);
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
    }

    #[test]
    fn test_scroll_accumulates() {
        let mut input = InputState::new();
        input.on_scroll(1.0);
        input.on_scroll(2.0);
        assert_eq!(input.scroll_delta(), 3.0);
        input.begin_frame();
        assert_eq!(input.scroll_delta(), 0.0);
    }

    #[test]
    fn test_mouse_buttons() {
        let mut input = InputState::new();
        input.on_mouse_pressed(MouseButton::Right);
        assert!(input.is_mouse_pressed(MouseButton::Right));
        input.on_mouse_released(MouseButton::Right);
        assert!(!input.is_mouse_pressed(MouseButton::Right));
    }
}

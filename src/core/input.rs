//! Keyboard and mouse state

use glam::Vec2;
use rustc_hash::FxHashSet;
use winit::event::{ElementState, MouseButton};
use winit::keyboard::KeyCode;

/// Held and edge-triggered input for the current frame.
#[derive(Debug, Default)]
pub struct Input {
    held: FxHashSet<KeyCode>,
    pressed: FxHashSet<KeyCode>,
    buttons: FxHashSet<MouseButton>,
    cursor: Vec2,
    /// Cursor movement while a mouse button is held
    drag: Vec2,
    scroll: f32,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear edge state at the end of a frame.
    pub fn end_frame(&mut self) {
        self.pressed.clear();
        self.drag = Vec2::ZERO;
        self.scroll = 0.0;
    }

    pub fn process_keyboard(&mut self, key: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => {
                // Key repeat reports Pressed again without a release
                if self.held.insert(key) {
                    self.pressed.insert(key);
                }
            }
            ElementState::Released => {
                self.held.remove(&key);
            }
        }
    }

    pub fn process_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        match state {
            ElementState::Pressed => {
                self.buttons.insert(button);
            }
            ElementState::Released => {
                self.buttons.remove(&button);
            }
        }
    }

    pub fn process_cursor(&mut self, position: Vec2) {
        if !self.buttons.is_empty() {
            self.drag += position - self.cursor;
        }
        self.cursor = position;
    }

    pub fn process_scroll(&mut self, lines: f32) {
        self.scroll += lines;
    }

    pub fn is_key_held(&self, key: KeyCode) -> bool {
        self.held.contains(&key)
    }

    /// True only on the frame the key went down.
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    pub fn is_button_held(&self, button: MouseButton) -> bool {
        self.buttons.contains(&button)
    }

    pub const fn drag(&self) -> Vec2 {
        self.drag
    }

    pub const fn scroll(&self) -> f32 {
        self.scroll
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_repeat_is_not_a_new_press() {
        let mut input = Input::new();
        input.process_keyboard(KeyCode::F1, ElementState::Pressed);
        assert!(input.is_key_pressed(KeyCode::F1));
        input.end_frame();

        input.process_keyboard(KeyCode::F1, ElementState::Pressed);
        assert!(!input.is_key_pressed(KeyCode::F1));
        assert!(input.is_key_held(KeyCode::F1));

        input.process_keyboard(KeyCode::F1, ElementState::Released);
        assert!(!input.is_key_held(KeyCode::F1));
    }

    #[test]
    fn test_drag_only_counts_with_button_down() {
        let mut input = Input::new();
        input.process_cursor(Vec2::new(10.0, 10.0));
        assert_eq!(input.drag(), Vec2::ZERO);

        input.process_mouse_button(MouseButton::Left, ElementState::Pressed);
        input.process_cursor(Vec2::new(14.0, 7.0));
        assert_eq!(input.drag(), Vec2::new(4.0, -3.0));

        input.end_frame();
        assert_eq!(input.drag(), Vec2::ZERO);
    }
}

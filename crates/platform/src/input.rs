//! Keyboard and mouse state, refreshed once per run loop iteration.

use std::collections::HashSet;

use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::keyboard::PhysicalKey;

pub use winit::keyboard::KeyCode;

/// Pixels one wheel "line" counts for, so line and pixel deltas share a unit.
const PIXELS_PER_LINE: f32 = 20.0;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// Maps a winit button; extra buttons are not tracked.
    fn from_winit(button: winit::event::MouseButton) -> Option<Self> {
        match button {
            winit::event::MouseButton::Left => Some(MouseButton::Left),
            winit::event::MouseButton::Right => Some(MouseButton::Right),
            winit::event::MouseButton::Middle => Some(MouseButton::Middle),
            _ => None,
        }
    }
}

/// Input collected from window events.
///
/// "Just pressed" and deltas cover the events seen since the last
/// [`begin_iteration`](Self::begin_iteration).
#[derive(Debug, Default)]
pub struct InputState {
    held_keys: HashSet<KeyCode>,
    pressed_keys: HashSet<KeyCode>,
    held_buttons: HashSet<MouseButton>,
    pressed_buttons: HashSet<MouseButton>,
    cursor: Option<(f32, f32)>,
    cursor_delta: (f32, f32),
    scroll: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets per-iteration state. Held keys and buttons persist.
    pub fn begin_iteration(&mut self) {
        self.pressed_keys.clear();
        self.pressed_buttons.clear();
        self.cursor_delta = (0.0, 0.0);
        self.scroll = 0.0;
    }

    /// Folds one window event into the state.
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    self.set_key(key, event.state);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(button) = MouseButton::from_winit(*button) {
                    self.set_button(button, *state);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.move_cursor(position.x as f32, position.y as f32);
            }
            WindowEvent::CursorLeft { .. } => self.cursor = None,
            WindowEvent::MouseWheel { delta, .. } => {
                self.scroll += match delta {
                    MouseScrollDelta::LineDelta(_, y) => y * PIXELS_PER_LINE,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32,
                };
            }
            WindowEvent::Focused(false) => {
                self.held_keys.clear();
                self.held_buttons.clear();
            }
            _ => {}
        }
    }

    fn set_key(&mut self, key: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => self.on_key_pressed(key),
            ElementState::Released => self.on_key_released(key),
        }
    }

    /// Records `key` going down. Repeats of a held key are not new presses.
    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.held_keys.insert(key) {
            self.pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.held_keys.remove(&key);
    }

    fn set_button(&mut self, button: MouseButton, state: ElementState) {
        match state {
            ElementState::Pressed => {
                if self.held_buttons.insert(button) {
                    self.pressed_buttons.insert(button);
                }
            }
            ElementState::Released => {
                self.held_buttons.remove(&button);
            }
        }
    }

    fn move_cursor(&mut self, x: f32, y: f32) {
        if let Some((old_x, old_y)) = self.cursor {
            self.cursor_delta.0 += x - old_x;
            self.cursor_delta.1 += y - old_y;
        }
        self.cursor = Some((x, y));
    }

    pub fn is_key_held(&self, key: KeyCode) -> bool {
        self.held_keys.contains(&key)
    }

    /// True if `key` went down during this iteration (key repeat does not count).
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_button_held(&self, button: MouseButton) -> bool {
        self.held_buttons.contains(&button)
    }

    pub fn is_button_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    /// Cursor position in physical pixels, `None` while outside the window.
    pub fn cursor(&self) -> Option<(f32, f32)> {
        self.cursor
    }

    pub fn cursor_delta(&self) -> (f32, f32) {
        self.cursor_delta
    }

    /// Vertical scroll this iteration, in pixels.
    pub fn scroll(&self) -> f32 {
        self.scroll
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_is_reported_for_one_iteration() {
        let mut input = InputState::new();
        input.set_key(KeyCode::Space, ElementState::Pressed);
        assert!(input.is_key_pressed(KeyCode::Space));
        assert!(input.is_key_held(KeyCode::Space));

        input.begin_iteration();
        input.set_key(KeyCode::Space, ElementState::Pressed);
        assert!(!input.is_key_pressed(KeyCode::Space));
        assert!(input.is_key_held(KeyCode::Space));

        input.set_key(KeyCode::Space, ElementState::Released);
        assert!(!input.is_key_held(KeyCode::Space));
    }

    #[test]
    fn test_buttons() {
        let mut input = InputState::new();
        input.set_button(MouseButton::Left, ElementState::Pressed);
        assert!(input.is_button_pressed(MouseButton::Left));
        input.begin_iteration();
        assert!(!input.is_button_pressed(MouseButton::Left));
        assert!(input.is_button_held(MouseButton::Left));
        assert_eq!(
            MouseButton::from_winit(winit::event::MouseButton::Back),
            None
        );
    }

    #[test]
    fn test_cursor_delta_accumulates() {
        let mut input = InputState::new();
        input.move_cursor(10.0, 10.0);
        assert_eq!(input.cursor_delta(), (0.0, 0.0));
        input.move_cursor(15.0, 12.0);
        input.move_cursor(20.0, 8.0);
        assert_eq!(input.cursor_delta(), (10.0, -2.0));
        assert_eq!(input.cursor(), Some((20.0, 8.0)));

        input.begin_iteration();
        assert_eq!(input.cursor_delta(), (0.0, 0.0));
    }
}

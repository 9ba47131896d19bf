//! Raw window events distilled into pollable input state.

use std::collections::HashSet;

use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Backend-neutral input event, decoupled from the windowing library's
/// event types so state transitions stay testable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    KeyPressed(KeyCode),
    KeyReleased(KeyCode),
    ButtonPressed(MouseButton),
    ButtonReleased(MouseButton),
    CursorMoved { x: f64, y: f64 },
}

impl InputEvent {
    pub fn from_window_event(event: &WindowEvent) -> Option<Self> {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return None;
                };
                Some(match event.state {
                    ElementState::Pressed => Self::KeyPressed(code),
                    ElementState::Released => Self::KeyReleased(code),
                })
            }
            WindowEvent::MouseInput { state, button, .. } => Some(match state {
                ElementState::Pressed => Self::ButtonPressed(*button),
                ElementState::Released => Self::ButtonReleased(*button),
            }),
            WindowEvent::CursorMoved { position, .. } => Some(Self::CursorMoved {
                x: position.x,
                y: position.y,
            }),
            _ => None,
        }
    }
}

/// Current keyboard/mouse state plus the cursor delta accumulated since it
/// was last taken.
#[derive(Default)]
pub struct InputManager {
    keys: HashSet<KeyCode>,
    buttons: HashSet<MouseButton>,
    cursor: Option<(f64, f64)>,
    cursor_delta: (f64, f64),
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: InputEvent) {
        match event {
            InputEvent::KeyPressed(code) => {
                self.keys.insert(code);
            }
            InputEvent::KeyReleased(code) => {
                self.keys.remove(&code);
            }
            InputEvent::ButtonPressed(button) => {
                self.buttons.insert(button);
            }
            InputEvent::ButtonReleased(button) => {
                self.buttons.remove(&button);
            }
            InputEvent::CursorMoved { x, y } => {
                if let Some((px, py)) = self.cursor {
                    self.cursor_delta.0 += x - px;
                    self.cursor_delta.1 += y - py;
                }
                self.cursor = Some((x, y));
            }
        }
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        if let Some(event) = InputEvent::from_window_event(event) {
            self.apply(event);
        }
    }

    #[inline]
    pub fn is_key_down(&self, code: KeyCode) -> bool {
        self.keys.contains(&code)
    }

    #[inline]
    pub fn is_button_down(&self, button: MouseButton) -> bool {
        self.buttons.contains(&button)
    }

    #[inline]
    pub fn cursor_position(&self) -> Option<(f64, f64)> {
        self.cursor.map(|(x, y)| (x, y))
    }

    /// Returns and clears the accumulated cursor movement; deltas are
    /// per-poll values, not persistent state.
    pub fn take_cursor_delta(&mut self) -> (f64, f64) {
        std::mem::take(&mut self.cursor_delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_state_follows_press_and_release() {
        let mut input = InputManager::new();
        assert!(!input.is_key_down(KeyCode::KeyW));

        input.apply(InputEvent::KeyPressed(KeyCode::KeyW));
        assert!(input.is_key_down(KeyCode::KeyW));

        // repeated press is idempotent
        input.apply(InputEvent::KeyPressed(KeyCode::KeyW));
        assert!(input.is_key_down(KeyCode::KeyW));

        input.apply(InputEvent::KeyReleased(KeyCode::KeyW));
        assert!(!input.is_key_down(KeyCode::KeyW));
    }

    #[test]
    fn button_state_follows_press_and_release() {
        let mut input = InputManager::new();
        input.apply(InputEvent::ButtonPressed(MouseButton::Left));
        assert!(input.is_button_down(MouseButton::Left));
        assert!(!input.is_button_down(MouseButton::Right));

        input.apply(InputEvent::ButtonReleased(MouseButton::Left));
        assert!(!input.is_button_down(MouseButton::Left));
    }

    #[test]
    fn cursor_delta_accumulates_and_resets_on_take() {
        let mut input = InputManager::new();
        // first move establishes position, no delta
        input.apply(InputEvent::CursorMoved { x: 10.0, y: 10.0 });
        assert_eq!(input.take_cursor_delta(), (0.0, 0.0));

        input.apply(InputEvent::CursorMoved { x: 15.0, y: 8.0 });
        input.apply(InputEvent::CursorMoved { x: 20.0, y: 6.0 });
        assert_eq!(input.cursor_position(), Some((20.0, 6.0)));
        assert_eq!(input.take_cursor_delta(), (10.0, -4.0));
        assert_eq!(input.take_cursor_delta(), (0.0, 0.0));
    }
}

//! Pointer (mouse/trackpad) handling

use log::debug;

use crate::event::{MouseButton, PointerEvent, ScrollDelta, WindowId};
use crate::geometry::LogicalPosition;

/// evdev button codes reported by `wl_pointer.button`
const BTN_LEFT: u32 = 0x110;
const BTN_RIGHT: u32 = 0x111;
const BTN_MIDDLE: u32 = 0x112;
const BTN_SIDE: u32 = 0x113;
const BTN_EXTRA: u32 = 0x114;

/// What an X11 core button number stands for
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum X11Button {
    Button(MouseButton),
    /// Buttons 4-7 encode one wheel notch each
    Scroll(ScrollDelta),
}

/// Map an X11 core button detail
pub fn x11_button(detail: u8) -> X11Button {
    match detail {
        1 => X11Button::Button(MouseButton::Left),
        2 => X11Button::Button(MouseButton::Middle),
        3 => X11Button::Button(MouseButton::Right),
        4 => X11Button::Scroll(ScrollDelta::Lines { x: 0.0, y: -1.0 }),
        5 => X11Button::Scroll(ScrollDelta::Lines { x: 0.0, y: 1.0 }),
        6 => X11Button::Scroll(ScrollDelta::Lines { x: -1.0, y: 0.0 }),
        7 => X11Button::Scroll(ScrollDelta::Lines { x: 1.0, y: 0.0 }),
        8 => X11Button::Button(MouseButton::Back),
        9 => X11Button::Button(MouseButton::Forward),
        other => X11Button::Button(MouseButton::Other(u32::from(other))),
    }
}

/// Map an evdev button code
pub fn evdev_button(code: u32) -> MouseButton {
    match code {
        BTN_LEFT => MouseButton::Left,
        BTN_RIGHT => MouseButton::Right,
        BTN_MIDDLE => MouseButton::Middle,
        BTN_SIDE => MouseButton::Back,
        BTN_EXTRA => MouseButton::Forward,
        other => MouseButton::Other(other),
    }
}

/// Pointer state
#[derive(Debug, Default)]
pub struct PointerState {
    /// Window under the pointer
    focus: Option<WindowId>,
    /// Position in focused window coordinates
    position: LogicalPosition,
    /// Currently pressed buttons
    pressed_buttons: Vec<MouseButton>,
    /// Axis motion accumulated until the next frame
    axis: AxisAccumulator,
}

impl PointerState {
    /// Create a new pointer
    pub fn new() -> Self {
        Self::default()
    }

    /// Set pointer focus to a window
    pub fn set_focus(&mut self, window: Option<WindowId>, position: LogicalPosition) {
        self.focus = window;
        self.position = position;
        if window.is_none() {
            self.pressed_buttons.clear();
            self.axis = AxisAccumulator::default();
        }
    }

    /// Get the currently focused window
    pub fn focus(&self) -> Option<WindowId> {
        self.focus
    }

    /// Update pointer position
    pub fn motion(&mut self, position: LogicalPosition) {
        self.position = position;
    }

    /// Get current position
    pub fn position(&self) -> LogicalPosition {
        self.position
    }

    /// Handle a button press
    pub fn button_press(&mut self, button: MouseButton) -> bool {
        if !self.pressed_buttons.contains(&button) {
            self.pressed_buttons.push(button);
            debug!("Button pressed: {:?}", button);
            true
        } else {
            false
        }
    }

    /// Handle a button release
    pub fn button_release(&mut self, button: MouseButton) -> bool {
        if let Some(idx) = self.pressed_buttons.iter().position(|&b| b == button) {
            self.pressed_buttons.remove(idx);
            debug!("Button released: {:?}", button);
            true
        } else {
            false
        }
    }

    /// Check if any button is pressed
    pub fn has_button_pressed(&self) -> bool {
        !self.pressed_buttons.is_empty()
    }

    pub fn axis_mut(&mut self) -> &mut AxisAccumulator {
        &mut self.axis
    }

    /// Close the current frame, producing at most one wheel event
    pub fn frame(&mut self) -> Option<PointerEvent> {
        let window = self.focus?;
        let delta = self.axis.take()?;
        Some(PointerEvent::Wheel { window, delta })
    }
}

/// Scroll motion gathered between `wl_pointer.frame` events
#[derive(Debug, Default, Clone, Copy)]
pub struct AxisAccumulator {
    pixels: (f64, f64),
    /// Discrete notches (v120 units divided by 120, or axis_discrete steps)
    lines: Option<(f64, f64)>,
}

impl AxisAccumulator {
    /// Continuous motion; `vertical` selects the axis
    pub fn add_pixels(&mut self, vertical: bool, value: f64) {
        if vertical {
            self.pixels.1 += value;
        } else {
            self.pixels.0 += value;
        }
    }

    /// Discrete notches; these win over continuous motion in the same frame
    pub fn add_lines(&mut self, vertical: bool, value: f64) {
        let lines = self.lines.get_or_insert((0.0, 0.0));
        if vertical {
            lines.1 += value;
        } else {
            lines.0 += value;
        }
    }

    fn take(&mut self) -> Option<ScrollDelta> {
        let acc = std::mem::take(self);
        match acc.lines {
            Some((x, y)) if x != 0.0 || y != 0.0 => Some(ScrollDelta::Lines { x, y }),
            _ if acc.pixels != (0.0, 0.0) => Some(ScrollDelta::Pixels {
                x: acc.pixels.0,
                y: acc.pixels.1,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_x11_button_mapping() {
        assert_eq!(x11_button(1), X11Button::Button(MouseButton::Left));
        assert_eq!(x11_button(2), X11Button::Button(MouseButton::Middle));
        assert_eq!(x11_button(3), X11Button::Button(MouseButton::Right));
        assert_eq!(x11_button(8), X11Button::Button(MouseButton::Back));
        assert_eq!(x11_button(9), X11Button::Button(MouseButton::Forward));
        assert_eq!(x11_button(12), X11Button::Button(MouseButton::Other(12)));
        assert_eq!(
            x11_button(5),
            X11Button::Scroll(ScrollDelta::Lines { x: 0.0, y: 1.0 })
        );
    }

    #[test]
    fn test_evdev_button_mapping() {
        assert_eq!(evdev_button(0x110), MouseButton::Left);
        assert_eq!(evdev_button(0x111), MouseButton::Right);
        assert_eq!(evdev_button(0x112), MouseButton::Middle);
        assert_eq!(evdev_button(0x113), MouseButton::Back);
        assert_eq!(evdev_button(0x114), MouseButton::Forward);
        assert_eq!(evdev_button(0x115), MouseButton::Other(0x115));
    }

    #[test]
    fn test_button_press_release() {
        let mut pointer = PointerState::new();

        assert!(pointer.button_press(MouseButton::Left));
        assert!(!pointer.button_press(MouseButton::Left));
        assert!(pointer.has_button_pressed());

        assert!(pointer.button_release(MouseButton::Left));
        assert!(!pointer.has_button_pressed());
        assert!(!pointer.button_release(MouseButton::Left));
    }

    #[test]
    fn test_focus_change() {
        let mut pointer = PointerState::new();
        let window = WindowId::new();

        pointer.set_focus(Some(window), LogicalPosition::new(100.0, 50.0));
        assert_eq!(pointer.focus(), Some(window));
        assert_eq!(pointer.position(), LogicalPosition::new(100.0, 50.0));

        pointer.button_press(MouseButton::Right);
        pointer.set_focus(None, LogicalPosition::default());
        assert!(!pointer.has_button_pressed());
    }

    #[test]
    fn test_axis_frame_accumulates() {
        let mut pointer = PointerState::new();
        let window = WindowId::new();
        pointer.set_focus(Some(window), LogicalPosition::default());

        pointer.axis_mut().add_pixels(true, 4.0);
        pointer.axis_mut().add_pixels(true, 6.0);
        pointer.axis_mut().add_pixels(false, -2.0);
        assert_eq!(
            pointer.frame(),
            Some(PointerEvent::Wheel {
                window,
                delta: ScrollDelta::Pixels { x: -2.0, y: 10.0 }
            })
        );
        // Frame consumed the motion
        assert_eq!(pointer.frame(), None);
    }

    #[test]
    fn test_axis_discrete_wins() {
        let mut pointer = PointerState::new();
        let window = WindowId::new();
        pointer.set_focus(Some(window), LogicalPosition::default());

        pointer.axis_mut().add_pixels(true, 15.0);
        pointer.axis_mut().add_lines(true, 1.0);
        assert_eq!(
            pointer.frame(),
            Some(PointerEvent::Wheel {
                window,
                delta: ScrollDelta::Lines { x: 0.0, y: 1.0 }
            })
        );
    }

    #[test]
    fn test_axis_without_focus_is_dropped() {
        let mut pointer = PointerState::new();
        pointer.axis_mut().add_pixels(true, 5.0);
        assert_eq!(pointer.frame(), None);
    }
}

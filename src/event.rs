//! Platform-neutral event model
//!
//! Every backend translates its native events into [`Event`] values. Events
//! are immutable once constructed and are handed to the application exactly
//! once by `App::pump_events`.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::geometry::{LogicalPosition, LogicalSize};

/// Unique identifier for windows
///
/// Identifiers are never reused within a process, so a native handle that
/// the display server recycles still maps to a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(u64);

impl WindowId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        WindowId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, useful for logging
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Unique identifier for monitors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorId(u64);

impl MonitorId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        MonitorId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, useful for logging
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// An event delivered to the application
#[derive(Debug)]
pub enum Event {
    Window(WindowEvent),
    Pointer(PointerEvent),
    Keyboard(KeyboardEvent),
    Redraw(RedrawEvent),
    Monitor(MonitorEvent),
    /// Application-defined payload posted through a `UserEventSender`
    User(UserPayload),
}

impl Event {
    /// The window this event targets, if any
    pub fn window_id(&self) -> Option<WindowId> {
        match self {
            Event::Window(event) => Some(event.window_id()),
            Event::Pointer(event) => Some(event.window_id()),
            Event::Keyboard(event) => Some(event.window_id()),
            Event::Redraw(RedrawEvent::Requested(id)) => Some(*id),
            Event::Monitor(_) | Event::User(_) => None,
        }
    }
}

/// Window lifecycle and geometry events
#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    Created(WindowId),
    /// The user or window manager asked for the window to close
    Closed(WindowId),
    Resized { window: WindowId, size: LogicalSize },
    Moved { window: WindowId, position: LogicalPosition },
    Focused(WindowId),
    Unfocused(WindowId),
    ScaleChanged { window: WindowId, scale: f64 },
}

impl WindowEvent {
    pub fn window_id(&self) -> WindowId {
        match self {
            WindowEvent::Created(id)
            | WindowEvent::Closed(id)
            | WindowEvent::Focused(id)
            | WindowEvent::Unfocused(id) => *id,
            WindowEvent::Resized { window, .. }
            | WindowEvent::Moved { window, .. }
            | WindowEvent::ScaleChanged { window, .. } => *window,
        }
    }
}

/// Mouse buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
    Other(u32),
}

/// Scroll amount reported by a wheel event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollDelta {
    /// Discrete wheel notches (positive `y` scrolls down)
    Lines { x: f64, y: f64 },
    /// Continuous scrolling in logical pixels
    Pixels { x: f64, y: f64 },
}

/// Pointer events
#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent {
    Moved { window: WindowId, position: LogicalPosition },
    Entered { window: WindowId, position: LogicalPosition },
    Left { window: WindowId },
    ButtonPressed { window: WindowId, button: MouseButton, position: LogicalPosition },
    ButtonReleased { window: WindowId, button: MouseButton, position: LogicalPosition },
    Wheel { window: WindowId, delta: ScrollDelta },
}

impl PointerEvent {
    pub fn window_id(&self) -> WindowId {
        match self {
            PointerEvent::Moved { window, .. }
            | PointerEvent::Entered { window, .. }
            | PointerEvent::Left { window }
            | PointerEvent::ButtonPressed { window, .. }
            | PointerEvent::ButtonReleased { window, .. }
            | PointerEvent::Wheel { window, .. } => *window,
        }
    }
}

/// An XKB keysym value
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Keysym(pub u32);

impl Keysym {
    /// Human-readable keysym name, e.g. `"Return"` or `"a"`
    pub fn name(self) -> String {
        xkbcommon::xkb::keysym_get_name(xkbcommon::xkb::Keysym::new(self.0))
    }
}

impl fmt::Debug for Keysym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keysym({:#x} {})", self.0, self.name())
    }
}

bitflags::bitflags! {
    /// Keyboard modifier state at the time of a key event
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u32 {
        const SHIFT = 1;
        const CONTROL = 1 << 1;
        const ALT = 1 << 2;
        const SUPER = 1 << 3;
        const CAPS_LOCK = 1 << 4;
        const NUM_LOCK = 1 << 5;
    }
}

/// A key press or release
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEvent {
    pub window: WindowId,
    /// Hardware keycode in XKB numbering (evdev code + 8)
    pub keycode: u32,
    /// Keysym resolved against the active keymap and modifiers
    pub keysym: Keysym,
    pub modifiers: Modifiers,
}

/// Keyboard events
#[derive(Debug, Clone, PartialEq)]
pub enum KeyboardEvent {
    KeyDown(KeyEvent),
    KeyUp(KeyEvent),
    /// Text produced by a key press
    TextInput { window: WindowId, text: String },
}

impl KeyboardEvent {
    pub fn window_id(&self) -> WindowId {
        match self {
            KeyboardEvent::KeyDown(key) | KeyboardEvent::KeyUp(key) => key.window,
            KeyboardEvent::TextInput { window, .. } => *window,
        }
    }
}

/// Redraw events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedrawEvent {
    Requested(WindowId),
}

/// Monitor events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Monitors were added, removed, or reconfigured
    ConfigurationChanged,
}

/// Application-defined value carried by [`Event::User`]
///
/// The payload is created on any thread and consumed on the loop thread.
pub struct UserPayload(Box<dyn Any + Send>);

impl UserPayload {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self(Box::new(value))
    }

    /// Borrow the payload as `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    /// Take the payload as `T`, handing it back unchanged on a type mismatch
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        self.0.downcast().map(|boxed| *boxed).map_err(Self)
    }
}

impl fmt::Debug for UserPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserPayload").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_id_unique() {
        let id1 = WindowId::new();
        let id2 = WindowId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_monitor_id_unique() {
        assert_ne!(MonitorId::new(), MonitorId::new());
    }

    #[test]
    fn test_event_window_id() {
        let id = WindowId::new();
        let event = Event::Window(WindowEvent::Resized {
            window: id,
            size: LogicalSize::new(10.0, 10.0),
        });
        assert_eq!(event.window_id(), Some(id));

        let event = Event::Pointer(PointerEvent::Left { window: id });
        assert_eq!(event.window_id(), Some(id));

        let event = Event::Monitor(MonitorEvent::ConfigurationChanged);
        assert_eq!(event.window_id(), None);
    }

    #[test]
    fn test_user_payload_downcast() {
        let payload = UserPayload::new(42u32);
        assert_eq!(payload.downcast_ref::<u32>(), Some(&42));
        assert!(payload.downcast_ref::<String>().is_none());

        let payload = match payload.downcast::<String>() {
            Ok(_) => panic!("wrong type accepted"),
            Err(payload) => payload,
        };
        assert_eq!(payload.downcast::<u32>().ok(), Some(42));
    }

    #[test]
    fn test_keysym_name() {
        // XK_Return
        assert_eq!(Keysym(0xff0d).name(), "Return");
    }
}

//! Window handles and the per-backend window contract

use crate::error::Result;
use crate::event::WindowId;
use crate::geometry::{LogicalPosition, LogicalSize};
use crate::wayland::WaylandWindow;
use crate::x11::X11Window;

bitflags::bitflags! {
    /// Capability-gated operations a window supports on this backend
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        const WINDOW_POSITION = 1;
        const FOCUS_REQUEST = 1 << 1;
        const DECORATION_TOGGLE = 1 << 2;
        const ALWAYS_ON_TOP = 1 << 3;
        const TRANSPARENCY = 1 << 4;
        const CLIPBOARD = 1 << 5;
    }
}

/// Parameters for `create_window`
#[derive(Debug, Clone, PartialEq)]
pub struct WindowAttributes {
    pub title: String,
    pub size: LogicalSize,
    pub resizable: bool,
    /// Map the window immediately
    pub visible: bool,
    pub decorated: bool,
    pub min_size: Option<LogicalSize>,
    pub max_size: Option<LogicalSize>,
}

impl WindowAttributes {
    pub fn new(title: impl Into<String>, size: LogicalSize) -> Self {
        Self {
            title: title.into(),
            size,
            ..Self::default()
        }
    }

    pub fn with_resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_decorated(mut self, decorated: bool) -> Self {
        self.decorated = decorated;
        self
    }

    pub fn with_min_size(mut self, size: LogicalSize) -> Self {
        self.min_size = Some(size);
        self
    }

    pub fn with_max_size(mut self, size: LogicalSize) -> Self {
        self.max_size = Some(size);
        self
    }
}

impl Default for WindowAttributes {
    fn default() -> Self {
        Self {
            title: "lumina".to_string(),
            size: LogicalSize::new(800.0, 600.0),
            resizable: true,
            visible: true,
            decorated: true,
            min_size: None,
            max_size: None,
        }
    }
}

/// Operations every backend window implements
///
/// Methods taking `&self` on a window that was already closed through
/// another path panic; ids are never revived.
pub trait PlatformWindow {
    fn id(&self) -> WindowId;

    fn show(&self) -> Result<()>;
    fn hide(&self) -> Result<()>;
    /// Destroy the native window; the id becomes invalid
    fn close(self)
    where
        Self: Sized;

    fn title(&self) -> String;
    fn set_title(&self, title: &str) -> Result<()>;

    /// Inner size in logical units
    fn size(&self) -> LogicalSize;
    fn set_size(&self, size: LogicalSize) -> Result<()>;
    /// Outer position, when the platform exposes one
    fn position(&self) -> Option<LogicalPosition>;
    fn set_position(&self, position: LogicalPosition) -> Result<()>;
    fn set_min_size(&self, size: Option<LogicalSize>) -> Result<()>;
    fn set_max_size(&self, size: Option<LogicalSize>) -> Result<()>;

    fn request_focus(&self) -> Result<()>;
    fn scale_factor(&self) -> f64;
    /// Queue a `Redraw::Requested` for this window
    fn request_redraw(&self);

    fn set_decorated(&self, decorated: bool) -> Result<()>;
    fn set_always_on_top(&self, always_on_top: bool) -> Result<()>;
    fn set_transparent(&self, transparent: bool) -> Result<()>;

    fn capabilities(&self) -> Capabilities;
}

/// A window on whichever backend the application runs on
pub enum Window {
    X11(X11Window),
    Wayland(WaylandWindow),
}

macro_rules! dispatch {
    ($self:expr, $window:ident => $body:expr) => {
        match $self {
            Window::X11($window) => $body,
            Window::Wayland($window) => $body,
        }
    };
}

impl PlatformWindow for Window {
    fn id(&self) -> WindowId {
        dispatch!(self, w => w.id())
    }

    fn show(&self) -> Result<()> {
        dispatch!(self, w => w.show())
    }

    fn hide(&self) -> Result<()> {
        dispatch!(self, w => w.hide())
    }

    fn close(self) {
        dispatch!(self, w => w.close())
    }

    fn title(&self) -> String {
        dispatch!(self, w => w.title())
    }

    fn set_title(&self, title: &str) -> Result<()> {
        dispatch!(self, w => w.set_title(title))
    }

    fn size(&self) -> LogicalSize {
        dispatch!(self, w => w.size())
    }

    fn set_size(&self, size: LogicalSize) -> Result<()> {
        dispatch!(self, w => w.set_size(size))
    }

    fn position(&self) -> Option<LogicalPosition> {
        dispatch!(self, w => w.position())
    }

    fn set_position(&self, position: LogicalPosition) -> Result<()> {
        dispatch!(self, w => w.set_position(position))
    }

    fn set_min_size(&self, size: Option<LogicalSize>) -> Result<()> {
        dispatch!(self, w => w.set_min_size(size))
    }

    fn set_max_size(&self, size: Option<LogicalSize>) -> Result<()> {
        dispatch!(self, w => w.set_max_size(size))
    }

    fn request_focus(&self) -> Result<()> {
        dispatch!(self, w => w.request_focus())
    }

    fn scale_factor(&self) -> f64 {
        dispatch!(self, w => w.scale_factor())
    }

    fn request_redraw(&self) {
        dispatch!(self, w => w.request_redraw())
    }

    fn set_decorated(&self, decorated: bool) -> Result<()> {
        dispatch!(self, w => w.set_decorated(decorated))
    }

    fn set_always_on_top(&self, always_on_top: bool) -> Result<()> {
        dispatch!(self, w => w.set_always_on_top(always_on_top))
    }

    fn set_transparent(&self, transparent: bool) -> Result<()> {
        dispatch!(self, w => w.set_transparent(transparent))
    }

    fn capabilities(&self) -> Capabilities {
        dispatch!(self, w => w.capabilities())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_attributes() {
        let attrs = WindowAttributes::default();
        assert_eq!(attrs.size, LogicalSize::new(800.0, 600.0));
        assert!(attrs.resizable);
        assert!(attrs.visible);
        assert!(attrs.decorated);
    }

    #[test]
    fn test_attribute_builders() {
        let attrs = WindowAttributes::new("viewer", LogicalSize::new(320.0, 240.0))
            .with_resizable(false)
            .with_decorated(false)
            .with_min_size(LogicalSize::new(100.0, 100.0));
        assert_eq!(attrs.title, "viewer");
        assert!(!attrs.resizable);
        assert!(!attrs.decorated);
        assert_eq!(attrs.min_size, Some(LogicalSize::new(100.0, 100.0)));
        assert_eq!(attrs.max_size, None);
    }

    #[test]
    fn test_capabilities_are_distinct() {
        let all = Capabilities::all();
        assert_eq!(all.bits().count_ones(), 6);
        assert!(!Capabilities::CLIPBOARD.intersects(Capabilities::TRANSPARENCY));
    }
}

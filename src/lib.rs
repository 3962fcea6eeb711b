//! Lumina - one event loop and window surface over X11 and Wayland
//!
//! Lumina presents a single deterministic event stream and one
//! window-control surface to application code, whichever Linux display
//! server the session runs.
//!
//! # Architecture
//!
//! - **Event model**: [`Event`] and [`ControlFlowMode`], shared by every backend
//! - **Backend plumbing**: calloop event loop, pending queue, window registry
//! - **X11 backend**: x11rb connection, atom cache, EWMH window state, selections
//! - **Wayland backend**: registry globals, decoration negotiation, output scale,
//!   data-device clipboard
//!
//! # Example
//!
//! ```no_run
//! use lumina::{App, ControlFlowMode, Event, PlatformApp, WindowAttributes, WindowEvent};
//!
//! let mut app = App::from_env()?;
//! let _window = app.create_window(&WindowAttributes::default())?;
//! app.run(ControlFlowMode::Wait, |app, event| {
//!     if let Event::Window(WindowEvent::Closed(_)) = event {
//!         app.quit();
//!     }
//! })?;
//! # Ok::<(), lumina::PlatformError>(())
//! ```

pub mod app;
pub mod backend;
pub mod config;
pub mod control_flow;
pub mod error;
pub mod event;
pub mod ffi;
pub mod geometry;
pub mod input;
pub mod monitor;
pub mod wayland;
pub mod window;
pub mod x11;

pub use app::{App, PlatformApp};
pub use backend::UserEventSender;
pub use config::{BackendPreference, Config};
pub use control_flow::{ControlFlowMode, Deadline};
pub use error::{Feature, PlatformError, Result};
pub use event::{
    Event, KeyEvent, KeyboardEvent, Keysym, Modifiers, MonitorEvent, MonitorId, MouseButton, PointerEvent,
    RedrawEvent, ScrollDelta, UserPayload, WindowEvent, WindowId,
};
pub use geometry::{LogicalPosition, LogicalRect, LogicalSize, PhysicalPosition, PhysicalSize};
pub use monitor::MonitorInfo;
pub use window::{Capabilities, PlatformWindow, Window, WindowAttributes};

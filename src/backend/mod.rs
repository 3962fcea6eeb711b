//! Backend-independent plumbing
//!
//! - Event loop integration with calloop
//! - The pending event queue both backends fill
//! - Native handle to window id mapping

pub mod event_loop;
pub mod queue;
pub mod registry;

pub(crate) use event_loop::NativeSource;
pub use event_loop::{EventLoop, UserEventSender};
pub use queue::PendingEvents;
pub use registry::WindowRegistry;

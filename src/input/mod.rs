//! Input handling module
//!
//! This module provides the keyboard and pointer state shared by the X11 and
//! Wayland backends.

pub mod keyboard;
pub mod pointer;

pub use keyboard::KeyboardState;
pub use pointer::PointerState;

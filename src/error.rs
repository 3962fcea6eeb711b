//! Error types

use std::fmt;

use crate::window::Capabilities;

/// A capability-gated operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    WindowPosition,
    FocusRequest,
    DecorationToggle,
    AlwaysOnTop,
    Transparency,
    Clipboard,
}

impl Feature {
    /// The capability flag that advertises this feature
    pub fn capability(self) -> Capabilities {
        match self {
            Feature::WindowPosition => Capabilities::WINDOW_POSITION,
            Feature::FocusRequest => Capabilities::FOCUS_REQUEST,
            Feature::DecorationToggle => Capabilities::DECORATION_TOGGLE,
            Feature::AlwaysOnTop => Capabilities::ALWAYS_ON_TOP,
            Feature::Transparency => Capabilities::TRANSPARENCY,
            Feature::Clipboard => Capabilities::CLIPBOARD,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Feature::WindowPosition => "window position",
            Feature::FocusRequest => "focus request",
            Feature::DecorationToggle => "decoration toggle",
            Feature::AlwaysOnTop => "always on top",
            Feature::Transparency => "transparency",
            Feature::Clipboard => "clipboard",
        };
        f.write_str(name)
    }
}

/// Errors reported by the platform layer
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("platform initialization failed: {0}")]
    PlatformInitializationFailed(String),
    #[error("required protocol missing: {0}")]
    ProtocolMissing(String),
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(Feature),
    #[error("clipboard access denied")]
    ClipboardAccessDenied,
    #[error("clipboard read failed: {0}")]
    ClipboardReadFailed(String),
    #[error("clipboard write failed: {0}")]
    ClipboardWriteFailed(String),
    #[error("monitor enumeration failed: {0}")]
    MonitorEnumerationFailed(String),
    #[error("connection to the display server lost: {0}")]
    ConnectionLost(String),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, PlatformError>;

impl From<x11rb::errors::ConnectionError> for PlatformError {
    fn from(err: x11rb::errors::ConnectionError) -> Self {
        PlatformError::ConnectionLost(err.to_string())
    }
}

impl From<x11rb::errors::ReplyError> for PlatformError {
    fn from(err: x11rb::errors::ReplyError) -> Self {
        PlatformError::ConnectionLost(err.to_string())
    }
}

impl From<x11rb::errors::ReplyOrIdError> for PlatformError {
    fn from(err: x11rb::errors::ReplyOrIdError) -> Self {
        PlatformError::ConnectionLost(err.to_string())
    }
}

impl From<calloop::Error> for PlatformError {
    fn from(err: calloop::Error) -> Self {
        PlatformError::ConnectionLost(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_capability_mapping() {
        assert_eq!(Feature::AlwaysOnTop.capability(), Capabilities::ALWAYS_ON_TOP);
        assert_eq!(Feature::Transparency.capability(), Capabilities::TRANSPARENCY);
    }

    #[test]
    fn test_error_display() {
        let err = PlatformError::UnsupportedFeature(Feature::Transparency);
        assert_eq!(err.to_string(), "unsupported feature: transparency");

        let err = PlatformError::ProtocolMissing("xdg_wm_base".into());
        assert_eq!(err.to_string(), "required protocol missing: xdg_wm_base");
    }
}

//! Application handle and backend selection

use std::any::Any;
use std::env;

use log::{info, warn};

use crate::backend::UserEventSender;
use crate::config::{BackendPreference, Config};
use crate::control_flow::ControlFlowMode;
use crate::error::{PlatformError, Result};
use crate::event::Event;
use crate::monitor::MonitorInfo;
use crate::wayland::WaylandApp;
use crate::window::{PlatformWindow, Window, WindowAttributes};
use crate::x11::X11App;

/// Operations every backend application implements
pub trait PlatformApp {
    type Window: PlatformWindow;

    /// Return the next event, blocking according to `mode`
    ///
    /// `Poll` never blocks. `Wait` blocks until an event exists. `WaitUntil`
    /// blocks at most until its deadline and returns `None` on expiry.
    fn pump_events(&mut self, mode: ControlFlowMode) -> Result<Option<Event>>;

    /// Handle for posting [`Event::User`] from other threads
    fn user_event_sender(&self) -> UserEventSender;

    /// Post a user event from the loop thread
    fn post_user_event<T: Any + Send>(&self, value: T) -> Result<()> {
        self.user_event_sender().send(value)
    }

    /// Ask `run` to return; idempotent and never interrupts a blocked pump
    fn quit(&mut self);
    fn should_quit(&self) -> bool;

    fn create_window(&mut self, attributes: &WindowAttributes) -> Result<Self::Window>;

    fn monitors(&mut self) -> Result<Vec<MonitorInfo>>;

    fn write_clipboard_text(&mut self, text: &str) -> Result<()>;
    /// `Ok(None)` when the clipboard holds no text
    fn read_clipboard_text(&mut self) -> Result<Option<String>>;
}

/// The application, connected to whichever display server the session uses
///
/// `App` and its windows must stay on the thread that created them:
///
/// ```compile_fail
/// fn assert_send<T: Send>() {}
/// assert_send::<lumina::App>();
/// ```
///
/// ```compile_fail
/// fn assert_send<T: Send>() {}
/// assert_send::<lumina::Window>();
/// ```
pub enum App {
    X11(X11App),
    Wayland(WaylandApp),
}

/// Backend chosen for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackendKind {
    X11,
    Wayland,
}

/// Backends to try, in order, for a preference and session environment
fn candidates(
    preference: BackendPreference,
    has_wayland: bool,
    has_x11: bool,
) -> Result<Vec<BackendKind>> {
    match preference {
        BackendPreference::X11 => Ok(vec![BackendKind::X11]),
        BackendPreference::Wayland => Ok(vec![BackendKind::Wayland]),
        BackendPreference::Auto => {
            let mut kinds = Vec::new();
            if has_wayland {
                kinds.push(BackendKind::Wayland);
            }
            if has_x11 {
                kinds.push(BackendKind::X11);
            }
            if kinds.is_empty() {
                return Err(PlatformError::PlatformInitializationFailed(
                    "neither WAYLAND_DISPLAY nor DISPLAY is set".into(),
                ));
            }
            Ok(kinds)
        }
    }
}

fn env_set(key: &str) -> bool {
    env::var_os(key).is_some_and(|value| !value.is_empty())
}

impl App {
    /// Connect using the configured or detected backend
    pub fn new(config: Config) -> Result<Self> {
        let kinds = candidates(
            config.backend,
            env_set("WAYLAND_DISPLAY"),
            env_set("DISPLAY"),
        )?;

        let mut last_error = None;
        for kind in kinds {
            let result = match kind {
                BackendKind::Wayland => WaylandApp::connect(&config).map(App::Wayland),
                BackendKind::X11 => X11App::connect(&config).map(App::X11),
            };
            match result {
                Ok(app) => {
                    info!("Using {:?} backend", kind);
                    return Ok(app);
                }
                Err(err) => {
                    warn!("{:?} backend unavailable: {}", kind, err);
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            PlatformError::PlatformInitializationFailed("no backend available".into())
        }))
    }

    /// Connect with [`Config::from_env`]
    pub fn from_env() -> Result<Self> {
        Self::new(Config::from_env())
    }

    /// Pump events into `handler` until [`PlatformApp::quit`] is called
    ///
    /// With `Poll`, or once a `WaitUntil` deadline has passed, this spins.
    pub fn run(&mut self, mode: ControlFlowMode, mut handler: impl FnMut(&mut App, Event)) -> Result<()> {
        while !self.should_quit() {
            if let Some(event) = self.pump_events(mode)? {
                handler(self, event);
            }
        }
        Ok(())
    }
}

macro_rules! dispatch {
    ($self:expr, $app:ident => $body:expr) => {
        match $self {
            App::X11($app) => $body,
            App::Wayland($app) => $body,
        }
    };
}

impl PlatformApp for App {
    type Window = Window;

    fn pump_events(&mut self, mode: ControlFlowMode) -> Result<Option<Event>> {
        dispatch!(self, app => app.pump_events(mode))
    }

    fn user_event_sender(&self) -> UserEventSender {
        dispatch!(self, app => app.user_event_sender())
    }

    fn quit(&mut self) {
        dispatch!(self, app => app.quit())
    }

    fn should_quit(&self) -> bool {
        dispatch!(self, app => app.should_quit())
    }

    fn create_window(&mut self, attributes: &WindowAttributes) -> Result<Window> {
        match self {
            App::X11(app) => app.create_window(attributes).map(Window::X11),
            App::Wayland(app) => app.create_window(attributes).map(Window::Wayland),
        }
    }

    fn monitors(&mut self) -> Result<Vec<MonitorInfo>> {
        dispatch!(self, app => app.monitors())
    }

    fn write_clipboard_text(&mut self, text: &str) -> Result<()> {
        dispatch!(self, app => app.write_clipboard_text(text))
    }

    fn read_clipboard_text(&mut self) -> Result<Option<String>> {
        dispatch!(self, app => app.read_clipboard_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_prefers_wayland_then_x11() {
        let kinds = candidates(BackendPreference::Auto, true, true).unwrap();
        assert_eq!(kinds, vec![BackendKind::Wayland, BackendKind::X11]);

        let kinds = candidates(BackendPreference::Auto, false, true).unwrap();
        assert_eq!(kinds, vec![BackendKind::X11]);

        let kinds = candidates(BackendPreference::Auto, true, false).unwrap();
        assert_eq!(kinds, vec![BackendKind::Wayland]);
    }

    #[test]
    fn test_auto_without_session_fails() {
        let err = candidates(BackendPreference::Auto, false, false).unwrap_err();
        assert!(matches!(err, PlatformError::PlatformInitializationFailed(_)));
    }

    #[test]
    fn test_explicit_preference_is_exclusive() {
        assert_eq!(
            candidates(BackendPreference::X11, true, false).unwrap(),
            vec![BackendKind::X11]
        );
        assert_eq!(
            candidates(BackendPreference::Wayland, false, true).unwrap(),
            vec![BackendKind::Wayland]
        );
    }
}

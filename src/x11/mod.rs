//! X11 backend
//!
//! One `RustConnection` per application. Windows share the connection
//! through an `Rc<RefCell<X11Context>>`; the calloop loop lives beside the
//! context so pumping can borrow both at once.

pub mod atoms;
pub(crate) mod clipboard;
pub(crate) mod monitor;
pub(crate) mod translate;
pub mod window;

use std::cell::RefCell;
use std::collections::HashMap;
use std::os::unix::io::AsFd;
use std::rc::Rc;
use std::time::Duration;

use log::{debug, info, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::randr::{self, ConnectionExt as RandrExt, NotifyMask};
use x11rb::protocol::xproto::{ChangeWindowAttributesAux, ConnectionExt, EventMask, Screen};
use x11rb::protocol::Event as XEvent;
use x11rb::rust_connection::RustConnection;

use crate::app::PlatformApp;
use crate::backend::{EventLoop, NativeSource, PendingEvents, UserEventSender};
use crate::config::Config;
use crate::control_flow::{ControlFlowMode, Deadline};
use crate::error::{PlatformError, Result};
use crate::event::{Event, WindowId};
use crate::input::KeyboardState;
use crate::monitor::MonitorInfo;
use crate::window::WindowAttributes;

use self::atoms::Atoms;
use self::clipboard::Clipboard;
use self::monitor::MonitorIds;
use self::translate::{Followup, Translator};
use self::window::WindowState;

pub use self::window::X11Window;

/// How long a clipboard read waits for the selection owner
pub const CLIPBOARD_TIMEOUT: Duration = Duration::from_secs(1);

/// RandR version that introduced `GetMonitors`
const RANDR_MONITORS_VERSION: (u32, u32) = (1, 5);

/// Lifecycle of the display connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Connected and initialized, not yet pumped
    Connected,
    Running,
}

impl ConnectionState {
    /// State after a pump starts
    fn start(self) -> Result<Self> {
        match self {
            ConnectionState::Disconnected => Err(PlatformError::ConnectionLost(
                "X11 connection is closed".into(),
            )),
            ConnectionState::Connected | ConnectionState::Running => Ok(ConnectionState::Running),
        }
    }
}

/// Log an X11 error reply and carry on; only connection errors are fatal
fn recover_reply<T>(
    result: std::result::Result<T, ReplyError>,
    what: &str,
) -> std::result::Result<Option<T>, ConnectionError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ReplyError::X11Error(err)) => {
            warn!("{} failed: {:?}", what, err);
            Ok(None)
        }
        Err(ReplyError::ConnectionError(err)) => Err(err),
    }
}

/// Randr support detected while connecting
#[derive(Debug, Clone, Copy, Default)]
struct RandrSupport {
    present: bool,
    monitors: bool,
}

fn probe_randr(conn: &RustConnection) -> Result<RandrSupport> {
    if conn.extension_information(randr::X11_EXTENSION_NAME)?.is_none() {
        return Ok(RandrSupport::default());
    }
    let version = conn
        .randr_query_version(RANDR_MONITORS_VERSION.0, RANDR_MONITORS_VERSION.1)?
        .reply()?;
    Ok(RandrSupport {
        present: true,
        monitors: (version.major_version, version.minor_version) >= RANDR_MONITORS_VERSION,
    })
}

/// Everything the X11 backend shares between the app and its windows
pub(crate) struct X11Context {
    pub(crate) conn: RustConnection,
    pub(crate) screen: Screen,
    pub(crate) atoms: Atoms,
    pub(crate) translator: Translator,
    pub(crate) windows: HashMap<WindowId, WindowState>,
    pub(crate) pending: PendingEvents,
    pub(crate) app_id: String,
    state: ConnectionState,
    clipboard: Clipboard,
    monitor_ids: MonitorIds,
    randr: RandrSupport,
}

impl X11Context {
    fn connect(config: &Config) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None)
            .map_err(|e| PlatformError::PlatformInitializationFailed(e.to_string()))?;
        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .cloned()
            .ok_or_else(|| {
                PlatformError::PlatformInitializationFailed(format!("no screen {screen_num}"))
            })?;

        let atoms = Atoms::intern(&conn)?;
        let randr = probe_randr(&conn)?;
        if randr.present {
            conn.randr_select_input(screen.root, NotifyMask::SCREEN_CHANGE)?;
        } else {
            warn!("RandR unavailable, monitor changes will not be reported");
        }
        conn.change_window_attributes(
            screen.root,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE),
        )?;

        let scale = monitor::read_scale(&conn, screen.root)?;
        let keyboard = KeyboardState::from_default_names();
        if keyboard.is_none() {
            warn!("No XKB keymap available, key events carry no keysyms");
        }
        let clipboard = Clipboard::new(&conn, &screen)?;
        conn.flush()?;

        info!(
            "Connected to X11 screen {} ({}x{}, scale {})",
            screen_num, screen.width_in_pixels, screen.height_in_pixels, scale
        );

        Ok(Self {
            translator: Translator::new(atoms, screen.root, keyboard, scale),
            conn,
            screen,
            atoms,
            windows: HashMap::new(),
            pending: PendingEvents::new(),
            app_id: config.app_id.clone(),
            state: ConnectionState::Connected,
            clipboard,
            monitor_ids: MonitorIds::default(),
            randr,
        })
    }

    fn lost(&mut self, err: impl Into<PlatformError>) -> PlatformError {
        let err = err.into();
        if self.state != ConnectionState::Disconnected {
            warn!("X11 connection lost: {}", err);
        }
        self.state = ConnectionState::Disconnected;
        err
    }

    fn handle_event(&mut self, event: XEvent) -> Result<()> {
        let clipboard_window = self.clipboard.window();
        match &event {
            XEvent::SelectionRequest(e) => {
                return self.clipboard.handle_request(&self.conn, &self.atoms, e);
            }
            XEvent::SelectionClear(e) => {
                self.clipboard.handle_clear(e);
                return Ok(());
            }
            XEvent::SelectionNotify(e) => {
                return self.clipboard.handle_notify(&self.conn, &self.atoms, e);
            }
            XEvent::PropertyNotify(e) if e.window == clipboard_window => {
                return self.clipboard.handle_property(&self.conn, &self.atoms, e);
            }
            _ => {}
        }

        match self.translator.translate(&event, &mut self.pending) {
            Some(Followup::Ping(reply)) => {
                self.conn.send_event(
                    false,
                    self.screen.root,
                    EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
                    reply,
                )?;
            }
            Some(Followup::ResourcesChanged) => {
                let reply = monitor::read_scale(&self.conn, self.screen.root);
                if let Some(scale) = recover_reply(reply, "Rereading Xft.dpi")? {
                    debug!("Resource database changed, scale {}", scale);
                    self.translator.set_scale(scale, &mut self.pending);
                }
            }
            None => {}
        }
        Ok(())
    }

    fn monitors(&mut self) -> Result<Vec<MonitorInfo>> {
        let scale = self.translator.scale();
        monitor::enumerate(
            &self.conn,
            &self.screen,
            &self.atoms,
            self.randr.monitors,
            scale,
            &mut self.monitor_ids,
        )
    }
}

impl NativeSource for X11Context {
    fn drain(&mut self) -> Result<()> {
        loop {
            let event = match self.conn.poll_for_event() {
                Ok(Some(event)) => event,
                Ok(None) => return Ok(()),
                Err(err) => return Err(self.lost(err)),
            };
            if let Err(err) = self.handle_event(event) {
                return Err(match err {
                    PlatformError::ConnectionLost(_) => self.lost(err),
                    other => other,
                });
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.conn.flush().map_err(|err| self.lost(err))
    }

    fn pending(&mut self) -> &mut PendingEvents {
        &mut self.pending
    }
}

/// Application on the X11 backend
pub struct X11App {
    event_loop: EventLoop,
    ctx: Rc<RefCell<X11Context>>,
}

impl X11App {
    /// Connect to the server named by `DISPLAY`
    pub fn connect(config: &Config) -> Result<Self> {
        let ctx = X11Context::connect(config)?;
        let event_loop = EventLoop::new()?;
        event_loop.watch_fd(ctx.conn.stream().as_fd())?;
        Ok(Self {
            event_loop,
            ctx: Rc::new(RefCell::new(ctx)),
        })
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.ctx.borrow().state
    }
}

impl PlatformApp for X11App {
    type Window = X11Window;

    fn pump_events(&mut self, mode: ControlFlowMode) -> Result<Option<Event>> {
        let mut ctx = self.ctx.borrow_mut();
        ctx.state = ctx.state.start()?;
        self.event_loop.pump(&mut *ctx, mode)
    }

    fn user_event_sender(&self) -> UserEventSender {
        self.event_loop.user_event_sender()
    }

    fn quit(&mut self) {
        self.event_loop.quit();
    }

    fn should_quit(&self) -> bool {
        self.event_loop.quit_requested()
    }

    fn create_window(&mut self, attributes: &WindowAttributes) -> Result<X11Window> {
        let id = self.ctx.borrow_mut().create_window(attributes)?;
        Ok(X11Window::new(self.ctx.clone(), id))
    }

    fn monitors(&mut self) -> Result<Vec<MonitorInfo>> {
        self.ctx.borrow_mut().monitors()
    }

    fn write_clipboard_text(&mut self, text: &str) -> Result<()> {
        let mut guard = self.ctx.borrow_mut();
        let ctx = &mut *guard;
        ctx.clipboard.write(&ctx.conn, &ctx.atoms, text)
    }

    fn read_clipboard_text(&mut self) -> Result<Option<String>> {
        let mut guard = self.ctx.borrow_mut();
        let ctx = &mut *guard;
        if let Some(text) = ctx.clipboard.owned() {
            return Ok(Some(text.to_string()));
        }

        let deadline = Deadline::after(CLIPBOARD_TIMEOUT);
        if !ctx.clipboard.begin_read(&ctx.conn, &ctx.atoms, deadline)? {
            return Ok(None);
        }

        // Other events arriving meanwhile stay queued for the next pump
        loop {
            ctx.drain()?;
            if let Some(outcome) = ctx.clipboard.take_outcome() {
                return Ok(outcome);
            }
            let expired = ctx
                .clipboard
                .request()
                .map_or(true, |request| request.deadline.has_expired());
            if expired {
                ctx.clipboard.cancel_read();
                return Err(PlatformError::ClipboardReadFailed(
                    "timed out waiting for the selection owner".into(),
                ));
            }
            ctx.flush()?;
            self.event_loop
                .dispatch(Some(deadline.remaining()), &mut ctx.pending)?;
        }
    }
}

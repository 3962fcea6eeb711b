//! Wayland backend
//!
//! One `Connection` and one event queue per application. Protocol objects
//! dispatch into [`State`]; windows reach it through the shared
//! `Rc<RefCell<WaylandContext>>` the same way the X11 backend shares its
//! connection.

pub mod decoration;
pub mod globals;
pub mod output;
pub(crate) mod clipboard;
pub(crate) mod seat;
pub(crate) mod shm;
pub mod window;

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::rc::Rc;

use log::{debug, info, warn};
use wayland_client::backend::{ObjectId, WaylandError};
use wayland_client::globals::{registry_queue_init, GlobalList, GlobalListContents};
use wayland_client::protocol::{
    wl_buffer, wl_compositor, wl_output, wl_registry, wl_shm, wl_shm_pool, wl_surface,
};
use wayland_client::{delegate_noop, Connection, Dispatch, EventQueue, Proxy, QueueHandle, WEnum};
use wayland_protocols::wp::fractional_scale::v1::client::wp_fractional_scale_manager_v1;
use wayland_protocols::xdg::decoration::zv1::client::zxdg_decoration_manager_v1;
use wayland_protocols::xdg::shell::client::xdg_wm_base;

use crate::app::PlatformApp;
use crate::backend::{EventLoop, NativeSource, PendingEvents, UserEventSender, WindowRegistry};
use crate::config::Config;
use crate::control_flow::{ControlFlowMode, Deadline};
use crate::error::{Feature, PlatformError, Result};
use crate::event::{Event, MonitorEvent, WindowId};
use crate::ffi::libdecor::Libdecor;
use crate::geometry::{PhysicalPosition, PhysicalSize};
use crate::monitor::MonitorInfo;
use crate::window::WindowAttributes;

use self::clipboard::ClipboardState;
use self::globals::{bind_outputs, Globals, ProtocolCapabilities, WL_OUTPUT_VERSION};
use self::output::Outputs;
use self::seat::SeatState;
use self::window::WindowData;

pub use self::window::WaylandWindow;

/// How long a clipboard read waits for the selection owner
pub const CLIPBOARD_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

fn lost(err: impl std::fmt::Display) -> PlatformError {
    PlatformError::ConnectionLost(err.to_string())
}

/// libdecor is loaded the first time a window needs client-side decorations
enum DecorLoader {
    Unprobed,
    Loaded(Libdecor),
    Unavailable,
}

/// Dispatch state for every protocol object of the connection
pub struct State {
    conn: Connection,
    qh: QueueHandle<State>,
    globals: Globals,
    capabilities: ProtocolCapabilities,
    pending: PendingEvents,
    registry: WindowRegistry<ObjectId>,
    windows: HashMap<WindowId, WindowData>,
    outputs: Outputs,
    output_proxies: HashMap<u32, wl_output::WlOutput>,
    seat: SeatState,
    clipboard: ClipboardState,
    decor: DecorLoader,
    app_id: String,
    /// Output changes before the initial roundtrip completes are not events
    initialized: bool,
}

impl State {
    pub fn capabilities(&self) -> ProtocolCapabilities {
        self.capabilities
    }

    /// The libdecor context, loading it on first use
    fn libdecor(&mut self) -> Option<Libdecor> {
        if let DecorLoader::Unprobed = self.decor {
            let display = self.conn.backend().display_ptr() as *mut c_void;
            self.decor = match Libdecor::new(display) {
                Ok(lib) => {
                    info!("Using libdecor for client-side decorations");
                    DecorLoader::Loaded(lib)
                }
                Err(err) => {
                    warn!("No decorations available: {}", err);
                    DecorLoader::Unavailable
                }
            };
        }
        match &self.decor {
            DecorLoader::Loaded(lib) => Some(lib.clone()),
            _ => None,
        }
    }

    fn monitors_changed(&mut self) {
        if self.initialized {
            self.pending
                .push(Event::Monitor(MonitorEvent::ConfigurationChanged));
        }
        let mut ids: Vec<WindowId> = self.windows.keys().copied().collect();
        ids.sort();
        for id in ids {
            self.rescale(id);
        }
    }

    fn output_done(&mut self, name: u32) {
        if self.outputs.done(name) {
            self.monitors_changed();
        }
    }

    fn add_output(&mut self, name: u32, output: wl_output::WlOutput) {
        debug!("Output {} bound at v{}", name, output.version());
        self.outputs.add(name);
        self.output_proxies.insert(name, output);
    }

    fn remove_output(&mut self, name: u32) {
        let Some(output) = self.output_proxies.remove(&name) else {
            return;
        };
        if output.version() >= 3 {
            output.release();
        }
        let published = self.outputs.remove(name).is_some();
        for data in self.windows.values_mut() {
            data.scale.leave(name);
        }
        debug!("Output {} removed", name);
        if published {
            self.monitors_changed();
        }
    }
}

/// Connection, queue and dispatch state shared by the app and its windows
pub(crate) struct WaylandContext {
    conn: Connection,
    queue: EventQueue<State>,
    pub(crate) state: State,
    _globals: GlobalList,
    connected: bool,
}

impl WaylandContext {
    fn connect(config: &Config) -> Result<Self> {
        let init_failed = |e: &dyn std::fmt::Display| {
            PlatformError::PlatformInitializationFailed(e.to_string())
        };
        let conn = Connection::connect_to_env().map_err(|e| init_failed(&e))?;
        let (globals, mut queue) = registry_queue_init::<State>(&conn).map_err(|e| init_failed(&e))?;
        let qh = queue.handle();

        let bound = Globals::bind_all(&globals, &qh)?;
        let clipboard = ClipboardState::new(bound.data_device_manager.as_ref(), &bound.seat, &qh);
        let mut state = State {
            conn: conn.clone(),
            qh,
            capabilities: bound.capabilities(),
            globals: bound,
            pending: PendingEvents::new(),
            registry: WindowRegistry::new(),
            windows: HashMap::new(),
            outputs: Outputs::new(),
            output_proxies: HashMap::new(),
            seat: SeatState::default(),
            clipboard,
            decor: DecorLoader::Unprobed,
            app_id: config.app_id.clone(),
            initialized: false,
        };
        for (name, output) in bind_outputs(&globals, &state.qh) {
            state.add_output(name, output);
        }

        // Output descriptions and seat capabilities
        queue.roundtrip(&mut state).map_err(|e| init_failed(&e))?;
        state.initialized = true;

        info!(
            "Connected to Wayland ({} outputs, {:?})",
            state.output_proxies.len(),
            state.capabilities
        );

        Ok(Self {
            conn,
            queue,
            state,
            _globals: globals,
            connected: true,
        })
    }

    fn lost(&mut self, err: impl std::fmt::Display) -> PlatformError {
        if self.connected {
            warn!("Wayland connection lost: {}", err);
        }
        self.connected = false;
        lost(err)
    }

    /// Run libdecor and turn its frame callbacks into window updates
    fn dispatch_frames(&mut self) -> Result<()> {
        if let DecorLoader::Loaded(lib) = &self.state.decor {
            if let Err(err) = lib.dispatch() {
                return Err(self.lost(err));
            }
        }
        self.state.process_frames();
        Ok(())
    }
}

/// Alternate libdecor and queue dispatch until the queue stays empty
///
/// libdecor reads the shared socket itself, so events for our queue can
/// land in its buffer after our own read has returned.
fn settle<S>(
    source: &mut S,
    mut frames: impl FnMut(&mut S) -> Result<()>,
    mut pending: impl FnMut(&mut S) -> Result<usize>,
) -> Result<()> {
    loop {
        frames(source)?;
        if pending(source)? == 0 {
            return Ok(());
        }
    }
}

impl NativeSource for WaylandContext {
    fn drain(&mut self) -> Result<()> {
        if !self.connected {
            return Err(lost("Wayland connection is closed"));
        }
        if let Err(err) = self.queue.dispatch_pending(&mut self.state) {
            return Err(self.lost(err));
        }
        if let Some(guard) = self.queue.prepare_read() {
            match guard.read() {
                Ok(_) => {}
                Err(WaylandError::Io(err)) if err.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(err) => return Err(self.lost(err)),
            }
        }
        if let Err(err) = self.queue.dispatch_pending(&mut self.state) {
            return Err(self.lost(err));
        }
        settle(self, Self::dispatch_frames, |ctx| {
            ctx.queue
                .dispatch_pending(&mut ctx.state)
                .map_err(|err| ctx.lost(err))
        })
    }

    fn flush(&mut self) -> Result<()> {
        match self.conn.flush() {
            Ok(()) => Ok(()),
            Err(WaylandError::Io(err)) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
            Err(err) => Err(self.lost(err)),
        }
    }

    fn pending(&mut self) -> &mut PendingEvents {
        &mut self.state.pending
    }
}

/// Application on the Wayland backend
pub struct WaylandApp {
    event_loop: EventLoop,
    ctx: Rc<RefCell<WaylandContext>>,
}

impl WaylandApp {
    /// Connect to the compositor named by `WAYLAND_DISPLAY`
    pub fn connect(config: &Config) -> Result<Self> {
        let ctx = WaylandContext::connect(config)?;
        let event_loop = EventLoop::new()?;
        event_loop.watch_fd(ctx.conn.backend().poll_fd())?;
        Ok(Self {
            event_loop,
            ctx: Rc::new(RefCell::new(ctx)),
        })
    }

    /// Optional protocols the compositor offers
    pub fn protocol_capabilities(&self) -> ProtocolCapabilities {
        self.ctx.borrow().state.capabilities()
    }
}

impl PlatformApp for WaylandApp {
    type Window = WaylandWindow;

    fn pump_events(&mut self, mode: ControlFlowMode) -> Result<Option<Event>> {
        let mut ctx = self.ctx.borrow_mut();
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

    fn create_window(&mut self, attributes: &WindowAttributes) -> Result<WaylandWindow> {
        let id = {
            let mut ctx = self.ctx.borrow_mut();
            let id = ctx.state.create_window(attributes)?;
            ctx.flush()?;
            id
        };
        Ok(WaylandWindow::new(self.ctx.clone(), id))
    }

    fn monitors(&mut self) -> Result<Vec<MonitorInfo>> {
        Ok(self.ctx.borrow().state.outputs.monitors())
    }

    fn write_clipboard_text(&mut self, text: &str) -> Result<()> {
        let mut guard = self.ctx.borrow_mut();
        let ctx = &mut *guard;
        let state = &mut ctx.state;
        state.clipboard.write(
            state.globals.data_device_manager.as_ref(),
            state.seat.last_serial(),
            &state.qh,
            text,
        )?;
        ctx.flush()
    }

    fn read_clipboard_text(&mut self) -> Result<Option<String>> {
        let mut ctx = self.ctx.borrow_mut();
        if !ctx.state.clipboard.is_available() {
            return Err(PlatformError::UnsupportedFeature(Feature::Clipboard));
        }
        if let Some(text) = ctx.state.clipboard.owned() {
            return Ok(Some(text.to_string()));
        }
        let Some(pipe) = ctx.state.clipboard.receive()? else {
            return Ok(None);
        };
        ctx.flush()?;
        clipboard::read_pipe(pipe, Deadline::after(CLIPBOARD_TIMEOUT)).map(Some)
    }
}

impl Dispatch<wl_registry::WlRegistry, GlobalListContents> for State {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } if interface == wl_output::WlOutput::interface().name => {
                let output = registry.bind::<wl_output::WlOutput, _, _>(
                    name,
                    version.min(WL_OUTPUT_VERSION),
                    qh,
                    name,
                );
                state.add_output(name, output);
            }
            wl_registry::Event::GlobalRemove { name } => state.remove_output(name),
            _ => {}
        }
    }
}

impl Dispatch<wl_output::WlOutput, u32> for State {
    fn event(
        state: &mut Self,
        output: &wl_output::WlOutput,
        event: wl_output::Event,
        name: &u32,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let name = *name;
        match event {
            wl_output::Event::Geometry { x, y, model, .. } => {
                state.outputs.update(name, |info| {
                    info.position = PhysicalPosition::new(x, y);
                    if info.name.is_empty() {
                        info.name = model;
                    }
                });
            }
            wl_output::Event::Mode {
                flags,
                width,
                height,
                ..
            } => {
                let current = matches!(flags, WEnum::Value(f) if f.contains(wl_output::Mode::Current));
                if current {
                    state.outputs.update(name, |info| {
                        info.size = PhysicalSize::new(width.max(0) as u32, height.max(0) as u32);
                    });
                }
            }
            wl_output::Event::Scale { factor } => {
                state.outputs.update(name, |info| info.scale = factor);
            }
            wl_output::Event::Name { name: output_name } => {
                state.outputs.update(name, |info| info.name = output_name);
            }
            wl_output::Event::Done => state.output_done(name),
            _ => {}
        }
        // Version 1 has no done event; every change stands alone
        if output.version() < 2 {
            state.output_done(name);
        }
    }
}

impl Dispatch<wl_surface::WlSurface, ()> for State {
    fn event(
        state: &mut Self,
        surface: &wl_surface::WlSurface,
        event: wl_surface::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let Some(window) = state.registry.lookup(&surface.id()) else {
            return;
        };
        let (output, entered) = match event {
            wl_surface::Event::Enter { output } => (output, true),
            wl_surface::Event::Leave { output } => (output, false),
            _ => return,
        };
        let Some(&name) = output.data::<u32>() else {
            return;
        };
        if let Some(data) = state.windows.get_mut(&window) {
            if entered {
                data.scale.enter(name);
            } else {
                data.scale.leave(name);
            }
        }
        state.rescale(window);
    }
}

impl Dispatch<xdg_wm_base::XdgWmBase, ()> for State {
    fn event(
        _state: &mut Self,
        wm_base: &xdg_wm_base::XdgWmBase,
        event: xdg_wm_base::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            wm_base.pong(serial);
        }
    }
}

delegate_noop!(State: ignore wl_compositor::WlCompositor);
delegate_noop!(State: ignore wl_shm::WlShm);
delegate_noop!(State: ignore wl_shm_pool::WlShmPool);
delegate_noop!(State: ignore wl_buffer::WlBuffer);
delegate_noop!(State: ignore zxdg_decoration_manager_v1::ZxdgDecorationManagerV1);
delegate_noop!(State: ignore wp_fractional_scale_manager_v1::WpFractionalScaleManagerV1);

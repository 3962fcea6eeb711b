//! X11 windows

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, warn};
use x11rb::connection::Connection;
use x11rb::properties::WmSizeHints;
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ClientMessageEvent, ConfigureWindowAux, ConnectionExt, CreateWindowAux,
    EventMask, InputFocus, PropMode, Window, WindowClass,
};
use x11rb::wrapper::ConnectionExt as _;
use x11rb::CURRENT_TIME;

use crate::error::{Feature, PlatformError, Result};
use crate::event::{Event, RedrawEvent, WindowEvent, WindowId};
use crate::geometry::{LogicalPosition, LogicalSize, PhysicalSize};
use crate::window::{Capabilities, PlatformWindow, WindowAttributes};

use super::atoms::Atoms;
use super::X11Context;

/// `MWM_HINTS_DECORATIONS`
const MOTIF_DECORATIONS_FLAG: u32 = 1 << 1;

/// `_NET_WM_STATE` client message actions
const NET_WM_STATE_REMOVE: u32 = 0;
const NET_WM_STATE_ADD: u32 = 1;

/// Source indication for pager-style requests
const SOURCE_APPLICATION: u32 = 1;

/// Client-side state the server does not hand back cheaply
#[derive(Debug, Clone)]
pub(crate) struct WindowState {
    pub title: String,
    pub mapped: bool,
    pub resizable: bool,
    pub min_size: Option<LogicalSize>,
    pub max_size: Option<LogicalSize>,
}

impl WindowState {
    fn from_attributes(attributes: &WindowAttributes) -> Self {
        Self {
            title: attributes.title.clone(),
            mapped: attributes.visible,
            resizable: attributes.resizable,
            min_size: attributes.min_size,
            max_size: attributes.max_size,
        }
    }
}

/// `_MOTIF_WM_HINTS` value toggling decorations
pub(crate) fn motif_hints(decorated: bool) -> [u32; 5] {
    [MOTIF_DECORATIONS_FLAG, 0, u32::from(decorated), 0, 0]
}

/// `WM_CLASS` value: instance and class, each NUL terminated
pub(crate) fn wm_class(app_id: &str) -> Vec<u8> {
    let mut value = Vec::with_capacity(app_id.len() * 2 + 2);
    for _ in 0..2 {
        value.extend_from_slice(app_id.as_bytes());
        value.push(0);
    }
    value
}

/// Add or remove `atom` from a `_NET_WM_STATE` list
pub(crate) fn update_state_list(current: &[Atom], atom: Atom, enable: bool) -> Vec<Atom> {
    let mut states: Vec<Atom> = current.iter().copied().filter(|a| *a != atom).collect();
    if enable {
        states.push(atom);
    }
    states
}

/// Clamp a size to the range a core protocol `CARD16` dimension accepts
pub(crate) fn protocol_size(size: PhysicalSize) -> PhysicalSize {
    let clamp = |v: u32| v.clamp(1, u32::from(u16::MAX));
    PhysicalSize::new(clamp(size.width), clamp(size.height))
}

/// `protocol_size` as the pair `CreateWindow` takes
fn protocol_extent(size: PhysicalSize) -> (u16, u16) {
    let size = protocol_size(size);
    (
        u16::try_from(size.width).unwrap_or(u16::MAX),
        u16::try_from(size.height).unwrap_or(u16::MAX),
    )
}

/// Normal hints for the current size constraints
///
/// A window that is not resizable pins both bounds to its size.
pub(crate) fn size_hints(
    resizable: bool,
    size: PhysicalSize,
    min: Option<PhysicalSize>,
    max: Option<PhysicalSize>,
) -> WmSizeHints {
    let as_hint = |s: PhysicalSize| (s.width as i32, s.height as i32);
    let mut hints = WmSizeHints::new();
    if resizable {
        hints.min_size = min.map(as_hint);
        hints.max_size = max.map(as_hint);
    } else {
        hints.min_size = Some(as_hint(size));
        hints.max_size = Some(as_hint(size));
    }
    hints
}

fn client_message(window: Window, type_: Atom, data: [u32; 5]) -> ClientMessageEvent {
    ClientMessageEvent::new(32, window, type_, data)
}

fn always_on_top_message(atoms: &Atoms, window: Window, enable: bool) -> ClientMessageEvent {
    let action = if enable {
        NET_WM_STATE_ADD
    } else {
        NET_WM_STATE_REMOVE
    };
    client_message(
        window,
        atoms._NET_WM_STATE,
        [action, atoms._NET_WM_STATE_ABOVE, 0, SOURCE_APPLICATION, 0],
    )
}

impl X11Context {
    /// Create, configure and optionally map a native window
    pub(crate) fn create_window(&mut self, attributes: &WindowAttributes) -> Result<WindowId> {
        let scale = self.translator.scale();
        let size = protocol_size(attributes.size.to_physical(scale));
        let (width, height) = protocol_extent(size);
        let window = self.conn.generate_id()?;
        let event_mask = EventMask::EXPOSURE
            | EventMask::STRUCTURE_NOTIFY
            | EventMask::KEY_PRESS
            | EventMask::KEY_RELEASE
            | EventMask::BUTTON_PRESS
            | EventMask::BUTTON_RELEASE
            | EventMask::POINTER_MOTION
            | EventMask::ENTER_WINDOW
            | EventMask::LEAVE_WINDOW
            | EventMask::FOCUS_CHANGE
            | EventMask::PROPERTY_CHANGE;

        self.conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            window,
            self.screen.root,
            0,
            0,
            width,
            height,
            0,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new()
                .background_pixel(self.screen.black_pixel)
                .event_mask(event_mask),
        )?;

        let atoms = self.atoms;
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms.WM_PROTOCOLS,
            AtomEnum::ATOM,
            &[atoms.WM_DELETE_WINDOW, atoms._NET_WM_PING],
        )?;
        self.conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_CLASS,
            AtomEnum::STRING,
            &wm_class(&self.app_id),
        )?;
        self.write_title(window, &attributes.title)?;
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms._MOTIF_WM_HINTS,
            atoms._MOTIF_WM_HINTS,
            &motif_hints(attributes.decorated),
        )?;

        let state = WindowState::from_attributes(attributes);
        self.write_size_hints(window, &state, size)?;
        if state.mapped {
            self.conn.map_window(window)?;
        }
        self.conn.flush()?;

        let id = self.translator.register(window, size);
        self.windows.insert(id, state);
        self.pending.push(Event::Window(WindowEvent::Created(id)));
        debug!("Created X11 window {:#x} as {:?}", window, id);
        Ok(id)
    }

    /// Destroy a window created by [`create_window`](Self::create_window)
    pub(crate) fn destroy_window(&mut self, id: WindowId) -> Result<()> {
        self.windows.remove(&id);
        if let Some(window) = self.translator.unregister(id) {
            self.conn.destroy_window(window)?;
            self.conn.flush()?;
            debug!("Destroyed X11 window {:#x}", window);
        }
        Ok(())
    }

    fn native(&self, id: WindowId) -> Window {
        match self.translator.native(id) {
            Some(window) => window,
            None => panic!("window {:?} used after close", id),
        }
    }

    fn state_mut(&mut self, id: WindowId) -> &mut WindowState {
        match self.windows.get_mut(&id) {
            Some(state) => state,
            None => panic!("window {:?} used after close", id),
        }
    }

    fn write_title(&self, window: Window, title: &str) -> Result<()> {
        self.conn.change_property8(
            PropMode::REPLACE,
            window,
            self.atoms._NET_WM_NAME,
            self.atoms.UTF8_STRING,
            title.as_bytes(),
        )?;
        self.conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            title.as_bytes(),
        )?;
        Ok(())
    }

    fn write_size_hints(&self, window: Window, state: &WindowState, size: PhysicalSize) -> Result<()> {
        let scale = self.translator.scale();
        size_hints(
            state.resizable,
            size,
            state.min_size.map(|s| s.to_physical(scale)),
            state.max_size.map(|s| s.to_physical(scale)),
        )
        .set_normal_hints(&self.conn, window)?;
        Ok(())
    }

    fn current_size(&self, id: WindowId) -> PhysicalSize {
        self.translator
            .geometry(id)
            .map(|g| g.size)
            .unwrap_or_else(|| PhysicalSize::new(1, 1))
    }

    fn send_to_root(&self, event: ClientMessageEvent) -> Result<()> {
        self.conn.send_event(
            false,
            self.screen.root,
            EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
            event,
        )?;
        Ok(())
    }

    fn update_constraints(
        &mut self,
        id: WindowId,
        update: impl FnOnce(&mut WindowState),
    ) -> Result<()> {
        let window = self.native(id);
        update(self.state_mut(id));
        let state = self.state_mut(id).clone();
        self.write_size_hints(window, &state, self.current_size(id))?;
        self.conn.flush()?;
        Ok(())
    }
}

/// A window on the X11 backend
///
/// Dropping the handle destroys the native window.
pub struct X11Window {
    ctx: Rc<RefCell<X11Context>>,
    id: WindowId,
}

impl X11Window {
    pub(crate) fn new(ctx: Rc<RefCell<X11Context>>, id: WindowId) -> Self {
        Self { ctx, id }
    }

    /// The native window id
    pub fn xid(&self) -> Window {
        self.ctx.borrow().native(self.id)
    }
}

impl PlatformWindow for X11Window {
    fn id(&self) -> WindowId {
        self.id
    }

    fn show(&self) -> Result<()> {
        let mut ctx = self.ctx.borrow_mut();
        let window = ctx.native(self.id);
        ctx.conn.map_window(window)?;
        ctx.conn.flush()?;
        ctx.state_mut(self.id).mapped = true;
        Ok(())
    }

    fn hide(&self) -> Result<()> {
        let mut ctx = self.ctx.borrow_mut();
        let window = ctx.native(self.id);
        ctx.conn.unmap_window(window)?;
        ctx.conn.flush()?;
        ctx.state_mut(self.id).mapped = false;
        Ok(())
    }

    fn close(self) {
        // Drop does the work
    }

    fn title(&self) -> String {
        let mut ctx = self.ctx.borrow_mut();
        ctx.state_mut(self.id).title.clone()
    }

    fn set_title(&self, title: &str) -> Result<()> {
        let mut ctx = self.ctx.borrow_mut();
        let window = ctx.native(self.id);
        ctx.write_title(window, title)?;
        ctx.conn.flush()?;
        ctx.state_mut(self.id).title = title.to_string();
        Ok(())
    }

    fn size(&self) -> LogicalSize {
        let ctx = self.ctx.borrow();
        ctx.current_size(self.id).to_logical(ctx.translator.scale())
    }

    fn set_size(&self, size: LogicalSize) -> Result<()> {
        let mut guard = self.ctx.borrow_mut();
        let ctx = &mut *guard;
        let window = ctx.native(self.id);
        let physical = protocol_size(size.to_physical(ctx.translator.scale()));
        ctx.conn.configure_window(
            window,
            &ConfigureWindowAux::new()
                .width(physical.width)
                .height(physical.height),
        )?;
        let state = ctx.state_mut(self.id).clone();
        if !state.resizable {
            ctx.write_size_hints(window, &state, physical)?;
        }
        ctx.conn.flush()?;
        ctx.translator.set_size(self.id, physical, &mut ctx.pending);
        Ok(())
    }

    fn position(&self) -> Option<LogicalPosition> {
        let ctx = self.ctx.borrow();
        let window = ctx.native(self.id);
        let reply = ctx
            .conn
            .translate_coordinates(window, ctx.screen.root, 0, 0)
            .ok()?
            .reply()
            .ok()?;
        let scale = ctx.translator.scale();
        Some(LogicalPosition::new(
            f64::from(reply.dst_x) / scale,
            f64::from(reply.dst_y) / scale,
        ))
    }

    fn set_position(&self, position: LogicalPosition) -> Result<()> {
        let ctx = self.ctx.borrow();
        let window = ctx.native(self.id);
        let physical = position.to_physical(ctx.translator.scale());
        ctx.conn
            .configure_window(window, &ConfigureWindowAux::new().x(physical.x).y(physical.y))?;
        ctx.conn.flush()?;
        Ok(())
    }

    fn set_min_size(&self, size: Option<LogicalSize>) -> Result<()> {
        self.ctx
            .borrow_mut()
            .update_constraints(self.id, |state| state.min_size = size)
    }

    fn set_max_size(&self, size: Option<LogicalSize>) -> Result<()> {
        self.ctx
            .borrow_mut()
            .update_constraints(self.id, |state| state.max_size = size)
    }

    fn request_focus(&self) -> Result<()> {
        let mut ctx = self.ctx.borrow_mut();
        let window = ctx.native(self.id);
        if ctx.state_mut(self.id).mapped {
            let atoms = ctx.atoms;
            ctx.send_to_root(client_message(
                window,
                atoms._NET_ACTIVE_WINDOW,
                [SOURCE_APPLICATION, CURRENT_TIME, 0, 0, 0],
            ))?;
        } else {
            ctx.conn
                .set_input_focus(InputFocus::PARENT, window, CURRENT_TIME)?;
        }
        ctx.conn.flush()?;
        Ok(())
    }

    fn scale_factor(&self) -> f64 {
        self.ctx.borrow().translator.scale()
    }

    fn request_redraw(&self) {
        self.ctx
            .borrow_mut()
            .pending
            .push(Event::Redraw(RedrawEvent::Requested(self.id)));
    }

    fn set_decorated(&self, decorated: bool) -> Result<()> {
        let ctx = self.ctx.borrow();
        let window = ctx.native(self.id);
        ctx.conn.change_property32(
            PropMode::REPLACE,
            window,
            ctx.atoms._MOTIF_WM_HINTS,
            ctx.atoms._MOTIF_WM_HINTS,
            &motif_hints(decorated),
        )?;
        ctx.conn.flush()?;
        Ok(())
    }

    fn set_always_on_top(&self, always_on_top: bool) -> Result<()> {
        let mut ctx = self.ctx.borrow_mut();
        let window = ctx.native(self.id);
        let atoms = ctx.atoms;
        if ctx.state_mut(self.id).mapped {
            ctx.send_to_root(always_on_top_message(&atoms, window, always_on_top))?;
        } else {
            // The window manager reads the property when the window is mapped
            let reply = ctx
                .conn
                .get_property(false, window, atoms._NET_WM_STATE, AtomEnum::ATOM, 0, 64)?
                .reply()?;
            let current: Vec<Atom> = reply.value32().map(Iterator::collect).unwrap_or_default();
            let states = update_state_list(&current, atoms._NET_WM_STATE_ABOVE, always_on_top);
            ctx.conn.change_property32(
                PropMode::REPLACE,
                window,
                atoms._NET_WM_STATE,
                AtomEnum::ATOM,
                &states,
            )?;
        }
        ctx.conn.flush()?;
        Ok(())
    }

    fn set_transparent(&self, _transparent: bool) -> Result<()> {
        Err(PlatformError::UnsupportedFeature(Feature::Transparency))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all() - Capabilities::TRANSPARENCY
    }
}

impl Drop for X11Window {
    fn drop(&mut self) {
        if let Err(err) = self.ctx.borrow_mut().destroy_window(self.id) {
            warn!("Failed to destroy window {:?}: {}", self.id, err);
        }
    }
}

//! Toplevel windows
//!
//! A window is a `wl_surface` with either an `xdg_toplevel` (optionally
//! decorated by the compositor) or a libdecor frame. Every configure is
//! acknowledged, then answered with a buffer at the new size.

use std::cell::RefCell;
use std::ffi::c_void;
use std::rc::Rc;

use log::{debug, warn};
use wayland_client::protocol::wl_surface;
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle, WEnum};
use wayland_protocols::wp::fractional_scale::v1::client::wp_fractional_scale_v1;
use wayland_protocols::xdg::decoration::zv1::client::zxdg_toplevel_decoration_v1::{
    self, Mode as DecorationMode,
};
use wayland_protocols::xdg::shell::client::{xdg_surface, xdg_toplevel};

use crate::backend::NativeSource;
use crate::error::{Feature, PlatformError, Result};
use crate::event::{Event, RedrawEvent, WindowEvent, WindowId};
use crate::ffi::libdecor::{DecoratedFrame, FrameNotice};
use crate::geometry::{LogicalPosition, LogicalSize};
use crate::window::{Capabilities, PlatformWindow, WindowAttributes};

use super::decoration::{DecorationState, Decorations, Negotiation};
use super::output::ScaleTracker;
use super::shm::{ShmBuffer, BACKGROUND};
use super::{State, WaylandContext};

/// `wl_surface.set_buffer_scale` arrived in version 3
const BUFFER_SCALE_VERSION: u32 = 3;

/// Fully transparent background for transparent windows
const CLEAR: u32 = 0x0000_0000;

/// Logical size as whole content pixels, never zero
fn content_size(size: LogicalSize) -> (u32, u32) {
    (
        size.width.round().max(1.0) as u32,
        size.height.round().max(1.0) as u32,
    )
}

/// Min and max content size to advertise; a fixed window pins both
fn size_bounds(
    resizable: bool,
    size: LogicalSize,
    min: Option<LogicalSize>,
    max: Option<LogicalSize>,
) -> (Option<(u32, u32)>, Option<(u32, u32)>) {
    if resizable {
        (min.map(content_size), max.map(content_size))
    } else {
        let fixed = content_size(size);
        (Some(fixed), Some(fixed))
    }
}

fn requested_mode(decorated: bool) -> DecorationMode {
    if decorated {
        DecorationMode::ServerSide
    } else {
        DecorationMode::ClientSide
    }
}

pub(crate) enum Shell {
    Xdg {
        xdg_surface: xdg_surface::XdgSurface,
        toplevel: xdg_toplevel::XdgToplevel,
        decoration: Option<zxdg_toplevel_decoration_v1::ZxdgToplevelDecorationV1>,
    },
    Libdecor(DecoratedFrame),
}

pub(crate) struct WindowData {
    surface: wl_surface::WlSurface,
    shell: Shell,
    fractional: Option<wp_fractional_scale_v1::WpFractionalScaleV1>,
    decoration: DecorationState,
    decorated: bool,
    transparent: bool,
    title: String,
    size: LogicalSize,
    /// Size from the latest `xdg_toplevel.configure`, applied on ack
    pending_size: Option<LogicalSize>,
    min_size: Option<LogicalSize>,
    max_size: Option<LogicalSize>,
    resizable: bool,
    visible: bool,
    configured: bool,
    pub(crate) scale: ScaleTracker,
    buffer: Option<ShmBuffer>,
}

impl WindowData {
    fn apply_constraints(&self) {
        let (min, max) = size_bounds(self.resizable, self.size, self.min_size, self.max_size);
        match &self.shell {
            Shell::Xdg { toplevel, .. } => {
                let (w, h) = min.unwrap_or((0, 0));
                toplevel.set_min_size(w as i32, h as i32);
                let (w, h) = max.unwrap_or((0, 0));
                toplevel.set_max_size(w as i32, h as i32);
            }
            Shell::Libdecor(frame) => {
                frame.set_min_size(min);
                frame.set_max_size(max);
            }
        }
    }

    fn can_toggle_decorations(&self) -> bool {
        match &self.shell {
            Shell::Xdg { decoration, .. } => decoration.is_some(),
            Shell::Libdecor(_) => true,
        }
    }

    fn background(&self) -> u32 {
        if self.transparent {
            CLEAR
        } else {
            BACKGROUND
        }
    }

    fn destroy(self) {
        if let Some(fractional) = self.fractional {
            fractional.destroy();
        }
        match self.shell {
            Shell::Xdg {
                xdg_surface,
                toplevel,
                decoration,
            } => {
                if let Some(decoration) = decoration {
                    decoration.destroy();
                }
                toplevel.destroy();
                xdg_surface.destroy();
            }
            Shell::Libdecor(frame) => drop(frame),
        }
        drop(self.buffer);
        self.surface.destroy();
    }
}

impl State {
    pub(crate) fn create_window(&mut self, attributes: &WindowAttributes) -> Result<WindowId> {
        let qh = self.qh.clone();
        let surface = self.globals.compositor.create_surface(&qh, ());
        let id = self.registry.register(surface.id());
        let fractional = self
            .globals
            .fractional_scale_manager
            .as_ref()
            .map(|manager| manager.get_fractional_scale(&surface, &qh, id));

        let mut decoration = DecorationState::default();
        let shell = if let Some(manager) = self.globals.decoration_manager.clone() {
            let (xdg_surface, toplevel) = self.xdg_toplevel(&surface, id, attributes);
            let toplevel_decoration = manager.get_toplevel_decoration(&toplevel, &qh, id);
            toplevel_decoration.set_mode(requested_mode(attributes.decorated));
            decoration.begin(Negotiation::ServerSide);
            Shell::Xdg {
                xdg_surface,
                toplevel,
                decoration: Some(toplevel_decoration),
            }
        } else {
            decoration.begin(Negotiation::ClientSideFallback);
            match self.decorate(&surface, attributes) {
                Some(frame) => Shell::Libdecor(frame),
                None => {
                    decoration.settle(Decorations::Undecorated);
                    let (xdg_surface, toplevel) = self.xdg_toplevel(&surface, id, attributes);
                    Shell::Xdg {
                        xdg_surface,
                        toplevel,
                        decoration: None,
                    }
                }
            }
        };

        let data = WindowData {
            surface,
            shell,
            fractional,
            decoration,
            decorated: attributes.decorated,
            transparent: false,
            title: attributes.title.clone(),
            size: attributes.size,
            pending_size: None,
            min_size: attributes.min_size,
            max_size: attributes.max_size,
            resizable: attributes.resizable,
            visible: attributes.visible,
            configured: false,
            scale: ScaleTracker::new(),
            buffer: None,
        };
        data.apply_constraints();
        if data.visible {
            match &data.shell {
                // Initial commit without a buffer asks for the first configure
                Shell::Xdg { .. } => data.surface.commit(),
                Shell::Libdecor(frame) => frame.map(),
            }
        }
        self.windows.insert(id, data);

        debug!("Created window {:?} {:?}", id, attributes.title);
        self.pending.push(Event::Window(WindowEvent::Created(id)));
        Ok(id)
    }

    fn xdg_toplevel(
        &self,
        surface: &wl_surface::WlSurface,
        id: WindowId,
        attributes: &WindowAttributes,
    ) -> (xdg_surface::XdgSurface, xdg_toplevel::XdgToplevel) {
        let xdg_surface = self.globals.wm_base.get_xdg_surface(surface, &self.qh, id);
        let toplevel = xdg_surface.get_toplevel(&self.qh, id);
        toplevel.set_title(attributes.title.clone());
        toplevel.set_app_id(self.app_id.clone());
        (xdg_surface, toplevel)
    }

    fn decorate(
        &mut self,
        surface: &wl_surface::WlSurface,
        attributes: &WindowAttributes,
    ) -> Option<DecoratedFrame> {
        let lib = self.libdecor()?;
        let native = surface.id().as_ptr() as *mut c_void;
        match lib.decorate(
            native,
            &attributes.title,
            &self.app_id,
            content_size(attributes.size),
        ) {
            Ok(frame) => {
                frame.set_visibility(attributes.decorated);
                Some(frame)
            }
            Err(err) => {
                warn!("libdecor could not decorate the window: {}", err);
                None
            }
        }
    }

    pub(crate) fn destroy_window(&mut self, id: WindowId) {
        self.registry.unregister(id);
        self.seat.forget(id);
        if let Some(data) = self.windows.remove(&id) {
            data.destroy();
            debug!("Destroyed window {:?}", id);
        }
    }

    fn window_mut(&mut self, id: WindowId) -> &mut WindowData {
        match self.windows.get_mut(&id) {
            Some(data) => data,
            None => panic!("window {id:?} used after close"),
        }
    }

    fn window(&self, id: WindowId) -> &WindowData {
        match self.windows.get(&id) {
            Some(data) => data,
            None => panic!("window {id:?} used after close"),
        }
    }

    /// Adopt a configured size and present a frame at it
    fn apply_configure(&mut self, id: WindowId, size: Option<LogicalSize>) {
        let Some(data) = self.windows.get_mut(&id) else {
            return;
        };
        if let Some(size) = size {
            if data.resizable && size != data.size {
                data.size = size;
                self.pending
                    .push(Event::Window(WindowEvent::Resized { window: id, size }));
            }
        }
        data.configured = true;
        self.present(id);
        self.pending.push(Event::Redraw(RedrawEvent::Requested(id)));
    }

    /// Attach a buffer matching the current size and scale, then commit
    fn present(&mut self, id: WindowId) {
        let Some(data) = self.windows.get_mut(&id) else {
            return;
        };
        if !data.visible || !data.configured {
            return;
        }
        let buffer_scale = data.scale.buffer_scale();
        let physical = data.size.to_physical(f64::from(buffer_scale));
        if data.buffer.as_ref().map(ShmBuffer::size) != Some(physical) {
            data.buffer = None;
            match ShmBuffer::new(&self.globals.shm, &self.qh, physical, data.background()) {
                Ok(buffer) => data.buffer = Some(buffer),
                Err(err) => {
                    warn!("Window {:?} has no buffer: {}", id, err);
                    return;
                }
            }
        }
        let Some(buffer) = data.buffer.as_ref() else {
            return;
        };
        if data.surface.version() >= BUFFER_SCALE_VERSION {
            data.surface.set_buffer_scale(buffer_scale);
        }
        data.surface.attach(Some(buffer.buffer()), 0, 0);
        data.surface.damage(0, 0, i32::MAX, i32::MAX);
        if let Shell::Xdg { xdg_surface, .. } = &data.shell {
            let (w, h) = content_size(data.size);
            xdg_surface.set_window_geometry(0, 0, w as i32, h as i32);
        }
        data.surface.commit();
    }

    /// Recompute a window's scale, reporting and applying a change
    pub(crate) fn rescale(&mut self, id: WindowId) {
        let Some(data) = self.windows.get_mut(&id) else {
            return;
        };
        let Some(scale) = data.scale.refresh(&self.outputs) else {
            return;
        };
        debug!("Window {:?} scale is now {}", id, scale);
        self.pending
            .push(Event::Window(WindowEvent::ScaleChanged { window: id, scale }));
        self.present(id);
    }

    /// Handle what libdecor frames reported during the last dispatch
    pub(crate) fn process_frames(&mut self) {
        let mut notices = Vec::new();
        for (id, data) in &self.windows {
            if let Shell::Libdecor(frame) = &data.shell {
                notices.extend(frame.take_notices().into_iter().map(|n| (*id, n)));
            }
        }
        for (id, notice) in notices {
            match notice {
                FrameNotice::Configure { size, active } => {
                    debug!("Frame {:?} configured {:?} (active {})", id, size, active);
                    let Some(data) = self.windows.get_mut(&id) else {
                        continue;
                    };
                    data.decoration.settle(Decorations::ClientSide);
                    self.apply_configure(id, Some(LogicalSize::from(size)));
                }
                FrameNotice::Close => {
                    self.pending.push(Event::Window(WindowEvent::Closed(id)));
                }
                FrameNotice::Commit => {
                    if let Some(data) = self.windows.get(&id) {
                        data.surface.commit();
                    }
                }
            }
        }
    }
}

impl Dispatch<xdg_surface::XdgSurface, WindowId> for State {
    fn event(
        state: &mut Self,
        xdg_surface: &xdg_surface::XdgSurface,
        event: xdg_surface::Event,
        id: &WindowId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            xdg_surface.ack_configure(serial);
            let size = state
                .windows
                .get_mut(id)
                .and_then(|data| data.pending_size.take());
            state.apply_configure(*id, size);
        }
    }
}

impl Dispatch<xdg_toplevel::XdgToplevel, WindowId> for State {
    fn event(
        state: &mut Self,
        _toplevel: &xdg_toplevel::XdgToplevel,
        event: xdg_toplevel::Event,
        id: &WindowId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            xdg_toplevel::Event::Configure { width, height, .. } => {
                // Zero leaves the size to the client
                if width > 0 && height > 0 {
                    if let Some(data) = state.windows.get_mut(id) {
                        data.pending_size = Some(LogicalSize::new(f64::from(width), f64::from(height)));
                    }
                }
            }
            xdg_toplevel::Event::Close => {
                state.pending.push(Event::Window(WindowEvent::Closed(*id)));
            }
            _ => {}
        }
    }
}

impl Dispatch<zxdg_toplevel_decoration_v1::ZxdgToplevelDecorationV1, WindowId> for State {
    fn event(
        state: &mut Self,
        _decoration: &zxdg_toplevel_decoration_v1::ZxdgToplevelDecorationV1,
        event: zxdg_toplevel_decoration_v1::Event,
        id: &WindowId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let zxdg_toplevel_decoration_v1::Event::Configure { mode } = event else {
            return;
        };
        let Some(data) = state.windows.get_mut(id) else {
            return;
        };
        let outcome = match mode {
            WEnum::Value(DecorationMode::ServerSide) => Decorations::ServerSide,
            WEnum::Value(DecorationMode::ClientSide) => Decorations::ClientSide,
            other => {
                debug!("Unknown decoration mode {:?}", other);
                return;
            }
        };
        if !data.decoration.settle(outcome) {
            debug!("Window {:?} decorations now {:?}", id, outcome);
        }
    }
}

impl Dispatch<wp_fractional_scale_v1::WpFractionalScaleV1, WindowId> for State {
    fn event(
        state: &mut Self,
        _fractional: &wp_fractional_scale_v1::WpFractionalScaleV1,
        event: wp_fractional_scale_v1::Event,
        id: &WindowId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wp_fractional_scale_v1::Event::PreferredScale { scale } = event {
            if let Some(data) = state.windows.get_mut(id) {
                data.scale.set_fractional(scale);
            }
            state.rescale(*id);
        }
    }
}

/// A window on the Wayland backend
///
/// Dropping the handle destroys the surface and its role objects.
pub struct WaylandWindow {
    ctx: Rc<RefCell<WaylandContext>>,
    id: WindowId,
}

impl WaylandWindow {
    pub(crate) fn new(ctx: Rc<RefCell<WaylandContext>>, id: WindowId) -> Self {
        Self { ctx, id }
    }

    /// How decoration negotiation for this window has gone so far
    pub fn decoration_state(&self) -> DecorationState {
        self.ctx.borrow().state.window(self.id).decoration
    }

    /// Run `f` on this window's state, then flush the connection
    fn update<R>(&self, f: impl FnOnce(&mut State, WindowId) -> Result<R>) -> Result<R> {
        let mut ctx = self.ctx.borrow_mut();
        let result = f(&mut ctx.state, self.id)?;
        ctx.flush()?;
        Ok(result)
    }
}

impl PlatformWindow for WaylandWindow {
    fn id(&self) -> WindowId {
        self.id
    }

    fn show(&self) -> Result<()> {
        self.update(|state, id| {
            let data = state.window_mut(id);
            if data.visible {
                return Ok(());
            }
            data.visible = true;
            match &data.shell {
                Shell::Xdg { .. } => data.surface.commit(),
                Shell::Libdecor(frame) => frame.map(),
            }
            Ok(())
        })
    }

    fn hide(&self) -> Result<()> {
        self.update(|state, id| {
            let data = state.window_mut(id);
            data.visible = false;
            data.configured = false;
            data.surface.attach(None, 0, 0);
            data.surface.commit();
            Ok(())
        })
    }

    fn close(self) {
        // Drop does the work
    }

    fn title(&self) -> String {
        self.ctx.borrow().state.window(self.id).title.clone()
    }

    fn set_title(&self, title: &str) -> Result<()> {
        self.update(|state, id| {
            let data = state.window_mut(id);
            match &data.shell {
                Shell::Xdg { toplevel, .. } => toplevel.set_title(title.to_string()),
                Shell::Libdecor(frame) => frame.set_title(title),
            }
            data.title = title.to_string();
            Ok(())
        })
    }

    fn size(&self) -> LogicalSize {
        self.ctx.borrow().state.window(self.id).size
    }

    fn set_size(&self, size: LogicalSize) -> Result<()> {
        self.update(|state, id| {
            let data = state.window_mut(id);
            if data.size == size {
                return Ok(());
            }
            data.size = size;
            if !data.resizable {
                data.apply_constraints();
            }
            if let Shell::Libdecor(frame) = &data.shell {
                frame.commit_size(content_size(size));
            }
            state
                .pending
                .push(Event::Window(WindowEvent::Resized { window: id, size }));
            state.present(id);
            Ok(())
        })
    }

    fn position(&self) -> Option<LogicalPosition> {
        None
    }

    fn set_position(&self, _position: LogicalPosition) -> Result<()> {
        Err(PlatformError::UnsupportedFeature(Feature::WindowPosition))
    }

    fn set_min_size(&self, size: Option<LogicalSize>) -> Result<()> {
        self.update(|state, id| {
            let data = state.window_mut(id);
            data.min_size = size;
            data.apply_constraints();
            data.surface.commit();
            Ok(())
        })
    }

    fn set_max_size(&self, size: Option<LogicalSize>) -> Result<()> {
        self.update(|state, id| {
            let data = state.window_mut(id);
            data.max_size = size;
            data.apply_constraints();
            data.surface.commit();
            Ok(())
        })
    }

    fn request_focus(&self) -> Result<()> {
        Err(PlatformError::UnsupportedFeature(Feature::FocusRequest))
    }

    fn scale_factor(&self) -> f64 {
        self.ctx.borrow().state.window(self.id).scale.scale()
    }

    fn request_redraw(&self) {
        self.ctx
            .borrow_mut()
            .state
            .pending
            .push(Event::Redraw(RedrawEvent::Requested(self.id)));
    }

    fn set_decorated(&self, decorated: bool) -> Result<()> {
        self.update(|state, id| {
            let data = state.window_mut(id);
            match &data.shell {
                Shell::Xdg {
                    decoration: Some(decoration),
                    ..
                } => decoration.set_mode(requested_mode(decorated)),
                Shell::Libdecor(frame) => frame.set_visibility(decorated),
                Shell::Xdg { decoration: None, .. } => {
                    return Err(PlatformError::UnsupportedFeature(Feature::DecorationToggle));
                }
            }
            data.decorated = decorated;
            Ok(())
        })
    }

    fn set_always_on_top(&self, _always_on_top: bool) -> Result<()> {
        Err(PlatformError::UnsupportedFeature(Feature::AlwaysOnTop))
    }

    fn set_transparent(&self, transparent: bool) -> Result<()> {
        self.update(|state, id| {
            let data = state.window_mut(id);
            if data.transparent != transparent {
                data.transparent = transparent;
                data.buffer = None;
                state.present(id);
            }
            Ok(())
        })
    }

    fn capabilities(&self) -> Capabilities {
        let ctx = self.ctx.borrow();
        let mut capabilities = Capabilities::TRANSPARENCY;
        if ctx.state.window(self.id).can_toggle_decorations() {
            capabilities |= Capabilities::DECORATION_TOGGLE;
        }
        if ctx.state.clipboard.is_available() {
            capabilities |= Capabilities::CLIPBOARD;
        }
        capabilities
    }
}

impl Drop for WaylandWindow {
    fn drop(&mut self) {
        let mut ctx = self.ctx.borrow_mut();
        ctx.state.destroy_window(self.id);
        if let Err(err) = ctx.flush() {
            warn!("Failed to flush after closing {:?}: {}", self.id, err);
        }
    }
}

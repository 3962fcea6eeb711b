//! X11 event translation
//!
//! Turns x11rb events into [`Event`]s. The translator owns the window
//! registry and the cached geometry it diffs configure events against, but
//! never touches the connection; anything that needs a request is handed
//! back as a [`Followup`].

use std::collections::HashMap;

use log::{trace, warn};
use x11rb::protocol::xproto::{
    AtomEnum, ClientMessageEvent, NotifyDetail, NotifyMode, Property, Window,
};
use x11rb::protocol::Event as XEvent;

use crate::backend::{PendingEvents, WindowRegistry};
use crate::event::{
    Event, KeyEvent, KeyboardEvent, Keysym, MonitorEvent, PointerEvent, RedrawEvent, WindowEvent,
    WindowId,
};
use crate::geometry::{PhysicalPosition, PhysicalSize};
use crate::input::keyboard::modifiers_from_x11_mask;
use crate::input::pointer::{x11_button, X11Button};
use crate::input::{KeyboardState, PointerState};

use super::atoms::Atoms;

/// Geometry last reported for a window, in root pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct WindowGeometry {
    pub size: PhysicalSize,
    pub position: Option<PhysicalPosition>,
    /// Still a direct child of the root, so real configure events carry
    /// root coordinates
    pub top_level: bool,
}

/// Work a translated event leaves for the connection owner
#[derive(Debug)]
pub(crate) enum Followup {
    /// `_NET_WM_PING` to reflect back to the root window
    Ping(ClientMessageEvent),
    /// The root `RESOURCE_MANAGER` property changed; reread `Xft.dpi`
    ResourcesChanged,
}

pub(crate) struct Translator {
    atoms: Atoms,
    root: Window,
    windows: WindowRegistry<Window>,
    geometry: HashMap<WindowId, WindowGeometry>,
    keyboard: Option<KeyboardState>,
    pointer: PointerState,
    scale: f64,
}

impl Translator {
    pub fn new(atoms: Atoms, root: Window, keyboard: Option<KeyboardState>, scale: f64) -> Self {
        Self {
            atoms,
            root,
            windows: WindowRegistry::new(),
            geometry: HashMap::new(),
            keyboard,
            pointer: PointerState::new(),
            scale,
        }
    }

    pub fn register(&mut self, native: Window, size: PhysicalSize) -> WindowId {
        let id = self.windows.register(native);
        self.geometry.insert(
            id,
            WindowGeometry {
                size,
                // Windows are created at the root origin
                position: Some(PhysicalPosition::default()),
                top_level: true,
            },
        );
        id
    }

    pub fn unregister(&mut self, id: WindowId) -> Option<Window> {
        self.geometry.remove(&id);
        if self.pointer.focus() == Some(id) {
            self.pointer.set_focus(None, Default::default());
        }
        self.windows.unregister(id)
    }

    pub fn native(&self, id: WindowId) -> Option<Window> {
        self.windows.native(id).copied()
    }

    pub fn lookup(&self, native: Window) -> Option<WindowId> {
        self.windows.lookup(&native)
    }

    pub fn geometry(&self, id: WindowId) -> Option<WindowGeometry> {
        self.geometry.get(&id).copied()
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Record a size this client requested, emitting `Resized` on change
    pub fn set_size(&mut self, id: WindowId, size: PhysicalSize, out: &mut PendingEvents) {
        let scale = self.scale;
        if let Some(geometry) = self.geometry.get_mut(&id) {
            if geometry.size != size {
                geometry.size = size;
                out.push(Event::Window(WindowEvent::Resized {
                    window: id,
                    size: size.to_logical(scale),
                }));
            }
        }
    }

    /// Apply a new global scale, emitting `ScaleChanged` for every window
    pub fn set_scale(&mut self, scale: f64, out: &mut PendingEvents) {
        if (scale - self.scale).abs() < f64::EPSILON {
            return;
        }
        self.scale = scale;
        let mut ids: Vec<WindowId> = self.windows.ids().collect();
        ids.sort_unstable();
        for window in ids {
            out.push(Event::Window(WindowEvent::ScaleChanged { window, scale }));
        }
    }

    pub fn translate(&mut self, event: &XEvent, out: &mut PendingEvents) -> Option<Followup> {
        let scale = self.scale;
        match event {
            XEvent::Expose(e) => {
                // Only the last expose of a series asks for a redraw
                if e.count == 0 {
                    if let Some(window) = self.lookup(e.window) {
                        out.push(Event::Redraw(RedrawEvent::Requested(window)));
                    }
                }
            }
            XEvent::ConfigureNotify(e) => {
                let window = self.lookup(e.window)?;
                let geometry = self.geometry.get_mut(&window)?;

                let size = PhysicalSize::new(u32::from(e.width), u32::from(e.height));
                if geometry.size != size {
                    geometry.size = size;
                    out.push(Event::Window(WindowEvent::Resized {
                        window,
                        size: size.to_logical(scale),
                    }));
                }

                // Under a reparenting window manager only synthetic configure
                // events carry root coordinates.
                let synthetic = e.response_type & 0x80 != 0;
                if synthetic || geometry.top_level {
                    let position = PhysicalPosition::new(i32::from(e.x), i32::from(e.y));
                    if geometry.position != Some(position) {
                        geometry.position = Some(position);
                        out.push(Event::Window(WindowEvent::Moved {
                            window,
                            position: position.to_logical(scale),
                        }));
                    }
                }
            }
            XEvent::ReparentNotify(e) => {
                let window = self.lookup(e.window)?;
                let geometry = self.geometry.get_mut(&window)?;
                geometry.top_level = e.parent == self.root;
                trace!("{:?} reparented to {:#x}", window, e.parent);
            }
            XEvent::ButtonPress(e) => {
                let window = self.lookup(e.event)?;
                let position = PhysicalPosition::new(i32::from(e.event_x), i32::from(e.event_y))
                    .to_logical(scale);
                match x11_button(e.detail) {
                    X11Button::Button(button) => {
                        self.pointer.button_press(button);
                        out.push(Event::Pointer(PointerEvent::ButtonPressed {
                            window,
                            button,
                            position,
                        }));
                    }
                    X11Button::Scroll(delta) => {
                        out.push(Event::Pointer(PointerEvent::Wheel { window, delta }));
                    }
                }
            }
            XEvent::ButtonRelease(e) => {
                let window = self.lookup(e.event)?;
                let position = PhysicalPosition::new(i32::from(e.event_x), i32::from(e.event_y))
                    .to_logical(scale);
                // Wheel buttons release immediately after pressing
                if let X11Button::Button(button) = x11_button(e.detail) {
                    self.pointer.button_release(button);
                    out.push(Event::Pointer(PointerEvent::ButtonReleased {
                        window,
                        button,
                        position,
                    }));
                }
            }
            XEvent::MotionNotify(e) => {
                let window = self.lookup(e.event)?;
                let position = PhysicalPosition::new(i32::from(e.event_x), i32::from(e.event_y))
                    .to_logical(scale);
                self.pointer.motion(position);
                out.push(Event::Pointer(PointerEvent::Moved { window, position }));
            }
            XEvent::EnterNotify(e) => {
                if e.mode != NotifyMode::NORMAL {
                    return None;
                }
                let window = self.lookup(e.event)?;
                let position = PhysicalPosition::new(i32::from(e.event_x), i32::from(e.event_y))
                    .to_logical(scale);
                self.pointer.set_focus(Some(window), position);
                out.push(Event::Pointer(PointerEvent::Entered { window, position }));
            }
            XEvent::LeaveNotify(e) => {
                if e.mode != NotifyMode::NORMAL {
                    return None;
                }
                let window = self.lookup(e.event)?;
                self.pointer.set_focus(None, Default::default());
                out.push(Event::Pointer(PointerEvent::Left { window }));
            }
            XEvent::KeyPress(e) => {
                let window = self.lookup(e.event)?;
                let keycode = u32::from(e.detail);
                let key = self.key_event(window, keycode, u16::from(e.state));
                out.push(Event::Keyboard(KeyboardEvent::KeyDown(key)));
                if let Some(keyboard) = self.keyboard.as_mut() {
                    keyboard.key_press(keycode);
                    if let Some(text) = keyboard.text(keycode) {
                        out.push(Event::Keyboard(KeyboardEvent::TextInput { window, text }));
                    }
                }
            }
            XEvent::KeyRelease(e) => {
                let window = self.lookup(e.event)?;
                let keycode = u32::from(e.detail);
                let key = self.key_event(window, keycode, u16::from(e.state));
                if let Some(keyboard) = self.keyboard.as_mut() {
                    keyboard.key_release(keycode);
                }
                out.push(Event::Keyboard(KeyboardEvent::KeyUp(key)));
            }
            XEvent::FocusIn(e) => {
                if ignore_focus_change(e.mode, e.detail) {
                    return None;
                }
                let window = self.lookup(e.event)?;
                out.push(Event::Window(WindowEvent::Focused(window)));
            }
            XEvent::FocusOut(e) => {
                if ignore_focus_change(e.mode, e.detail) {
                    return None;
                }
                let window = self.lookup(e.event)?;
                if let Some(keyboard) = self.keyboard.as_mut() {
                    keyboard.clear_pressed();
                }
                out.push(Event::Window(WindowEvent::Unfocused(window)));
            }
            XEvent::ClientMessage(e) => return self.client_message(e, out),
            XEvent::PropertyNotify(e) => {
                if e.window == self.root
                    && e.atom == u32::from(AtomEnum::RESOURCE_MANAGER)
                    && e.state == Property::NEW_VALUE
                {
                    return Some(Followup::ResourcesChanged);
                }
            }
            XEvent::RandrScreenChangeNotify(_) => {
                out.push(Event::Monitor(MonitorEvent::ConfigurationChanged));
            }
            XEvent::Error(err) => {
                warn!("X11 error: {:?}", err);
            }
            other => {
                trace!("Ignoring X11 event {:?}", other);
            }
        }
        None
    }

    fn key_event(&mut self, window: WindowId, keycode: u32, state: u16) -> KeyEvent {
        match self.keyboard.as_mut() {
            Some(keyboard) => {
                keyboard.update_from_x11(state);
                keyboard.key_event(window, keycode)
            }
            None => KeyEvent {
                window,
                keycode,
                keysym: Keysym(0),
                modifiers: modifiers_from_x11_mask(state),
            },
        }
    }

    fn client_message(&self, e: &ClientMessageEvent, out: &mut PendingEvents) -> Option<Followup> {
        if e.type_ != self.atoms.WM_PROTOCOLS || e.format != 32 {
            return None;
        }
        let data = e.data.as_data32();
        if data[0] == self.atoms.WM_DELETE_WINDOW {
            let window = self.lookup(e.window)?;
            out.push(Event::Window(WindowEvent::Closed(window)));
            None
        } else if data[0] == self.atoms._NET_WM_PING {
            let mut reply = e.clone();
            reply.window = self.root;
            Some(Followup::Ping(reply))
        } else {
            None
        }
    }
}

/// Focus changes caused by grabs or pointer-root focus are not window focus
fn ignore_focus_change(mode: NotifyMode, detail: NotifyDetail) -> bool {
    mode == NotifyMode::GRAB || mode == NotifyMode::UNGRAB || detail == NotifyDetail::POINTER
}

#[cfg(test)]
mod tests {
    use x11rb::protocol::xproto::{
        ButtonPressEvent, ConfigureNotifyEvent, ExposeEvent, FocusInEvent, KeyButMask, Motion,
        MotionNotifyEvent, PropertyNotifyEvent, ReparentNotifyEvent, BUTTON_PRESS_EVENT,
        BUTTON_RELEASE_EVENT, CONFIGURE_NOTIFY_EVENT, EXPOSE_EVENT, FOCUS_IN_EVENT,
        MOTION_NOTIFY_EVENT, PROPERTY_NOTIFY_EVENT, REPARENT_NOTIFY_EVENT,
    };

    use super::*;
    use crate::event::{MouseButton, ScrollDelta};
    use crate::geometry::{LogicalPosition, LogicalSize};

    const ROOT: Window = 0x100;
    const NATIVE: Window = 0x0040_0001;

    fn atoms() -> Atoms {
        Atoms::resolve(|name| {
            Atoms::NAMES
                .iter()
                .position(|n| *n == name)
                .map(|idx| 300 + idx as u32)
        })
        .unwrap()
    }

    fn translator(scale: f64) -> (Translator, WindowId) {
        let mut translator = Translator::new(atoms(), ROOT, None, scale);
        let id = translator.register(NATIVE, PhysicalSize::new(800, 600));
        (translator, id)
    }

    fn drain(queue: &mut PendingEvents) -> Vec<Event> {
        std::iter::from_fn(|| queue.pop()).collect()
    }

    fn expose(count: u16) -> XEvent {
        XEvent::Expose(ExposeEvent {
            response_type: EXPOSE_EVENT,
            sequence: 0,
            window: NATIVE,
            x: 0,
            y: 0,
            width: 800,
            height: 600,
            count,
        })
    }

    fn configure(width: u16, height: u16, x: i16, y: i16, synthetic: bool) -> XEvent {
        XEvent::ConfigureNotify(ConfigureNotifyEvent {
            response_type: CONFIGURE_NOTIFY_EVENT | if synthetic { 0x80 } else { 0 },
            sequence: 0,
            event: NATIVE,
            window: NATIVE,
            above_sibling: 0,
            x,
            y,
            width,
            height,
            border_width: 0,
            override_redirect: false,
        })
    }

    fn reparent(parent: Window) -> XEvent {
        XEvent::ReparentNotify(ReparentNotifyEvent {
            response_type: REPARENT_NOTIFY_EVENT,
            sequence: 0,
            event: NATIVE,
            window: NATIVE,
            parent,
            x: 0,
            y: 0,
            override_redirect: false,
        })
    }

    fn button(response_type: u8, detail: u8, x: i16, y: i16) -> ButtonPressEvent {
        ButtonPressEvent {
            response_type,
            detail,
            sequence: 0,
            time: 0,
            root: ROOT,
            event: NATIVE,
            child: 0,
            root_x: x,
            root_y: y,
            event_x: x,
            event_y: y,
            state: KeyButMask::from(0u16),
            same_screen: true,
        }
    }

    fn client_message(atoms: &Atoms, protocol: u32) -> ClientMessageEvent {
        ClientMessageEvent::new(32, NATIVE, atoms.WM_PROTOCOLS, [protocol, 1234, 0, 0, 0])
    }

    #[test]
    fn test_expose_coalesces_on_count() {
        let (mut translator, id) = translator(1.0);
        let mut queue = PendingEvents::new();

        translator.translate(&expose(2), &mut queue);
        translator.translate(&expose(1), &mut queue);
        assert!(queue.is_empty());

        translator.translate(&expose(0), &mut queue);
        assert!(matches!(
            drain(&mut queue).as_slice(),
            [Event::Redraw(RedrawEvent::Requested(w))] if *w == id
        ));
    }

    #[test]
    fn test_configure_reports_size_changes_only() {
        let (mut translator, id) = translator(1.0);
        let mut queue = PendingEvents::new();

        translator.translate(&configure(800, 600, 0, 0, false), &mut queue);
        assert!(queue.is_empty());

        translator.translate(&configure(1024, 768, 0, 0, false), &mut queue);
        let events = drain(&mut queue);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            Event::Window(WindowEvent::Resized { window, size })
                if *window == id && *size == LogicalSize::new(1024.0, 768.0)
        ));
    }

    #[test]
    fn test_synthetic_configure_reports_position() {
        let (mut translator, id) = translator(2.0);
        let mut queue = PendingEvents::new();

        translator.translate(&configure(800, 600, 200, 100, true), &mut queue);
        let events = drain(&mut queue);
        assert!(matches!(
            events.as_slice(),
            [Event::Window(WindowEvent::Moved { window, position })]
                if *window == id && *position == LogicalPosition::new(100.0, 50.0)
        ));

        // Same position again is not a move
        translator.translate(&configure(800, 600, 200, 100, true), &mut queue);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_real_configure_moves_unparented_window() {
        let (mut translator, id) = translator(1.0);
        let mut queue = PendingEvents::new();

        translator.translate(&configure(800, 600, 40, 30, false), &mut queue);
        assert!(matches!(
            drain(&mut queue).as_slice(),
            [Event::Window(WindowEvent::Moved { window, position })]
                if *window == id && *position == LogicalPosition::new(40.0, 30.0)
        ));
        assert_eq!(
            translator.geometry(id).unwrap().position,
            Some(PhysicalPosition::new(40, 30))
        );

        // Inside a frame the coordinates are parent-relative
        translator.translate(&reparent(0x0060_0000), &mut queue);
        translator.translate(&configure(800, 600, 4, 22, false), &mut queue);
        assert!(queue.is_empty());

        // Back on the root, real configure events count again
        translator.translate(&reparent(ROOT), &mut queue);
        translator.translate(&configure(800, 600, 90, 60, false), &mut queue);
        assert_eq!(drain(&mut queue).len(), 1);
    }

    #[test]
    fn test_button_mapping_and_wheel() {
        let (mut translator, id) = translator(1.0);
        let mut queue = PendingEvents::new();

        translator.translate(&XEvent::ButtonPress(button(BUTTON_PRESS_EVENT, 1, 10, 20)), &mut queue);
        translator.translate(&XEvent::ButtonRelease(button(BUTTON_RELEASE_EVENT, 1, 10, 20)), &mut queue);
        translator.translate(&XEvent::ButtonPress(button(BUTTON_PRESS_EVENT, 4, 10, 20)), &mut queue);
        translator.translate(&XEvent::ButtonRelease(button(BUTTON_RELEASE_EVENT, 4, 10, 20)), &mut queue);

        let events = drain(&mut queue);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].window_id(), Some(id));
        assert!(matches!(
            &events[0],
            Event::Pointer(PointerEvent::ButtonPressed { button: MouseButton::Left, position, .. })
                if *position == LogicalPosition::new(10.0, 20.0)
        ));
        assert!(matches!(
            &events[1],
            Event::Pointer(PointerEvent::ButtonReleased { button: MouseButton::Left, .. })
        ));
        assert!(matches!(
            &events[2],
            Event::Pointer(PointerEvent::Wheel { delta: ScrollDelta::Lines { x, y }, .. })
                if *x == 0.0 && *y == -1.0
        ));
    }

    #[test]
    fn test_motion_uses_scale() {
        let (mut translator, _) = translator(2.0);
        let mut queue = PendingEvents::new();
        let motion = MotionNotifyEvent {
            response_type: MOTION_NOTIFY_EVENT,
            detail: Motion::NORMAL,
            sequence: 0,
            time: 0,
            root: ROOT,
            event: NATIVE,
            child: 0,
            root_x: 40,
            root_y: 60,
            event_x: 40,
            event_y: 60,
            state: KeyButMask::from(0u16),
            same_screen: true,
        };
        translator.translate(&XEvent::MotionNotify(motion), &mut queue);
        assert!(matches!(
            queue.pop(),
            Some(Event::Pointer(PointerEvent::Moved { position, .. }))
                if position == LogicalPosition::new(20.0, 30.0)
        ));
    }

    #[test]
    fn test_delete_window_closes() {
        let (mut translator, id) = translator(1.0);
        let atoms = atoms();
        let mut queue = PendingEvents::new();

        let followup = translator.translate(
            &XEvent::ClientMessage(client_message(&atoms, atoms.WM_DELETE_WINDOW)),
            &mut queue,
        );
        assert!(followup.is_none());
        assert!(matches!(queue.pop(), Some(Event::Window(WindowEvent::Closed(w))) if w == id));
    }

    #[test]
    fn test_ping_is_reflected_to_root() {
        let (mut translator, _) = translator(1.0);
        let atoms = atoms();
        let mut queue = PendingEvents::new();

        let followup = translator.translate(
            &XEvent::ClientMessage(client_message(&atoms, atoms._NET_WM_PING)),
            &mut queue,
        );
        match followup {
            Some(Followup::Ping(reply)) => {
                assert_eq!(reply.window, ROOT);
                assert_eq!(reply.data.as_data32()[1], 1234);
            }
            other => panic!("unexpected followup {other:?}"),
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_focus_events() {
        let (mut translator, id) = translator(1.0);
        let mut queue = PendingEvents::new();
        let focus = |mode, detail| FocusInEvent {
            response_type: FOCUS_IN_EVENT,
            detail,
            sequence: 0,
            event: NATIVE,
            mode,
        };

        translator.translate(
            &XEvent::FocusIn(focus(NotifyMode::GRAB, NotifyDetail::NONLINEAR)),
            &mut queue,
        );
        assert!(queue.is_empty());

        translator.translate(
            &XEvent::FocusIn(focus(NotifyMode::NORMAL, NotifyDetail::NONLINEAR)),
            &mut queue,
        );
        assert!(matches!(queue.pop(), Some(Event::Window(WindowEvent::Focused(w))) if w == id));
    }

    #[test]
    fn test_resource_manager_change() {
        let (mut translator, _) = translator(1.0);
        let mut queue = PendingEvents::new();
        let notify = PropertyNotifyEvent {
            response_type: PROPERTY_NOTIFY_EVENT,
            sequence: 0,
            window: ROOT,
            atom: AtomEnum::RESOURCE_MANAGER.into(),
            time: 0,
            state: Property::NEW_VALUE,
        };
        let followup = translator.translate(&XEvent::PropertyNotify(notify), &mut queue);
        assert!(matches!(followup, Some(Followup::ResourcesChanged)));
    }

    #[test]
    fn test_set_scale_emits_per_window() {
        let (mut translator, first) = translator(1.0);
        let second = translator.register(NATIVE + 1, PhysicalSize::new(10, 10));
        let mut queue = PendingEvents::new();

        translator.set_scale(1.0, &mut queue);
        assert!(queue.is_empty());

        translator.set_scale(2.0, &mut queue);
        let ids: Vec<_> = drain(&mut queue).iter().filter_map(Event::window_id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn test_unknown_window_is_ignored() {
        let (mut translator, id) = translator(1.0);
        let mut queue = PendingEvents::new();
        translator.unregister(id);

        translator.translate(&expose(0), &mut queue);
        assert!(queue.is_empty());
        assert_eq!(translator.lookup(NATIVE), None);
    }

    #[test]
    fn test_set_size_emits_resized() {
        let (mut translator, id) = translator(1.0);
        let mut queue = PendingEvents::new();

        translator.set_size(id, PhysicalSize::new(1024, 768), &mut queue);
        // The configure notify confirming the request is not a second resize
        translator.translate(&configure(1024, 768, 0, 0, false), &mut queue);

        let events = drain(&mut queue);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            Event::Window(WindowEvent::Resized { window, size })
                if *window == id && *size == LogicalSize::new(1024.0, 768.0)
        ));
    }
}

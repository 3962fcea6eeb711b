//! Seat input: keyboard and pointer

use log::{debug, warn};
use wayland_client::protocol::{wl_keyboard, wl_pointer, wl_seat};
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle, WEnum};

use crate::event::{
    Event, KeyEvent, KeyboardEvent, Keysym, Modifiers, PointerEvent, WindowEvent, WindowId,
};
use crate::geometry::LogicalPosition;
use crate::input::pointer::evdev_button;
use crate::input::{KeyboardState, PointerState};

use super::State;

/// Offset between evdev and XKB keycodes
const XKB_KEYCODE_OFFSET: u32 = 8;

/// `wl_pointer.frame` and `axis_discrete` arrived in version 5
const POINTER_FRAME_VERSION: u32 = 5;

#[derive(Default)]
pub struct SeatState {
    keyboard: Option<wl_keyboard::WlKeyboard>,
    pointer: Option<wl_pointer::WlPointer>,
    xkb: Option<KeyboardState>,
    keyboard_focus: Option<WindowId>,
    pointer_state: PointerState,
    /// Serial of the latest input event, needed for selection requests
    last_serial: Option<u32>,
}

impl SeatState {
    pub fn last_serial(&self) -> Option<u32> {
        self.last_serial
    }

    /// Forget a window that is being destroyed
    pub fn forget(&mut self, window: WindowId) {
        if self.keyboard_focus == Some(window) {
            self.keyboard_focus = None;
        }
        if self.pointer_state.focus() == Some(window) {
            self.pointer_state.set_focus(None, LogicalPosition::default());
        }
    }

    fn key_event(&self, window: WindowId, keycode: u32) -> KeyEvent {
        match self.xkb.as_ref() {
            Some(xkb) => xkb.key_event(window, keycode),
            None => KeyEvent {
                window,
                keycode,
                keysym: Keysym(0),
                modifiers: Modifiers::empty(),
            },
        }
    }
}

impl Dispatch<wl_seat::WlSeat, ()> for State {
    fn event(
        state: &mut Self,
        seat: &wl_seat::WlSeat,
        event: wl_seat::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_seat::Event::Capabilities { capabilities } => {
                let WEnum::Value(capabilities) = capabilities else {
                    return;
                };
                let seat_state = &mut state.seat;

                let has_keyboard = capabilities.contains(wl_seat::Capability::Keyboard);
                match (has_keyboard, seat_state.keyboard.take()) {
                    (true, None) => {
                        debug!("Seat gained a keyboard");
                        seat_state.keyboard = Some(seat.get_keyboard(qh, ()));
                    }
                    (true, Some(keyboard)) => seat_state.keyboard = Some(keyboard),
                    (false, Some(keyboard)) => {
                        debug!("Seat lost its keyboard");
                        if keyboard.version() >= 3 {
                            keyboard.release();
                        }
                        seat_state.keyboard_focus = None;
                    }
                    (false, None) => {}
                }

                let has_pointer = capabilities.contains(wl_seat::Capability::Pointer);
                match (has_pointer, seat_state.pointer.take()) {
                    (true, None) => {
                        debug!("Seat gained a pointer");
                        seat_state.pointer = Some(seat.get_pointer(qh, ()));
                    }
                    (true, Some(pointer)) => seat_state.pointer = Some(pointer),
                    (false, Some(pointer)) => {
                        debug!("Seat lost its pointer");
                        if pointer.version() >= 3 {
                            pointer.release();
                        }
                        seat_state.pointer_state.set_focus(None, LogicalPosition::default());
                    }
                    (false, None) => {}
                }
            }
            wl_seat::Event::Name { name } => debug!("Seat name {}", name),
            _ => {}
        }
    }
}

impl Dispatch<wl_keyboard::WlKeyboard, ()> for State {
    fn event(
        state: &mut Self,
        _keyboard: &wl_keyboard::WlKeyboard,
        event: wl_keyboard::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_keyboard::Event::Keymap { format, fd, size } => {
                if format != WEnum::Value(wl_keyboard::KeymapFormat::XkbV1) {
                    warn!("Ignoring keymap in unknown format {:?}", format);
                    return;
                }
                match KeyboardState::from_fd(fd, size as usize) {
                    Ok(Some(xkb)) => state.seat.xkb = Some(xkb),
                    Ok(None) => warn!("Compositor sent a keymap xkbcommon cannot compile"),
                    Err(err) => warn!("Failed to map keymap: {}", err),
                }
            }
            wl_keyboard::Event::Enter { serial, surface, .. } => {
                state.seat.last_serial = Some(serial);
                let Some(window) = state.registry.lookup(&surface.id()) else {
                    return;
                };
                state.seat.keyboard_focus = Some(window);
                state.pending.push(Event::Window(WindowEvent::Focused(window)));
            }
            wl_keyboard::Event::Leave { serial, .. } => {
                state.seat.last_serial = Some(serial);
                if let Some(xkb) = state.seat.xkb.as_mut() {
                    xkb.clear_pressed();
                }
                if let Some(window) = state.seat.keyboard_focus.take() {
                    state.pending.push(Event::Window(WindowEvent::Unfocused(window)));
                }
            }
            wl_keyboard::Event::Key {
                serial,
                key,
                state: key_state,
                ..
            } => {
                state.seat.last_serial = Some(serial);
                let Some(window) = state.seat.keyboard_focus else {
                    return;
                };
                let keycode = key + XKB_KEYCODE_OFFSET;
                let event = state.seat.key_event(window, keycode);
                match key_state {
                    WEnum::Value(wl_keyboard::KeyState::Pressed) => {
                        state.pending.push(Event::Keyboard(KeyboardEvent::KeyDown(event)));
                        if let Some(xkb) = state.seat.xkb.as_mut() {
                            xkb.key_press(keycode);
                            if let Some(text) = xkb.text(keycode) {
                                state
                                    .pending
                                    .push(Event::Keyboard(KeyboardEvent::TextInput { window, text }));
                            }
                        }
                    }
                    WEnum::Value(wl_keyboard::KeyState::Released) => {
                        if let Some(xkb) = state.seat.xkb.as_mut() {
                            xkb.key_release(keycode);
                        }
                        state.pending.push(Event::Keyboard(KeyboardEvent::KeyUp(event)));
                    }
                    other => debug!("Ignoring key state {:?}", other),
                }
            }
            wl_keyboard::Event::Modifiers {
                serial,
                mods_depressed,
                mods_latched,
                mods_locked,
                group,
            } => {
                state.seat.last_serial = Some(serial);
                if let Some(xkb) = state.seat.xkb.as_mut() {
                    xkb.update_mask(mods_depressed, mods_latched, mods_locked, group);
                }
            }
            wl_keyboard::Event::RepeatInfo { rate, delay } => {
                if let Some(xkb) = state.seat.xkb.as_mut() {
                    xkb.set_repeat_info(rate, delay);
                }
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_pointer::WlPointer, ()> for State {
    fn event(
        state: &mut Self,
        pointer: &wl_pointer::WlPointer,
        event: wl_pointer::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_pointer::Event::Enter {
                serial,
                surface,
                surface_x,
                surface_y,
            } => {
                state.seat.last_serial = Some(serial);
                let Some(window) = state.registry.lookup(&surface.id()) else {
                    return;
                };
                let position = LogicalPosition::new(surface_x, surface_y);
                state.seat.pointer_state.set_focus(Some(window), position);
                state
                    .pending
                    .push(Event::Pointer(PointerEvent::Entered { window, position }));
            }
            wl_pointer::Event::Leave { serial, .. } => {
                state.seat.last_serial = Some(serial);
                if let Some(window) = state.seat.pointer_state.focus() {
                    state
                        .seat
                        .pointer_state
                        .set_focus(None, LogicalPosition::default());
                    state.pending.push(Event::Pointer(PointerEvent::Left { window }));
                }
            }
            wl_pointer::Event::Motion {
                surface_x,
                surface_y,
                ..
            } => {
                let Some(window) = state.seat.pointer_state.focus() else {
                    return;
                };
                let position = LogicalPosition::new(surface_x, surface_y);
                state.seat.pointer_state.motion(position);
                state
                    .pending
                    .push(Event::Pointer(PointerEvent::Moved { window, position }));
            }
            wl_pointer::Event::Button {
                serial,
                button,
                state: button_state,
                ..
            } => {
                state.seat.last_serial = Some(serial);
                let Some(window) = state.seat.pointer_state.focus() else {
                    return;
                };
                let button = evdev_button(button);
                let position = state.seat.pointer_state.position();
                match button_state {
                    WEnum::Value(wl_pointer::ButtonState::Pressed) => {
                        state.seat.pointer_state.button_press(button);
                        state.pending.push(Event::Pointer(PointerEvent::ButtonPressed {
                            window,
                            button,
                            position,
                        }));
                    }
                    WEnum::Value(wl_pointer::ButtonState::Released) => {
                        state.seat.pointer_state.button_release(button);
                        state.pending.push(Event::Pointer(PointerEvent::ButtonReleased {
                            window,
                            button,
                            position,
                        }));
                    }
                    other => debug!("Ignoring button state {:?}", other),
                }
            }
            wl_pointer::Event::Axis { axis, value, .. } => {
                if let WEnum::Value(axis) = axis {
                    let vertical = axis == wl_pointer::Axis::VerticalScroll;
                    state.seat.pointer_state.axis_mut().add_pixels(vertical, value);
                }
                // Before version 5 every axis event stands alone
                if pointer.version() < POINTER_FRAME_VERSION {
                    state.flush_pointer_frame();
                }
            }
            wl_pointer::Event::AxisDiscrete { axis, discrete } => {
                if let WEnum::Value(axis) = axis {
                    let vertical = axis == wl_pointer::Axis::VerticalScroll;
                    state
                        .seat
                        .pointer_state
                        .axis_mut()
                        .add_lines(vertical, f64::from(discrete));
                }
            }
            wl_pointer::Event::Frame => state.flush_pointer_frame(),
            _ => {}
        }
    }
}

impl State {
    fn flush_pointer_frame(&mut self) {
        if let Some(event) = self.seat.pointer_state.frame() {
            self.pending.push(Event::Pointer(event));
        }
    }
}

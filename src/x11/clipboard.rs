//! CLIPBOARD selection
//!
//! Writing claims ownership of `CLIPBOARD` with a hidden window and answers
//! later `SelectionRequest`s from the owned text. Reading converts the
//! selection into a property on that window and waits for the
//! `SelectionNotify`, following `INCR` transfers.

use log::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ConnectionExt, CreateWindowAux, EventMask, PropMode, Property,
    PropertyNotifyEvent, Screen, SelectionClearEvent, SelectionNotifyEvent,
    SelectionRequestEvent, Window, WindowClass, SELECTION_NOTIFY_EVENT,
};
use x11rb::wrapper::ConnectionExt as _;
use x11rb::CURRENT_TIME;

use crate::control_flow::Deadline;
use crate::error::{PlatformError, Result};

use super::atoms::Atoms;

/// An in-flight `ConvertSelection`
#[derive(Debug)]
pub(crate) struct SelectionRequest {
    pub target: Atom,
    pub deadline: Deadline,
    /// Data gathered so far in an `INCR` transfer
    incr: Option<Vec<u8>>,
    outcome: Option<Option<String>>,
}

impl SelectionRequest {
    fn new(target: Atom, deadline: Deadline) -> Self {
        Self {
            target,
            deadline,
            incr: None,
            outcome: None,
        }
    }

    fn finish(&mut self, bytes: Option<Vec<u8>>) {
        self.outcome = Some(bytes.map(|b| String::from_utf8_lossy(&b).into_owned()));
    }
}

/// Clipboard state on the X11 connection
#[derive(Debug)]
pub(crate) struct Clipboard {
    /// Hidden window owning the selection and receiving conversions
    window: Window,
    owned: Option<String>,
    request: Option<SelectionRequest>,
}

impl Clipboard {
    /// Create the hidden owner window
    pub fn new<C: Connection>(conn: &C, screen: &Screen) -> Result<Self> {
        let window = conn.generate_id()?;
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            window,
            screen.root,
            -1,
            -1,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new().event_mask(EventMask::PROPERTY_CHANGE),
        )?;
        Ok(Self {
            window,
            owned: None,
            request: None,
        })
    }

    pub fn window(&self) -> Window {
        self.window
    }

    /// Text this client currently owns
    pub fn owned(&self) -> Option<&str> {
        self.owned.as_deref()
    }

    /// Claim the selection
    pub fn write<C: Connection>(&mut self, conn: &C, atoms: &Atoms, text: &str) -> Result<()> {
        conn.set_selection_owner(self.window, atoms.CLIPBOARD, CURRENT_TIME)
            .map_err(|e| PlatformError::ClipboardWriteFailed(e.to_string()))?;
        let owner = conn
            .get_selection_owner(atoms.CLIPBOARD)
            .map_err(|e| PlatformError::ClipboardWriteFailed(e.to_string()))?
            .reply()
            .map_err(|e| PlatformError::ClipboardWriteFailed(e.to_string()))?
            .owner;
        if owner != self.window {
            self.owned = None;
            return Err(PlatformError::ClipboardAccessDenied);
        }
        self.owned = Some(text.to_string());
        debug!("Took CLIPBOARD ownership ({} bytes)", text.len());
        Ok(())
    }

    /// Ask the current owner to convert the selection
    ///
    /// Returns `Ok(false)` when nobody owns the selection.
    pub fn begin_read<C: Connection>(
        &mut self,
        conn: &C,
        atoms: &Atoms,
        deadline: Deadline,
    ) -> Result<bool> {
        let owner = conn
            .get_selection_owner(atoms.CLIPBOARD)?
            .reply()
            .map_err(|e| PlatformError::ClipboardReadFailed(e.to_string()))?
            .owner;
        if owner == x11rb::NONE {
            return Ok(false);
        }
        conn.delete_property(self.window, atoms.LUMINA_SELECTION)?;
        conn.convert_selection(
            self.window,
            atoms.CLIPBOARD,
            atoms.UTF8_STRING,
            atoms.LUMINA_SELECTION,
            CURRENT_TIME,
        )?;
        conn.flush()?;
        self.request = Some(SelectionRequest::new(atoms.UTF8_STRING, deadline));
        Ok(true)
    }

    pub fn request(&self) -> Option<&SelectionRequest> {
        self.request.as_ref()
    }

    /// Take the result of a finished read
    pub fn take_outcome(&mut self) -> Option<Option<String>> {
        let outcome = self.request.as_mut()?.outcome.take()?;
        self.request = None;
        Some(outcome)
    }

    pub fn cancel_read(&mut self) {
        self.request = None;
    }

    /// Another client took the selection
    pub fn handle_clear(&mut self, event: &SelectionClearEvent) {
        if event.owner == self.window {
            debug!("Lost CLIPBOARD ownership");
            self.owned = None;
        }
    }

    /// The owner answered our conversion
    pub fn handle_notify<C: Connection>(
        &mut self,
        conn: &C,
        atoms: &Atoms,
        event: &SelectionNotifyEvent,
    ) -> Result<()> {
        if event.requestor != self.window || event.selection != atoms.CLIPBOARD {
            return Ok(());
        }
        let Some(request) = self.request.as_mut() else {
            return Ok(());
        };

        if event.property == x11rb::NONE {
            // UTF8_STRING refused; fall back to STRING once
            if request.target == atoms.UTF8_STRING {
                request.target = AtomEnum::STRING.into();
                conn.convert_selection(
                    self.window,
                    atoms.CLIPBOARD,
                    AtomEnum::STRING.into(),
                    atoms.LUMINA_SELECTION,
                    CURRENT_TIME,
                )?;
                conn.flush()?;
            } else {
                request.finish(None);
            }
            return Ok(());
        }

        let reply = conn
            .get_property(
                true,
                self.window,
                event.property,
                AtomEnum::ANY,
                0,
                u32::MAX / 4,
            )?
            .reply()
            .map_err(|e| PlatformError::ClipboardReadFailed(e.to_string()))?;

        if reply.type_ == atoms.INCR {
            debug!("CLIPBOARD read uses INCR");
            // Deleting the property above told the owner to start sending
            request.incr = Some(Vec::new());
        } else if reply.type_ == x11rb::NONE {
            request.finish(None);
        } else {
            request.finish(Some(reply.value));
        }
        conn.flush()?;
        Ok(())
    }

    /// A chunk of an `INCR` transfer arrived on our window
    pub fn handle_property<C: Connection>(
        &mut self,
        conn: &C,
        atoms: &Atoms,
        event: &PropertyNotifyEvent,
    ) -> Result<()> {
        if event.window != self.window
            || event.atom != atoms.LUMINA_SELECTION
            || event.state != Property::NEW_VALUE
        {
            return Ok(());
        }
        let Some(request) = self.request.as_mut() else {
            return Ok(());
        };
        let Some(buffer) = request.incr.as_mut() else {
            return Ok(());
        };

        let reply = conn
            .get_property(
                true,
                self.window,
                atoms.LUMINA_SELECTION,
                AtomEnum::ANY,
                0,
                u32::MAX / 4,
            )?
            .reply()
            .map_err(|e| PlatformError::ClipboardReadFailed(e.to_string()))?;

        if reply.value.is_empty() {
            let data = std::mem::take(buffer);
            request.finish(Some(data));
        } else {
            buffer.extend_from_slice(&reply.value);
        }
        conn.flush()?;
        Ok(())
    }

    /// Answer another client's conversion request from the owned text
    pub fn handle_request<C: Connection>(
        &self,
        conn: &C,
        atoms: &Atoms,
        event: &SelectionRequestEvent,
    ) -> Result<()> {
        // Obsolete requestors leave the property unset
        let property = if event.property == x11rb::NONE {
            event.target
        } else {
            event.property
        };

        let answered = match self.owned.as_deref() {
            Some(text) if event.selection == atoms.CLIPBOARD => {
                self.answer(conn, atoms, event.requestor, property, event.target, text)?
            }
            _ => false,
        };

        let notify = SelectionNotifyEvent {
            response_type: SELECTION_NOTIFY_EVENT,
            sequence: 0,
            time: event.time,
            requestor: event.requestor,
            selection: event.selection,
            target: event.target,
            property: if answered { property } else { x11rb::NONE },
        };
        conn.send_event(false, event.requestor, EventMask::NO_EVENT, notify)?;
        conn.flush()?;
        Ok(())
    }

    fn answer<C: Connection>(
        &self,
        conn: &C,
        atoms: &Atoms,
        requestor: Window,
        property: Atom,
        target: Atom,
        text: &str,
    ) -> Result<bool> {
        match offered_target(atoms, target) {
            Some(Offer::Targets) => {
                conn.change_property32(
                    PropMode::REPLACE,
                    requestor,
                    property,
                    AtomEnum::ATOM,
                    &supported_targets(atoms),
                )?;
                Ok(true)
            }
            Some(Offer::Text(type_)) => {
                conn.change_property8(PropMode::REPLACE, requestor, property, type_, text.as_bytes())?;
                Ok(true)
            }
            None => {
                warn!("Refusing CLIPBOARD conversion to atom {}", target);
                Ok(false)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Offer {
    Targets,
    /// Text stored with this property type
    Text(Atom),
}

fn supported_targets(atoms: &Atoms) -> [Atom; 4] {
    [
        atoms.TARGETS,
        atoms.UTF8_STRING,
        AtomEnum::STRING.into(),
        atoms.TEXT,
    ]
}

fn offered_target(atoms: &Atoms, target: Atom) -> Option<Offer> {
    if target == atoms.TARGETS {
        Some(Offer::Targets)
    } else if target == atoms.UTF8_STRING || target == atoms.TEXT {
        Some(Offer::Text(atoms.UTF8_STRING))
    } else if target == u32::from(AtomEnum::STRING) {
        Some(Offer::Text(AtomEnum::STRING.into()))
    } else {
        None
    }
}

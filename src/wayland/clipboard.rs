//! Clipboard over `wl_data_device`
//!
//! Writing creates a data source offering UTF-8 text and answers `send`
//! requests by writing into the supplied pipe. Reading receives from the
//! current selection offer through a pipe polled with a deadline.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsFd, OwnedFd};
use std::time::Duration;

use calloop::generic::Generic;
use calloop::{EventLoop as CalLoop, Interest, Mode, PostAction};
use log::{debug, warn};
use rustix::pipe::{pipe_with, PipeFlags};
use wayland_client::protocol::{
    wl_data_device, wl_data_device_manager, wl_data_offer, wl_data_source, wl_seat,
};
use wayland_client::{event_created_child, Connection, Dispatch, QueueHandle};

use crate::control_flow::Deadline;
use crate::error::{PlatformError, Result};

use super::State;

/// Text MIME types, most preferred first
pub const TEXT_MIME_TYPES: &[&str] = &["text/plain;charset=utf-8", "UTF8_STRING", "text/plain"];

/// Best text MIME type among those an offer advertises
pub fn preferred_mime<'a>(offered: &'a [String]) -> Option<&'a str> {
    TEXT_MIME_TYPES
        .iter()
        .find_map(|wanted| offered.iter().find(|mime| mime.as_str() == *wanted))
        .map(String::as_str)
}

struct Offer {
    offer: wl_data_offer::WlDataOffer,
    mime_types: Vec<String>,
}

impl Offer {
    fn destroy(self) {
        self.offer.destroy();
    }
}

#[derive(Default)]
pub struct ClipboardState {
    device: Option<wl_data_device::WlDataDevice>,
    /// Offers introduced but not yet named as the selection
    introduced: Vec<Offer>,
    selection: Option<Offer>,
    source: Option<(wl_data_source::WlDataSource, String)>,
}

impl ClipboardState {
    pub fn new(
        manager: Option<&wl_data_device_manager::WlDataDeviceManager>,
        seat: &wl_seat::WlSeat,
        qh: &QueueHandle<State>,
    ) -> Self {
        Self {
            device: manager.map(|manager| manager.get_data_device(seat, qh, ())),
            ..Self::default()
        }
    }

    pub fn is_available(&self) -> bool {
        self.device.is_some()
    }

    /// Text of the selection this client currently owns
    pub fn owned(&self) -> Option<&str> {
        self.source.as_ref().map(|(_, text)| text.as_str())
    }

    pub fn write(
        &mut self,
        manager: Option<&wl_data_device_manager::WlDataDeviceManager>,
        serial: Option<u32>,
        qh: &QueueHandle<State>,
        text: &str,
    ) -> Result<()> {
        let (Some(manager), Some(device)) = (manager, self.device.as_ref()) else {
            return Err(PlatformError::ClipboardWriteFailed(
                "wl_data_device_manager not available".into(),
            ));
        };
        let Some(serial) = serial else {
            return Err(PlatformError::ClipboardWriteFailed(
                "no input event to take the selection with".into(),
            ));
        };

        let source = manager.create_data_source(qh, ());
        for mime in TEXT_MIME_TYPES {
            source.offer(mime.to_string());
        }
        device.set_selection(Some(&source), serial);
        if let Some((previous, _)) = self.source.replace((source, text.to_string())) {
            previous.destroy();
        }
        debug!("Set selection ({} bytes)", text.len());
        Ok(())
    }

    /// Start receiving the selection; `None` when there is no text to read
    pub fn receive(&self) -> Result<Option<File>> {
        let Some(offer) = self.selection.as_ref() else {
            return Ok(None);
        };
        let Some(mime) = preferred_mime(&offer.mime_types) else {
            debug!("Selection offers no text: {:?}", offer.mime_types);
            return Ok(None);
        };
        let (reader, writer) = pipe_with(PipeFlags::CLOEXEC | PipeFlags::NONBLOCK)
            .map_err(|e| PlatformError::ClipboardReadFailed(e.to_string()))?;
        offer.offer.receive(mime.to_string(), writer.as_fd());
        Ok(Some(File::from(reader)))
    }
}

/// Read `pipe` to EOF, giving up at `deadline`
pub fn read_pipe(pipe: File, deadline: Deadline) -> Result<String> {
    let read_failed = |e: &dyn std::fmt::Display| PlatformError::ClipboardReadFailed(e.to_string());

    struct Transfer {
        data: Vec<u8>,
        done: bool,
        error: Option<io::Error>,
    }

    let mut event_loop: CalLoop<'_, Transfer> = CalLoop::try_new().map_err(|e| read_failed(&e))?;
    event_loop
        .handle()
        .insert_source(
            Generic::new(pipe, Interest::READ, Mode::Level),
            |_, pipe, transfer: &mut Transfer| {
                let mut file: &File = pipe.as_ref();
                let mut buf = [0u8; 4096];
                loop {
                    match file.read(&mut buf) {
                        Ok(0) => {
                            transfer.done = true;
                            return Ok(PostAction::Remove);
                        }
                        Ok(n) => transfer.data.extend_from_slice(&buf[..n]),
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            return Ok(PostAction::Continue)
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => {
                            transfer.error = Some(e);
                            transfer.done = true;
                            return Ok(PostAction::Remove);
                        }
                    }
                }
            },
        )
        .map_err(|e| read_failed(&e.error))?;

    let mut transfer = Transfer {
        data: Vec::new(),
        done: false,
        error: None,
    };
    while !transfer.done {
        if deadline.has_expired() {
            return Err(PlatformError::ClipboardReadFailed(
                "timed out waiting for the selection owner".into(),
            ));
        }
        match event_loop.dispatch(Some(deadline.remaining()), &mut transfer) {
            Ok(()) => {}
            Err(calloop::Error::IoError(e)) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(read_failed(&e)),
        }
    }
    if let Some(err) = transfer.error {
        return Err(read_failed(&err));
    }
    Ok(String::from_utf8_lossy(&transfer.data).into_owned())
}

/// Write owned text into a requestor's pipe
fn send_text(fd: OwnedFd, text: &str) {
    let mut file = File::from(fd);
    if let Err(err) = file.write_all(text.as_bytes()) {
        warn!("Failed to send selection: {}", err);
    }
}

impl Dispatch<wl_data_device_manager::WlDataDeviceManager, ()> for State {
    fn event(
        _state: &mut Self,
        _manager: &wl_data_device_manager::WlDataDeviceManager,
        _event: wl_data_device_manager::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // No events
    }
}

impl Dispatch<wl_data_device::WlDataDevice, ()> for State {
    fn event(
        state: &mut Self,
        _device: &wl_data_device::WlDataDevice,
        event: wl_data_device::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let clipboard = &mut state.clipboard;
        match event {
            wl_data_device::Event::DataOffer { id } => {
                clipboard.introduced.push(Offer {
                    offer: id,
                    mime_types: Vec::new(),
                });
            }
            wl_data_device::Event::Selection { id } => {
                let offer = id.and_then(|id| {
                    let idx = clipboard.introduced.iter().position(|o| o.offer == id)?;
                    Some(clipboard.introduced.remove(idx))
                });
                if let Some(previous) = std::mem::replace(&mut clipboard.selection, offer) {
                    previous.destroy();
                }
            }
            wl_data_device::Event::Enter { id, .. } => {
                // Drag and drop is not handled; release the offer
                if let Some(id) = id {
                    if let Some(idx) = clipboard.introduced.iter().position(|o| o.offer == id) {
                        clipboard.introduced.remove(idx).destroy();
                    }
                }
            }
            _ => {}
        }
    }

    event_created_child!(State, wl_data_device::WlDataDevice, [
        wl_data_device::EVT_DATA_OFFER_OPCODE => (wl_data_offer::WlDataOffer, ()),
    ]);
}

impl Dispatch<wl_data_offer::WlDataOffer, ()> for State {
    fn event(
        state: &mut Self,
        offer: &wl_data_offer::WlDataOffer,
        event: wl_data_offer::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_data_offer::Event::Offer { mime_type } = event {
            let clipboard = &mut state.clipboard;
            let target = clipboard
                .introduced
                .iter_mut()
                .chain(clipboard.selection.as_mut())
                .find(|o| o.offer == *offer);
            if let Some(target) = target {
                target.mime_types.push(mime_type);
            }
        }
    }
}

impl Dispatch<wl_data_source::WlDataSource, ()> for State {
    fn event(
        state: &mut Self,
        source: &wl_data_source::WlDataSource,
        event: wl_data_source::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_data_source::Event::Send { mime_type, fd } => {
                match state.clipboard.source.as_ref() {
                    Some((owned, text)) if owned == source => {
                        debug!("Sending selection as {}", mime_type);
                        send_text(fd, text);
                    }
                    _ => warn!("Send request for a stale data source"),
                }
            }
            wl_data_source::Event::Cancelled => {
                if matches!(&state.clipboard.source, Some((owned, _)) if owned == source) {
                    debug!("Selection taken by another client");
                    state.clipboard.source = None;
                }
                source.destroy();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_preferred_mime_order() {
        let offered = vec!["text/html".to_string(), "text/plain".into(), "UTF8_STRING".into()];
        assert_eq!(preferred_mime(&offered), Some("UTF8_STRING"));

        let offered = vec!["image/png".to_string()];
        assert_eq!(preferred_mime(&offered), None);

        let offered = vec!["text/plain;charset=utf-8".to_string(), "text/plain".into()];
        assert_eq!(preferred_mime(&offered), Some("text/plain;charset=utf-8"));
    }

    #[test]
    fn test_read_pipe_until_eof() {
        let (reader, writer) = pipe_with(PipeFlags::CLOEXEC | PipeFlags::NONBLOCK).unwrap();
        let handle = thread::spawn(move || send_text(writer, "hello"));
        let text = read_pipe(File::from(reader), Deadline::after(Duration::from_secs(5))).unwrap();
        handle.join().unwrap();
        assert_eq!(text, "hello");
    }

    #[test]
    fn test_read_pipe_times_out() {
        let (reader, _writer) = pipe_with(PipeFlags::CLOEXEC | PipeFlags::NONBLOCK).unwrap();
        let err = read_pipe(File::from(reader), Deadline::after(Duration::from_millis(20)))
            .unwrap_err();
        assert!(matches!(err, PlatformError::ClipboardReadFailed(_)));
    }
}

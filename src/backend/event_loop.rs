//! Event loop integration
//!
//! Integrates calloop with the display connection. The loop watches the
//! protocol socket and a channel of user payloads; the channel's wakeup
//! descriptor is what unblocks a waiting pump when another thread posts.

use std::any::Any;
use std::io;
use std::os::unix::io::BorrowedFd;
use std::time::Duration;

use calloop::channel::{self, Channel, Sender};
use calloop::generic::Generic;
use calloop::{EventLoop as CalLoop, Interest, LoopSignal, Mode, PostAction};
use log::{debug, trace};

use super::PendingEvents;
use crate::control_flow::ControlFlowMode;
use crate::error::{PlatformError, Result};
use crate::event::{Event, UserPayload};

/// A connection whose events can be drained into the pending queue
pub(crate) trait NativeSource {
    /// Translate every event that can be read without blocking
    fn drain(&mut self) -> Result<()>;

    /// Push buffered requests to the server before the loop blocks
    fn flush(&mut self) -> Result<()>;

    fn pending(&mut self) -> &mut PendingEvents;
}

/// Cross-thread handle for posting [`Event::User`] events
///
/// Sending wakes the loop thread if it is blocked in `Wait` or `WaitUntil`.
#[derive(Clone)]
pub struct UserEventSender {
    sender: Sender<UserPayload>,
}

impl UserEventSender {
    /// Post a payload; fails once the application has been dropped
    pub fn send<T: Any + Send>(&self, value: T) -> Result<()> {
        self.sender
            .send(UserPayload::new(value))
            .map_err(|_| PlatformError::ConnectionLost("event loop closed".into()))
    }
}

/// Lumina event loop wrapper
pub struct EventLoop {
    /// Calloop event loop
    event_loop: CalLoop<'static, PendingEvents>,
    /// Loop signal for waking
    signal: LoopSignal,
    /// Sending half of the user event channel
    sender: Sender<UserPayload>,
    quit_requested: bool,
}

impl EventLoop {
    /// Create a new event loop with the user event channel registered
    pub fn new() -> Result<Self> {
        let event_loop: CalLoop<'static, PendingEvents> = CalLoop::try_new()
            .map_err(|e| PlatformError::PlatformInitializationFailed(e.to_string()))?;
        let signal = event_loop.get_signal();

        let (sender, channel): (Sender<UserPayload>, Channel<UserPayload>) = channel::channel();
        event_loop
            .handle()
            .insert_source(channel, |event, _, pending: &mut PendingEvents| {
                if let channel::Event::Msg(payload) = event {
                    pending.push(Event::User(payload));
                }
            })
            .map_err(|e| PlatformError::PlatformInitializationFailed(e.to_string()))?;

        Ok(Self {
            event_loop,
            signal,
            sender,
            quit_requested: false,
        })
    }

    /// Watch a connection descriptor for readability
    ///
    /// The callback does no work; readiness only ends the blocking poll so
    /// the backend can drain the connection.
    pub fn watch_fd(&self, fd: BorrowedFd<'_>) -> Result<()> {
        let owned = fd
            .try_clone_to_owned()
            .map_err(|e| PlatformError::PlatformInitializationFailed(e.to_string()))?;
        self.event_loop
            .handle()
            .insert_source(
                Generic::new(owned, Interest::READ, Mode::Level),
                |_, _, _| Ok(PostAction::Continue),
            )
            .map_err(|e| PlatformError::PlatformInitializationFailed(e.to_string()))?;
        Ok(())
    }

    /// Get a sender for posting user events from other threads
    pub fn user_event_sender(&self) -> UserEventSender {
        UserEventSender {
            sender: self.sender.clone(),
        }
    }

    /// Run one iteration of the event loop
    pub fn dispatch(&mut self, timeout: Option<Duration>, pending: &mut PendingEvents) -> Result<()> {
        match self.event_loop.dispatch(timeout, pending) {
            Ok(()) => Ok(()),
            Err(calloop::Error::IoError(err)) if err.kind() == io::ErrorKind::Interrupted => {
                trace!("Event loop poll interrupted");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Return the next event according to `mode`
    pub(crate) fn pump<N: NativeSource>(
        &mut self,
        native: &mut N,
        mode: ControlFlowMode,
    ) -> Result<Option<Event>> {
        self.dispatch(Some(Duration::ZERO), native.pending())?;
        native.drain()?;
        if let Some(event) = native.pending().pop() {
            return Ok(Some(event));
        }

        loop {
            let timeout = match mode {
                ControlFlowMode::Poll => return Ok(None),
                ControlFlowMode::Wait => None,
                ControlFlowMode::WaitUntil(deadline) => {
                    if deadline.has_expired() {
                        return Ok(None);
                    }
                    Some(deadline.remaining())
                }
            };

            native.flush()?;
            self.dispatch(timeout, native.pending())?;
            native.drain()?;
            if let Some(event) = native.pending().pop() {
                return Ok(Some(event));
            }
        }
    }

    /// Ask `run`-style helpers to stop; idempotent
    pub fn quit(&mut self) {
        if !self.quit_requested {
            debug!("Quit requested");
        }
        self.quit_requested = true;
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    /// Wake the event loop from the loop thread
    pub fn wake(&self) {
        self.signal.wakeup();
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::os::unix::io::AsFd;
    use std::os::unix::net::UnixStream;
    use std::thread;
    use std::time::Instant;

    use super::*;
    use crate::control_flow::Deadline;
    use crate::event::{RedrawEvent, WindowId};

    /// Turns every byte read from a socket into a redraw event
    struct SocketSource {
        stream: UnixStream,
        window: WindowId,
        pending: PendingEvents,
    }

    impl SocketSource {
        fn new(stream: UnixStream) -> Self {
            stream.set_nonblocking(true).unwrap();
            Self {
                stream,
                window: WindowId::new(),
                pending: PendingEvents::new(),
            }
        }
    }

    impl NativeSource for SocketSource {
        fn drain(&mut self) -> Result<()> {
            let mut buf = [0u8; 64];
            loop {
                match self.stream.read(&mut buf) {
                    Ok(0) => return Ok(()),
                    Ok(n) => {
                        for _ in 0..n {
                            self.pending.push(Event::Redraw(RedrawEvent::Requested(self.window)));
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                    Err(e) => return Err(PlatformError::ConnectionLost(e.to_string())),
                }
            }
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn pending(&mut self) -> &mut PendingEvents {
            &mut self.pending
        }
    }

    fn socket_loop() -> (EventLoop, SocketSource, UnixStream) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let event_loop = EventLoop::new().unwrap();
        event_loop.watch_fd(ours.as_fd()).unwrap();
        (event_loop, SocketSource::new(ours), theirs)
    }

    #[test]
    fn test_event_loop_new() {
        let event_loop = EventLoop::new();
        assert!(event_loop.is_ok());
    }

    #[test]
    fn test_event_loop_dispatch() {
        let mut event_loop = EventLoop::new().unwrap();
        let mut pending = PendingEvents::new();
        // Dispatch with zero timeout should return immediately
        let result = event_loop.dispatch(Some(Duration::ZERO), &mut pending);
        assert!(result.is_ok());
        assert!(pending.is_empty());
    }

    #[test]
    fn test_poll_returns_none_immediately() {
        let (mut event_loop, mut source, _peer) = socket_loop();
        let start = Instant::now();
        let event = event_loop.pump(&mut source, ControlFlowMode::Poll).unwrap();
        assert!(event.is_none());
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_poll_drains_native_events_in_order() {
        let (mut event_loop, mut source, mut peer) = socket_loop();
        peer.write_all(&[1, 2, 3]).unwrap();

        let mut count = 0;
        while let Some(event) = event_loop.pump(&mut source, ControlFlowMode::Poll).unwrap() {
            assert!(matches!(event, Event::Redraw(_)));
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn test_wait_until_expires_without_event() {
        let (mut event_loop, mut source, _peer) = socket_loop();
        let deadline = Deadline::after(Duration::from_millis(50));
        let event = event_loop
            .pump(&mut source, ControlFlowMode::WaitUntil(deadline))
            .unwrap();

        assert!(event.is_none());
        assert!(deadline.has_expired());
        assert!(Instant::now() < deadline.instant() + Duration::from_secs(2));
    }

    #[test]
    fn test_wait_wakes_on_native_readiness() {
        let (mut event_loop, mut source, mut peer) = socket_loop();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            peer.write_all(&[0]).unwrap();
            peer
        });

        let event = event_loop.pump(&mut source, ControlFlowMode::Wait).unwrap();
        assert!(matches!(event, Some(Event::Redraw(_))));
        writer.join().unwrap();
    }

    #[test]
    fn test_user_events_from_threads_arrive_in_order() {
        let (mut event_loop, mut source, _peer) = socket_loop();
        let sender = event_loop.user_event_sender();
        let poster = thread::spawn(move || {
            for i in 0..10u32 {
                thread::sleep(Duration::from_millis(2));
                sender.send(i).unwrap();
            }
        });

        let mut received = Vec::new();
        while received.len() < 10 {
            match event_loop.pump(&mut source, ControlFlowMode::Wait).unwrap() {
                Some(Event::User(payload)) => received.push(payload.downcast::<u32>().ok().unwrap()),
                other => panic!("unexpected event {other:?}"),
            }
        }
        poster.join().unwrap();

        assert_eq!(received, (0..10).collect::<Vec<_>>());
        let extra = event_loop.pump(&mut source, ControlFlowMode::Poll).unwrap();
        assert!(extra.is_none());
    }

    #[test]
    fn test_quit_is_idempotent() {
        let mut event_loop = EventLoop::new().unwrap();
        assert!(!event_loop.quit_requested());
        event_loop.quit();
        event_loop.quit();
        assert!(event_loop.quit_requested());
    }
}

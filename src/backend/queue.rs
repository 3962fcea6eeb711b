//! Pending event queue
//!
//! Strictly FIFO. The only coalescing is for interactive resizes: a resize
//! that directly follows a queued resize of the same window replaces it, so
//! a drag that produces hundreds of configure events yields one event per
//! drain. Nothing else is merged or reordered.
//!
//! The queue is unbounded.

use std::collections::VecDeque;

use crate::event::{Event, WindowEvent};

/// FIFO of translated events waiting for `pump_events`
#[derive(Debug, Default)]
pub struct PendingEvents {
    events: VecDeque<Event>,
}

impl PendingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, coalescing consecutive resizes of one window
    pub fn push(&mut self, event: Event) {
        if let Event::Window(WindowEvent::Resized { window, .. }) = &event {
            if let Some(Event::Window(WindowEvent::Resized { window: last, .. })) =
                self.events.back()
            {
                if last == window {
                    self.events.pop_back();
                }
            }
        }
        self.events.push_back(event);
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over queued events without consuming them
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{PointerEvent, RedrawEvent, WindowId};
    use crate::geometry::{LogicalPosition, LogicalSize};

    fn resized(window: WindowId, w: f64, h: f64) -> Event {
        Event::Window(WindowEvent::Resized {
            window,
            size: LogicalSize::new(w, h),
        })
    }

    #[test]
    fn test_fifo_order() {
        let id = WindowId::new();
        let mut queue = PendingEvents::new();
        queue.push(Event::Window(WindowEvent::Created(id)));
        queue.push(Event::Redraw(RedrawEvent::Requested(id)));
        queue.push(Event::Window(WindowEvent::Focused(id)));

        assert!(matches!(queue.pop(), Some(Event::Window(WindowEvent::Created(_)))));
        assert!(matches!(queue.pop(), Some(Event::Redraw(_))));
        assert!(matches!(queue.pop(), Some(Event::Window(WindowEvent::Focused(_)))));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_consecutive_resizes_coalesce() {
        let id = WindowId::new();
        let mut queue = PendingEvents::new();
        queue.push(resized(id, 100.0, 100.0));
        queue.push(resized(id, 200.0, 150.0));
        queue.push(resized(id, 300.0, 250.0));

        assert_eq!(queue.len(), 1);
        match queue.pop() {
            Some(Event::Window(WindowEvent::Resized { size, .. })) => {
                assert_eq!(size, LogicalSize::new(300.0, 250.0));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_interleaved_resizes_are_kept() {
        let a = WindowId::new();
        let b = WindowId::new();
        let mut queue = PendingEvents::new();
        queue.push(resized(a, 100.0, 100.0));
        queue.push(resized(b, 100.0, 100.0));
        queue.push(resized(a, 120.0, 100.0));
        assert_eq!(queue.len(), 3);

        let mut queue = PendingEvents::new();
        queue.push(resized(a, 100.0, 100.0));
        queue.push(Event::Pointer(PointerEvent::Moved {
            window: a,
            position: LogicalPosition::new(1.0, 1.0),
        }));
        queue.push(resized(a, 120.0, 100.0));
        assert_eq!(queue.len(), 3);
    }
}

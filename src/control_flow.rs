//! Scheduling modes for the event pump

use std::time::{Duration, Instant};

/// An absolute point in time on the monotonic clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    /// A deadline at the given instant
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    /// A deadline `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    pub fn instant(self) -> Instant {
        self.0
    }

    /// Whether the deadline has passed, sampled now
    pub fn has_expired(self) -> bool {
        Instant::now() >= self.0
    }

    /// Time left until the deadline, zero once expired
    pub fn remaining(self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }
}

/// How `pump_events` behaves when no event is queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlowMode {
    /// Block until an event arrives
    Wait,
    /// Never block
    Poll,
    /// Block at most until the deadline
    WaitUntil(Deadline),
}

impl ControlFlowMode {
    /// Convenience for `WaitUntil(Deadline::after(timeout))`
    pub fn wait_for(timeout: Duration) -> Self {
        ControlFlowMode::WaitUntil(Deadline::after(timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_expiry() {
        let past = Deadline::at(Instant::now() - Duration::from_millis(5));
        assert!(past.has_expired());
        assert_eq!(past.remaining(), Duration::ZERO);

        let future = Deadline::after(Duration::from_secs(60));
        assert!(!future.has_expired());
        assert!(future.remaining() > Duration::from_secs(59));
    }

    #[test]
    fn test_deadline_ordering() {
        let early = Deadline::after(Duration::from_millis(1));
        let late = Deadline::at(early.instant() + Duration::from_millis(1));
        assert!(early < late);
    }

    #[test]
    fn test_wait_for() {
        match ControlFlowMode::wait_for(Duration::from_secs(1)) {
            ControlFlowMode::WaitUntil(deadline) => assert!(!deadline.has_expired()),
            other => panic!("unexpected mode {other:?}"),
        }
    }
}

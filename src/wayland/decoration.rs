//! Decoration negotiation
//!
//! A window starts `Undecided`. With `zxdg_decoration_manager_v1` bound it
//! asks for server-side decorations; otherwise it falls back to libdecor.
//! The compositor's configure (or libdecor's first frame configure) settles
//! the outcome, and a settled window never negotiates again.

use log::{debug, warn};

/// Which path a negotiation took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    ServerSide,
    ClientSideFallback,
}

/// Who ended up drawing decorations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decorations {
    /// The compositor draws them
    ServerSide,
    /// libdecor draws them, or the compositor left them to the client
    ClientSide,
    /// Nobody can draw them
    Undecorated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecorationState {
    #[default]
    Undecided,
    Negotiating(Negotiation),
    Settled(Decorations),
}

impl DecorationState {
    /// Start negotiating; only valid while undecided
    pub fn begin(&mut self, path: Negotiation) -> bool {
        match self {
            DecorationState::Undecided => {
                debug!("Decoration negotiation started ({:?})", path);
                *self = DecorationState::Negotiating(path);
                true
            }
            _ => false,
        }
    }

    /// Record the outcome; later outcomes are ignored once settled
    pub fn settle(&mut self, outcome: Decorations) -> bool {
        match self {
            DecorationState::Negotiating(_) => {
                debug!("Decorations settled as {:?}", outcome);
                *self = DecorationState::Settled(outcome);
                true
            }
            DecorationState::Undecided => {
                warn!("Decoration outcome {:?} before negotiation started", outcome);
                false
            }
            DecorationState::Settled(_) => false,
        }
    }

    pub fn negotiation(&self) -> Option<Negotiation> {
        match self {
            DecorationState::Negotiating(path) => Some(*path),
            _ => None,
        }
    }

    pub fn settled(&self) -> Option<Decorations> {
        match self {
            DecorationState::Settled(outcome) => Some(*outcome),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, DecorationState::Settled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_side_negotiation() {
        let mut state = DecorationState::default();
        assert!(state.begin(Negotiation::ServerSide));
        assert_eq!(state.negotiation(), Some(Negotiation::ServerSide));
        assert!(state.settle(Decorations::ServerSide));
        assert_eq!(state.settled(), Some(Decorations::ServerSide));
    }

    #[test]
    fn test_settled_is_terminal() {
        let mut state = DecorationState::default();
        state.begin(Negotiation::ClientSideFallback);
        state.settle(Decorations::ClientSide);

        assert!(!state.begin(Negotiation::ServerSide));
        assert!(!state.settle(Decorations::ServerSide));
        assert_eq!(state, DecorationState::Settled(Decorations::ClientSide));
    }

    #[test]
    fn test_begin_only_once() {
        let mut state = DecorationState::default();
        assert!(state.begin(Negotiation::ServerSide));
        assert!(!state.begin(Negotiation::ClientSideFallback));
        assert_eq!(state.negotiation(), Some(Negotiation::ServerSide));
    }

    #[test]
    fn test_settle_requires_negotiation() {
        let mut state = DecorationState::default();
        assert!(!state.settle(Decorations::ServerSide));
        assert_eq!(state, DecorationState::Undecided);
        assert!(!state.is_settled());
    }
}

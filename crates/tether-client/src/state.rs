//! Connection lifecycle states

use serde::{Deserialize, Serialize};

/// Lifecycle state of the single logical connection.
///
/// ```text
/// idle --connect--> connecting --opened--> open --closed--> closed
///                   connecting --failed--> error
/// closed | error --retry--> connecting
/// any --explicit close--> idle   (open passes through closed first)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection and none being attempted
    Idle,
    /// An attempt is in flight
    Connecting,
    /// Frames may be sent
    Open,
    /// The link was closed by the peer or by `close()`
    Closed,
    /// The attempt or the link failed
    Error,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Closed or failed; a retry may follow
    pub fn is_down(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Error)
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Open | Error | Idle)
                | (Open, Closed | Error)
                | (Closed | Error, Connecting | Idle)
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closed => write!(f, "closed"),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

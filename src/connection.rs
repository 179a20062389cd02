//! Device presence tracking for Bluetooth mode.

use std::fmt;
use tracing::info;

use crate::player::{PlaybackSnapshot, SourceKind};
use crate::source::Unavailable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

impl ConnectionState {
    /// Whether a user reconnect request is honoured in this state.
    pub fn accepts_reconnect(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Failed(_))
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Failed(reason) => write!(f, "Failed ({reason})"),
        }
    }
}

/// Owns the [`ConnectionState`]. Moves at most once per poll, and leaves
/// `Failed` for `Connecting` only on an explicit reconnect.
#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Startup transition. Returns true when the caller should run the connect probe.
    pub fn start(&mut self) -> bool {
        if self.state == ConnectionState::Disconnected {
            self.transition(ConnectionState::Connecting);
            true
        } else {
            false
        }
    }

    /// User-initiated retry. Returns true when the caller should run the connect probe.
    pub fn request_reconnect(&mut self) -> bool {
        if self.state.accepts_reconnect() {
            self.transition(ConnectionState::Connecting);
            true
        } else {
            info!("Ignoring reconnect while {}", self.state);
            false
        }
    }

    /// Applies one poll result.
    pub fn on_poll(&mut self, snapshot: &PlaybackSnapshot, failure: Option<&Unavailable>) {
        let present = snapshot.source == SourceKind::Bluetooth;
        let next = match (&self.state, present) {
            (ConnectionState::Connected, true) => None,
            (_, true) => Some(ConnectionState::Connected),
            (ConnectionState::Connecting, false) => failure
                .filter(|reason| reason.is_hard_failure())
                .map(|reason| ConnectionState::Failed(reason.to_string())),
            (ConnectionState::Connected, false) => Some(ConnectionState::Disconnected),
            (ConnectionState::Disconnected | ConnectionState::Failed(_), false) => None,
        };
        if let Some(next) = next {
            self.transition(next);
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        info!("Connection: {} -> {}", self.state, next);
        self.state = next;
    }
}

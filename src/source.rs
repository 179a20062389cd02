//! The narrow contract every playback backend is consumed through.

use std::fmt;

use crate::player::{PlaybackSnapshot, SourceKind};

/// Why the last poll produced a source-less snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    /// No local player is registered.
    NoPlayer,
    /// The device is known but not connected yet.
    NotConnected,
    /// The device cannot be reached.
    Unreachable(String),
    /// The query ran out of time.
    Timeout,
}

impl Unavailable {
    /// Reasons that end a connection attempt.
    pub fn is_hard_failure(&self) -> bool {
        matches!(self, Unavailable::Unreachable(_) | Unavailable::Timeout)
    }
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unavailable::NoPlayer => write!(f, "no player running"),
            Unavailable::NotConnected => write!(f, "device not connected"),
            Unavailable::Unreachable(reason) => write!(f, "unreachable: {reason}"),
            Unavailable::Timeout => write!(f, "timed out"),
        }
    }
}

/// Control verbs understood by both backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Next,
    Previous,
    VolumeUp,
    VolumeDown,
}

impl PlaybackCommand {
    pub fn name(self) -> &'static str {
        match self {
            PlaybackCommand::Play => "Play",
            PlaybackCommand::Pause => "Pause",
            PlaybackCommand::Next => "Next",
            PlaybackCommand::Previous => "Previous",
            PlaybackCommand::VolumeUp => "VolumeUp",
            PlaybackCommand::VolumeDown => "VolumeDown",
        }
    }
}

/// A backend the main loop polls and sends commands to.
///
/// A poll runs in two halves so the loop never waits on the bus: `query`
/// captures what it needs and returns a detached future, and `absorb` folds
/// the finished reading back in. Absence of data is a [`SourceKind::None`]
/// snapshot with the reason available from `last_failure`. `send` and
/// `connect_probe` are fire-and-forget and must not block the caller.
#[allow(async_fn_in_trait)]
pub trait PlaybackSource {
    /// What a finished query hands back to the loop.
    type Reading: Send + 'static;

    fn kind(&self) -> SourceKind;

    fn query(&self) -> impl Future<Output = Self::Reading> + Send + 'static;

    fn absorb(&mut self, reading: Self::Reading) -> PlaybackSnapshot;

    /// Both halves back to back.
    async fn poll(&mut self) -> PlaybackSnapshot {
        let reading = self.query().await;
        self.absorb(reading)
    }

    fn last_failure(&self) -> Option<&Unavailable>;

    /// `current` is the snapshot the command was issued against.
    fn send(&self, command: PlaybackCommand, current: &PlaybackSnapshot);

    /// Asks the transport to (re)establish the link. Local players have none.
    fn connect_probe(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unreachable_and_timeout_are_hard() {
        assert!(Unavailable::Timeout.is_hard_failure());
        assert!(Unavailable::Unreachable("x".into()).is_hard_failure());
        assert!(!Unavailable::NotConnected.is_hard_failure());
        assert!(!Unavailable::NoPlayer.is_hard_failure());
    }

    #[test]
    fn reasons_render_for_the_banner() {
        assert_eq!(
            Unavailable::Unreachable("page timeout".into()).to_string(),
            "unreachable: page timeout"
        );
        assert_eq!(Unavailable::NoPlayer.to_string(), "no player running");
    }
}

//! Decaying "pressed" feedback for the control buttons.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::source::PlaybackCommand;

/// A pressed button stays lit for 3/5 (60%) of the poll interval.
const WINDOW_NUMERATOR: u32 = 3;
const WINDOW_DENOMINATOR: u32 = 5;

/// The on-screen buttons, in row order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Previous,
    PlayPause,
    Next,
    VolumeDown,
    VolumeUp,
}

impl Control {
    pub const ALL: [Control; 5] = [
        Control::Previous,
        Control::PlayPause,
        Control::Next,
        Control::VolumeDown,
        Control::VolumeUp,
    ];

    /// The command this button sends given the current play state.
    pub fn command(self, playing: bool) -> PlaybackCommand {
        match self {
            Control::Previous => PlaybackCommand::Previous,
            Control::PlayPause if playing => PlaybackCommand::Pause,
            Control::PlayPause => PlaybackCommand::Play,
            Control::Next => PlaybackCommand::Next,
            Control::VolumeDown => PlaybackCommand::VolumeDown,
            Control::VolumeUp => PlaybackCommand::VolumeUp,
        }
    }
}

/// Expiry is computed on read; entries are only ever overwritten.
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightTracker {
    window: Duration,
    activated: HashMap<Control, Instant>,
}

impl HighlightTracker {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            window: poll_interval * WINDOW_NUMERATOR / WINDOW_DENOMINATOR,
            activated: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn activate(&mut self, control: Control, now: Instant) {
        self.activated.insert(control, now);
    }

    pub fn is_highlighted(&self, control: Control, now: Instant) -> bool {
        self.activated
            .get(&control)
            .is_some_and(|at| now.saturating_duration_since(*at) < self.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_sixty_percent_of_poll_interval() {
        let tracker = HighlightTracker::new(Duration::from_secs(1));
        assert_eq!(tracker.window(), Duration::from_millis(600));
    }

    #[test]
    fn highlight_holds_for_exactly_the_window() {
        let mut tracker = HighlightTracker::new(Duration::from_millis(500));
        let window = tracker.window();
        let at = Instant::now();
        for control in Control::ALL {
            assert!(!tracker.is_highlighted(control, at));
            tracker.activate(control, at);
            assert!(tracker.is_highlighted(control, at));
            assert!(tracker.is_highlighted(control, at + window - Duration::from_nanos(1)));
            assert!(!tracker.is_highlighted(control, at + window));
            assert!(!tracker.is_highlighted(control, at + window * 3));
        }
    }

    #[test]
    fn reactivation_restarts_the_window() {
        let mut tracker = HighlightTracker::new(Duration::from_secs(1));
        let start = Instant::now();
        tracker.activate(Control::Next, start);
        let again = start + Duration::from_millis(500);
        tracker.activate(Control::Next, again);
        assert!(tracker.is_highlighted(Control::Next, start + Duration::from_millis(900)));
        assert!(!tracker.is_highlighted(Control::Next, again + Duration::from_millis(600)));
        assert!(!tracker.is_highlighted(Control::Previous, again));
    }

    #[test]
    fn play_pause_depends_on_state() {
        assert_eq!(Control::PlayPause.command(true), PlaybackCommand::Pause);
        assert_eq!(Control::PlayPause.command(false), PlaybackCommand::Play);
        assert_eq!(Control::Next.command(true), PlaybackCommand::Next);
    }
}

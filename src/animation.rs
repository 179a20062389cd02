use std::time::Instant;

use crate::player::PlaybackSnapshot;

/// Marker travel per animation tick, as a fraction of the bar.
pub const SWEEP_STEP: f64 = 0.04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationKind {
    ProgressFill,
    SweepMarker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// What the progress bar shows on this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationState {
    pub kind: AnimationKind,
    /// Fill ratio or marker position, always within [0, 1].
    pub value: f64,
    pub direction: Direction,
}

/// Bouncing marker shown once the track should already have ended.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Sweep {
    position: f64,
    direction: Direction,
}

impl Sweep {
    const START: Sweep = Sweep {
        position: 0.0,
        direction: Direction::Forward,
    };

    fn advance(self, step: f64) -> Self {
        let position = match self.direction {
            Direction::Forward => self.position + step,
            Direction::Backward => self.position - step,
        };
        if position >= 1.0 {
            Sweep {
                position: 1.0,
                direction: Direction::Backward,
            }
        } else if position <= 0.0 {
            Sweep {
                position: 0.0,
                direction: Direction::Forward,
            }
        } else {
            Sweep {
                position,
                direction: self.direction,
            }
        }
    }

    fn state(self) -> AnimationState {
        AnimationState {
            kind: AnimationKind::SweepMarker,
            value: self.position,
            direction: self.direction,
        }
    }
}

/// Progress of `snapshot` at `now`, before any sweep bookkeeping.
enum Progress {
    Unknown,
    Fill(f64),
    Overrun,
}

fn progress(snapshot: &PlaybackSnapshot, now: Instant) -> Progress {
    let (Some(position), Some(duration)) = (snapshot.estimate_position(now), snapshot.duration) else {
        return Progress::Unknown;
    };
    if duration <= 0.0 {
        return Progress::Unknown;
    }
    if duration - position >= 0.0 {
        Progress::Fill((position / duration).clamp(0.0, 1.0))
    } else {
        Progress::Overrun
    }
}

/// Derives the progress bar from the latest snapshot on every animation tick.
#[derive(Debug)]
pub struct AnimationController {
    step: f64,
    sweep: Option<Sweep>,
}

impl Default for AnimationController {
    fn default() -> Self {
        Self::new(SWEEP_STEP)
    }
}

impl AnimationController {
    pub fn new(step: f64) -> Self {
        Self {
            step: step.clamp(f64::EPSILON, 1.0),
            sweep: None,
        }
    }

    /// Advances one tick. `None` means the bar is suppressed.
    pub fn tick(&mut self, snapshot: &PlaybackSnapshot, now: Instant) -> Option<AnimationState> {
        match progress(snapshot, now) {
            Progress::Unknown => {
                self.sweep = None;
                None
            }
            Progress::Fill(value) => {
                self.sweep = None;
                Some(AnimationState {
                    kind: AnimationKind::ProgressFill,
                    value,
                    direction: Direction::Forward,
                })
            }
            Progress::Overrun => {
                let sweep = match self.sweep {
                    Some(sweep) => sweep.advance(self.step),
                    None => Sweep::START,
                };
                self.sweep = Some(sweep);
                Some(sweep.state())
            }
        }
    }

    /// Current state without moving the marker, for redraws between ticks.
    pub fn peek(&self, snapshot: &PlaybackSnapshot, now: Instant) -> Option<AnimationState> {
        match progress(snapshot, now) {
            Progress::Unknown => None,
            Progress::Fill(value) => Some(AnimationState {
                kind: AnimationKind::ProgressFill,
                value,
                direction: Direction::Forward,
            }),
            Progress::Overrun => Some(self.sweep.unwrap_or(Sweep::START).state()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{PlaybackStatus, SourceKind, TrackMetadata};
    use std::time::Duration;

    fn snapshot(position: Option<f64>, duration: Option<f64>, taken_at: Instant) -> PlaybackSnapshot {
        PlaybackSnapshot::from_track(
            SourceKind::Local,
            "mpv",
            TrackMetadata {
                length: duration,
                ..TrackMetadata::default()
            },
            PlaybackStatus::Playing,
            position,
            taken_at,
        )
    }

    #[test]
    fn fill_starts_at_position_over_duration_and_never_decreases() {
        let taken = Instant::now();
        let snap = snapshot(Some(30.0), Some(120.0), taken);
        let mut controller = AnimationController::default();

        let first = controller.tick(&snap, taken).unwrap();
        assert_eq!(first.kind, AnimationKind::ProgressFill);
        assert!((first.value - 0.25).abs() < 1e-9);

        let mut last = first.value;
        for ms in (0..90_000).step_by(700) {
            let state = controller.tick(&snap, taken + Duration::from_millis(ms)).unwrap();
            assert_eq!(state.kind, AnimationKind::ProgressFill);
            assert!(state.value >= last);
            last = state.value;
        }
    }

    #[test]
    fn overrun_switches_to_sweep() {
        let taken = Instant::now();
        let snap = snapshot(Some(58.0), Some(60.0), taken);
        let mut controller = AnimationController::default();

        let state = controller.tick(&snap, taken).unwrap();
        assert_eq!(state.kind, AnimationKind::ProgressFill);
        assert!((state.value - 58.0 / 60.0).abs() < 1e-3);

        let state = controller.tick(&snap, taken + Duration::from_secs(3)).unwrap();
        assert_eq!(state.kind, AnimationKind::SweepMarker);
        assert_eq!(state.value, 0.0);
        assert_eq!(state.direction, Direction::Forward);
    }

    #[test]
    fn sweep_stays_in_bounds_and_flips_only_at_edges() {
        let taken = Instant::now();
        let snap = snapshot(Some(61.0), Some(60.0), taken);
        let mut controller = AnimationController::new(0.07);
        let mut previous = controller.tick(&snap, taken).unwrap();
        let mut flips = 0;
        for _ in 0..500 {
            let state = controller.tick(&snap, taken).unwrap();
            assert!((0.0..=1.0).contains(&state.value));
            if state.direction != previous.direction {
                flips += 1;
                assert!(state.value == 0.0 || state.value == 1.0);
            }
            previous = state;
        }
        assert!(flips > 10);
    }

    #[test]
    fn unknown_position_or_duration_is_suppressed() {
        let now = Instant::now();
        let mut controller = AnimationController::default();
        assert!(controller.tick(&snapshot(None, Some(60.0), now), now).is_none());
        assert!(controller.tick(&snapshot(Some(1.0), None, now), now).is_none());
        assert!(controller.tick(&PlaybackSnapshot::none(now), now).is_none());
    }

    #[test]
    fn leaving_sweep_resets_the_marker() {
        let now = Instant::now();
        let mut controller = AnimationController::default();
        let overrun = snapshot(Some(70.0), Some(60.0), now);
        for _ in 0..5 {
            controller.tick(&overrun, now);
        }
        assert!(controller.peek(&overrun, now).unwrap().value > 0.0);

        controller.tick(&snapshot(Some(1.0), Some(60.0), now), now);
        assert_eq!(controller.tick(&overrun, now).unwrap().value, 0.0);
    }
}

//! The loop's timers, multiplexed into a single deadline.

use std::time::{Duration, Instant};

/// Loop time, read from tokio's clock so paused-time tests can drive the loop.
pub fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Timer {
    period: Duration,
    next_due: Instant,
}

impl Timer {
    fn new(period: Duration, first_due: Instant) -> Self {
        Self {
            period,
            next_due: first_due,
        }
    }

    /// Fires at most once per call; ticks missed while busy are dropped.
    fn take(&mut self, now: Instant) -> bool {
        if now < self.next_due {
            return false;
        }
        self.next_due += self.period;
        if self.next_due <= now {
            self.next_due = now + self.period;
        }
        true
    }
}

/// Which handlers are due on this wake-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Due {
    pub poll: bool,
    pub animation: bool,
    pub visualizer: bool,
}

impl Due {
    pub fn any(self) -> bool {
        self.poll || self.animation || self.visualizer
    }
}

#[derive(Debug, Clone)]
pub struct Schedule {
    poll: Timer,
    animation: Timer,
    visualizer: Option<Timer>,
}

impl Schedule {
    /// The first poll is due at `start`; the other timers one period later.
    pub fn new(start: Instant, poll: Duration, animation: Duration, visualizer: Option<Duration>) -> Self {
        Self {
            poll: Timer::new(poll, start),
            animation: Timer::new(animation, start + animation),
            visualizer: visualizer.map(|period| Timer::new(period, start + period)),
        }
    }

    pub fn next_deadline(&self) -> Instant {
        let earliest = self.poll.next_due.min(self.animation.next_due);
        match &self.visualizer {
            Some(timer) => earliest.min(timer.next_due),
            None => earliest,
        }
    }

    pub fn take_due(&mut self, now: Instant) -> Due {
        Due {
            poll: self.poll.take(now),
            animation: self.animation.take(now),
            visualizer: self.visualizer.as_mut().is_some_and(|timer| timer.take(now)),
        }
    }

    /// Pulls the next poll forward, e.g. to show the effect of a command.
    pub fn poll_soon(&mut self, now: Instant, delay: Duration) {
        self.poll.next_due = self.poll.next_due.min(now + delay);
    }
}

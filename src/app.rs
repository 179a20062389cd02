//! All mutable dashboard state and the loop that drives it.

use crossterm::event::{Event, EventStream};
use futures::{Stream, StreamExt};
use ratatui::Terminal;
use ratatui::backend::Backend;
use ratatui::layout::Rect;
use std::io;
use std::time::{Duration, Instant};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::animation::{AnimationController, AnimationState};
use crate::announce::{AnnounceTrigger, Announcer};
use crate::connection::{ConnectionManager, ConnectionState};
use crate::highlight::{Control, HighlightTracker};
use crate::input::{Action, action_for_key, action_for_mouse};
use crate::player::PlaybackSnapshot;
use crate::render::{Theme, View, control_boxes, render};
use crate::schedule::{Schedule, now};
use crate::source::PlaybackSource;
use crate::visualizer::{VisualizerFeed, VisualizerState};

/// How soon to re-poll after a command, so its effect shows up quickly.
const COMMAND_SETTLE: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub poll_interval: Duration,
    pub anim_period: Duration,
    pub visu_interval: Duration,
    pub theme: Theme,
}

/// Local players come and go; a device has a connection to manage.
enum Mode {
    Local,
    Device {
        manager: ConnectionManager,
        address: String,
    },
}

pub struct App<S: PlaybackSource> {
    source: S,
    /// Finished queries come back here.
    poll_tx: mpsc::UnboundedSender<S::Reading>,
    poll_rx: mpsc::UnboundedReceiver<S::Reading>,
    poll_in_flight: bool,
    mode: Mode,
    settings: Settings,
    schedule: Schedule,
    snapshot: PlaybackSnapshot,
    animator: AnimationController,
    animation: Option<AnimationState>,
    highlights: HighlightTracker,
    visualizer: Option<VisualizerFeed>,
    spectrum: Option<VisualizerState>,
    trigger: AnnounceTrigger,
    announcer: Option<Announcer>,
    /// Button geometry from the last drawn frame.
    boxes: Vec<(Control, Rect)>,
    should_quit: bool,
}

impl<S: PlaybackSource> App<S> {
    /// `device` selects Bluetooth mode and must be a normalized address.
    pub fn new(
        source: S,
        device: Option<String>,
        settings: Settings,
        visualizer: Option<VisualizerFeed>,
        announcer: Option<Announcer>,
    ) -> Self {
        let now = now();
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();
        let mode = match device {
            Some(address) => Mode::Device {
                manager: ConnectionManager::new(),
                address,
            },
            None => Mode::Local,
        };
        let schedule = Schedule::new(
            now,
            settings.poll_interval,
            settings.anim_period,
            visualizer.as_ref().map(|_| settings.visu_interval),
        );
        Self {
            source,
            poll_tx,
            poll_rx,
            poll_in_flight: false,
            mode,
            settings,
            schedule,
            snapshot: PlaybackSnapshot::none(now),
            animator: AnimationController::default(),
            animation: None,
            highlights: HighlightTracker::new(settings.poll_interval),
            visualizer,
            spectrum: None,
            trigger: AnnounceTrigger::default(),
            announcer,
            boxes: Vec::new(),
            should_quit: false,
        }
    }

    /// Kicks off the first connection attempt in Bluetooth mode.
    pub fn start(&mut self) {
        if let Mode::Device { manager, .. } = &mut self.mode {
            if manager.start() {
                self.source.connect_probe();
            }
        }
    }

    pub async fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> anyhow::Result<()> {
        self.drive(terminal, EventStream::new()).await
    }

    /// The loop proper. It only ever waits on a timer, an input event, a
    /// finished poll or SIGTERM.
    async fn drive<B, E>(&mut self, terminal: &mut Terminal<B>, mut events: E) -> anyhow::Result<()>
    where
        B: Backend,
        E: Stream<Item = io::Result<Event>> + Unpin,
    {
        let mut terminate = signal(SignalKind::terminate())?;
        self.start();
        while !self.should_quit {
            let deadline = tokio::time::Instant::from_std(self.schedule.next_deadline());
            let dirty = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => self.on_timers(),
                Some(reading) = self.poll_rx.recv() => {
                    self.on_poll_result(reading);
                    true
                }
                event = events.next() => match event {
                    Some(Ok(event)) => self.on_event(event, now()),
                    Some(Err(err)) => {
                        warn!("Terminal input error: {}", err);
                        false
                    }
                    None => {
                        self.should_quit = true;
                        false
                    }
                },
                _ = terminate.recv() => {
                    info!("Terminated by signal");
                    self.should_quit = true;
                    false
                }
            };
            if dirty && !self.should_quit {
                self.draw(terminal)?;
            }
        }
        Ok(())
    }

    /// Runs whichever tick handlers are due. Returns true when a redraw is needed.
    fn on_timers(&mut self) -> bool {
        let due = self.schedule.take_due(now());
        if due.poll {
            self.on_poll_tick();
        }
        if due.animation {
            self.on_animation_tick(now());
        }
        if due.visualizer {
            self.on_visualizer_tick();
        }
        due.animation || due.visualizer
    }

    /// Starts a query off the loop. A tick that finds the previous one still
    /// running is skipped.
    pub fn on_poll_tick(&mut self) {
        if self.poll_in_flight {
            debug!("Previous poll still running, skipping tick");
            return;
        }
        self.poll_in_flight = true;
        let query = self.source.query();
        let tx = self.poll_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(query.await);
        });
    }

    pub fn on_poll_result(&mut self, reading: S::Reading) {
        self.poll_in_flight = false;
        let snapshot = self.source.absorb(reading);
        if let Mode::Device { manager, .. } = &mut self.mode {
            manager.on_poll(&snapshot, self.source.last_failure());
        }
        if let Some(announcer) = &self.announcer {
            if let Some(text) = self.trigger.observe(&snapshot) {
                announcer.announce(text);
            }
        }
        self.snapshot = snapshot;
        self.animation = self.animator.peek(&self.snapshot, now());
    }

    pub fn on_animation_tick(&mut self, now: Instant) {
        self.animation = self.animator.tick(&self.snapshot, now);
    }

    pub fn on_visualizer_tick(&mut self) {
        if let Some(feed) = &mut self.visualizer {
            self.spectrum = Some(feed.poll());
        }
    }

    /// Returns true when the event changed something on screen.
    pub fn on_event(&mut self, event: Event, now: Instant) -> bool {
        let action = match event {
            Event::Key(key) => action_for_key(key),
            Event::Mouse(mouse) => match action_for_mouse(mouse, &self.boxes) {
                Some(Action::Control(control)) if self.highlights.is_highlighted(control, now) => {
                    debug!("Ignoring click on {:?} while it is still lit", control);
                    None
                }
                other => other,
            },
            Event::Resize(..) => return true,
            _ => None,
        };
        match action {
            Some(action) => {
                self.on_action(action, now);
                true
            }
            None => false,
        }
    }

    pub fn on_action(&mut self, action: Action, now: Instant) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::Reconnect => match &mut self.mode {
                Mode::Device { manager, .. } => {
                    if manager.request_reconnect() {
                        self.source.connect_probe();
                        self.schedule.poll_soon(now, COMMAND_SETTLE);
                    }
                }
                Mode::Local => debug!("Reconnect has no meaning for local players"),
            },
            Action::Control(control) => {
                if !self.snapshot.has_source() {
                    debug!("Ignoring {:?} with nothing to control", control);
                    return;
                }
                let command = control.command(self.snapshot.is_playing());
                self.source.send(command, &self.snapshot);
                self.highlights.activate(control, now);
                self.schedule.poll_soon(now, COMMAND_SETTLE);
            }
        }
    }

    fn connection(&self) -> Option<&ConnectionState> {
        match &self.mode {
            Mode::Device { manager, .. } => Some(manager.state()),
            Mode::Local => None,
        }
    }

    fn view(&self, now: Instant) -> View<'_> {
        let device = match &self.mode {
            Mode::Device { address, .. } => Some(address.as_str()),
            Mode::Local => None,
        };
        View {
            snapshot: &self.snapshot,
            connection: self.connection(),
            device,
            animation: self.animation,
            highlights: &self.highlights,
            visualizer: self.spectrum.as_ref(),
            theme: self.settings.theme,
            poll_interval: self.settings.poll_interval,
            now,
        }
    }

    pub fn draw<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        let now = now();
        let completed = terminal.draw(|frame| render(frame, &self.view(now)))?;
        let area = completed.area;
        self.boxes = if self.snapshot.has_source() {
            control_boxes(area)
        } else {
            Vec::new()
        };
        Ok(())
    }
}

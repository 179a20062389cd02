mod animation;
mod announce;
mod app;
mod bluez;
mod config;
mod connection;
mod error;
mod highlight;
mod input;
mod mpris;
mod player;
mod render;
mod schedule;
mod source;
mod visualizer;

use std::fs::File;
use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use crossterm::cursor::Show;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use announce::Announcer;
use app::{App, Settings};
use bluez::BluezSource;
use config::Config;
use mpris::MprisSource;
use source::PlaybackSource;
use visualizer::{CAVA_FRAMERATE, VisualizerFeed};

/// The dashboard owns the terminal, so logs only go to a file.
fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_path = config.log_path();
    match File::create(&log_path) {
        Ok(file) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false);
            tracing_subscriber::registry().with(env_filter).with(file_layer).init();
        }
        Err(e) => eprintln!("Failed to create log file at {}: {e}", log_path.display()),
    }
}

/// Raw mode, alternate screen and mouse capture, undone on drop.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let guard = TerminalGuard;
        execute!(io::stdout(), EnterAlternateScreen, EnableMouseCapture)?;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture, Show);
    }
}

async fn run<S: PlaybackSource>(mut source: S, config: &Config) -> Result<()> {
    info!("Starting with {:?} source", source.kind());
    if config.once {
        let snapshot = source.poll().await;
        println!("{}", serde_json::to_string(&snapshot)?);
        return Ok(());
    }

    let guard = TerminalGuard::enter().context("cannot set up the terminal")?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout())).context("cannot set up the terminal")?;
    let width = usize::from(terminal.size()?.width).max(1);

    let visualizer = config
        .visualizer
        .then(|| VisualizerFeed::spawn(config.visu_bars.clamp(1, width), CAVA_FRAMERATE, config.visu_autogain));
    let announcer = config.announce.then(Announcer::spawn);
    let settings = Settings {
        poll_interval: config.poll_interval,
        anim_period: config.anim_period,
        visu_interval: config.visu_interval,
        theme: config.theme,
    };
    let mut app = App::new(source, config.device.clone(), settings, visualizer, announcer);
    let result = app.run(&mut terminal).await;
    drop(guard);
    info!("Exiting");
    result
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = Config::parse()?;
    init_tracing(&config);
    match &config.device {
        Some(address) => run(BluezSource::new(address.clone()), &config).await,
        None => run(MprisSource::new(config.blocked.clone()), &config).await,
    }
}

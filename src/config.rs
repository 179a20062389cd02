use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, ensure};
use clap::Parser;
use ratatui::style::Color;

use crate::bluez::device::normalize_address;
use crate::render::Theme;

/// Shortest allowed poll interval in seconds.
pub const MIN_REFRESH: f64 = 0.1;

/// Configuration parsed from command-line arguments.
#[derive(Debug, Parser, Clone)]
#[command(author, version, about, long_about = None, disable_version_flag = true)]
pub struct Config {
    /// Bluetooth MAC address of the device; omit to follow local MPRIS players
    #[arg(short = 'D', long = "device")]
    pub device: Option<String>,
    /// Text color: "default", a name, 0-255 or #rrggbb
    #[arg(short = 'c', long = "color", default_value = "default")]
    pub color: String,
    /// Background color: "default", a name, 0-255 or #rrggbb
    #[arg(short = 'b', long = "bgcolor", default_value = "default")]
    pub bgcolor: String,
    /// Poll interval in seconds
    #[arg(short = 'a', long = "autorefresh", default_value_t = 1.0)]
    pub autorefresh: f64,
    /// Announce new tracks with espeak
    #[arg(short = 'A', long = "announce", default_value_t = false, action = clap::ArgAction::SetTrue)]
    pub announce: bool,
    /// Show a cava spectrum below the controls
    #[arg(short = 'V', long = "visualizer", default_value_t = false, action = clap::ArgAction::SetTrue)]
    pub visualizer: bool,
    /// Visualizer refresh interval in seconds
    #[arg(short = 'v', long = "visu-refresh", default_value_t = 0.1)]
    pub visu_refresh: f64,
    /// Normalize visualizer bars against a running peak
    #[arg(short = 'g', long = "visu-autogain", default_value_t = false, action = clap::ArgAction::SetTrue)]
    pub visu_autogain: bool,
    /// Number of visualizer bars (clamped to the terminal width)
    #[arg(short = 'B', long = "visu-bars", default_value_t = 30)]
    pub visu_bars: usize,
    /// Progress animation interval in seconds
    #[arg(long = "anim-interval", default_value_t = 0.07)]
    pub anim_interval: f64,
    /// Block certain players (comma-separated list)
    #[arg(long = "blocked", value_delimiter = ',', default_value = "")]
    pub blocked: Vec<String>,
    /// Log file (default: songui.log in the temp directory)
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
    /// Poll once, print the snapshot as JSON and exit
    #[arg(long = "once", default_value_t = false, action = clap::ArgAction::SetTrue)]
    pub once: bool,
    #[arg(skip)]
    pub poll_interval: Duration,
    #[arg(skip)]
    pub visu_interval: Duration,
    #[arg(skip)]
    pub anim_period: Duration,
    #[arg(skip)]
    pub theme: Theme,
}

impl Config {
    /// Parse arguments and compute derived fields.
    pub fn parse() -> anyhow::Result<Self> {
        <Self as Parser>::parse().resolve()
    }

    fn resolve(mut self) -> anyhow::Result<Self> {
        self.poll_interval = interval("autorefresh", self.autorefresh)?.max(Duration::from_secs_f64(MIN_REFRESH));
        self.visu_interval = interval("visu-refresh", self.visu_refresh)?;
        self.anim_period = interval("anim-interval", self.anim_interval)?;
        self.theme = Theme {
            fg: parse_color(&self.color).context("invalid --color")?,
            bg: parse_color(&self.bgcolor).context("invalid --bgcolor")?,
        };
        self.visu_bars = self.visu_bars.max(1);
        // Normalize blocked list
        self.blocked = self
            .blocked
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        self.device = match self.device.take() {
            Some(address) => Some(normalize_address(&address)?),
            None => None,
        };
        Ok(self)
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("songui.log"))
    }
}

fn interval(name: &str, seconds: f64) -> anyhow::Result<Duration> {
    ensure!(
        seconds.is_finite() && seconds > 0.0,
        "--{name} must be a positive number of seconds, got {seconds}"
    );
    Ok(Duration::from_secs_f64(seconds))
}

/// "default" keeps the terminal's own color.
fn parse_color(value: &str) -> anyhow::Result<Color> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("default") {
        return Ok(Color::Reset);
    }
    Color::from_str(value).map_err(|_| anyhow::anyhow!("unknown color {value:?}"))
}

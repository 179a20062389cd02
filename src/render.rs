//! Drawing the dashboard. Everything here is a pure function of [`View`].

use figlet_rs::FIGfont;
use once_cell::sync::Lazy;
use ratatui::Frame;
use ratatui::buffer::Buffer;
use ratatui::layout::{Alignment, Constraint, Flex, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Paragraph, Widget};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::animation::{AnimationKind, AnimationState};
use crate::connection::ConnectionState;
use crate::highlight::{Control, HighlightTracker};
use crate::player::PlaybackSnapshot;
use crate::visualizer::VisualizerState;

const BUTTON_HEIGHT: u16 = 5;
const BUTTON_WIDTH: u16 = 13;
const BUTTON_GAP: u16 = 6;
const BUTTON_ROW: usize = 9;
const PROGRESS_ROW: usize = 7;
const SWEEP_MARKER: &str = "<===>";
/// Columns the progress line spends on times and brackets.
const PROGRESS_CHROME: usize = 23;
const MIN_BAR: usize = 10;
/// Rows above the visualizer.
const DASHBOARD_HEIGHT: u16 = BUTTON_ROW as u16 + BUTTON_HEIGHT + 3;
/// The button row with its gaps.
const DASHBOARD_WIDTH: u16 = 5 * BUTTON_WIDTH + 4 * BUTTON_GAP;
/// Detail, hint and padding kept free below a large heading.
const BANNER_MARGIN: u16 = 4;

static FONT: Lazy<Option<FIGfont>> = Lazy::new(|| FIGfont::standard().ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub fg: Color,
    pub bg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            fg: Color::Reset,
            bg: Color::Reset,
        }
    }
}

impl Theme {
    fn style(self) -> Style {
        Style::default().fg(self.fg).bg(self.bg)
    }
}

/// Everything a frame depends on.
pub struct View<'a> {
    pub snapshot: &'a PlaybackSnapshot,
    /// Present in Bluetooth mode only.
    pub connection: Option<&'a ConnectionState>,
    pub device: Option<&'a str>,
    pub animation: Option<AnimationState>,
    pub highlights: &'a HighlightTracker,
    pub visualizer: Option<&'a VisualizerState>,
    pub theme: Theme,
    pub poll_interval: Duration,
    pub now: Instant,
}

pub fn render(frame: &mut Frame, view: &View) {
    let area = frame.area();
    frame.render_widget(Block::default().style(view.theme.style()), area);
    if view.snapshot.has_source() {
        if fits_dashboard(area) {
            render_dashboard(frame, area, view);
        } else {
            render_too_small(frame, area, view.theme);
        }
    } else {
        match (view.connection, view.device) {
            (Some(state), Some(address)) => render_device_screen(frame, area, view, state, address),
            _ => render_no_player(frame, area, view),
        }
    }
}

fn rows(area: Rect) -> Rc<[Rect]> {
    Layout::vertical([
        Constraint::Length(1), // rule
        Constraint::Length(1), // title
        Constraint::Length(1), // artist
        Constraint::Length(1), // album
        Constraint::Length(1), // rule
        Constraint::Length(1), // status
        Constraint::Length(1),
        Constraint::Length(1), // progress
        Constraint::Length(1),
        Constraint::Length(BUTTON_HEIGHT),
        Constraint::Length(1),
        Constraint::Length(1), // help
        Constraint::Length(1), // rule
        Constraint::Min(0),    // visualizer
    ])
    .split(area)
}

/// Where each control button is drawn for a frame of size `area`.
/// Mouse hit-testing uses the same geometry.
pub fn control_boxes(area: Rect) -> Vec<(Control, Rect)> {
    if !fits_dashboard(area) {
        return Vec::new();
    }
    let row = rows(area)[BUTTON_ROW];
    let columns = Layout::horizontal([Constraint::Length(BUTTON_WIDTH); 5])
        .flex(Flex::Center)
        .spacing(BUTTON_GAP)
        .split(row);
    Control::ALL
        .into_iter()
        .zip(columns.iter().copied())
        .filter(|(_, rect)| !rect.is_empty())
        .collect()
}

fn fits_dashboard(area: Rect) -> bool {
    area.height >= DASHBOARD_HEIGHT && area.width >= DASHBOARD_WIDTH
}

fn render_too_small(frame: &mut Frame, area: Rect, theme: Theme) {
    let [_, notice, _] = Layout::vertical([Constraint::Fill(1), Constraint::Length(2), Constraint::Fill(1)]).areas(area);
    frame.render_widget(
        Paragraph::new(vec![
            Line::from("Screen too small."),
            Line::from("Try resizing the window."),
        ])
        .style(theme.style())
        .alignment(Alignment::Center),
        notice,
    );
}

fn render_dashboard(frame: &mut Frame, area: Rect, view: &View) {
    let style = view.theme.style();
    let snapshot = view.snapshot;
    let rows = rows(area);
    let rule = "=".repeat(usize::from(area.width));
    let centered = |text: String, style: Style| Paragraph::new(text).style(style).alignment(Alignment::Center);

    frame.render_widget(Paragraph::new(rule.as_str()).style(style), rows[0]);
    frame.render_widget(
        centered(or_unknown(&snapshot.title, "Unknown Title"), style.add_modifier(Modifier::BOLD)),
        rows[1],
    );
    frame.render_widget(centered(or_unknown(&snapshot.artist, "Unknown Artist"), style), rows[2]);
    frame.render_widget(centered(or_unknown(&snapshot.album, "Unknown Album"), style), rows[3]);
    frame.render_widget(Paragraph::new(rule.as_str()).style(style), rows[4]);
    frame.render_widget(Paragraph::new(status_line(snapshot, view.connection)).style(style), rows[5]);
    frame.render_widget(
        Paragraph::new(progress_line(view.animation, snapshot, view.now, area.width)).style(style),
        rows[PROGRESS_ROW],
    );

    for (control, rect) in control_boxes(area) {
        let lit = view.highlights.is_highlighted(control, view.now);
        frame.render_widget(button(control, snapshot.is_playing(), lit, style), rect);
    }

    frame.render_widget(centered(help_line(view.connection.is_some()), style), rows[11]);
    frame.render_widget(Paragraph::new(rule.as_str()).style(style), rows[12]);
    if let Some(state) = view.visualizer {
        frame.render_widget(
            Spectrum {
                bars: &state.bars,
                style,
            },
            rows[13],
        );
    }
}

fn render_no_player(frame: &mut Frame, area: Rect, view: &View) {
    let hint = format!(
        "No audio player running. Auto-retry every {:.1}s, press [q] to quit.",
        view.poll_interval.as_secs_f64()
    );
    render_banner(frame, area, view.theme, "No Player", None, &hint);
}

fn render_device_screen(frame: &mut Frame, area: Rect, view: &View, state: &ConnectionState, address: &str) {
    let hint = match state {
        ConnectionState::Failed(_) => "Connection failed. Press [r] to reconnect, [q] to quit.".to_string(),
        ConnectionState::Disconnected => "Device disconnected. Press [r] to reconnect, [q] to quit.".to_string(),
        _ => format!(
            "Device not connected. Waiting for device... (auto-retry every {:.1}s, press [q] to quit, [r] to reconnect)",
            view.poll_interval.as_secs_f64()
        ),
    };
    render_banner(frame, area, view.theme, address, Some(state.to_string()), &hint);
}

/// `heading` in large letters, trimmed of blank rows. `None` when the font
/// has no rendering for it.
fn banner_lines(heading: &str) -> Option<Vec<String>> {
    let figure = (*FONT).as_ref()?.convert(heading)?;
    let mut lines: Vec<String> = figure
        .to_string()
        .lines()
        .map(|line| line.trim_end().to_string())
        .collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    let first = lines.iter().position(|line| !line.is_empty())?;
    Some(lines.split_off(first))
}

fn banner_width(lines: &[String]) -> u16 {
    let widest = lines.iter().map(|line| line.chars().count()).max().unwrap_or(0);
    u16::try_from(widest).unwrap_or(u16::MAX)
}

/// Centered heading, drawn large when it fits, with an optional detail line
/// and a hint near the bottom.
fn render_banner(frame: &mut Frame, area: Rect, theme: Theme, heading: &str, detail: Option<String>, hint: &str) {
    let style = theme.style();
    let big = banner_lines(heading).filter(|lines| {
        banner_width(lines) <= area.width && lines.len() + usize::from(BANNER_MARGIN) <= usize::from(area.height)
    });
    let heading_height = big.as_ref().map_or(1, |lines| lines.len() as u16);
    let [_, heading_row, detail_row, _, hint_row, _] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(heading_height),
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(area);
    match big {
        Some(lines) => {
            let [block] = Layout::horizontal([Constraint::Length(banner_width(&lines))])
                .flex(Flex::Center)
                .areas(heading_row);
            frame.render_widget(Paragraph::new(lines.join("\n")).style(style), block);
        }
        None => frame.render_widget(
            Paragraph::new(heading)
                .style(style.add_modifier(Modifier::BOLD))
                .alignment(Alignment::Center),
            heading_row,
        ),
    }
    if let Some(detail) = detail {
        frame.render_widget(Paragraph::new(detail).style(style).alignment(Alignment::Center), detail_row);
    }
    frame.render_widget(Paragraph::new(hint).style(style).alignment(Alignment::Center), hint_row);
}

fn or_unknown(value: &Option<String>, fallback: &str) -> String {
    value.as_deref().unwrap_or(fallback).to_string()
}

fn status_line(snapshot: &PlaybackSnapshot, connection: Option<&ConnectionState>) -> String {
    let mut parts = vec![format!(
        "Status: {}",
        snapshot.status.map_or("Unknown", |status| status.label())
    )];
    if let Some(player) = &snapshot.player {
        parts.push(format!("Player: {player}"));
    }
    if let Some(volume) = snapshot.volume {
        parts.push(format!("Volume: {:.0}%", volume * 100.0));
    }
    if let Some(state) = connection {
        parts.push(state.to_string());
    }
    parts.join("  |  ")
}

fn help_line(device: bool) -> String {
    let mut help = String::from("Controls: [p] Play/Pause  [n] Next  [b] Previous  [+/-] Volume");
    if device {
        help.push_str("  [r] Reconnect");
    }
    help.push_str("  [q] Quit");
    help
}

fn button_label(control: Control, playing: bool) -> &'static str {
    match control {
        Control::Previous => "|< Prev",
        Control::PlayPause if playing => "|| Pause",
        Control::PlayPause => "> Play",
        Control::Next => "Next >|",
        Control::VolumeDown => "Vol -",
        Control::VolumeUp => "Vol +",
    }
}

fn button(control: Control, playing: bool, lit: bool, style: Style) -> Paragraph<'static> {
    let style = if lit {
        style.add_modifier(Modifier::REVERSED)
    } else {
        style
    };
    Paragraph::new(vec![
        Line::default(),
        Line::from(button_label(control, playing)).style(Style::default().add_modifier(Modifier::BOLD)),
    ])
    .alignment(Alignment::Center)
    .style(style)
    .block(Block::bordered())
}

/// Formats seconds as mm:ss, or hh:mm:ss from an hour up.
pub fn format_position(seconds: f64) -> String {
    let total = if seconds.is_finite() { seconds.max(0.0) as u64 } else { 0 };
    if total >= 3600 {
        format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
    } else {
        format!("{:02}:{:02}", total / 60, total % 60)
    }
}

fn bar_length(width: u16) -> usize {
    usize::from(width).saturating_sub(PROGRESS_CHROME).max(MIN_BAR)
}

fn fill_bar(value: f64, length: usize) -> String {
    let filled = ((value.clamp(0.0, 1.0) * length as f64).floor() as usize).min(length - 1);
    format!("[{}>{}]", "=".repeat(filled), " ".repeat(length - filled - 1))
}

fn sweep_bar(value: f64, length: usize) -> String {
    let travel = length.saturating_sub(SWEEP_MARKER.len());
    let offset = ((value.clamp(0.0, 1.0) * travel as f64).round() as usize).min(travel);
    format!(
        "[{}{}{}]",
        " ".repeat(offset),
        SWEEP_MARKER,
        " ".repeat(travel - offset)
    )
}

fn progress_line(animation: Option<AnimationState>, snapshot: &PlaybackSnapshot, now: Instant, width: u16) -> String {
    let elapsed = snapshot.estimate_position(now);
    let Some(state) = animation else {
        return elapsed.map_or_else(String::new, |e| format!("{:>5}", format_position(e)));
    };
    let length = bar_length(width);
    let bar = match state.kind {
        AnimationKind::ProgressFill => fill_bar(state.value, length),
        AnimationKind::SweepMarker => sweep_bar(state.value, length),
    };
    let elapsed = elapsed.unwrap_or(0.0);
    let remaining = snapshot.duration.map_or(0.0, |d| (d - elapsed).max(0.0));
    format!(
        "{:>5} {} -{}",
        format_position(elapsed),
        bar,
        format_position(remaining)
    )
}

/// Maps `bars` onto `width` columns: averaging when there are more bars than
/// columns, otherwise repeating each bar with leftover columns given to the
/// bars around the middle.
pub fn spread_bars(bars: &[f32], width: usize) -> Vec<f32> {
    let count = bars.len();
    if count == 0 || width == 0 {
        return vec![0.0; width];
    }
    if count == width {
        return bars.to_vec();
    }
    if count > width {
        let factor = count as f64 / width as f64;
        return (0..width)
            .map(|i| {
                let start = (i as f64 * factor) as usize;
                let end = (((i + 1) as f64 * factor) as usize).clamp(start + 1, count);
                bars[start..end].iter().sum::<f32>() / (end - start) as f32
            })
            .collect();
    }
    let mut repeats = vec![width / count; count];
    let remainder = width % count;
    let left = (count / 2).saturating_sub(remainder / 2);
    for slot in repeats.iter_mut().skip(left).take(remainder) {
        *slot += 1;
    }
    let mut columns: Vec<f32> = bars
        .iter()
        .zip(repeats)
        .flat_map(|(value, n)| std::iter::repeat_n(*value, n))
        .collect();
    columns.resize(width, bars[count - 1]);
    columns
}

/// Solid bottom-up bars, one terminal column each.
struct Spectrum<'a> {
    bars: &'a [f32],
    style: Style,
}

impl Widget for Spectrum<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.is_empty() {
            return;
        }
        let columns = spread_bars(self.bars, usize::from(area.width));
        for (x, value) in (area.left()..area.right()).zip(columns) {
            let height = (f64::from(value.clamp(0.0, 1.0)) * f64::from(area.height)).floor() as u16;
            for level in 0..height {
                buf[(x, area.bottom() - 1 - level)].set_symbol("█").set_style(self.style);
            }
        }
    }
}

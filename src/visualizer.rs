//! Spectrum bars fed by an external `cava` process.

use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{Result, SonguiError};

/// cava's own default.
pub const CAVA_FRAMERATE: u32 = 60;
/// Running peak decay per visualizer tick.
pub const PEAK_DECAY: f32 = 0.98;
/// Keeps silence from being amplified into full-height bars.
pub const MIN_PEAK: f32 = 1e-3;

/// One tick's bar magnitudes, each within [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct VisualizerState {
    pub bars: Vec<f32>,
}

impl VisualizerState {
    pub fn silent(count: usize) -> Self {
        Self {
            bars: vec![0.0; count],
        }
    }
}

/// Truncates or zero-pads `raw` to exactly `count` bars, clamping each to [0, 1].
pub fn fit_bars(raw: &[f32], count: usize) -> Vec<f32> {
    raw.iter()
        .map(|v| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 })
        .chain(std::iter::repeat(0.0))
        .take(count)
        .collect()
}

/// Running peak normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoGain {
    peak: f32,
}

impl Default for AutoGain {
    fn default() -> Self {
        Self { peak: MIN_PEAK }
    }
}

impl AutoGain {
    #[cfg(test)]
    pub fn peak(&self) -> f32 {
        self.peak
    }

    /// A louder frame raises the peak at once; a quieter one lets it sink slowly.
    pub fn apply(&mut self, frame: &[f32]) -> Vec<f32> {
        let frame_peak = frame.iter().copied().fold(0.0_f32, f32::max);
        self.peak = if frame_peak >= self.peak {
            frame_peak
        } else {
            self.peak * PEAK_DECAY + frame_peak * (1.0 - PEAK_DECAY)
        }
        .max(MIN_PEAK);
        frame.iter().map(|v| (v / self.peak).clamp(0.0, 1.0)).collect()
    }
}

/// Pulls the latest analyzer frame on each visualizer tick.
pub struct VisualizerFeed {
    frames: watch::Receiver<Vec<f32>>,
    bars: usize,
    autogain: Option<AutoGain>,
    closed: bool,
    _process: Option<CavaProcess>,
}

impl VisualizerFeed {
    pub fn from_receiver(frames: watch::Receiver<Vec<f32>>, bars: usize, autogain: bool) -> Self {
        Self {
            frames,
            bars: bars.max(1),
            autogain: autogain.then(AutoGain::default),
            closed: false,
            _process: None,
        }
    }

    /// Starts cava. On failure the feed still works and reports silence.
    pub fn spawn(bars: usize, framerate: u32, autogain: bool) -> Self {
        let (tx, rx) = watch::channel(vec![0.0; bars]);
        let mut feed = Self::from_receiver(rx, bars, autogain);
        match CavaProcess::start(bars, framerate, autogain, tx) {
            Ok(process) => {
                info!("Visualizer started with {} bars", bars);
                feed._process = Some(process);
            }
            Err(err) => warn!("{}", err),
        }
        feed
    }

    pub fn poll(&mut self) -> VisualizerState {
        if !self.closed && self.frames.has_changed().is_err() {
            warn!("Visualizer feed ended; showing silence");
            self.closed = true;
        }
        if self.closed {
            return VisualizerState::silent(self.bars);
        }
        let frame = fit_bars(&self.frames.borrow_and_update(), self.bars);
        let bars = match &mut self.autogain {
            Some(gain) => gain.apply(&frame),
            None => frame,
        };
        VisualizerState { bars }
    }
}

/// The analyzer subprocess and its generated config file.
struct CavaProcess {
    _child: Child,
    config_path: PathBuf,
}

impl CavaProcess {
    fn start(bars: usize, framerate: u32, autogain: bool, tx: watch::Sender<Vec<f32>>) -> Result<Self> {
        let config_path = std::env::temp_dir().join(format!("songui-cava-{}.conf", std::process::id()));
        std::fs::write(&config_path, cava_config(bars, framerate, autogain))?;
        let mut child = Command::new("cava")
            .arg("-p")
            .arg(&config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                let _ = std::fs::remove_file(&config_path);
                SonguiError::Auxiliary {
                    feature: "visualizer",
                    reason: format!("cannot start cava: {e}"),
                }
            })?;
        let mut stdout = child.stdout.take().ok_or_else(|| SonguiError::Auxiliary {
            feature: "visualizer",
            reason: "cava stdout not captured".into(),
        })?;
        tokio::spawn(async move {
            let mut chunk = vec![0u8; bars * 2];
            loop {
                if let Err(err) = stdout.read_exact(&mut chunk).await {
                    warn!("cava output stopped: {}", err);
                    break;
                }
                if tx.send(decode_frame(&chunk)).is_err() {
                    break;
                }
            }
        });
        Ok(Self {
            _child: child,
            config_path,
        })
    }
}

impl Drop for CavaProcess {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.config_path);
    }
}

/// cava does its own sensitivity scaling only when ours is off.
fn cava_config(bars: usize, framerate: u32, autogain: bool) -> String {
    format!(
        "[general]\nbars = {bars}\nframerate = {framerate}\nautosens = {}\n\n\
         [output]\nmethod = raw\nraw_target = /dev/stdout\ndata_format = binary\nbit_format = 16bit\n",
        if autogain { 0 } else { 1 }
    )
}

/// Native-endian 16-bit samples to [0, 1].
fn decode_frame(chunk: &[u8]) -> Vec<f32> {
    chunk
        .chunks_exact(2)
        .map(|pair| f32::from(u16::from_ne_bytes([pair[0], pair[1]])) / f32::from(u16::MAX))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_fitted_to_bar_count() {
        assert_eq!(fit_bars(&[0.1, 0.2, 0.3], 2), vec![0.1, 0.2]);
        assert_eq!(fit_bars(&[0.5], 3), vec![0.5, 0.0, 0.0]);
        assert_eq!(fit_bars(&[1.5, -0.2, f32::NAN], 3), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn autogain_normalizes_to_the_loudest_bar() {
        let mut gain = AutoGain::default();
        let out = gain.apply(&[0.1, 0.2, 0.05]);
        assert_eq!(out[1], 1.0);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!(out.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn autogain_peak_decays_toward_quieter_frames() {
        let mut gain = AutoGain::default();
        gain.apply(&[0.8]);
        assert_eq!(gain.peak(), 0.8);

        let mut previous = gain.peak();
        for _ in 0..50 {
            let out = gain.apply(&[0.2]);
            assert!(gain.peak() < previous);
            assert!(gain.peak() > 0.2);
            assert!(out[0] <= 1.0);
            previous = gain.peak();
        }
        for _ in 0..1000 {
            gain.apply(&[0.2]);
        }
        assert!((gain.peak() - 0.2).abs() < 1e-3);
    }

    #[test]
    fn silence_does_not_blow_up() {
        let mut gain = AutoGain::default();
        let out = gain.apply(&[0.0, 0.0]);
        assert_eq!(out, vec![0.0, 0.0]);
        assert_eq!(gain.peak(), MIN_PEAK);
    }

    #[test]
    fn decodes_sixteen_bit_samples() {
        let mut chunk = Vec::new();
        chunk.extend_from_slice(&u16::MAX.to_ne_bytes());
        chunk.extend_from_slice(&0u16.to_ne_bytes());
        assert_eq!(decode_frame(&chunk), vec![1.0, 0.0]);
    }

    #[test]
    fn config_requests_raw_binary_output() {
        let config = cava_config(24, 30, true);
        assert!(config.contains("bars = 24"));
        assert!(config.contains("method = raw"));
        assert!(config.contains("autosens = 0"));
        assert!(cava_config(24, 30, false).contains("autosens = 1"));
    }

    #[tokio::test]
    async fn feed_replaces_state_wholesale_and_degrades_when_closed() {
        let (tx, rx) = watch::channel(vec![0.0; 4]);
        let mut feed = VisualizerFeed::from_receiver(rx, 3, false);
        tx.send(vec![0.25, 0.5, 0.75, 1.0]).unwrap();
        assert_eq!(feed.poll().bars, vec![0.25, 0.5, 0.75]);

        drop(tx);
        assert_eq!(feed.poll(), VisualizerState::silent(3));
    }
}

//! Spoken "now playing" announcements.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::player::PlaybackSnapshot;

/// Quiet period before speaking, so rapid skips announce only the last track.
pub const DEBOUNCE: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Seen {
    /// No source at all. Startup begins here.
    Gap,
    /// A source with title or artist missing.
    Partial,
    Track(String, String),
}

impl Seen {
    fn of(snapshot: &PlaybackSnapshot) -> Self {
        if !snapshot.has_source() {
            return Seen::Gap;
        }
        match snapshot.track_id() {
            Some((title, artist)) => Seen::Track(title.to_string(), artist.to_string()),
            None => Seen::Partial,
        }
    }
}

/// Decides when a poll represents a new track worth announcing.
#[derive(Debug)]
pub struct AnnounceTrigger {
    previous: Seen,
}

impl Default for AnnounceTrigger {
    fn default() -> Self {
        Self { previous: Seen::Gap }
    }
}

impl AnnounceTrigger {
    /// Returns the sentence to speak, if this snapshot starts a new track.
    pub fn observe(&mut self, snapshot: &PlaybackSnapshot) -> Option<String> {
        let current = Seen::of(snapshot);
        let fire = match (&self.previous, &current) {
            (Seen::Track(t0, a0), Seen::Track(t1, a1)) => t0 != t1 || a0 != a1,
            (Seen::Partial, Seen::Track(..)) => true,
            _ => false,
        };
        let text = match (&current, fire) {
            (Seen::Track(title, artist), true) => Some(format!("Now playing: {title} by {artist}")),
            _ => None,
        };
        self.previous = current;
        text
    }
}

/// Handle to the background speech worker.
pub struct Announcer {
    requests: mpsc::UnboundedSender<String>,
}

impl Announcer {
    pub fn spawn() -> Self {
        let (requests, rx) = mpsc::unbounded_channel();
        tokio::spawn(speech_worker(rx));
        info!("Announcer started");
        Self { requests }
    }

    pub fn announce(&self, text: String) {
        if self.requests.send(text).is_err() {
            warn!("Speech worker is gone; dropping announcement");
        }
    }
}

/// Waits out the quiet period, letting newer requests replace `text`.
/// `None` once the sender is dropped.
async fn settle(rx: &mut mpsc::UnboundedReceiver<String>, mut text: String) -> Option<String> {
    loop {
        tokio::select! {
            newer = rx.recv() => text = newer?,
            _ = tokio::time::sleep(DEBOUNCE) => return Some(text),
        }
    }
}

async fn speech_worker(mut rx: mpsc::UnboundedReceiver<String>) {
    let mut speaking: Option<Child> = None;
    while let Some(first) = rx.recv().await {
        let Some(text) = settle(&mut rx, first).await else {
            break;
        };
        if let Some(mut child) = speaking.take() {
            if let Ok(None) = child.try_wait() {
                debug!("Cutting off previous announcement");
                let _ = child.start_kill();
            }
        }
        debug!("Speaking: {}", text);
        match Command::new("espeak")
            .arg(&text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => speaking = Some(child),
            Err(err) => warn!("Cannot run espeak: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{PlaybackStatus, SourceKind, TrackMetadata};
    use std::time::Instant;

    fn track(title: Option<&str>, artist: Option<&str>) -> PlaybackSnapshot {
        PlaybackSnapshot::from_track(
            SourceKind::Local,
            "mpv",
            TrackMetadata {
                title: title.map(Into::into),
                artist: artist.map(Into::into),
                ..TrackMetadata::default()
            },
            PlaybackStatus::Playing,
            None,
            Instant::now(),
        )
    }

    fn gap() -> PlaybackSnapshot {
        PlaybackSnapshot::none(Instant::now())
    }

    #[test]
    fn artist_change_fires_exactly_once() {
        let mut trigger = AnnounceTrigger::default();
        assert_eq!(trigger.observe(&track(Some("Song"), Some("A"))), None);
        assert_eq!(
            trigger.observe(&track(Some("Song"), Some("B"))),
            Some("Now playing: Song by B".to_string())
        );
        assert_eq!(trigger.observe(&track(Some("Song"), Some("B"))), None);
    }

    #[test]
    fn startup_and_gaps_never_fire() {
        let mut trigger = AnnounceTrigger::default();
        assert_eq!(trigger.observe(&gap()), None);
        assert_eq!(trigger.observe(&track(Some("One"), Some("A"))), None);
        assert_eq!(trigger.observe(&gap()), None);
        assert_eq!(trigger.observe(&track(Some("Two"), Some("B"))), None);
    }

    #[test]
    fn completing_partial_metadata_fires() {
        let mut trigger = AnnounceTrigger::default();
        assert_eq!(trigger.observe(&track(Some("Song"), None)), None);
        assert_eq!(
            trigger.observe(&track(Some("Song"), Some("Band"))),
            Some("Now playing: Song by Band".to_string())
        );
        assert_eq!(trigger.observe(&track(None, None)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_requests_settle_on_the_newest() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send("second".to_string()).unwrap();
        tx.send("third".to_string()).unwrap();
        let spoken = settle(&mut rx, "first".to_string()).await;
        assert_eq!(spoken.as_deref(), Some("third"));

        drop(tx);
        assert_eq!(settle(&mut rx, "last".to_string()).await, None);
    }
}

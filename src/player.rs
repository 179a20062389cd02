// Immutable playback snapshots shared by every tick handler.

use serde::Serialize;
use std::time::Instant;

/// Where a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Bluetooth,
    Local,
    None,
}

/// Normalized playback status across MPRIS and BlueZ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
}

impl PlaybackStatus {
    /// Parses MPRIS ("Playing") and BlueZ ("playing", "forward-seek") spellings.
    pub fn parse(status: &str) -> Self {
        match status.to_lowercase().as_str() {
            "playing" | "forward-seek" | "reverse-seek" => PlaybackStatus::Playing,
            "paused" => PlaybackStatus::Paused,
            _ => PlaybackStatus::Stopped,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PlaybackStatus::Playing => "Playing",
            PlaybackStatus::Paused => "Paused",
            PlaybackStatus::Stopped => "Stopped",
        }
    }
}

/// Track fields as read from a backend, before they are frozen into a snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Track duration in seconds.
    pub length: Option<f64>,
}

/// One poll's worth of playback state. Never mutated; the next poll replaces it.
///
/// When `source` is [`SourceKind::None`] every other field is absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub source: SourceKind,
    pub player: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub status: Option<PlaybackStatus>,
    pub position: Option<f64>,
    pub duration: Option<f64>,
    pub volume: Option<f64>,
    #[serde(skip)]
    pub taken_at: Instant,
}

impl PlaybackSnapshot {
    /// The "nothing to show" snapshot.
    pub fn none(taken_at: Instant) -> Self {
        Self {
            source: SourceKind::None,
            player: None,
            title: None,
            artist: None,
            album: None,
            status: None,
            position: None,
            duration: None,
            volume: None,
            taken_at,
        }
    }

    /// Builds a snapshot from backend data. Blank strings and non-positive
    /// durations count as absent.
    pub fn from_track(
        source: SourceKind,
        player: impl Into<String>,
        meta: TrackMetadata,
        status: PlaybackStatus,
        position: Option<f64>,
        taken_at: Instant,
    ) -> Self {
        if source == SourceKind::None {
            return Self::none(taken_at);
        }
        Self {
            source,
            player: Some(player.into()),
            title: non_blank(meta.title),
            artist: non_blank(meta.artist),
            album: non_blank(meta.album),
            status: Some(status),
            position: position.filter(|p| p.is_finite() && *p >= 0.0),
            duration: meta.length.filter(|d| d.is_finite() && *d > 0.0),
            volume: None,
            taken_at,
        }
    }

    pub fn with_volume(mut self, volume: Option<f64>) -> Self {
        if self.source != SourceKind::None {
            self.volume = volume.map(|v| v.clamp(0.0, 1.0));
        }
        self
    }

    pub fn has_source(&self) -> bool {
        self.source != SourceKind::None
    }

    pub fn is_playing(&self) -> bool {
        self.status == Some(PlaybackStatus::Playing)
    }

    /// Position extrapolated to `now`; only advances while playing.
    pub fn estimate_position(&self, now: Instant) -> Option<f64> {
        let position = self.position?;
        if self.is_playing() {
            let elapsed = now.saturating_duration_since(self.taken_at).as_secs_f64();
            Some(position + elapsed)
        } else {
            Some(position)
        }
    }

    /// The (title, artist) pair when both are known.
    pub fn track_id(&self) -> Option<(&str, &str)> {
        Some((self.title.as_deref()?, self.artist.as_deref()?))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| s.chars().any(|c| !c.is_whitespace() && !c.is_control()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn meta(title: &str, artist: &str, length: Option<f64>) -> TrackMetadata {
        TrackMetadata {
            title: Some(title.into()),
            artist: Some(artist.into()),
            album: None,
            length,
        }
    }

    #[test]
    fn none_snapshot_has_no_fields() {
        let snap = PlaybackSnapshot::none(Instant::now()).with_volume(Some(0.5));
        assert_eq!(snap.source, SourceKind::None);
        assert!(snap.title.is_none() && snap.artist.is_none() && snap.album.is_none());
        assert!(snap.status.is_none() && snap.position.is_none() && snap.duration.is_none());
        assert!(snap.volume.is_none());
        assert!(!snap.is_playing());
    }

    #[test]
    fn from_track_with_none_source_collapses() {
        let snap = PlaybackSnapshot::from_track(
            SourceKind::None,
            "vlc",
            meta("a", "b", Some(10.0)),
            PlaybackStatus::Playing,
            Some(1.0),
            Instant::now(),
        );
        assert_eq!(snap, PlaybackSnapshot::none(snap.taken_at));
    }

    #[test]
    fn blank_fields_and_bad_durations_are_absent() {
        let snap = PlaybackSnapshot::from_track(
            SourceKind::Local,
            "mpv",
            meta("   ", "Artist", Some(0.0)),
            PlaybackStatus::Paused,
            Some(-3.0),
            Instant::now(),
        );
        assert!(snap.title.is_none());
        assert_eq!(snap.artist.as_deref(), Some("Artist"));
        assert!(snap.duration.is_none());
        assert!(snap.position.is_none());
    }

    #[test]
    fn position_only_advances_while_playing() {
        let taken = Instant::now();
        let later = taken + Duration::from_secs(5);
        let playing = PlaybackSnapshot::from_track(
            SourceKind::Local,
            "mpv",
            meta("t", "a", Some(100.0)),
            PlaybackStatus::Playing,
            Some(10.0),
            taken,
        );
        assert_eq!(playing.estimate_position(later), Some(15.0));

        let paused = PlaybackSnapshot {
            status: Some(PlaybackStatus::Paused),
            ..playing
        };
        assert_eq!(paused.estimate_position(later), Some(10.0));
    }

    #[test]
    fn status_parsing_covers_both_backends() {
        assert_eq!(PlaybackStatus::parse("Playing"), PlaybackStatus::Playing);
        assert_eq!(PlaybackStatus::parse("forward-seek"), PlaybackStatus::Playing);
        assert_eq!(PlaybackStatus::parse("paused"), PlaybackStatus::Paused);
        assert_eq!(PlaybackStatus::parse("error"), PlaybackStatus::Stopped);
    }

    #[test]
    fn snapshot_serializes_without_instant() {
        let snap = PlaybackSnapshot::from_track(
            SourceKind::Bluetooth,
            "phone",
            meta("Song", "Band", Some(60.0)),
            PlaybackStatus::Playing,
            Some(1.5),
            Instant::now(),
        );
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["source"], "bluetooth");
        assert_eq!(json["status"], "playing");
        assert_eq!(json["title"], "Song");
        assert!(json.get("taken_at").is_none());
    }
}

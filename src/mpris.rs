//! Local "now playing" backend over MPRIS2.

pub mod connection;
pub mod metadata;

use dbus::arg::PropMap;
use dbus::nonblock::stdintf::org_freedesktop_dbus::Properties;
use dbus::nonblock::{Proxy, SyncConnection};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::{Result, SonguiError};
use crate::player::{PlaybackSnapshot, PlaybackStatus, SourceKind, TrackMetadata};
use crate::source::{PlaybackCommand, PlaybackSource, Unavailable};
use connection::{MPRIS_PATH, TIMEOUT, get_dbus_conn, get_player_names, is_blocked, short_name};
use metadata::extract_metadata;

const MPRIS_PLAYER_INTERFACE: &str = "org.mpris.MediaPlayer2.Player";
const VOLUME_STEP: f64 = 0.05;

/// Polls whichever MPRIS player is active on the session bus.
pub struct MprisSource {
    block_list: Vec<String>,
    conn: Option<Arc<SyncConnection>>,
    current_service: Option<String>,
    last_failure: Option<Unavailable>,
}

/// The outcome of one detached MPRIS query.
pub struct MprisReading {
    conn: Option<Arc<SyncConnection>>,
    outcome: std::result::Result<Option<(String, PlaybackSnapshot)>, Unavailable>,
}

impl MprisSource {
    pub fn new(block_list: Vec<String>) -> Self {
        Self {
            block_list,
            conn: None,
            current_service: None,
            last_failure: None,
        }
    }
}

/// The first playing player wins, otherwise the first one listed.
async fn select_player(conn: &Arc<SyncConnection>, block_list: &[String]) -> Result<Option<String>> {
    let names: Vec<String> = get_player_names(conn.clone())
        .await?
        .into_iter()
        .filter(|name| !is_blocked(name, block_list))
        .collect();
    for name in &names {
        let proxy = Proxy::new(name.as_str(), MPRIS_PATH, TIMEOUT, conn.clone());
        let status: Option<String> = Properties::get(&proxy, MPRIS_PLAYER_INTERFACE, "PlaybackStatus")
            .await
            .ok();
        if status.as_deref() == Some("Playing") {
            return Ok(Some(name.clone()));
        }
    }
    Ok(names.into_iter().next())
}

async fn read_active(conn: Arc<SyncConnection>, block_list: &[String]) -> Result<Option<(String, PlaybackSnapshot)>> {
    let Some(service) = select_player(&conn, block_list).await? else {
        return Ok(None);
    };
    let proxy = Proxy::new(service.as_str(), MPRIS_PATH, TIMEOUT, conn);
    let status: String = Properties::get(&proxy, MPRIS_PLAYER_INTERFACE, "PlaybackStatus").await?;
    let meta = match Properties::get::<PropMap>(&proxy, MPRIS_PLAYER_INTERFACE, "Metadata").await {
        Ok(map) => extract_metadata(&map),
        Err(_) => TrackMetadata::default(),
    };
    let position: Option<f64> = Properties::get::<i64>(&proxy, MPRIS_PLAYER_INTERFACE, "Position")
        .await
        .ok()
        .map(|p| p as f64 / 1_000_000.0);
    let volume: Option<f64> = Properties::get(&proxy, MPRIS_PLAYER_INTERFACE, "Volume")
        .await
        .ok();

    let snapshot = PlaybackSnapshot::from_track(
        SourceKind::Local,
        short_name(&service),
        meta,
        PlaybackStatus::parse(&status),
        position,
        Instant::now(),
    )
    .with_volume(volume);
    Ok(Some((service, snapshot)))
}

fn classify(err: &SonguiError) -> Unavailable {
    debug!("MPRIS query failed: {}", err);
    if err.is_timeout() {
        Unavailable::Timeout
    } else {
        Unavailable::NoPlayer
    }
}

impl PlaybackSource for MprisSource {
    type Reading = MprisReading;

    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    fn query(&self) -> impl Future<Output = MprisReading> + Send + 'static {
        let conn = self.conn.clone();
        let block_list = self.block_list.clone();
        async move {
            let conn = match conn {
                Some(conn) => conn,
                None => match get_dbus_conn().await {
                    Ok(conn) => conn,
                    Err(err) => {
                        return MprisReading {
                            conn: None,
                            outcome: Err(classify(&err)),
                        };
                    }
                },
            };
            let outcome = read_active(conn.clone(), &block_list)
                .await
                .map_err(|err| classify(&err));
            MprisReading {
                conn: Some(conn),
                outcome,
            }
        }
    }

    fn absorb(&mut self, reading: MprisReading) -> PlaybackSnapshot {
        if reading.conn.is_some() {
            self.conn = reading.conn;
        }
        match reading.outcome {
            Ok(Some((service, snapshot))) => {
                self.last_failure = None;
                self.current_service = Some(service);
                debug!(
                    "Polled {:?}: {:?} - {:?} ({:?})",
                    snapshot.player, snapshot.title, snapshot.artist, snapshot.status
                );
                snapshot
            }
            Ok(None) => {
                self.current_service = None;
                self.last_failure = Some(Unavailable::NoPlayer);
                PlaybackSnapshot::none(Instant::now())
            }
            Err(reason) => {
                self.current_service = None;
                self.last_failure = Some(reason);
                PlaybackSnapshot::none(Instant::now())
            }
        }
    }

    fn last_failure(&self) -> Option<&Unavailable> {
        self.last_failure.as_ref()
    }

    fn send(&self, command: PlaybackCommand, current: &PlaybackSnapshot) {
        let (Some(conn), Some(service)) = (self.conn.clone(), self.current_service.clone()) else {
            debug!("Dropping {} with no active player", command.name());
            return;
        };
        let volume = current.volume;
        tokio::spawn(async move {
            if let Err(err) = send_command(conn, &service, command, volume).await {
                warn!("{} on {} failed: {}", command.name(), service, err);
            }
        });
    }
}

async fn send_command(
    conn: Arc<SyncConnection>,
    service: &str,
    command: PlaybackCommand,
    volume: Option<f64>,
) -> Result<()> {
    let proxy = Proxy::new(service, MPRIS_PATH, TIMEOUT, conn);
    let step = match command {
        PlaybackCommand::VolumeUp => VOLUME_STEP,
        PlaybackCommand::VolumeDown => -VOLUME_STEP,
        _ => {
            let () = proxy
                .method_call(MPRIS_PLAYER_INTERFACE, command.name(), ())
                .await?;
            return Ok(());
        }
    };
    let current = match volume {
        Some(v) => v,
        None => Properties::get::<f64>(&proxy, MPRIS_PLAYER_INTERFACE, "Volume")
            .await
            .map_err(|_| SonguiError::Command {
                command: command.name().to_string(),
                reason: "player exposes no volume".into(),
            })?,
    };
    let target = (current + step).clamp(0.0, 1.0);
    Properties::set(&proxy, MPRIS_PLAYER_INTERFACE, "Volume", target).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing() -> PlaybackSnapshot {
        PlaybackSnapshot::from_track(
            SourceKind::Local,
            "spotify",
            TrackMetadata::default(),
            PlaybackStatus::Playing,
            None,
            Instant::now(),
        )
    }

    #[test]
    fn absorbed_readings_track_the_active_service() {
        let mut source = MprisSource::new(Vec::new());
        let snapshot = source.absorb(MprisReading {
            conn: None,
            outcome: Ok(Some(("org.mpris.MediaPlayer2.spotify".into(), playing()))),
        });
        assert_eq!(snapshot.source, SourceKind::Local);
        assert_eq!(source.current_service.as_deref(), Some("org.mpris.MediaPlayer2.spotify"));
        assert_eq!(source.last_failure(), None);

        let snapshot = source.absorb(MprisReading {
            conn: None,
            outcome: Err(Unavailable::Timeout),
        });
        assert_eq!(snapshot.source, SourceKind::None);
        assert_eq!(source.current_service, None);
        assert_eq!(source.last_failure(), Some(&Unavailable::Timeout));

        source.absorb(MprisReading {
            conn: None,
            outcome: Ok(None),
        });
        assert_eq!(source.last_failure(), Some(&Unavailable::NoPlayer));
    }
}

//! Bluetooth backend: a single BlueZ device on the system bus.

pub mod device;
pub mod media;

use dbus::nonblock::SyncConnection;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, SonguiError};
use crate::player::{PlaybackSnapshot, PlaybackStatus, SourceKind, TrackMetadata};
use crate::source::{PlaybackCommand, PlaybackSource, Unavailable};
use device::DeviceInfo;

async fn get_system_conn() -> Result<Arc<SyncConnection>> {
    static ONCE: OnceCell<Arc<SyncConnection>> = OnceCell::new();
    if let Some(conn) = ONCE.get() {
        return Ok(conn.clone());
    }
    let (resource, conn) =
        dbus_tokio::connection::new_system_sync().map_err(|_| SonguiError::NoConnection)?;
    tokio::spawn(async move {
        let err = resource.await;
        warn!("System bus connection lost: {}", err);
    });
    let _ = ONCE.set(conn.clone());
    Ok(conn)
}

/// Where the last connect probe stands.
#[derive(Debug, Clone, PartialEq)]
enum Probe {
    Idle,
    InFlight,
    /// BlueZ answered the connect at this instant.
    Succeeded(Instant),
    Failed(String),
}

type ProbeResult = (Instant, std::result::Result<(), String>);

/// What one query saw on the bus.
#[derive(Debug)]
enum Observation {
    Unknown,
    Disconnected(DeviceInfo),
    Connected(DeviceInfo, PlaybackSnapshot),
}

/// The outcome of one detached BlueZ query.
pub struct BluezReading {
    started: Instant,
    conn: Option<Arc<SyncConnection>>,
    outcome: std::result::Result<Observation, Unavailable>,
}

pub struct BluezSource {
    address: String,
    conn: Option<Arc<SyncConnection>>,
    device: Option<DeviceInfo>,
    probe: Probe,
    probe_tx: mpsc::UnboundedSender<ProbeResult>,
    probe_rx: mpsc::UnboundedReceiver<ProbeResult>,
    last_failure: Option<Unavailable>,
}

impl BluezSource {
    /// `address` must already be normalized.
    pub fn new(address: String) -> Self {
        let (probe_tx, probe_rx) = mpsc::unbounded_channel();
        Self {
            address,
            conn: None,
            device: None,
            probe: Probe::Idle,
            probe_tx,
            probe_rx,
            last_failure: None,
        }
    }

    fn drain_probe_results(&mut self) {
        while let Ok((at, result)) = self.probe_rx.try_recv() {
            self.probe = match result {
                Ok(()) => Probe::Succeeded(at),
                Err(reason) => Probe::Failed(reason),
            };
        }
    }

    /// Why a known-but-disconnected or unknown device yields no snapshot.
    /// `started` is when the query that saw it began.
    fn absence_reason(&self, known: bool, started: Instant) -> Unavailable {
        match (&self.probe, known) {
            (Probe::InFlight, _) => Unavailable::NotConnected,
            (Probe::Failed(reason), _) => Unavailable::Unreachable(reason.clone()),
            (Probe::Succeeded(at), true) if started >= *at => {
                Unavailable::Unreachable("connected then dropped".into())
            }
            (Probe::Idle | Probe::Succeeded(_), true) => Unavailable::NotConnected,
            (Probe::Idle | Probe::Succeeded(_), false) => Unavailable::Unreachable("device not found".into()),
        }
    }
}

async fn observe(conn: Arc<SyncConnection>, address: &str) -> Result<Observation> {
    let Some(device) = device::find_device(conn.clone(), address).await? else {
        return Ok(Observation::Unknown);
    };
    if !device.connected {
        return Ok(Observation::Disconnected(device));
    }
    let player_name = device.name.clone().unwrap_or_else(|| address.to_string());
    let reading = match &device.player {
        Some(player) => Some(media::read_player(conn, player.clone()).await?),
        None => None,
    };
    let now = Instant::now();
    let snapshot = match reading {
        Some(reading) => PlaybackSnapshot::from_track(
            SourceKind::Bluetooth,
            player_name,
            reading.meta,
            reading.status,
            reading.position,
            now,
        ),
        // Connected, but nothing is playing through it yet.
        None => PlaybackSnapshot::from_track(
            SourceKind::Bluetooth,
            player_name,
            TrackMetadata::default(),
            PlaybackStatus::Stopped,
            None,
            now,
        ),
    };
    Ok(Observation::Connected(device, snapshot))
}

fn classify(err: &SonguiError) -> Unavailable {
    if err.is_timeout() {
        Unavailable::Timeout
    } else {
        Unavailable::Unreachable(err.to_string())
    }
}

impl PlaybackSource for BluezSource {
    type Reading = BluezReading;

    fn kind(&self) -> SourceKind {
        SourceKind::Bluetooth
    }

    fn query(&self) -> impl Future<Output = BluezReading> + Send + 'static {
        let conn = self.conn.clone();
        let address = self.address.clone();
        let started = Instant::now();
        async move {
            let conn = match conn {
                Some(conn) => conn,
                None => match get_system_conn().await {
                    Ok(conn) => conn,
                    Err(err) => {
                        return BluezReading {
                            started,
                            conn: None,
                            outcome: Err(classify(&err)),
                        };
                    }
                },
            };
            let outcome = observe(conn.clone(), &address).await.map_err(|err| classify(&err));
            BluezReading {
                started,
                conn: Some(conn),
                outcome,
            }
        }
    }

    fn absorb(&mut self, reading: BluezReading) -> PlaybackSnapshot {
        if reading.conn.is_some() {
            self.conn = reading.conn;
        }
        self.drain_probe_results();
        let result = match reading.outcome {
            Ok(Observation::Connected(device, snapshot)) => {
                self.device = Some(device);
                self.probe = Probe::Idle;
                Ok(snapshot)
            }
            Ok(Observation::Disconnected(device)) => {
                self.device = Some(device);
                Err(self.absence_reason(true, reading.started))
            }
            Ok(Observation::Unknown) => {
                self.device = None;
                Err(self.absence_reason(false, reading.started))
            }
            Err(reason) => Err(reason),
        };
        match result {
            Ok(snapshot) => {
                self.last_failure = None;
                debug!(
                    "Polled {}: {:?} - {:?} ({:?})",
                    self.address, snapshot.title, snapshot.artist, snapshot.status
                );
                snapshot
            }
            Err(reason) => {
                debug!("Device {} unavailable: {}", self.address, reason);
                self.last_failure = Some(reason);
                PlaybackSnapshot::none(Instant::now())
            }
        }
    }

    fn last_failure(&self) -> Option<&Unavailable> {
        self.last_failure.as_ref()
    }

    fn send(&self, command: PlaybackCommand, _current: &PlaybackSnapshot) {
        let (Some(conn), Some(device)) = (self.conn.clone(), self.device.clone()) else {
            debug!("Dropping {} with no device", command.name());
            return;
        };
        tokio::spawn(async move {
            if let Err(err) = media::send_command(conn, device.path, device.player, command).await {
                warn!("{} on Bluetooth device failed: {}", command.name(), err);
            }
        });
    }

    fn connect_probe(&mut self) {
        if self.probe == Probe::InFlight {
            return;
        }
        info!("Connecting to {}", self.address);
        self.probe = Probe::InFlight;
        let address = self.address.clone();
        let conn = self.conn.clone();
        let tx = self.probe_tx.clone();
        tokio::spawn(async move {
            let result = match conn {
                Some(conn) => device::connect(conn, &address).await,
                None => match get_system_conn().await {
                    Ok(conn) => device::connect(conn, &address).await,
                    Err(err) => Err(err),
                },
            };
            if let Err(err) = &result {
                warn!("Connecting to {} failed: {}", address, err);
            }
            let _ = tx.send((Instant::now(), result.map_err(|e| e.to_string())));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionManager, ConnectionState};
    use assert_matches::assert_matches;
    use dbus::Path;
    use std::time::Duration;

    const ADDRESS: &str = "00:11:22:33:44:55";

    fn disconnected(started: Instant) -> BluezReading {
        BluezReading {
            started,
            conn: None,
            outcome: Ok(Observation::Disconnected(DeviceInfo {
                path: Path::from("/org/bluez/hci0/dev_00_11_22_33_44_55"),
                name: Some("Headphones".into()),
                connected: false,
                player: None,
            })),
        }
    }

    #[test]
    fn absence_reason_follows_probe() {
        let mut source = BluezSource::new(ADDRESS.into());
        let now = Instant::now();
        assert_eq!(source.absence_reason(true, now), Unavailable::NotConnected);
        assert_matches!(source.absence_reason(false, now), Unavailable::Unreachable(_));

        source.probe = Probe::InFlight;
        assert_eq!(source.absence_reason(false, now), Unavailable::NotConnected);

        source.probe = Probe::Failed("br-connection-page-timeout".into());
        assert_eq!(
            source.absence_reason(true, now),
            Unavailable::Unreachable("br-connection-page-timeout".into())
        );

        source.probe = Probe::Succeeded(now);
        assert_eq!(
            source.absence_reason(true, now + Duration::from_secs(1)),
            Unavailable::Unreachable("connected then dropped".into())
        );
    }

    #[tokio::test]
    async fn probe_results_are_drained_without_waiting() {
        let mut source = BluezSource::new(ADDRESS.into());
        source.probe = Probe::InFlight;
        let at = Instant::now();
        source.probe_tx.send((at, Err("host is down".into()))).unwrap();
        source.drain_probe_results();
        assert_eq!(source.probe, Probe::Failed("host is down".into()));

        source.probe_tx.send((at, Ok(()))).unwrap();
        source.drain_probe_results();
        assert_eq!(source.probe, Probe::Succeeded(at));
    }

    #[test]
    fn device_dropping_after_connect_fails_the_attempt() {
        let mut source = BluezSource::new(ADDRESS.into());
        let mut manager = ConnectionManager::new();
        assert!(manager.start());
        source.probe = Probe::InFlight;

        let before = Instant::now();
        let connected_at = before + Duration::from_secs(1);
        source.probe_tx.send((connected_at, Ok(()))).unwrap();

        // Began before the connect finished, so it proves nothing.
        let snapshot = source.absorb(disconnected(before));
        manager.on_poll(&snapshot, source.last_failure());
        assert_eq!(source.last_failure(), Some(&Unavailable::NotConnected));
        assert_eq!(manager.state(), &ConnectionState::Connecting);

        let snapshot = source.absorb(disconnected(connected_at + Duration::from_secs(1)));
        manager.on_poll(&snapshot, source.last_failure());
        assert_matches!(manager.state(), ConnectionState::Failed(reason) if reason.contains("connected then dropped"));
        assert!(manager.request_reconnect());
    }

    #[test]
    fn connected_device_clears_the_probe() {
        let mut source = BluezSource::new(ADDRESS.into());
        source.probe = Probe::Failed("host is down".into());
        let device = DeviceInfo {
            path: Path::from("/org/bluez/hci0/dev_00_11_22_33_44_55"),
            name: Some("Headphones".into()),
            connected: true,
            player: None,
        };
        let snapshot = PlaybackSnapshot::from_track(
            SourceKind::Bluetooth,
            "Headphones",
            TrackMetadata::default(),
            PlaybackStatus::Stopped,
            None,
            Instant::now(),
        );
        let polled = source.absorb(BluezReading {
            started: Instant::now(),
            conn: None,
            outcome: Ok(Observation::Connected(device.clone(), snapshot)),
        });
        assert_eq!(polled.source, SourceKind::Bluetooth);
        assert_eq!(source.probe, Probe::Idle);
        assert_eq!(source.device, Some(device));
        assert_eq!(source.last_failure(), None);
    }
}

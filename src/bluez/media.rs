//! Reading and driving a BlueZ `MediaPlayer1`.

use dbus::arg::PropMap;
use dbus::nonblock::stdintf::org_freedesktop_dbus::Properties;
use dbus::nonblock::{Proxy, SyncConnection};
use dbus::Path;
use std::sync::Arc;

use super::device::{BLUEZ_SERVICE, PLAYER_INTERFACE, TIMEOUT};
use crate::error::Result;
use crate::mpris::metadata::{extract_integer, extract_optional_string};
use crate::player::{PlaybackStatus, TrackMetadata};
use crate::source::PlaybackCommand;

const CONTROL_INTERFACE: &str = "org.bluez.MediaControl1";

/// Extract fields from a BlueZ `Track` dictionary. Durations are milliseconds.
pub fn extract_track(map: &PropMap) -> TrackMetadata {
    TrackMetadata {
        title: map.get("Title").and_then(extract_optional_string),
        artist: map.get("Artist").and_then(extract_optional_string),
        album: map.get("Album").and_then(extract_optional_string),
        length: map
            .get("Duration")
            .and_then(extract_integer)
            .map(|ms| ms as f64 / 1000.0),
    }
}

pub struct PlayerReading {
    pub meta: TrackMetadata,
    pub status: PlaybackStatus,
    /// Seconds.
    pub position: Option<f64>,
}

pub async fn read_player(conn: Arc<SyncConnection>, player: Path<'static>) -> Result<PlayerReading> {
    let proxy = Proxy::new(BLUEZ_SERVICE, player, TIMEOUT, conn);
    let status: String = Properties::get(&proxy, PLAYER_INTERFACE, "Status").await?;
    let meta = match Properties::get::<PropMap>(&proxy, PLAYER_INTERFACE, "Track").await {
        Ok(map) => extract_track(&map),
        Err(_) => TrackMetadata::default(),
    };
    let position: Option<u32> = Properties::get(&proxy, PLAYER_INTERFACE, "Position").await.ok();
    Ok(PlayerReading {
        meta,
        status: PlaybackStatus::parse(&status),
        position: position.map(|ms| f64::from(ms) / 1000.0),
    })
}

/// Transport verbs live on the player; volume is only exposed on the device.
pub async fn send_command(
    conn: Arc<SyncConnection>,
    device: Path<'static>,
    player: Option<Path<'static>>,
    command: PlaybackCommand,
) -> Result<()> {
    let (path, interface) = match command {
        PlaybackCommand::VolumeUp | PlaybackCommand::VolumeDown => (device, CONTROL_INTERFACE),
        _ => match player {
            Some(player) => (player, PLAYER_INTERFACE),
            None => (device, CONTROL_INTERFACE),
        },
    };
    let proxy = Proxy::new(BLUEZ_SERVICE, path, TIMEOUT, conn);
    let () = proxy.method_call(interface, command.name(), ()).await?;
    Ok(())
}

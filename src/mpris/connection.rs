//! Session bus connection and player discovery for MPRIS.

use dbus::nonblock::{Proxy, SyncConnection};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::error::{Result, SonguiError};

pub const TIMEOUT: Duration = Duration::from_millis(500);
pub const MPRIS_PREFIX: &str = "org.mpris.MediaPlayer2.";
pub const MPRIS_PATH: &str = "/org/mpris/MediaPlayer2";

pub async fn get_dbus_conn() -> Result<Arc<SyncConnection>> {
    static ONCE: OnceCell<Arc<SyncConnection>> = OnceCell::new();
    if let Some(conn) = ONCE.get() {
        return Ok(conn.clone());
    }
    let (resource, conn) =
        dbus_tokio::connection::new_session_sync().map_err(|_| SonguiError::NoConnection)?;
    tokio::spawn(async move {
        let err = resource.await;
        warn!("Session bus connection lost: {}", err);
    });
    let _ = ONCE.set(conn.clone());
    Ok(conn)
}

/// Bus names of every registered MPRIS player, in bus order.
pub async fn get_player_names(conn: Arc<SyncConnection>) -> Result<Vec<String>> {
    let proxy = Proxy::new("org.freedesktop.DBus", "/org/freedesktop/DBus", TIMEOUT, conn);
    let (names,): (Vec<String>,) = proxy
        .method_call("org.freedesktop.DBus", "ListNames", ())
        .await?;
    Ok(names
        .into_iter()
        .filter(|name| name.starts_with(MPRIS_PREFIX))
        .collect())
}

pub fn is_blocked(service: &str, block_list: &[String]) -> bool {
    let service = service.to_lowercase();
    block_list.iter().any(|b| service.contains(b.as_str()))
}

/// Short display name, e.g. `spotify` for `org.mpris.MediaPlayer2.spotify`.
pub fn short_name(service: &str) -> &str {
    let name = service.strip_prefix(MPRIS_PREFIX).unwrap_or(service);
    name.split('.').next().unwrap_or(name)
}

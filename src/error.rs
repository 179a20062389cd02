//! Crate-wide error type.

#[derive(thiserror::Error, Debug)]
pub enum SonguiError {
    #[error("DBus error: {0}")]
    DBus(#[from] dbus::Error),
    #[error("No connection to D-Bus")]
    NoConnection,
    #[error("Device {0} is not known to BlueZ")]
    UnknownDevice(String),
    #[error("Invalid device address {0:?}, expected AA:BB:CC:DD:EE:FF")]
    InvalidAddress(String),
    #[error("{command} did not take effect: {reason}")]
    Command { command: String, reason: String },
    #[error("{feature} unavailable: {reason}")]
    Auxiliary { feature: &'static str, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SonguiError {
    /// True when the underlying D-Bus call ran out of time rather than being refused.
    pub fn is_timeout(&self) -> bool {
        match self {
            SonguiError::DBus(err) => matches!(
                err.name(),
                Some("org.freedesktop.DBus.Error.NoReply" | "org.freedesktop.DBus.Error.Timeout")
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SonguiError>;

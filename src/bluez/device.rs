//! Locating and connecting a BlueZ device by address.

use dbus::arg::{PropMap, prop_cast};
use dbus::nonblock::stdintf::org_freedesktop_dbus::ObjectManager;
use dbus::nonblock::{Proxy, SyncConnection};
use dbus::Path;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, SonguiError};

pub const BLUEZ_SERVICE: &str = "org.bluez";
pub const DEVICE_INTERFACE: &str = "org.bluez.Device1";
pub const PLAYER_INTERFACE: &str = "org.bluez.MediaPlayer1";
pub const TIMEOUT: Duration = Duration::from_millis(1500);
/// Pairing a sleeping headset can take a while.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

static ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{2}([:_][0-9A-Fa-f]{2}){5}$").expect("address pattern is valid")
});

type ManagedObjects = HashMap<Path<'static>, HashMap<String, PropMap>>;

/// Validates an address and returns it in canonical `AA:BB:CC:DD:EE:FF` form.
pub fn normalize_address(address: &str) -> Result<String> {
    let trimmed = address.trim();
    if !ADDRESS.is_match(trimmed) {
        return Err(SonguiError::InvalidAddress(address.to_string()));
    }
    Ok(trimmed.replace('_', ":").to_uppercase())
}

/// What BlueZ currently knows about the configured device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub path: Path<'static>,
    pub name: Option<String>,
    pub connected: bool,
    pub player: Option<Path<'static>>,
}

/// Finds the device with `address` and its media player among BlueZ's objects.
pub fn locate(objects: &ManagedObjects, address: &str) -> Option<DeviceInfo> {
    let (path, props) = objects.iter().find_map(|(path, interfaces)| {
        let props = interfaces.get(DEVICE_INTERFACE)?;
        let found = prop_cast::<String>(props, "Address")?;
        found.eq_ignore_ascii_case(address).then_some((path, props))
    })?;
    let prefix = format!("{}/", path);
    let player = objects
        .iter()
        .filter(|(p, interfaces)| p.starts_with(&prefix) && interfaces.contains_key(PLAYER_INTERFACE))
        .map(|(p, _)| p.clone())
        .min_by(|a, b| (**a).cmp(&**b));
    Some(DeviceInfo {
        path: path.clone(),
        name: prop_cast::<String>(props, "Alias")
            .or_else(|| prop_cast::<String>(props, "Name"))
            .cloned(),
        connected: prop_cast::<bool>(props, "Connected").copied().unwrap_or(false),
        player,
    })
}

pub async fn find_device(conn: Arc<SyncConnection>, address: &str) -> Result<Option<DeviceInfo>> {
    let proxy = Proxy::new(BLUEZ_SERVICE, "/", TIMEOUT, conn);
    let objects = proxy.get_managed_objects().await?;
    Ok(locate(&objects, address))
}

/// Issues `Device1.Connect` and waits for BlueZ to answer.
pub async fn connect(conn: Arc<SyncConnection>, address: &str) -> Result<()> {
    let device = find_device(conn.clone(), address)
        .await?
        .ok_or_else(|| SonguiError::UnknownDevice(address.to_string()))?;
    if device.connected {
        return Ok(());
    }
    let proxy = Proxy::new(BLUEZ_SERVICE, device.path, CONNECT_TIMEOUT, conn);
    let () = proxy.method_call(DEVICE_INTERFACE, "Connect", ()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbus::arg::{RefArg, Variant};

    fn prop<T: RefArg + 'static>(value: T) -> Variant<Box<dyn RefArg + 'static>> {
        Variant(Box::new(value))
    }

    fn device(address: &str, connected: bool) -> HashMap<String, PropMap> {
        let mut props = PropMap::new();
        props.insert("Address".into(), prop(address.to_string()));
        props.insert("Alias".into(), prop("Headphones".to_string()));
        props.insert("Connected".into(), prop(connected));
        let mut interfaces = HashMap::new();
        interfaces.insert(DEVICE_INTERFACE.to_string(), props);
        interfaces
    }

    fn player() -> HashMap<String, PropMap> {
        let mut interfaces = HashMap::new();
        interfaces.insert(PLAYER_INTERFACE.to_string(), PropMap::new());
        interfaces
    }

    #[test]
    fn addresses_are_validated_and_canonicalised() {
        assert_eq!(
            normalize_address("aa_bb_cc_dd_ee_ff").unwrap(),
            "AA:BB:CC:DD:EE:FF"
        );
        assert_eq!(
            normalize_address(" 00:1A:7d:DA:71:13 ").unwrap(),
            "00:1A:7D:DA:71:13"
        );
        assert!(matches!(
            normalize_address("00:1A:7D"),
            Err(SonguiError::InvalidAddress(_))
        ));
        assert!(normalize_address("zz:1A:7D:DA:71:13").is_err());
    }

    #[test]
    fn locates_device_and_player_on_any_adapter() {
        let mut objects = ManagedObjects::new();
        objects.insert(
            Path::from("/org/bluez/hci1/dev_00_1A_7D_DA_71_13"),
            device("00:1A:7D:DA:71:13", true),
        );
        objects.insert(
            Path::from("/org/bluez/hci1/dev_00_1A_7D_DA_71_13/player0"),
            player(),
        );
        objects.insert(
            Path::from("/org/bluez/hci0/dev_11_22_33_44_55_66"),
            device("11:22:33:44:55:66", false),
        );

        let info = locate(&objects, "00:1a:7d:da:71:13").unwrap();
        assert!(info.connected);
        assert_eq!(info.name.as_deref(), Some("Headphones"));
        assert_eq!(
            info.player,
            Some(Path::from("/org/bluez/hci1/dev_00_1A_7D_DA_71_13/player0"))
        );

        let other = locate(&objects, "11:22:33:44:55:66").unwrap();
        assert!(!other.connected);
        assert!(other.player.is_none());

        assert!(locate(&objects, "AA:BB:CC:DD:EE:FF").is_none());
    }
}

//! Device identifiers and the read-only snapshot the core borrows from the
//! external inventory (spec §3 "Device").

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Stable identifier for a device in the external inventory.
    pub struct DeviceId("dev-");
}

/// Transport used to reach a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Ssh,
    Telnet,
}

crate::simple_display! {
    Transport {
        Ssh => "ssh",
        Telnet => "telnet",
    }
}

/// Platform hint from the inventory; `Auto` triggers one-shot sniffing in
/// the Connection Manager (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformHint {
    Ios,
    IosXr,
    NxOs,
    Auto,
}

crate::simple_display! {
    PlatformHint {
        Ios => "ios",
        IosXr => "ios-xr",
        NxOs => "nx-os",
        Auto => "auto",
    }
}

/// Read-only snapshot of a device as handed to the Connection Manager.
/// The core never mutates or persists this; it is owned by the external
/// inventory (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub name: String,
    pub host: String,
    pub transport: Transport,
    pub port: u16,
    pub username: String,
    /// Encrypted at rest; the Connection Manager decrypts just before use.
    pub password_encrypted: String,
    pub country: String,
    pub platform: PlatformHint,
}

#[cfg(any(test, feature = "test-support"))]
impl DeviceSnapshot {
    pub fn test(id: &str, name: &str) -> Self {
        Self {
            id: DeviceId::from_string(id),
            name: name.to_string(),
            host: "10.0.0.1".to_string(),
            transport: Transport::Ssh,
            port: 22,
            username: "admin".to_string(),
            password_encrypted: String::new(),
            country: "us".to_string(),
            platform: PlatformHint::Auto,
        }
    }
}

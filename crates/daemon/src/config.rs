//! Centralized environment variable access for the daemon (spec §6
//! "Environment"). One function per variable, documented default,
//! override order is always env-var-wins over built-in default — there
//! is no config file layer beyond the jumphost config (spec §6
//! "Jumphost config file").

use std::path::PathBuf;
use std::time::Duration;

/// Root of the data tree: `artifacts/`, `jobs.sqlite3`,
/// `topology.sqlite3`, `topology_snapshots/` all live under here.
/// Default: `./data` (relative to the daemon's working directory).
pub fn data_root() -> PathBuf {
    std::env::var("DATA_ROOT").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./data"))
}

/// Path to the at-rest encryption key used by the Credential Store.
/// Default: `<data_root>/credentials.key`.
pub fn encryption_key_path() -> PathBuf {
    std::env::var("ENCRYPTION_KEY_PATH").map(PathBuf::from).unwrap_or_else(|_| data_root().join("credentials.key"))
}

/// SSH/Telnet connect timeout. Default 10s.
pub fn ssh_connect_timeout() -> Duration {
    env_secs("SSH_CONNECT_TIMEOUT_S").unwrap_or(Duration::from_secs(10))
}

/// SSH/Telnet per-command read timeout. Default 30s.
pub fn ssh_read_timeout() -> Duration {
    env_secs("SSH_READ_TIMEOUT_S").unwrap_or(Duration::from_secs(30))
}

/// Progress Bus per-job replay buffer size (spec §4.5). Default 256,
/// matching [`netorch_engine::DEFAULT_REPLAY_BUFFER`].
pub fn progress_bus_buffer() -> usize {
    std::env::var("PROGRESS_BUS_BUFFER")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(netorch_engine::DEFAULT_REPLAY_BUFFER)
}

/// Shutdown drain timeout: how long graceful shutdown waits for in-flight
/// connections to close after requesting every job stop. Default 10s.
pub fn drain_timeout() -> Duration {
    env_secs("SHUTDOWN_DRAIN_TIMEOUT_S").unwrap_or(Duration::from_secs(10))
}

/// Jumphost config, read once at startup and overridable per-field by
/// environment (spec §6 "Jumphost config file").
pub fn jumphost_config_path() -> PathBuf {
    std::env::var("JUMPHOST_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| data_root().join("jumphost.json"))
}

pub fn jumphost_env_overrides() -> JumphostEnvOverrides {
    JumphostEnvOverrides {
        enabled: std::env::var("JUMPHOST_ENABLED").ok().and_then(|s| s.parse().ok()),
        host: std::env::var("JUMPHOST_HOST").ok(),
        port: std::env::var("JUMPHOST_PORT").ok().and_then(|s| s.parse().ok()),
        username: std::env::var("JUMPHOST_USERNAME").ok(),
        password: std::env::var("JUMPHOST_PASSWORD").ok(),
    }
}

#[derive(Debug, Default)]
pub struct JumphostEnvOverrides {
    pub enabled: Option<bool>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_secs)
}

/// Load the jumphost config file if present, falling back to a disabled
/// default, then apply per-field environment overrides (spec §6).
pub fn resolve_jumphost_config() -> netorch_core::JumphostConfig {
    let mut config = std::fs::read(jumphost_config_path())
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default();
    apply_jumphost_overrides(&mut config, &jumphost_env_overrides());
    config
}

fn apply_jumphost_overrides(config: &mut netorch_core::JumphostConfig, overrides: &JumphostEnvOverrides) {
    if let Some(enabled) = overrides.enabled {
        config.enabled = enabled;
    }
    if let Some(host) = &overrides.host {
        config.host = host.clone();
    }
    if let Some(port) = overrides.port {
        config.port = port;
    }
    if let Some(username) = &overrides.username {
        config.username = username.clone();
    }
    if let Some(password) = &overrides.password {
        config.password_encrypted = password.clone();
    }
}

/// Persist a jumphost config to disk, called after a successful
/// `JumphostSet` probe (spec §6).
pub fn save_jumphost_config(config: &netorch_core::JumphostConfig) -> std::io::Result<()> {
    if let Some(parent) = jumphost_config_path().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(jumphost_config_path(), bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_apply_when_unset() {
        std::env::remove_var("DATA_ROOT");
        std::env::remove_var("SSH_CONNECT_TIMEOUT_S");
        assert_eq!(data_root(), PathBuf::from("./data"));
        assert_eq!(ssh_connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    #[serial]
    fn env_var_overrides_default() {
        std::env::set_var("SSH_CONNECT_TIMEOUT_S", "5");
        assert_eq!(ssh_connect_timeout(), Duration::from_secs(5));
        std::env::remove_var("SSH_CONNECT_TIMEOUT_S");
    }

    #[test]
    #[serial]
    fn jumphost_overrides_are_independently_optional() {
        std::env::remove_var("JUMPHOST_ENABLED");
        std::env::set_var("JUMPHOST_HOST", "jump.example.net");
        let overrides = jumphost_env_overrides();
        assert_eq!(overrides.enabled, None);
        assert_eq!(overrides.host.as_deref(), Some("jump.example.net"));
        std::env::remove_var("JUMPHOST_HOST");
    }
}

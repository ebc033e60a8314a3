//! Process-wide Jumphost Config singleton (spec §4 "No global mutable
//! state beyond the Jumphost Config singleton"). Reads are lock-free
//! fast path via a reader lock; writes are rare and gated by a live
//! probe precondition (spec §6 `JumphostSet`).

use crate::connection::ConnectionAdapter;
use netorch_core::{JumphostConfig, JumphostProbeError};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

pub struct JumphostManager<A: ConnectionAdapter> {
    adapter: Arc<A>,
    config: RwLock<JumphostConfig>,
}

impl<A: ConnectionAdapter> JumphostManager<A> {
    pub fn new(adapter: Arc<A>, initial: JumphostConfig) -> Self {
        Self { adapter, config: RwLock::new(initial) }
    }

    /// `JumphostGet` (spec §6): password redacted.
    pub fn get(&self) -> JumphostConfig {
        self.config.read().redacted()
    }

    /// Returns the live config with the password intact, for internal
    /// use by the Connection Manager only — never exposed over the wire.
    pub fn get_unredacted(&self) -> JumphostConfig {
        self.config.read().clone()
    }

    /// `JumphostSet` (spec §6): a live probe must succeed before the new
    /// config is persisted; on probe failure the config is unchanged.
    pub async fn set(&self, candidate: JumphostConfig) -> Result<bool, JumphostProbeError> {
        if candidate.enabled {
            let ok = self.adapter.probe_jumphost(&candidate, Duration::from_secs(10)).await;
            if !ok {
                return Err(JumphostProbeError(format!(
                    "live probe to jumphost {}:{} failed",
                    candidate.host, candidate.port
                )));
            }
        }
        *self.config.write() = candidate.clone();
        Ok(candidate.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::fake::FakeConnectionAdapter;

    fn disabled_config() -> JumphostConfig {
        JumphostConfig::default()
    }

    #[tokio::test]
    async fn set_rejects_config_when_probe_fails() {
        let adapter = Arc::new(FakeConnectionAdapter::new());
        adapter.set_probe_result(false);
        let manager = JumphostManager::new(adapter, disabled_config());
        let candidate = JumphostConfig { enabled: true, host: "bastion".into(), ..disabled_config() };
        let result = manager.set(candidate).await;
        assert!(result.is_err());
        assert!(!manager.get().enabled);
    }

    #[tokio::test]
    async fn set_accepts_config_when_probe_succeeds() {
        let adapter = Arc::new(FakeConnectionAdapter::new());
        adapter.set_probe_result(true);
        let manager = JumphostManager::new(adapter, disabled_config());
        let candidate =
            JumphostConfig { enabled: true, host: "bastion".into(), port: 22, ..disabled_config() };
        manager.set(candidate).await.unwrap();
        assert!(manager.get().enabled);
        assert_eq!(manager.get().host, "bastion");
    }

    #[tokio::test]
    async fn get_redacts_password() {
        let adapter = Arc::new(FakeConnectionAdapter::new());
        adapter.set_probe_result(true);
        let manager = JumphostManager::new(adapter, disabled_config());
        let candidate = JumphostConfig {
            enabled: true,
            host: "bastion".into(),
            port: 22,
            username: "admin".into(),
            password_encrypted: "enc:v1:abc".into(),
        };
        manager.set(candidate).await.unwrap();
        assert_eq!(manager.get().password_encrypted, "***");
    }
}

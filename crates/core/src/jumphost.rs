//! Jumphost configuration (spec §3 "Jumphost Config", §4.2, §4.8).
//!
//! Process-wide singleton, mutable, guarded by an RW-mutex at the adapter
//! layer (spec §5). `JumphostConfig` itself is a plain value type; the
//! live-probe precondition lives in `netorch-adapters`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumphostConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password_encrypted: String,
}

impl Default for JumphostConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: 22,
            username: String::new(),
            password_encrypted: String::new(),
        }
    }
}

impl JumphostConfig {
    /// Same config with the password redacted, for `JumphostGet` (spec §6).
    pub fn redacted(&self) -> Self {
        Self {
            password_encrypted: if self.password_encrypted.is_empty() {
                String::new()
            } else {
                "***".to_string()
            },
            ..self.clone()
        }
    }
}

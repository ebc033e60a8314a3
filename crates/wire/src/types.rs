//! Wire-level DTOs that don't already live in `netorch-core`. Kept
//! separate from `netorch-storage::FileInfo` so this crate only ever
//! depends on `netorch-core` (spec §6 "transport-agnostic API").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Text,
    Json,
}

/// One entry from `FilesList` (spec §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub device_name: String,
    pub sanitised_command: String,
    pub timestamp: String,
    pub kind: FileKind,
}

/// What a progress subscriber receives immediately on subscribe, before
/// the live event tail (spec §6 "server first sends a snapshot of
/// current Job + all DeviceJobStates").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub job: netorch_core::Job,
    pub device_states: Vec<netorch_core::DeviceJobState>,
}

//! Replies to each [`crate::Request`] variant (spec §6), plus the error
//! envelope every verb can return instead.

use netorch_core::{DeviceId, Job, JobId, JumphostConfig, TopologySnapshot};
use serde::{Deserialize, Serialize};

use crate::types::FileEntry;

/// One entry of the §7 error taxonomy, carried by name so the adapter can
/// decide retry/display behaviour without string-matching a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Auth,
    Transport,
    Storage,
    Crypto,
    JumphostProbe,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    JobCreated { job_id: JobId },
    Job { job: Option<Job> },
    JobStopped { stopped: bool, disconnected_device_ids: Vec<DeviceId> },
    Files { files: Vec<FileEntry> },
    FileContents { bytes: Vec<u8> },
    Topology { snapshot: Option<TopologySnapshot> },
    Jumphost { config: JumphostConfig },
    JumphostUpdated { enabled: bool },
    Error { kind: ErrorKind, message: String },
}

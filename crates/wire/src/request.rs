//! The nine verbs of the external API (spec §6), as a transport-agnostic
//! request enum. The HTTP/WebSocket adapter that frames these over a
//! socket is out of scope; this type is what it would carry.

use netorch_core::{ConnectionMode, DeviceId, JobId, JumphostConfig};
use serde::{Deserialize, Serialize};

use crate::types::FileKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    JobsCreate {
        device_ids: Vec<DeviceId>,
        commands: Vec<String>,
        batch_size: usize,
        devices_per_hour: u32,
        connection_mode: ConnectionMode,
    },
    JobsGet {
        job_id: JobId,
    },
    JobsLatest,
    JobsStop {
        job_id: JobId,
    },
    FilesList {
        kind: FileKind,
    },
    FileRead {
        path: String,
    },
    TopologyBuild,
    TopologyLatest,
    JumphostGet,
    JumphostSet {
        config: JumphostConfig,
    },
}

//! Progress events published by the Progress Bus (spec §3 "ProgressEvent",
//! §4.5, §6 "Progress channel").

use crate::device::DeviceId;
use crate::job::{CommandStatus, DeviceStatus, JobId, JobStatus};
use serde::{Deserialize, Serialize};

/// Tagged union over the event kinds a subscriber can receive. `job_id`,
/// `seq`, and `ts` are carried on every variant (spec §3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    JobStatus {
        job_id: JobId,
        seq: u64,
        ts_ms: u64,
        status: JobStatus,
    },
    DeviceStatus {
        job_id: JobId,
        seq: u64,
        ts_ms: u64,
        device_id: DeviceId,
        device_name: String,
        status: DeviceStatus,
        error: Option<String>,
    },
    CommandStatus {
        job_id: JobId,
        seq: u64,
        ts_ms: u64,
        device_id: DeviceId,
        device_name: String,
        command: String,
        cmd_index: usize,
        cmd_total: usize,
        status: CommandStatus,
        execution_ms: Option<u64>,
        error: Option<String>,
    },
    Log {
        job_id: JobId,
        seq: u64,
        ts_ms: u64,
        message: String,
    },
    /// Emitted exactly once when the job reaches a terminal status; the
    /// per-job topic closes immediately after (spec §4.5 "Cancellation").
    Terminal {
        job_id: JobId,
        seq: u64,
        ts_ms: u64,
        status: JobStatus,
    },
}

impl ProgressEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            ProgressEvent::JobStatus { job_id, .. }
            | ProgressEvent::DeviceStatus { job_id, .. }
            | ProgressEvent::CommandStatus { job_id, .. }
            | ProgressEvent::Log { job_id, .. }
            | ProgressEvent::Terminal { job_id, .. } => *job_id,
        }
    }

    pub fn seq(&self) -> u64 {
        match self {
            ProgressEvent::JobStatus { seq, .. }
            | ProgressEvent::DeviceStatus { seq, .. }
            | ProgressEvent::CommandStatus { seq, .. }
            | ProgressEvent::Log { seq, .. }
            | ProgressEvent::Terminal { seq, .. } => *seq,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Terminal { .. })
    }
}

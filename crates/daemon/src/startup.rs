//! Daemon startup (SPEC_FULL.md "Restart recovery", spec §4.4, §9 "the
//! orchestrator never resumes jobs across restarts"). Grounded in the
//! teacher's `lifecycle/startup.rs` shape — a single entry point that
//! opens storage, runs one-time recovery, and reports what it did —
//! minus the lock-file/socket bring-up the teacher needs for its
//! Unix-socket listener, which this daemon has no counterpart for
//! (spec §1 "no HTTP/WebSocket framing" is out of scope here).

use netorch_core::{JobId, SystemClock};
use netorch_storage::{Storage, StorageOpenError};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to open storage: {0}")]
    Storage(#[from] StorageOpenError),
    #[error("restart recovery failed: {0}")]
    Recovery(#[from] netorch_core::StorageError),
}

pub struct StartupResult {
    pub storage: Storage,
    pub recovered_job_ids: Vec<JobId>,
}

/// Opens the data root and force-transitions any non-terminal job to
/// `failed` before the daemon accepts new work.
pub async fn startup(data_root: &Path) -> Result<StartupResult, StartupError> {
    std::fs::create_dir_all(data_root).map_err(|e| {
        StartupError::Storage(StorageOpenError::Artifact(netorch_storage::ArtifactError::Io(e)))
    })?;
    let storage = Storage::open(data_root)?;

    let recovered_job_ids = netorch_engine::recover_on_restart(&storage.jobs, &SystemClock)?;
    if recovered_job_ids.is_empty() {
        info!("no non-terminal jobs found at startup");
    } else {
        warn!(count = recovered_job_ids.len(), "force-failed non-terminal jobs from a previous run");
    }

    Ok(StartupResult { storage, recovered_job_ids })
}

//! Graceful shutdown draining (SPEC_FULL.md "Graceful shutdown
//! draining"): ask the Job Manager to stop every non-terminal job, then
//! wait up to `drain_timeout` for their scheduler tasks to reach a
//! terminal state before the process exits. Grounded in the teacher's
//! `engine/runtime/signal.rs` best-effort-cleanup-before-exit pattern.

use netorch_adapters::ConnectionAdapter;
use netorch_core::Clock;
use netorch_engine::{DeviceDirectory, JobManager};
use netorch_storage::JobStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub async fn drain<A, D, C>(
    job_manager: &JobManager<A, D, C>,
    job_store: &JobStore,
    drain_timeout: Duration,
    clock: &C,
) where
    A: ConnectionAdapter,
    D: DeviceDirectory,
    C: Clock,
{
    let active: Vec<_> = job_store
        .jobs_since(0)
        .unwrap_or_default()
        .into_iter()
        .filter(|j| !j.status.is_terminal())
        .collect();

    if active.is_empty() {
        info!("shutdown: no active jobs to drain");
        return;
    }

    info!(count = active.len(), "shutdown: requesting stop for active jobs");
    for job in &active {
        if let Err(err) = job_manager.stop_job(job.id) {
            warn!(job_id = %job.id, error = %err, "failed to request job stop during shutdown");
        }
    }

    let deadline = clock.now() + drain_timeout;
    loop {
        let still_active = job_store
            .jobs_since(0)
            .unwrap_or_default()
            .into_iter()
            .filter(|j| !j.status.is_terminal())
            .count();
        if still_active == 0 {
            info!("shutdown: all jobs drained");
            return;
        }
        if clock.now() >= deadline {
            warn!(still_active, "shutdown: drain timeout elapsed with jobs still active");
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}


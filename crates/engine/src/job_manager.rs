//! Job Manager (spec §4.8, C8): the `JobsCreate`/`JobsGet`/`JobsLatest`/
//! `JobsStop` surface. Creation persists a pending job and hands off to
//! the Batch Scheduler without blocking; the scheduler runs on its own
//! spawned task.

use crate::cancel::CancelToken;
use crate::device_directory::DeviceDirectory;
use crate::progress_bus::ProgressBus;
use crate::scheduler::BatchScheduler;
use netorch_adapters::ConnectionAdapter;
use netorch_core::{Clock, ConnectionMode, DeviceId, DeviceJobState, Job, JobId, ValidationError};
use netorch_storage::JobStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of `JobsStop` (spec §6).
pub struct StopOutcome {
    pub stopped: bool,
    pub disconnected_device_ids: Vec<DeviceId>,
}

pub struct JobManager<A: ConnectionAdapter, D: DeviceDirectory, C: Clock> {
    scheduler: Arc<BatchScheduler<A, D, C>>,
    job_store: Arc<JobStore>,
    directory: Arc<D>,
    bus: Arc<ProgressBus<C>>,
    clock: C,
    cancel_tokens: Mutex<HashMap<JobId, CancelToken>>,
}

impl<A: ConnectionAdapter, D: DeviceDirectory, C: Clock> JobManager<A, D, C> {
    pub fn new(
        scheduler: Arc<BatchScheduler<A, D, C>>,
        job_store: Arc<JobStore>,
        directory: Arc<D>,
        bus: Arc<ProgressBus<C>>,
        clock: C,
    ) -> Self {
        Self { scheduler, job_store, directory, bus, clock, cancel_tokens: Mutex::new(HashMap::new()) }
    }

    /// `JobsCreate` (spec §6). Validates input, persists a `pending` job,
    /// spawns the scheduler, and returns immediately.
    pub fn create_job(
        &self,
        device_ids: Vec<DeviceId>,
        commands: Vec<String>,
        batch_size: usize,
        devices_per_hour: u32,
        connection_mode: ConnectionMode,
    ) -> Result<JobId, ValidationError>
    where
        A: 'static,
        D: 'static,
        C: 'static,
    {
        if commands.is_empty() {
            return Err(ValidationError::new("commands must not be empty"));
        }
        if device_ids.is_empty() {
            return Err(ValidationError::new("device_ids must not be empty"));
        }

        let job = Job::new(device_ids, commands, batch_size, devices_per_hour, connection_mode, &self.clock);
        let device_states: Vec<DeviceJobState> = job
            .device_ids
            .iter()
            .map(|&id| {
                let name = self.directory.lookup(id).map(|d| d.name).unwrap_or_else(|| id.to_string());
                DeviceJobState::new(id, name, &job.commands)
            })
            .collect();

        self.job_store
            .create_job(&job, &device_states)
            .map_err(|err| ValidationError::new(format!("failed to persist job: {err}")))?;

        let cancel = CancelToken::new();
        self.cancel_tokens.lock().insert(job.id, cancel.clone());

        let scheduler = Arc::clone(&self.scheduler);
        let job_id = job.id;
        tokio::spawn(async move {
            scheduler.run(job, cancel).await;
        });

        Ok(job_id)
    }

    /// `JobsGet` (spec §6).
    pub fn get_job(&self, job_id: JobId) -> Result<Option<Job>, netorch_core::StorageError> {
        self.job_store.get_job(job_id).map_err(Into::into)
    }

    /// `JobsLatest` (spec §6).
    pub fn latest_job(&self) -> Result<Option<Job>, netorch_core::StorageError> {
        self.job_store.latest_job().map_err(Into::into)
    }

    /// `JobsStop` (spec §6, §4.8): sets the cancel flag; the actual
    /// transition happens at the scheduler's next cancellation point.
    /// Disconnection of in-flight sessions happens naturally at the
    /// scheduler's own disconnect phase once it observes the flag.
    pub fn stop_job(&self, job_id: JobId) -> Result<StopOutcome, netorch_core::StorageError> {
        let Some(job) = self.job_store.get_job(job_id)? else {
            return Ok(StopOutcome { stopped: false, disconnected_device_ids: Vec::new() });
        };
        if job.status.is_terminal() {
            return Ok(StopOutcome { stopped: false, disconnected_device_ids: Vec::new() });
        }

        if let Some(cancel) = self.cancel_tokens.lock().get(&job_id) {
            cancel.request();
        }
        self.job_store.set_cancel_requested(job_id)?;
        self.bus.publish_log(job_id, "stop requested; cancelling at the next batch boundary".to_string());

        let connected: Vec<DeviceId> = self
            .job_store
            .device_states(job_id)?
            .into_iter()
            .filter(|s| matches!(s.status, netorch_core::DeviceStatus::Connected | netorch_core::DeviceStatus::Executing))
            .map(|s| s.device_id)
            .collect();

        Ok(StopOutcome { stopped: true, disconnected_device_ids: connected })
    }
}

/// Restart recovery entry point (spec §4.4, §9 "the orchestrator never
/// resumes jobs across restarts"): call once at process start, before
/// accepting new jobs.
pub fn recover_on_restart(job_store: &JobStore, clock: &impl Clock) -> Result<Vec<JobId>, netorch_core::StorageError> {
    job_store.fail_non_terminal_jobs_on_restart(clock.epoch_ms()).map_err(Into::into)
}

//! Batch Scheduler (spec §4.7, C7) — the centrepiece. Partitions a job's
//! devices into batches, runs connect/execute/disconnect phases per
//! batch with bounded parallelism, and rate-limits between batches.

use crate::cancel::CancelToken;
use crate::device_directory::DeviceDirectory;
use crate::executor;
use crate::progress_bus::ProgressBus;
use netorch_adapters::{ConnectionAdapter, ConnectionManager, JumphostManager};
use netorch_core::{
    Clock, CommandState, CommandStatus, ConnectionMode, ConnectionType, DeviceId, DeviceJobState,
    DeviceStatus, Job, JobStatus,
};
use netorch_storage::{ArtifactStore, JobStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct BatchScheduler<A: ConnectionAdapter, D: DeviceDirectory, C: Clock> {
    connections: Arc<ConnectionManager<A>>,
    directory: Arc<D>,
    job_store: Arc<JobStore>,
    artifacts: Arc<ArtifactStore>,
    bus: Arc<ProgressBus<C>>,
    jumphost: Arc<JumphostManager<A>>,
    clock: C,
    connect_timeout: Duration,
    read_timeout: Duration,
}

enum ConnectOutcome {
    Connected { connection_type: ConnectionType },
    Failed { error: String },
}

impl<A: ConnectionAdapter, D: DeviceDirectory, C: Clock> BatchScheduler<A, D, C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connections: Arc<ConnectionManager<A>>,
        directory: Arc<D>,
        job_store: Arc<JobStore>,
        artifacts: Arc<ArtifactStore>,
        bus: Arc<ProgressBus<C>>,
        jumphost: Arc<JumphostManager<A>>,
        clock: C,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Self {
        Self { connections, directory, job_store, artifacts, bus, jumphost, clock, connect_timeout, read_timeout }
    }

    fn persist_status(&self, job: &Job) {
        if let Err(err) = self.job_store.update_job_status(
            job.id,
            job.status,
            job.started_at_ms,
            job.ended_at_ms,
            job.completed_devices,
            job.failed_devices,
            job.progress_percent,
            job.cancel_requested,
        ) {
            tracing::warn!(job_id = %job.id, error = %err, "failed to persist job status transition");
        }
    }

    /// Runs a job to a terminal state. Intended to be spawned
    /// (`tokio::spawn`) by the Job Manager immediately after
    /// `create_job` persists the pending row — `JobsCreate` itself never
    /// blocks on this (spec §4.8).
    pub async fn run(self: Arc<Self>, mut job: Job, cancel: CancelToken) {
        job.status = JobStatus::Connecting;
        job.started_at_ms = Some(self.clock.epoch_ms());
        self.persist_status(&job);
        self.bus.publish_job_status(job.id, job.status);

        let mut device_states: HashMap<DeviceId, DeviceJobState> = job
            .device_ids
            .iter()
            .map(|&id| {
                let name = self.directory.lookup(id).map(|d| d.name).unwrap_or_else(|| id.to_string());
                (id, DeviceJobState::new(id, name, &job.commands))
            })
            .collect();

        let batches: Vec<Vec<DeviceId>> = job.device_ids.chunks(job.batch_size).map(|c| c.to_vec()).collect();
        let batch_count = batches.len();
        let mut cancelled = false;

        for (batch_index, batch) in batches.into_iter().enumerate() {
            if cancel.is_requested() {
                cancelled = true;
                break;
            }

            let worker_count = match job.connection_mode {
                ConnectionMode::Parallel => batch.len().max(1),
                ConnectionMode::Sequential => 1,
            };

            let connected = self.run_connect_phase(&job, &batch, worker_count, &mut device_states).await;

            if job.status == JobStatus::Connecting {
                job.status = JobStatus::Running;
                self.persist_status(&job);
                self.bus.publish_job_status(job.id, job.status);
            }

            self.run_execute_phase(&job, &connected, worker_count, &mut device_states).await;
            self.run_disconnect_phase(&job, &batch, &mut device_states).await;

            self.recompute_and_publish_aggregates(&mut job, &device_states);

            let is_last_batch = batch_index + 1 == batch_count;
            if !is_last_batch && job.devices_per_hour > 0 {
                let delay = Duration::from_secs_f64(
                    (job.batch_size as f64 / job.devices_per_hour as f64) * 3600.0,
                );
                if self.sleep_cancellable(delay, &cancel).await {
                    cancelled = true;
                    break;
                }
            } else if cancel.is_requested() {
                cancelled = true;
                break;
            }
        }

        job.ended_at_ms = Some(self.clock.epoch_ms());
        if cancelled {
            job.status = JobStatus::Stopping;
            self.persist_status(&job);
            self.bus.publish_job_status(job.id, job.status);
            job.status = JobStatus::Cancelled;
        } else if job.total_devices > 0 && job.failed_devices == job.total_devices {
            job.status = JobStatus::Failed;
        } else {
            job.status = JobStatus::Completed;
        }
        self.persist_status(&job);
        self.bus.publish_terminal(job.id, job.status);
    }

    /// Sleeps in short polling increments so a cancellation request or a
    /// fake clock's `advance` is observed promptly (spec §4.7e "the sleep
    /// is cancellable"; spec §8 S4 "shortened in tests by an injectable
    /// clock"). Returns `true` if interrupted by cancellation.
    async fn sleep_cancellable(&self, delay: Duration, cancel: &CancelToken) -> bool {
        let deadline = self.clock.now() + delay;
        const POLL: Duration = Duration::from_millis(20);
        while self.clock.now() < deadline {
            if cancel.is_requested() {
                return true;
            }
            tokio::time::sleep(POLL).await;
        }
        cancel.is_requested()
    }

    async fn run_connect_phase(
        &self,
        job: &Job,
        batch: &[DeviceId],
        worker_count: usize,
        device_states: &mut HashMap<DeviceId, DeviceJobState>,
    ) -> Vec<DeviceId> {
        let mut connected = Vec::new();
        for chunk in batch.chunks(worker_count) {
            let mut tasks = tokio::task::JoinSet::new();
            for &device_id in chunk {
                let Some(state) = device_states.get(&device_id) else { continue };
                let device_name = state.device_name.clone();
                self.bus.publish_device_status(
                    job.id,
                    device_id,
                    device_name,
                    DeviceStatus::Connecting,
                    None,
                );

                let connections = Arc::clone(&self.connections);
                let directory = Arc::clone(&self.directory);
                let jumphost = Arc::clone(&self.jumphost);
                let connect_timeout = self.connect_timeout;
                tasks.spawn(async move {
                    let outcome = match directory.lookup(device_id) {
                        None => ConnectOutcome::Failed { error: "device not found in inventory".to_string() },
                        Some(snapshot) => {
                            let candidate = jumphost.get_unredacted();
                            let jumphost_ref = candidate.enabled.then_some(&candidate);
                            match connections.connect(&snapshot, jumphost_ref, connect_timeout).await {
                                Ok(()) => ConnectOutcome::Connected {
                                    connection_type: if candidate.enabled {
                                        ConnectionType::Jumphosted
                                    } else {
                                        ConnectionType::Real
                                    },
                                },
                                Err(err) => ConnectOutcome::Failed { error: err.0 },
                            }
                        }
                    };
                    (device_id, outcome)
                });
            }

            while let Some(result) = tasks.join_next().await {
                let Ok((device_id, outcome)) = result else { continue };
                let Some(state) = device_states.get_mut(&device_id) else { continue };
                match outcome {
                    ConnectOutcome::Connected { connection_type } => {
                        state.status = DeviceStatus::Connected;
                        state.connection_type = Some(connection_type);
                        self.bus.publish_device_status(
                            job.id,
                            device_id,
                            state.device_name.clone(),
                            DeviceStatus::Connected,
                            None,
                        );
                        connected.push(device_id);
                    }
                    ConnectOutcome::Failed { error } => {
                        state.status = DeviceStatus::ConnectionFailed;
                        state.error = Some(error.clone());
                        self.bus.publish_device_status(
                            job.id,
                            device_id,
                            state.device_name.clone(),
                            DeviceStatus::ConnectionFailed,
                            Some(error.clone()),
                        );
                        // Spec §4.7 step 3b: every command on an
                        // unreachable device is recorded failed, not
                        // left pending, so the Job Store reflects the
                        // outcome without the execute phase ever running.
                        for (cmd_index, command_state) in state.commands.iter_mut().enumerate() {
                            command_state.status = CommandStatus::Failed;
                            command_state.error = Some("connection failed".to_string());
                            let result = CommandState {
                                command: command_state.command.clone(),
                                status: CommandStatus::Failed,
                                execution_ms: None,
                                error: Some("connection failed".to_string()),
                                output_bytes: 0,
                            };
                            if let Err(err) = self.job_store.append_result(
                                job.id,
                                device_id,
                                &command_state.command,
                                cmd_index,
                                &result,
                                self.clock.epoch_ms(),
                            ) {
                                tracing::warn!(job_id = %job.id, %device_id, error = %err, "failed to persist connection-failure command row");
                            }
                        }
                    }
                }
                if let Err(err) = self.job_store.upsert_device_state(job.id, state) {
                    tracing::warn!(job_id = %job.id, %device_id, error = %err, "failed to persist device state");
                }
            }
        }
        connected
    }

    async fn run_execute_phase(
        &self,
        job: &Job,
        connected: &[DeviceId],
        worker_count: usize,
        device_states: &mut HashMap<DeviceId, DeviceJobState>,
    ) {
        for chunk in connected.chunks(worker_count) {
            let mut tasks = tokio::task::JoinSet::new();
            for &device_id in chunk {
                let Some(state) = device_states.get(&device_id) else { continue };
                let device_name = state.device_name.clone();
                self.bus.publish_device_status(
                    job.id,
                    device_id,
                    device_name.clone(),
                    DeviceStatus::Executing,
                    None,
                );

                let bus = Arc::clone(&self.bus);
                let connections = Arc::clone(&self.connections);
                let job_store = Arc::clone(&self.job_store);
                let artifacts = Arc::clone(&self.artifacts);
                let clock = self.clock.clone();
                let job_id = job.id;
                let commands = job.commands.clone();
                let read_timeout = self.read_timeout;

                tasks.spawn(async move {
                    let cmd_total = commands.len();
                    let mut results = Vec::with_capacity(cmd_total);
                    for (cmd_index, command) in commands.iter().enumerate() {
                        let outcome = executor::execute(
                            &bus,
                            &connections,
                            &job_store,
                            &artifacts,
                            &clock,
                            job_id,
                            device_id,
                            &device_name,
                            command,
                            cmd_index,
                            cmd_total,
                            read_timeout,
                        )
                        .await;
                        results.push(outcome.state);
                    }
                    (device_id, results)
                });
            }

            while let Some(result) = tasks.join_next().await {
                let Ok((device_id, results)) = result else { continue };
                let Some(state) = device_states.get_mut(&device_id) else { continue };
                state.commands = results;
                let all_succeeded_or_failed = state
                    .commands
                    .iter()
                    .all(|c| matches!(c.status, CommandStatus::Success | CommandStatus::Failed));
                if all_succeeded_or_failed {
                    state.status = DeviceStatus::Completed;
                }
                self.bus.publish_device_status(
                    job.id,
                    device_id,
                    state.device_name.clone(),
                    state.status,
                    None,
                );
                if let Err(err) = self.job_store.upsert_device_state(job.id, state) {
                    tracing::warn!(job_id = %job.id, %device_id, error = %err, "failed to persist device state");
                }
            }
        }
    }

    async fn run_disconnect_phase(
        &self,
        job: &Job,
        batch: &[DeviceId],
        device_states: &mut HashMap<DeviceId, DeviceJobState>,
    ) {
        for &device_id in batch {
            let Some(state) = device_states.get(&device_id) else { continue };
            self.bus.publish_device_status(
                job.id,
                device_id,
                state.device_name.clone(),
                DeviceStatus::Disconnecting,
                None,
            );
            let _ = self.connections.disconnect(device_id).await;
            let Some(state) = device_states.get(&device_id) else { continue };
            self.bus.publish_device_status(job.id, device_id, state.device_name.clone(), state.status, state.error.clone());
        }
    }

    fn recompute_and_publish_aggregates(&self, job: &mut Job, device_states: &HashMap<DeviceId, DeviceJobState>) {
        let completed = device_states.values().filter(|s| s.status == DeviceStatus::Completed).count();
        let failed = device_states
            .values()
            .filter(|s| matches!(s.status, DeviceStatus::ConnectionFailed | DeviceStatus::Failed))
            .count();
        job.completed_devices = completed;
        job.failed_devices = failed;
        job.recompute_progress();
        self.persist_status(job);
        self.bus.publish_log(
            job.id,
            format!(
                "progress: {}/{} devices completed, {} failed ({}%)",
                job.completed_devices, job.total_devices, job.failed_devices, job.progress_percent
            ),
        );
    }
}

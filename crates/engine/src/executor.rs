//! Command Executor (spec §4.6, C6): runs one command against an
//! already-connected session and records the outcome. Never owns the
//! session — ownership stays with the Batch Scheduler (§4.7).

use crate::progress_bus::ProgressBus;
use netorch_adapters::ConnectionManager;
use netorch_core::{Clock, CommandState, CommandStatus, DeviceId, JobId};
use netorch_storage::JobStore;
use std::time::Duration;

/// Outcome of one command, already persisted and published.
pub struct CommandOutcome {
    pub state: CommandState,
    pub text_output: String,
}

/// Runs a single command and records text+json artifacts, a Job Store
/// row, and a `command_status` progress event. Failures never propagate
/// as errors — spec §4.6 step 4 is explicit that one failed command does
/// not abort the remaining commands for that device.
#[allow(clippy::too_many_arguments)]
pub async fn execute<A, C>(
    bus: &ProgressBus<C>,
    connections: &ConnectionManager<A>,
    job_store: &JobStore,
    artifacts: &netorch_storage::ArtifactStore,
    clock: &C,
    job_id: JobId,
    device_id: DeviceId,
    device_name: &str,
    command: &str,
    cmd_index: usize,
    cmd_total: usize,
    read_timeout: Duration,
) -> CommandOutcome
where
    A: netorch_adapters::ConnectionAdapter,
    C: Clock,
{
    bus.publish_command_status(
        job_id,
        device_id,
        device_name.to_string(),
        command.to_string(),
        cmd_index,
        cmd_total,
        CommandStatus::Running,
        None,
        None,
    );

    let started = clock.now();
    let result = connections.send(device_id, command, read_timeout).await;
    let execution_ms = clock.now().saturating_duration_since(started).as_millis() as u64;

    let (state, text_output) = match result {
        Ok(output) => {
            let json = serde_json::json!({
                "device": device_name,
                "command": command,
                "output": output,
                "execution_ms": execution_ms,
            });
            let write_result = artifacts.write(device_name, command, &output, &json, chrono_now(clock));
            match write_result {
                Ok(_) => {
                    let state = CommandState {
                        command: command.to_string(),
                        status: CommandStatus::Success,
                        execution_ms: Some(execution_ms),
                        error: None,
                        output_bytes: output.len(),
                    };
                    (state, output)
                }
                Err(err) => {
                    let storage_err: netorch_core::StorageError = err.into();
                    let state = CommandState {
                        command: command.to_string(),
                        status: CommandStatus::Failed,
                        execution_ms: Some(execution_ms),
                        error: Some(storage_err.0),
                        output_bytes: 0,
                    };
                    (state, String::new())
                }
            }
        }
        Err(err) => {
            let state = CommandState {
                command: command.to_string(),
                status: CommandStatus::Failed,
                execution_ms: Some(execution_ms),
                error: Some(err.0),
                output_bytes: 0,
            };
            (state, String::new())
        }
    };

    if let Err(err) = job_store.append_result(job_id, device_id, command, cmd_index, &state, clock.epoch_ms()) {
        tracing::warn!(%job_id, %device_id, error = %err, "failed to persist command result row");
    }

    bus.publish_command_status(
        job_id,
        device_id,
        device_name.to_string(),
        command.to_string(),
        cmd_index,
        cmd_total,
        state.status,
        state.execution_ms,
        state.error.clone(),
    );

    CommandOutcome { state, text_output }
}

fn chrono_now<C: Clock>(clock: &C) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_millis(clock.epoch_ms() as i64).unwrap_or_else(chrono::Utc::now)
}

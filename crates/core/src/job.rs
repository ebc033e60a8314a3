//! Job identifier, state machine, and per-device/per-command tracking
//! (spec §3 "Job", "DeviceJobState", "CommandState"; §4.8 state machine).

use crate::clock::Clock;
use crate::device::DeviceId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a job instance.
    pub struct JobId("job-");
}

/// Job lifecycle status (spec §4.8 state machine). `Completed`,
/// `Cancelled`, and `Failed` are terminal; a terminal job never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Connecting,
    Running,
    Stopping,
    Completed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    JobStatus {
        Pending => "pending",
        Connecting => "connecting",
        Running => "running",
        Stopping => "stopping",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

/// Connect/execute worker fan-out for a batch (spec §4.7 tie-breaks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    Parallel,
    Sequential,
}

/// Status of a device within one job run (spec §3 "DeviceJobState").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Pending,
    Connecting,
    Connected,
    Executing,
    Disconnecting,
    Completed,
    ConnectionFailed,
    Failed,
}

crate::simple_display! {
    DeviceStatus {
        Pending => "pending",
        Connecting => "connecting",
        Connected => "connected",
        Executing => "executing",
        Disconnecting => "disconnecting",
        Completed => "completed",
        ConnectionFailed => "connection_failed",
        Failed => "failed",
    }
}

impl DeviceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeviceStatus::Completed | DeviceStatus::ConnectionFailed | DeviceStatus::Failed)
    }
}

/// How a device's session reached the target (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Real,
    Jumphosted,
}

/// Status of a single command execution (spec §3 "CommandState").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Running,
    Success,
    Failed,
}

crate::simple_display! {
    CommandStatus {
        Pending => "pending",
        Running => "running",
        Success => "success",
        Failed => "failed",
    }
}

/// Per-command record within a `DeviceJobState`. Invariant:
/// `status == Success` iff an artifact file exists for it (enforced by
/// the Command Executor, not by this type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandState {
    pub command: String,
    pub status: CommandStatus,
    pub execution_ms: Option<u64>,
    pub error: Option<String>,
    pub output_bytes: usize,
}

impl CommandState {
    pub fn pending(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            status: CommandStatus::Pending,
            execution_ms: None,
            error: None,
            output_bytes: 0,
        }
    }
}

/// Per-device, per-job state (spec §3 "DeviceJobState"). Status is
/// monotonic except for terminal transitions (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceJobState {
    pub device_id: DeviceId,
    pub device_name: String,
    pub status: DeviceStatus,
    pub commands: Vec<CommandState>,
    pub connection_type: Option<ConnectionType>,
    pub error: Option<String>,
}

impl DeviceJobState {
    pub fn new(device_id: DeviceId, device_name: String, commands: &[String]) -> Self {
        Self {
            device_id,
            device_name,
            status: DeviceStatus::Pending,
            commands: commands.iter().map(CommandState::pending).collect(),
            connection_type: None,
            error: None,
        }
    }

    pub fn total_commands(&self) -> usize {
        self.commands.len()
    }

    pub fn completed_commands(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c.status, CommandStatus::Success | CommandStatus::Failed))
            .count()
    }
}

/// Clamp a requested batch size into `[2, min(50, n_devices)]`, with the
/// `n_devices == 1` degenerate case producing `1` (spec §4.7 tie-breaks).
pub fn clamp_batch_size(requested: usize, n_devices: usize) -> usize {
    if n_devices <= 1 {
        return n_devices;
    }
    let ceiling = n_devices.min(50);
    requested.clamp(2, ceiling)
}

/// Round `100 * completed / total` to the nearest integer, per the
/// `progress_percent` invariant (spec §3 "Job").
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (((completed * 100) as f64 / total as f64).round() as u8).min(100)
}

/// A job instance (spec §3 "Job").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at_ms: u64,
    pub started_at_ms: Option<u64>,
    pub ended_at_ms: Option<u64>,
    pub device_ids: Vec<DeviceId>,
    pub commands: Vec<String>,
    pub batch_size: usize,
    pub devices_per_hour: u32,
    pub connection_mode: ConnectionMode,
    pub cancel_requested: bool,
    pub total_devices: usize,
    pub completed_devices: usize,
    pub failed_devices: usize,
    pub progress_percent: u8,
}

impl Job {
    /// Build a new pending job. `device_ids` is de-duplicated
    /// (first occurrence wins) and `batch_size` is clamped, both per
    /// spec §4.7 tie-breaks.
    pub fn new(
        device_ids: Vec<DeviceId>,
        commands: Vec<String>,
        requested_batch_size: usize,
        devices_per_hour: u32,
        connection_mode: ConnectionMode,
        clock: &impl Clock,
    ) -> Self {
        let mut seen = std::collections::HashSet::new();
        let device_ids: Vec<DeviceId> =
            device_ids.into_iter().filter(|id| seen.insert(*id)).collect();
        let total_devices = device_ids.len();
        let batch_size = clamp_batch_size(requested_batch_size, total_devices);
        Self {
            id: JobId::new(),
            status: JobStatus::Pending,
            created_at_ms: clock.epoch_ms(),
            started_at_ms: None,
            ended_at_ms: None,
            device_ids,
            commands,
            batch_size,
            devices_per_hour,
            connection_mode,
            cancel_requested: false,
            total_devices,
            completed_devices: 0,
            failed_devices: 0,
            progress_percent: 0,
        }
    }

    /// Recompute `progress_percent` from the aggregate counters (spec §3
    /// invariant). Call after any change to `completed_devices`.
    pub fn recompute_progress(&mut self) {
        self.progress_percent = progress_percent(self.completed_devices, self.total_devices);
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        set {
            id: JobId = JobId::new(),
            status: JobStatus = JobStatus::Pending,
            created_at_ms: u64 = 0,
            started_at_ms: Option<u64> = None,
            ended_at_ms: Option<u64> = None,
            device_ids: Vec<DeviceId> = Vec::new(),
            commands: Vec<String> = Vec::new(),
            batch_size: usize = 2,
            devices_per_hour: u32 = 0,
            connection_mode: ConnectionMode = ConnectionMode::Parallel,
            cancel_requested: bool = false,
            total_devices: usize = 0,
            completed_devices: usize = 0,
            failed_devices: usize = 0,
            progress_percent: u8 = 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    #[test]
    fn clamp_batch_size_promotes_one_to_two() {
        assert_eq!(clamp_batch_size(1, 10), 2);
    }

    #[test]
    fn clamp_batch_size_caps_at_fifty() {
        assert_eq!(clamp_batch_size(80, 200), 50);
    }

    #[test]
    fn clamp_batch_size_degenerates_for_single_device() {
        assert_eq!(clamp_batch_size(10, 1), 1);
        assert_eq!(clamp_batch_size(10, 0), 0);
    }

    #[test]
    fn clamp_batch_size_respects_small_fleets() {
        // N_devices = 3, requested 10 -> clamp ceiling is min(50, 3) = 3
        assert_eq!(clamp_batch_size(10, 3), 3);
    }

    #[test]
    fn progress_percent_rounds_to_nearest() {
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(5, 5), 100);
    }

    #[test]
    fn new_job_dedups_device_ids_keeping_first_occurrence() {
        let clock = FakeClock::new();
        let d1 = DeviceId::from_string("dev-a");
        let d2 = DeviceId::from_string("dev-b");
        let job = Job::new(
            vec![d1, d2, d1],
            vec!["show version".to_string()],
            2,
            0,
            ConnectionMode::Parallel,
            &clock,
        );
        assert_eq!(job.device_ids, vec![d1, d2]);
        assert_eq!(job.total_devices, 2);
    }
}

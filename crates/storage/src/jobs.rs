//! Job Store (spec §4.4, C4): durable job metadata and per-command
//! results in an embedded SQL store.

use netorch_core::{
    CommandState, CommandStatus, ConnectionMode, ConnectionType, DeviceId, DeviceJobState,
    DeviceStatus, Job, JobId, JobStatus,
};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<JobStoreError> for netorch_core::StorageError {
    fn from(e: JobStoreError) -> Self {
        netorch_core::StorageError(e.to_string())
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL,
    started_at_ms INTEGER,
    ended_at_ms INTEGER,
    device_ids_json TEXT NOT NULL,
    commands_json TEXT NOT NULL,
    batch_size INTEGER NOT NULL,
    devices_per_hour INTEGER NOT NULL,
    connection_mode TEXT NOT NULL,
    cancel_requested INTEGER NOT NULL,
    total_devices INTEGER NOT NULL,
    completed_devices INTEGER NOT NULL,
    failed_devices INTEGER NOT NULL,
    progress_percent INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS device_job_states (
    job_id TEXT NOT NULL REFERENCES jobs(id),
    device_id TEXT NOT NULL,
    device_name TEXT NOT NULL,
    status TEXT NOT NULL,
    connection_type TEXT,
    error TEXT,
    PRIMARY KEY (job_id, device_id)
);

CREATE TABLE IF NOT EXISTS command_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL REFERENCES jobs(id),
    device_id TEXT NOT NULL,
    command TEXT NOT NULL,
    cmd_index INTEGER NOT NULL,
    status TEXT NOT NULL,
    execution_ms INTEGER,
    error TEXT,
    output_bytes INTEGER NOT NULL,
    recorded_at_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_command_results_job ON command_results(job_id, device_id, cmd_index);
"#;

/// Embedded-SQL job store. Single process, single writer per job by
/// caller discipline (spec §4.4, §5): the scheduler task owning a job is
/// the only writer for that job's rows.
pub struct JobStore {
    conn: Mutex<Connection>,
}

impl JobStore {
    pub fn open(path: &Path) -> Result<Self, JobStoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, JobStoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn create_job(&self, job: &Job, device_states: &[DeviceJobState]) -> Result<(), JobStoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO jobs (id, status, created_at_ms, started_at_ms, ended_at_ms,
                device_ids_json, commands_json, batch_size, devices_per_hour,
                connection_mode, cancel_requested, total_devices, completed_devices,
                failed_devices, progress_percent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                job.id.as_str(),
                job.status.to_string(),
                job.created_at_ms,
                job.started_at_ms,
                job.ended_at_ms,
                serde_json::to_string(&job.device_ids)?,
                serde_json::to_string(&job.commands)?,
                job.batch_size as i64,
                job.devices_per_hour as i64,
                connection_mode_str(job.connection_mode),
                job.cancel_requested as i64,
                job.total_devices as i64,
                job.completed_devices as i64,
                job.failed_devices as i64,
                job.progress_percent as i64,
            ],
        )?;
        for state in device_states {
            insert_device_state(&conn, job.id, state)?;
        }
        Ok(())
    }

    pub fn update_job_status(
        &self,
        job_id: JobId,
        status: JobStatus,
        started_at_ms: Option<u64>,
        ended_at_ms: Option<u64>,
        completed_devices: usize,
        failed_devices: usize,
        progress_percent: u8,
        cancel_requested: bool,
    ) -> Result<(), JobStoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE jobs SET status = ?2, started_at_ms = COALESCE(?3, started_at_ms),
                ended_at_ms = COALESCE(?4, ended_at_ms), completed_devices = ?5,
                failed_devices = ?6, progress_percent = ?7, cancel_requested = ?8
             WHERE id = ?1",
            params![
                job_id.as_str(),
                status.to_string(),
                started_at_ms,
                ended_at_ms,
                completed_devices as i64,
                failed_devices as i64,
                progress_percent as i64,
                cancel_requested as i64,
            ],
        )?;
        if changed == 0 {
            return Err(JobStoreError::NotFound(job_id));
        }
        Ok(())
    }

    pub fn set_cancel_requested(&self, job_id: JobId) -> Result<(), JobStoreError> {
        let conn = self.conn.lock();
        let changed =
            conn.execute("UPDATE jobs SET cancel_requested = 1 WHERE id = ?1", params![job_id.as_str()])?;
        if changed == 0 {
            return Err(JobStoreError::NotFound(job_id));
        }
        Ok(())
    }

    pub fn upsert_device_state(&self, job_id: JobId, state: &DeviceJobState) -> Result<(), JobStoreError> {
        let conn = self.conn.lock();
        insert_device_state(&conn, job_id, state)
    }

    pub fn append_result(
        &self,
        job_id: JobId,
        device_id: DeviceId,
        command: &str,
        cmd_index: usize,
        result: &CommandState,
        recorded_at_ms: u64,
    ) -> Result<(), JobStoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO command_results (job_id, device_id, command, cmd_index, status,
                execution_ms, error, output_bytes, recorded_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                job_id.as_str(),
                device_id.as_str(),
                command,
                cmd_index as i64,
                result.status.to_string(),
                result.execution_ms.map(|v| v as i64),
                result.error,
                result.output_bytes as i64,
                recorded_at_ms,
            ],
        )?;
        Ok(())
    }

    pub fn get_job(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let conn = self.conn.lock();
        row_to_job(&conn, job_id.as_str())
    }

    pub fn latest_job(&self) -> Result<Option<Job>, JobStoreError> {
        let conn = self.conn.lock();
        let id: Option<String> = conn
            .query_row("SELECT id FROM jobs ORDER BY created_at_ms DESC LIMIT 1", [], |r| r.get(0))
            .optional()?;
        match id {
            Some(id) => row_to_job(&conn, &id),
            None => Ok(None),
        }
    }

    pub fn jobs_since(&self, ts_ms: u64) -> Result<Vec<Job>, JobStoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM jobs WHERE created_at_ms >= ?1 ORDER BY created_at_ms ASC")?;
        let ids: Vec<String> = stmt
            .query_map(params![ts_ms as i64], |r| r.get(0))?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        ids.into_iter()
            .filter_map(|id| row_to_job(&conn, &id).transpose())
            .collect()
    }

    /// Device states for a job, in insertion order of device_id.
    pub fn device_states(&self, job_id: JobId) -> Result<Vec<DeviceJobState>, JobStoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT device_id, device_name, status, connection_type, error
             FROM device_job_states WHERE job_id = ?1",
        )?;
        let rows = stmt.query_map(params![job_id.as_str()], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, Option<String>>(3)?,
                r.get::<_, Option<String>>(4)?,
            ))
        })?;
        let mut rows_data = Vec::new();
        for row in rows {
            rows_data.push(row?);
        }
        let mut out = Vec::new();
        for (device_id, device_name, status, conn_type, error) in rows_data {
            let commands = command_states_for_device(&conn, job_id.as_str(), &device_id)?;
            out.push(DeviceJobState {
                device_id: DeviceId::from_string(device_id),
                device_name,
                status: parse_device_status(&status),
                commands,
                connection_type: conn_type.as_deref().map(parse_connection_type),
                error,
            });
        }
        Ok(out)
    }

    /// Restart recovery (spec §4.4): force every non-terminal job to
    /// `failed`, reason "orchestrator restart". Called once at process
    /// start; the orchestrator never resumes jobs across restarts.
    pub fn fail_non_terminal_jobs_on_restart(&self, ended_at_ms: u64) -> Result<Vec<JobId>, JobStoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id FROM jobs WHERE status NOT IN ('completed', 'failed', 'cancelled')",
        )?;
        let ids: Vec<String> = stmt.query_map([], |r| r.get(0))?.collect::<Result<_, _>>()?;
        drop(stmt);
        for id in &ids {
            conn.execute(
                "UPDATE jobs SET status = 'failed', ended_at_ms = ?2 WHERE id = ?1",
                params![id, ended_at_ms as i64],
            )?;
        }
        Ok(ids.into_iter().map(JobId::from_string).collect())
    }
}

fn command_states_for_device(
    conn: &Connection,
    job_id: &str,
    device_id: &str,
) -> Result<Vec<CommandState>, JobStoreError> {
    let mut stmt = conn.prepare(
        "SELECT command, status, execution_ms, error, output_bytes
         FROM command_results WHERE job_id = ?1 AND device_id = ?2 ORDER BY cmd_index ASC",
    )?;
    let rows = stmt.query_map(params![job_id, device_id], |r| {
        Ok(CommandState {
            command: r.get(0)?,
            status: parse_command_status(&r.get::<_, String>(1)?),
            execution_ms: r.get::<_, Option<i64>>(2)?.map(|v| v as u64),
            error: r.get(3)?,
            output_bytes: r.get::<_, i64>(4)? as usize,
        })
    })?;
    rows.collect::<Result<_, _>>().map_err(JobStoreError::from)
}

fn insert_device_state(conn: &Connection, job_id: JobId, state: &DeviceJobState) -> Result<(), JobStoreError> {
    conn.execute(
        "INSERT INTO device_job_states (job_id, device_id, device_name, status, connection_type, error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(job_id, device_id) DO UPDATE SET
            status = excluded.status,
            connection_type = excluded.connection_type,
            error = excluded.error",
        params![
            job_id.as_str(),
            state.device_id.as_str(),
            state.device_name,
            state.status.to_string(),
            state.connection_type.map(connection_type_str),
            state.error,
        ],
    )?;
    Ok(())
}

fn connection_mode_str(mode: ConnectionMode) -> &'static str {
    match mode {
        ConnectionMode::Parallel => "parallel",
        ConnectionMode::Sequential => "sequential",
    }
}

fn parse_connection_mode(s: &str) -> ConnectionMode {
    match s {
        "sequential" => ConnectionMode::Sequential,
        _ => ConnectionMode::Parallel,
    }
}

fn connection_type_str(t: ConnectionType) -> &'static str {
    match t {
        ConnectionType::Real => "real",
        ConnectionType::Jumphosted => "jumphosted",
    }
}

fn parse_connection_type(s: &str) -> ConnectionType {
    match s {
        "jumphosted" => ConnectionType::Jumphosted,
        _ => ConnectionType::Real,
    }
}

fn parse_device_status(s: &str) -> DeviceStatus {
    match s {
        "connecting" => DeviceStatus::Connecting,
        "connected" => DeviceStatus::Connected,
        "executing" => DeviceStatus::Executing,
        "disconnecting" => DeviceStatus::Disconnecting,
        "completed" => DeviceStatus::Completed,
        "connection_failed" => DeviceStatus::ConnectionFailed,
        "failed" => DeviceStatus::Failed,
        _ => DeviceStatus::Pending,
    }
}

fn parse_job_status(s: &str) -> JobStatus {
    match s {
        "connecting" => JobStatus::Connecting,
        "running" => JobStatus::Running,
        "stopping" => JobStatus::Stopping,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        "cancelled" => JobStatus::Cancelled,
        _ => JobStatus::Pending,
    }
}

fn parse_command_status(s: &str) -> CommandStatus {
    match s {
        "running" => CommandStatus::Running,
        "success" => CommandStatus::Success,
        "failed" => CommandStatus::Failed,
        _ => CommandStatus::Pending,
    }
}

fn row_to_job(conn: &Connection, id: &str) -> Result<Option<Job>, JobStoreError> {
    let row = conn
        .query_row(
            "SELECT id, status, created_at_ms, started_at_ms, ended_at_ms, device_ids_json,
                commands_json, batch_size, devices_per_hour, connection_mode, cancel_requested,
                total_devices, completed_devices, failed_devices, progress_percent
             FROM jobs WHERE id = ?1",
            params![id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, Option<i64>>(3)?,
                    r.get::<_, Option<i64>>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                    r.get::<_, i64>(7)?,
                    r.get::<_, i64>(8)?,
                    r.get::<_, String>(9)?,
                    r.get::<_, i64>(10)?,
                    r.get::<_, i64>(11)?,
                    r.get::<_, i64>(12)?,
                    r.get::<_, i64>(13)?,
                    r.get::<_, i64>(14)?,
                ))
            },
        )
        .optional()?;
    let Some((
        id,
        status,
        created_at_ms,
        started_at_ms,
        ended_at_ms,
        device_ids_json,
        commands_json,
        batch_size,
        devices_per_hour,
        connection_mode,
        cancel_requested,
        total_devices,
        completed_devices,
        failed_devices,
        progress_percent,
    )) = row
    else {
        return Ok(None);
    };
    Ok(Some(Job {
        id: JobId::from_string(id),
        status: parse_job_status(&status),
        created_at_ms: created_at_ms as u64,
        started_at_ms: started_at_ms.map(|v| v as u64),
        ended_at_ms: ended_at_ms.map(|v| v as u64),
        device_ids: serde_json::from_str(&device_ids_json)?,
        commands: serde_json::from_str(&commands_json)?,
        batch_size: batch_size as usize,
        devices_per_hour: devices_per_hour as u32,
        connection_mode: parse_connection_mode(&connection_mode),
        cancel_requested: cancel_requested != 0,
        total_devices: total_devices as usize,
        completed_devices: completed_devices as usize,
        failed_devices: failed_devices as usize,
        progress_percent: progress_percent as u8,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use netorch_core::{ConnectionMode, FakeClock};

    fn sample_job() -> Job {
        let clock = FakeClock::new();
        Job::new(
            vec![DeviceId::from_string("dev-a"), DeviceId::from_string("dev-b")],
            vec!["show version".to_string()],
            2,
            0,
            ConnectionMode::Parallel,
            &clock,
        )
    }

    #[test]
    fn create_and_get_round_trips() {
        let store = JobStore::open_in_memory().unwrap();
        let job = sample_job();
        store.create_job(&job, &[]).unwrap();
        let fetched = store.get_job(job.id).unwrap().expect("job exists");
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.device_ids, job.device_ids);
        assert_eq!(fetched.status, JobStatus::Pending);
    }

    #[test]
    fn latest_job_returns_most_recently_created() {
        let store = JobStore::open_in_memory().unwrap();
        let j1 = sample_job();
        store.create_job(&j1, &[]).unwrap();
        let mut j2 = sample_job();
        j2.created_at_ms = j1.created_at_ms + 1000;
        store.create_job(&j2, &[]).unwrap();
        let latest = store.latest_job().unwrap().expect("a job exists");
        assert_eq!(latest.id, j2.id);
    }

    #[test]
    fn restart_recovery_fails_non_terminal_jobs() {
        let store = JobStore::open_in_memory().unwrap();
        let job = sample_job();
        store.create_job(&job, &[]).unwrap();
        store
            .update_job_status(job.id, JobStatus::Running, Some(1), None, 0, 0, 0, false)
            .unwrap();
        let failed = store.fail_non_terminal_jobs_on_restart(999).unwrap();
        assert_eq!(failed, vec![job.id]);
        let reloaded = store.get_job(job.id).unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Failed);
    }

    #[test]
    fn append_result_preserves_input_command_order() {
        let store = JobStore::open_in_memory().unwrap();
        let job = sample_job();
        store.create_job(&job, &[]).unwrap();
        let device = DeviceId::from_string("dev-a");
        for (i, cmd) in ["show version", "show ospf neighbor"].iter().enumerate() {
            let result = CommandState {
                command: cmd.to_string(),
                status: CommandStatus::Success,
                execution_ms: Some(10),
                error: None,
                output_bytes: 100,
            };
            store.append_result(job.id, device, cmd, i, &result, 1000 + i as u64).unwrap();
        }
        let conn = store.conn.lock();
        let mut stmt = conn
            .prepare("SELECT command FROM command_results WHERE job_id = ?1 ORDER BY cmd_index")
            .unwrap();
        let commands: Vec<String> =
            stmt.query_map(params![job.id.as_str()], |r| r.get(0)).unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(commands, vec!["show version".to_string(), "show ospf neighbor".to_string()]);
    }
}

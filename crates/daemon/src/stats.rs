//! Cheap in-process counters (SPEC_FULL.md "Health/metrics summary"):
//! no metrics transport is in scope, but an operator attaching to the
//! running process wants a snapshot of what it's done. Grounded in the
//! teacher's own usage-metrics collector, minus the JSONL persistence
//! and token-cost accounting this domain has no use for.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Stats {
    jobs_started: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    devices_connected: AtomicU64,
    commands_run: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub jobs_started: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub devices_connected: u64,
    pub commands_run: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_job_started(&self) {
        self.jobs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_device_connected(&self) {
        self.devices_connected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command_run(&self) {
        self.commands_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            jobs_started: self.jobs_started.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            devices_connected: self.devices_connected.load(Ordering::Relaxed),
            commands_run: self.commands_run.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_counts() {
        let stats = Stats::new();
        stats.record_job_started();
        stats.record_job_started();
        stats.record_job_completed();
        stats.record_device_connected();
        stats.record_command_run();
        stats.record_command_run();
        stats.record_command_run();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.jobs_started, 2);
        assert_eq!(snapshot.jobs_completed, 1);
        assert_eq!(snapshot.jobs_failed, 0);
        assert_eq!(snapshot.devices_connected, 1);
        assert_eq!(snapshot.commands_run, 3);
    }
}

//! Progress Bus (spec §4.5, C5): an in-process pub/sub keyed by job id.
//!
//! Each job gets its own topic: a bounded replay buffer plus a
//! `tokio::sync::broadcast` channel for the live tail. A slow subscriber
//! that falls behind the broadcast channel's capacity observes a
//! `Lagged` gap, which [`Subscription::recv`] turns into a synthetic
//! `log` event carrying a `lag` marker rather than silently skipping —
//! the publisher itself never blocks on a slow reader (spec §5).

use netorch_core::{Clock, JobId, ProgressEvent, SystemClock};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Replay buffer size on late subscription (spec §4.5 default).
pub const DEFAULT_REPLAY_BUFFER: usize = 256;

struct Topic {
    seq: u64,
    replay: VecDeque<ProgressEvent>,
    sender: broadcast::Sender<ProgressEvent>,
}

impl Topic {
    fn new(replay_capacity: usize) -> Self {
        // Broadcast channel capacity tracks the replay buffer size: a
        // receiver that falls more than `replay_capacity` events behind
        // the live tail is the "slow subscriber" the spec allows to lag.
        let (sender, _) = broadcast::channel(replay_capacity.max(1));
        Self { seq: 0, replay: VecDeque::with_capacity(replay_capacity), sender }
    }

    fn push(&mut self, event: ProgressEvent, replay_capacity: usize) {
        if self.replay.len() == replay_capacity {
            self.replay.pop_front();
        }
        self.replay.push_back(event.clone());
        // No receivers is not an error here: publishing to an unwatched
        // job is normal (e.g. nobody has subscribed yet).
        let _ = self.sender.send(event);
    }
}

/// A live subscription to one job's event stream.
pub struct Subscription {
    job_id: JobId,
    inner: broadcast::Receiver<ProgressEvent>,
}

impl Subscription {
    /// Await the next event. Returns `None` once the topic has closed
    /// (spec §4.5 "subscribers must handle topic close as end-of-stream").
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.inner.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Some(ProgressEvent::Log {
                        job_id: self.job_id,
                        seq: 0,
                        ts_ms: 0,
                        message: format!("lag: {skipped} events dropped"),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// In-process pub/sub over per-job `ProgressEvent` topics.
pub struct ProgressBus<C: Clock = SystemClock> {
    clock: C,
    replay_capacity: usize,
    topics: Mutex<HashMap<JobId, Topic>>,
}

impl<C: Clock> ProgressBus<C> {
    pub fn new(clock: C, replay_capacity: usize) -> Self {
        Self { clock, replay_capacity, topics: Mutex::new(HashMap::new()) }
    }

    /// Assigns the next sequence number and enqueues the event under a
    /// single lock acquisition, so concurrent publishers for the same job
    /// (spec §4.5 "strictly monotonic sequence numbers assigned at
    /// publish") can never have their seq assignment and their enqueue
    /// order diverge.
    fn publish(&self, job_id: JobId, build: impl FnOnce(u64, u64) -> ProgressEvent) -> ProgressEvent {
        let mut topics = self.topics.lock();
        let topic = topics.entry(job_id).or_insert_with(|| Topic::new(self.replay_capacity));
        topic.seq += 1;
        let event = build(topic.seq, self.clock.epoch_ms());
        topic.push(event.clone(), self.replay_capacity);
        event
    }

    pub fn publish_job_status(&self, job_id: JobId, status: netorch_core::JobStatus) -> ProgressEvent {
        self.publish(job_id, |seq, ts_ms| ProgressEvent::JobStatus { job_id, seq, ts_ms, status })
    }

    pub fn publish_device_status(
        &self,
        job_id: JobId,
        device_id: netorch_core::DeviceId,
        device_name: String,
        status: netorch_core::DeviceStatus,
        error: Option<String>,
    ) -> ProgressEvent {
        self.publish(job_id, |seq, ts_ms| ProgressEvent::DeviceStatus {
            job_id,
            seq,
            ts_ms,
            device_id,
            device_name,
            status,
            error,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn publish_command_status(
        &self,
        job_id: JobId,
        device_id: netorch_core::DeviceId,
        device_name: String,
        command: String,
        cmd_index: usize,
        cmd_total: usize,
        status: netorch_core::CommandStatus,
        execution_ms: Option<u64>,
        error: Option<String>,
    ) -> ProgressEvent {
        self.publish(job_id, |seq, ts_ms| ProgressEvent::CommandStatus {
            job_id,
            seq,
            ts_ms,
            device_id,
            device_name,
            command,
            cmd_index,
            cmd_total,
            status,
            execution_ms,
            error,
        })
    }

    pub fn publish_log(&self, job_id: JobId, message: String) -> ProgressEvent {
        self.publish(job_id, |seq, ts_ms| ProgressEvent::Log { job_id, seq, ts_ms, message })
    }

    /// Emits the `terminal` event and closes the topic: the sender is
    /// dropped from the registry, so every live `Subscription` observes
    /// `Closed` on its next `recv` (spec §4.5 "Cancellation").
    pub fn publish_terminal(&self, job_id: JobId, status: netorch_core::JobStatus) -> ProgressEvent {
        let event = self.publish(job_id, |seq, ts_ms| ProgressEvent::Terminal { job_id, seq, ts_ms, status });
        self.topics.lock().remove(&job_id);
        event
    }

    /// Subscribe to a job's topic, returning the current replay buffer
    /// (oldest first) and a live tail subscription (spec §4.5 "a bounded
    /// replay buffer... on late subscription").
    pub fn subscribe(&self, job_id: JobId) -> (Vec<ProgressEvent>, Subscription) {
        let mut topics = self.topics.lock();
        let topic = topics.entry(job_id).or_insert_with(|| Topic::new(self.replay_capacity));
        let replay: Vec<ProgressEvent> = topic.replay.iter().cloned().collect();
        let receiver = topic.sender.subscribe();
        (replay, Subscription { job_id, inner: receiver })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netorch_core::{DeviceId, DeviceStatus, FakeClock, JobStatus};

    fn job_id() -> JobId {
        JobId::from_string("job-test")
    }

    #[tokio::test]
    async fn events_are_strictly_ordered_and_monotonic() {
        let bus = ProgressBus::new(FakeClock::new(), DEFAULT_REPLAY_BUFFER);
        let (_, mut sub) = bus.subscribe(job_id());
        bus.publish_job_status(job_id(), JobStatus::Connecting);
        bus.publish_job_status(job_id(), JobStatus::Running);

        let first = sub.recv().await.unwrap();
        let second = sub.recv().await.unwrap();
        assert!(first.seq() < second.seq());
    }

    #[tokio::test]
    async fn late_subscriber_receives_replay_buffer() {
        let bus = ProgressBus::new(FakeClock::new(), DEFAULT_REPLAY_BUFFER);
        bus.publish_job_status(job_id(), JobStatus::Connecting);
        bus.publish_device_status(
            job_id(),
            DeviceId::from_string("d1"),
            "r1".to_string(),
            DeviceStatus::Connecting,
            None,
        );

        let (replay, _sub) = bus.subscribe(job_id());
        assert_eq!(replay.len(), 2);
    }

    #[tokio::test]
    async fn terminal_event_closes_the_topic() {
        let bus = ProgressBus::new(FakeClock::new(), DEFAULT_REPLAY_BUFFER);
        let (_, mut sub) = bus.subscribe(job_id());
        bus.publish_terminal(job_id(), JobStatus::Completed);

        assert!(sub.recv().await.unwrap().is_terminal());
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn independent_jobs_have_independent_sequences() {
        let bus = ProgressBus::new(FakeClock::new(), DEFAULT_REPLAY_BUFFER);
        let job_a = JobId::from_string("job-a");
        let job_b = JobId::from_string("job-b");
        bus.publish_job_status(job_a, JobStatus::Connecting);
        bus.publish_job_status(job_a, JobStatus::Running);
        let event = bus.publish_job_status(job_b, JobStatus::Connecting);
        assert_eq!(event.seq(), 1);
    }
}

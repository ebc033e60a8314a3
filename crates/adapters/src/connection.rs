//! Connection Manager (spec §4.2, C2): session lifecycle over SSH or
//! Telnet, optional jumphost tunnelling, one live session per device.

use async_trait::async_trait;
use netorch_core::{DeviceId, DeviceSnapshot, JumphostConfig, PlatformHint, TransportError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A live session to a single device. Owned exclusively by whichever
/// caller holds it — the Batch Scheduler, never the executor (spec §4.6).
#[async_trait]
pub trait SessionHandle: Send + Sync {
    async fn send(&self, command: &str, read_timeout: Duration) -> Result<String, TransportError>;
    async fn close(&self) -> Result<(), TransportError>;
}

/// Establishes and tears down device sessions. Implementations are
/// cheap to clone (`Arc`-backed) and safe to share across tasks.
#[async_trait]
pub trait ConnectionAdapter: Send + Sync + 'static {
    async fn connect(
        &self,
        device: &DeviceSnapshot,
        jumphost: Option<&JumphostConfig>,
        connect_timeout: Duration,
    ) -> Result<Box<dyn SessionHandle>, TransportError>;

    /// Live connect+authenticate+close against a candidate jumphost,
    /// no command executed (spec §4.2 `probe_jumphost`).
    async fn probe_jumphost(&self, config: &JumphostConfig, connect_timeout: Duration) -> bool;
}

/// Default connect timeout (spec §4.2).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default read timeout (spec §4.2).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-device registry of live sessions. Single active session per
/// device; `connect` replaces any prior session for that device id. A
/// per-device lock serialises concurrent connect attempts for the same
/// device (spec §4.2 "thread-safe... concurrent connect calls... serialise").
pub struct ConnectionManager<A: ConnectionAdapter> {
    adapter: A,
    sessions: Mutex<HashMap<DeviceId, Arc<tokio::sync::Mutex<Box<dyn SessionHandle>>>>>,
    locks: Mutex<HashMap<DeviceId, Arc<tokio::sync::Mutex<()>>>>,
    platform_cache: Mutex<HashMap<DeviceId, PlatformHint>>,
}

impl<A: ConnectionAdapter> ConnectionManager<A> {
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            sessions: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            platform_cache: Mutex::new(HashMap::new()),
        }
    }

    fn device_lock(&self, device_id: DeviceId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.lock().entry(device_id).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))).clone()
    }

    pub async fn connect(
        &self,
        device: &DeviceSnapshot,
        jumphost: Option<&JumphostConfig>,
        connect_timeout: Duration,
    ) -> Result<(), TransportError> {
        let lock = self.device_lock(device.id);
        let _guard = lock.lock().await;

        // Platform sniffing for `auto` devices is the adapter's job (it
        // owns the banner/`show version` probe); the cache here just
        // remembers the choice for the session's lifetime.
        if matches!(device.platform, PlatformHint::Auto) {
            self.platform_cache.lock().entry(device.id).or_insert(PlatformHint::Auto);
        }

        let session = self.adapter.connect(device, jumphost, connect_timeout).await?;
        self.sessions.lock().insert(device.id, Arc::new(tokio::sync::Mutex::new(session)));
        Ok(())
    }

    pub async fn disconnect(&self, device_id: DeviceId) -> Result<(), TransportError> {
        let session = self.sessions.lock().remove(&device_id);
        if let Some(session) = session {
            let session = session.lock().await;
            // Idempotent: tolerate an already-closed transport.
            let _ = session.close().await;
        }
        Ok(())
    }

    pub fn is_connected(&self, device_id: DeviceId) -> bool {
        self.sessions.lock().contains_key(&device_id)
    }

    pub async fn send(
        &self,
        device_id: DeviceId,
        command: &str,
        read_timeout: Duration,
    ) -> Result<String, TransportError> {
        let session = self
            .sessions
            .lock()
            .get(&device_id)
            .cloned()
            .ok_or_else(|| TransportError(format!("no active session for device {device_id}")))?;
        let session = session.lock().await;
        session.send(command, read_timeout).await
    }

    pub async fn probe_jumphost(&self, config: &JumphostConfig, connect_timeout: Duration) -> bool {
        self.adapter.probe_jumphost(config, connect_timeout).await
    }
}

/// Fake connection adapter for tests (spec-agnostic: fully
/// programmable per-device outcome, no real sockets). Grounded on the
/// call-recording fake adapter pattern used elsewhere in this codebase.
#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Clone)]
    pub enum ConnectionCall {
        Connect { device_id: DeviceId, jumphosted: bool },
        Send { device_id: DeviceId, command: String },
        Close { device_id: DeviceId },
        ProbeJumphost { host: String },
    }

    struct FakeState {
        calls: Vec<ConnectionCall>,
        connect_should_fail: HashMap<DeviceId, String>,
        responses: HashMap<DeviceId, VecDeque<Result<String, String>>>,
        probe_result: bool,
    }

    #[derive(Clone)]
    pub struct FakeConnectionAdapter {
        inner: Arc<Mutex<FakeState>>,
    }

    impl Default for FakeConnectionAdapter {
        fn default() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeState {
                    calls: Vec::new(),
                    connect_should_fail: HashMap::new(),
                    responses: HashMap::new(),
                    probe_result: true,
                })),
            }
        }
    }

    impl FakeConnectionAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<ConnectionCall> {
            self.inner.lock().calls.clone()
        }

        pub fn fail_connect(&self, device_id: DeviceId, reason: &str) {
            self.inner.lock().connect_should_fail.insert(device_id, reason.to_string());
        }

        pub fn queue_response(&self, device_id: DeviceId, response: Result<String, String>) {
            self.inner.lock().responses.entry(device_id).or_default().push_back(response);
        }

        pub fn set_probe_result(&self, result: bool) {
            self.inner.lock().probe_result = result;
        }
    }

    struct FakeSession {
        device_id: DeviceId,
        inner: Arc<Mutex<FakeState>>,
    }

    #[async_trait]
    impl SessionHandle for FakeSession {
        async fn send(&self, command: &str, _read_timeout: Duration) -> Result<String, TransportError> {
            let mut inner = self.inner.lock();
            inner.calls.push(ConnectionCall::Send { device_id: self.device_id, command: command.to_string() });
            match inner.responses.get_mut(&self.device_id).and_then(VecDeque::pop_front) {
                Some(Ok(output)) => Ok(output),
                Some(Err(reason)) => Err(TransportError(reason)),
                None => Ok(String::new()),
            }
        }

        async fn close(&self) -> Result<(), TransportError> {
            self.inner.lock().calls.push(ConnectionCall::Close { device_id: self.device_id });
            Ok(())
        }
    }

    #[async_trait]
    impl ConnectionAdapter for FakeConnectionAdapter {
        async fn connect(
            &self,
            device: &DeviceSnapshot,
            jumphost: Option<&JumphostConfig>,
            _connect_timeout: Duration,
        ) -> Result<Box<dyn SessionHandle>, TransportError> {
            let jumphosted = jumphost.map(|j| j.enabled).unwrap_or(false);
            let mut inner = self.inner.lock();
            inner.calls.push(ConnectionCall::Connect { device_id: device.id, jumphosted });
            if let Some(reason) = inner.connect_should_fail.get(&device.id).cloned() {
                return Err(TransportError(reason));
            }
            drop(inner);
            Ok(Box::new(FakeSession { device_id: device.id, inner: self.inner.clone() }))
        }

        async fn probe_jumphost(&self, config: &JumphostConfig, _connect_timeout: Duration) -> bool {
            let mut inner = self.inner.lock();
            inner.calls.push(ConnectionCall::ProbeJumphost { host: config.host.clone() });
            inner.probe_result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeConnectionAdapter;
    use super::*;
    use netorch_core::DeviceSnapshot;

    #[tokio::test]
    async fn connect_then_send_round_trips() {
        let adapter = FakeConnectionAdapter::new();
        let manager = ConnectionManager::new(adapter.clone());
        let device = DeviceSnapshot::test("dev-a", "r1");
        adapter.queue_response(device.id, Ok("Router Uptime is 1 day".to_string()));

        manager.connect(&device, None, DEFAULT_CONNECT_TIMEOUT).await.unwrap();
        assert!(manager.is_connected(device.id));
        let out = manager.send(device.id, "show version", DEFAULT_READ_TIMEOUT).await.unwrap();
        assert_eq!(out, "Router Uptime is 1 day");
    }

    #[tokio::test]
    async fn send_without_connect_fails() {
        let adapter = FakeConnectionAdapter::new();
        let manager = ConnectionManager::new(adapter);
        let device_id = DeviceId::from_string("dev-missing");
        let result = manager.send(device_id, "show version", DEFAULT_READ_TIMEOUT).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let adapter = FakeConnectionAdapter::new();
        let manager = ConnectionManager::new(adapter);
        let device = DeviceSnapshot::test("dev-a", "r1");
        manager.connect(&device, None, DEFAULT_CONNECT_TIMEOUT).await.unwrap();
        manager.disconnect(device.id).await.unwrap();
        manager.disconnect(device.id).await.unwrap();
        assert!(!manager.is_connected(device.id));
    }

    #[tokio::test]
    async fn connect_failure_surfaces_transport_error() {
        let adapter = FakeConnectionAdapter::new();
        let manager = ConnectionManager::new(adapter.clone());
        let device = DeviceSnapshot::test("dev-a", "r1");
        adapter.fail_connect(device.id, "connection refused");
        let err = manager.connect(&device, None, DEFAULT_CONNECT_TIMEOUT).await.unwrap_err();
        assert!(err.0.contains("connection refused"));
        assert!(!manager.is_connected(device.id));
    }
}

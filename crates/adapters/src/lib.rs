// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! netorch-adapters: the side of the orchestrator that touches the
//! outside world — encrypted credentials at rest, and live SSH/Telnet
//! sessions to devices (optionally via a jumphost).

pub mod connection;
pub mod credentials;
pub mod jumphost_manager;
pub mod transport;

pub use connection::{ConnectionAdapter, ConnectionManager, SessionHandle, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
pub use credentials::CredentialStore;
pub use jumphost_manager::JumphostManager;
pub use transport::SshTelnetAdapter;

#[cfg(any(test, feature = "test-support"))]
pub use connection::fake::{ConnectionCall, FakeConnectionAdapter};

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! netorch-core: domain types shared across the orchestrator — ids, the
//! job state machine, device snapshots, progress events, and the
//! topology model.

pub mod macros;

pub mod clock;
pub mod device;
pub mod error;
pub mod event;
pub mod id;
pub mod job;
pub mod jumphost;
pub mod topology;

pub use clock::{Clock, FakeClock, SystemClock};
pub use device::{DeviceId, DeviceSnapshot, PlatformHint, Transport};
pub use error::{
    AuthError, Cancelled, CryptoError, JumphostProbeError, StorageError, TransportError,
    ValidationError,
};
pub use event::ProgressEvent;
#[cfg(any(test, feature = "test-support"))]
pub use job::JobBuilder;
pub use job::{
    clamp_batch_size, progress_percent, CommandState, CommandStatus, ConnectionMode,
    ConnectionType, DeviceJobState, DeviceStatus, Job, JobId, JobStatus,
};
pub use jumphost::JumphostConfig;
pub use topology::{link_id, Link, Node, TopologyMetadata, TopologySnapshot};

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! netorch-engine: the job-running machinery — progress fan-out, command
//! execution, batch scheduling, job lifecycle, and OSPF-derived topology
//! discovery (spec §4.5-§4.9).

pub mod cancel;
pub mod device_directory;
pub mod executor;
pub mod job_manager;
pub mod ospf_parse;
pub mod progress_bus;
pub mod scheduler;
pub mod topology_builder;

pub use cancel::CancelToken;
pub use device_directory::{DeviceDirectory, StaticDirectory};
pub use executor::CommandOutcome;
pub use job_manager::{recover_on_restart, JobManager, StopOutcome};
pub use progress_bus::{ProgressBus, Subscription, DEFAULT_REPLAY_BUFFER};
pub use scheduler::BatchScheduler;
pub use topology_builder::TopologyBuilder;

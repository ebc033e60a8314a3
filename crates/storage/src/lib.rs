// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! netorch-storage: the durable side of the orchestrator — job metadata
//! and per-command results in an embedded SQL store, command artifacts
//! on a rooted filesystem tree, and the topology graph.

pub mod artifacts;
pub mod jobs;
pub mod topology_store;

pub use artifacts::{classify, ArtifactError, ArtifactKind, ArtifactStore, CommandKind, FileInfo};
pub use jobs::{JobStore, JobStoreError};
pub use topology_store::{TopologyStore, TopologyStoreError};

use std::path::Path;

/// Bundles the three stores under one data root, matching the layout
/// the daemon's config module hands out (spec §4 "Data root").
pub struct Storage {
    pub artifacts: ArtifactStore,
    pub jobs: JobStore,
    pub topology: TopologyStore,
}

impl Storage {
    pub fn open(data_root: &Path) -> Result<Self, StorageOpenError> {
        let artifacts = ArtifactStore::new(data_root.join("artifacts"))?;
        let jobs = JobStore::open(&data_root.join("jobs.sqlite3"))?;
        let topology =
            TopologyStore::open(&data_root.join("topology.sqlite3"), &data_root.join("topology_snapshots"))?;
        Ok(Self { artifacts, jobs, topology })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageOpenError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Job(#[from] JobStoreError),
    #[error(transparent)]
    Topology(#[from] TopologyStoreError),
}

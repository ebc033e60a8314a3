//! The Batch Scheduler needs host/credential details for a device id, but
//! the core domain never owns that inventory (spec §3 "Device" lives in
//! the external inventory). `DeviceDirectory` is the seam: the daemon
//! wires a real implementation backed by whatever holds the fleet list;
//! tests use [`StaticDirectory`].

use netorch_core::{DeviceId, DeviceSnapshot};
use std::collections::HashMap;

pub trait DeviceDirectory: Send + Sync + 'static {
    fn lookup(&self, device_id: DeviceId) -> Option<DeviceSnapshot>;

    /// The full recognised fleet (spec §4.9 step 1: "authoritative set
    /// of recognised device names"), used by the Topology Builder to
    /// scan the artifact root.
    fn all(&self) -> Vec<DeviceSnapshot>;
}

/// Fixed-snapshot directory: good enough for a single job run where the
/// caller already resolved the relevant devices up front.
pub struct StaticDirectory {
    devices: HashMap<DeviceId, DeviceSnapshot>,
}

impl StaticDirectory {
    pub fn new(devices: Vec<DeviceSnapshot>) -> Self {
        Self { devices: devices.into_iter().map(|d| (d.id, d)).collect() }
    }
}

impl DeviceDirectory for StaticDirectory {
    fn lookup(&self, device_id: DeviceId) -> Option<DeviceSnapshot> {
        self.devices.get(&device_id).cloned()
    }

    fn all(&self) -> Vec<DeviceSnapshot> {
        self.devices.values().cloned().collect()
    }
}

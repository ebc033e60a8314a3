//! Topology Builder (spec §4.9, C9): turns the artifact root's latest
//! OSPF command outputs into a graph keyed by device name.

use crate::device_directory::DeviceDirectory;
use crate::ospf_parse::{parse_interface_brief, parse_neighbor_table, parse_network_lsa, parse_router_id, parse_router_lsa};
use netorch_core::{link_id, Clock, Link, Node, PlatformHint, TopologyMetadata, TopologySnapshot};
use netorch_storage::{classify, ArtifactKind, ArtifactStore, CommandKind, TopologyStore};
use std::collections::HashMap;
use std::sync::Arc;

const DISCOVERY_METHOD: &str = "ospf";

pub struct TopologyBuilder<D: DeviceDirectory, C: Clock> {
    artifacts: Arc<ArtifactStore>,
    store: Arc<TopologyStore>,
    directory: Arc<D>,
    clock: C,
}

struct DeviceInputs {
    name: String,
    country: String,
    platform: PlatformHint,
    router_id: Option<String>,
    router_lsa: Vec<crate::ospf_parse::RouterLsaEntry>,
    interfaces: HashMap<String, u32>,
    neighbors: Vec<crate::ospf_parse::NeighborEntry>,
}

impl<D: DeviceDirectory, C: Clock> TopologyBuilder<D, C> {
    pub fn new(artifacts: Arc<ArtifactStore>, store: Arc<TopologyStore>, directory: Arc<D>, clock: C) -> Self {
        Self { artifacts, store, directory, clock }
    }

    /// `TopologyBuild` (spec §6): runs the full discovery algorithm and
    /// persists the result.
    pub fn build(&self) -> Result<TopologySnapshot, netorch_core::StorageError> {
        let fleet = self.directory.all();
        let mut skipped_devices = Vec::new();
        let mut router_id_to_name: HashMap<String, String> = HashMap::new();
        let mut inputs: HashMap<String, DeviceInputs> = HashMap::new();

        // Step 1 (scan) + step 2 (router-id bijection).
        for device in &fleet {
            let router_id = self
                .latest_text(&device.name, CommandKind::OspfDatabaseRouter)
                .and_then(|text| parse_router_id(&text));
            if router_id.is_none() {
                skipped_devices.push(device.name.clone());
            } else if let Some(id) = &router_id {
                router_id_to_name.insert(id.clone(), device.name.clone());
            }

            let router_lsa = self
                .latest_text(&device.name, CommandKind::OspfDatabaseRouter)
                .map(|text| parse_router_lsa(&text))
                .unwrap_or_default();
            let interfaces: HashMap<String, u32> = self
                .latest_text(&device.name, CommandKind::OspfInterface)
                .map(|text| {
                    parse_interface_brief(&text).into_iter().map(|e| (e.interface, e.cost)).collect()
                })
                .unwrap_or_default();
            let neighbors = self
                .latest_text(&device.name, CommandKind::OspfNeighbor)
                .map(|text| parse_neighbor_table(&text))
                .unwrap_or_default();

            inputs.insert(
                device.name.clone(),
                DeviceInputs {
                    name: device.name.clone(),
                    country: device.country.clone(),
                    platform: device.platform,
                    router_id,
                    router_lsa,
                    interfaces,
                    neighbors,
                },
            );
        }

        // Step 4: network-LSA attached-router sets, keyed by DR address
        // (link_state_id), gathered across every device's own database
        // (a transit segment's network LSA may be self-originated by
        // any router on that segment).
        let mut network_lsa_members: HashMap<String, Vec<String>> = HashMap::new();
        for device in &fleet {
            if let Some(text) = self.latest_text(&device.name, CommandKind::OspfDatabaseNetwork) {
                for (link_state_id, routers) in parse_network_lsa(&text) {
                    network_lsa_members.entry(link_state_id).or_insert(routers);
                }
            }
        }

        let nodes: Vec<Node> = fleet
            .iter()
            .map(|d| Node { id: d.name.clone(), country: d.country.clone(), platform: d.platform })
            .collect();

        // Steps 3+4+6+7: emit links.
        let mut links = Vec::new();
        let mut pair_counters: HashMap<(String, String), u32> = HashMap::new();
        for device in &fleet {
            let Some(state) = inputs.get(&device.name) else { continue };
            let Some(self_router_id) = &state.router_id else { continue };

            // Router-LSA-derived peer set: point-to-point links name the
            // neighbor directly; transit links resolve through the
            // network LSA's attached-router set (spec §4.9 steps 3+4).
            let mut peers: Vec<(String, Option<u32>, Option<String>)> = Vec::new();
            for entry in &state.router_lsa {
                if entry.is_transit {
                    if let Some(members) = network_lsa_members.get(&entry.link_id) {
                        for router_id in members {
                            if router_id != self_router_id {
                                peers.push((router_id.clone(), entry.tos0_metric, entry.local_interface.clone()));
                            }
                        }
                    }
                } else {
                    peers.push((entry.link_id.clone(), entry.tos0_metric, entry.local_interface.clone()));
                }
            }

            // Neighbor-table-derived peers fill in the local interface
            // when the LSA didn't carry one, and are the sole source
            // when no router-LSA link matched (spec §4.9 step 6).
            for neighbor in &state.neighbors {
                if !peers.iter().any(|(id, _, _)| id == &neighbor.neighbor_router_id) {
                    peers.push((neighbor.neighbor_router_id.clone(), None, Some(neighbor.local_interface.clone())));
                } else {
                    for peer in peers.iter_mut().filter(|(id, _, iface)| {
                        id == &neighbor.neighbor_router_id && iface.is_none()
                    }) {
                        peer.2 = Some(neighbor.local_interface.clone());
                    }
                }
            }

            for (neighbor_router_id, metric, local_interface) in peers {
                let Some(target) = router_id_to_name.get(&neighbor_router_id) else { continue };
                let Some(local_interface) = local_interface else { continue };
                if crate::ospf_parse::is_management_interface(&local_interface) {
                    continue;
                }
                let cost = metric
                    .or_else(|| state.interfaces.get(&local_interface).copied())
                    .unwrap_or(1);

                let key = (device.name.clone(), target.clone());
                let counter = pair_counters.entry(key).or_insert(0);
                let id = link_id(&device.name, target, *counter);
                *counter += 1;

                links.push(Link {
                    id,
                    source: device.name.clone(),
                    target: target.clone(),
                    cost,
                    source_interface: local_interface,
                    target_interface: "unknown".to_string(),
                    status: "up".to_string(),
                });
            }
        }

        let metadata = TopologyMetadata {
            node_count: nodes.len(),
            link_count: links.len(),
            generated_at_ms: self.clock.epoch_ms(),
            discovery_method: DISCOVERY_METHOD.to_string(),
            sources: vec![
                "router_lsa".to_string(),
                "network_lsa".to_string(),
                "interface".to_string(),
                "neighbor".to_string(),
            ],
            skipped_devices,
        };

        let snapshot = TopologySnapshot { nodes, links, metadata };
        self.store.store(&snapshot)?;
        Ok(snapshot)
    }

    /// `TopologyLatest` (spec §6).
    pub fn latest(&self) -> Result<Option<TopologySnapshot>, netorch_core::StorageError> {
        self.store.latest().map_err(Into::into)
    }

    fn latest_text(&self, device_name: &str, kind: CommandKind) -> Option<String> {
        let files = self.artifacts.list(ArtifactKind::Text).ok()?;
        let file = files
            .into_iter()
            .filter(|f| f.device_name == device_name && classify(&f.sanitised_command) == kind)
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp))?;
        let bytes = self.artifacts.read(&file.path).ok()?;
        String::from_utf8(bytes).ok()
    }
}

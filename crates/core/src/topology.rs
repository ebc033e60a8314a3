//! Topology snapshot types (spec §3 "Topology snapshot", §4.9).

use crate::device::PlatformHint;
use serde::{Deserialize, Serialize};

/// A device as it appears in the topology graph. `id` is the device name
/// (spec §3: "Node: id=device name").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    pub country: String,
    pub platform: PlatformHint,
}

/// A directed OSPF adjacency. Link identity is `(source, target,
/// source_interface)`, not `(source, target)` — parallel physical links,
/// sub-interfaces, and bundle interfaces are first-class (spec §4.9 step 7).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Link {
    pub id: String,
    pub source: String,
    pub target: String,
    pub cost: u32,
    pub source_interface: String,
    pub target_interface: String,
    pub status: String,
}

/// Build a link id with a monotonic per-pair counter suffix, so multiple
/// parallel adjacencies between the same two devices coexist (spec §3
/// Topology snapshot invariant).
pub fn link_id(source: &str, target: &str, counter: u32) -> String {
    format!("{source}->{target}#{counter}")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopologyMetadata {
    pub node_count: usize,
    pub link_count: usize,
    pub generated_at_ms: u64,
    pub discovery_method: String,
    pub sources: Vec<String>,
    /// Devices that produced no usable router id and degraded to a
    /// node-only entry (spec §4.9 Failure clause).
    pub skipped_devices: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopologySnapshot {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
    pub metadata: TopologyMetadata,
}

impl TopologySnapshot {
    /// Invariant check used by tests (spec §8 properties 7 and 8):
    /// `(source, target, source_interface)` unique, and every link
    /// endpoint resolves to a node.
    pub fn check_invariants(&self) -> Result<(), String> {
        let node_ids: std::collections::HashSet<&str> =
            self.nodes.iter().map(|n| n.id.as_str()).collect();
        let mut seen = std::collections::HashSet::new();
        for link in &self.links {
            if link.source == link.target {
                return Err(format!("self-loop link: {}", link.id));
            }
            if !node_ids.contains(link.source.as_str()) {
                return Err(format!("dangling source: {}", link.source));
            }
            if !node_ids.contains(link.target.as_str()) {
                return Err(format!("dangling target: {}", link.target));
            }
            let key = (link.source.clone(), link.target.clone(), link.source_interface.clone());
            if !seen.insert(key) {
                return Err(format!(
                    "duplicate link key ({}, {}, {})",
                    link.source, link.target, link.source_interface
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> Node {
        Node { id: id.to_string(), country: "us".to_string(), platform: PlatformHint::IosXr }
    }

    fn link(source: &str, target: &str, iface: &str) -> Link {
        Link {
            id: link_id(source, target, 0),
            source: source.to_string(),
            target: target.to_string(),
            cost: 10,
            source_interface: iface.to_string(),
            target_interface: "unknown".to_string(),
            status: "up".to_string(),
        }
    }

    #[test]
    fn rejects_dangling_link_endpoint() {
        let snap = TopologySnapshot {
            nodes: vec![node("r1")],
            links: vec![link("r1", "r2", "Gi0/0/0/1")],
            metadata: TopologyMetadata {
                node_count: 1,
                link_count: 1,
                generated_at_ms: 0,
                discovery_method: "ospf".to_string(),
                sources: vec![],
                skipped_devices: vec![],
            },
        };
        assert!(snap.check_invariants().is_err());
    }

    #[test]
    fn allows_parallel_links_on_distinct_interfaces() {
        let snap = TopologySnapshot {
            nodes: vec![node("r1"), node("r2")],
            links: vec![link("r1", "r2", "Gi0/0/0/1"), link("r1", "r2", "Gi0/0/0/2.300")],
            metadata: TopologyMetadata {
                node_count: 2,
                link_count: 2,
                generated_at_ms: 0,
                discovery_method: "ospf".to_string(),
                sources: vec![],
                skipped_devices: vec![],
            },
        };
        assert!(snap.check_invariants().is_ok());
    }
}

//! Line-oriented parsers for the four OSPF CLI outputs the Topology
//! Builder consumes (spec §4.9 steps 2-6). None of these abort on a
//! malformed line — a parser returns whatever it could extract, and the
//! builder treats an empty result the same as a missing file.

/// One row parsed out of `show ospf database router` (spec §4.9 step 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterLsaEntry {
    pub link_id: String,
    pub is_transit: bool,
    pub tos0_metric: Option<u32>,
    pub local_interface: Option<String>,
}

/// Extract the originating router id from `show ospf database router`
/// output, e.g. `OSPF Router with ID (10.0.0.1) (Process ID 1)`.
pub fn parse_router_id(text: &str) -> Option<String> {
    for line in text.lines() {
        let line = line.trim();
        if let Some(after) = line.strip_prefix("OSPF Router with ID (") {
            if let Some(end) = after.find(')') {
                return Some(after[..end].to_string());
            }
        }
    }
    None
}

/// Parse router-LSA link entries (spec §4.9 step 3). Each `Link
/// connected to:` line starts a new entry; subsequent indented lines
/// supply its fields until the next such line or EOF.
pub fn parse_router_lsa(text: &str) -> Vec<RouterLsaEntry> {
    let mut entries = Vec::new();
    let mut current: Option<RouterLsaEntry> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if let Some(kind) = line.strip_prefix("Link connected to:") {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            let is_transit = kind.to_lowercase().contains("transit");
            current = Some(RouterLsaEntry {
                link_id: String::new(),
                is_transit,
                tos0_metric: None,
                local_interface: None,
            });
        } else if let Some(entry) = current.as_mut() {
            if let Some(value) = line.strip_prefix("Link ID:") {
                entry.link_id = value.trim().split_whitespace().next().unwrap_or("").to_string();
            } else if let Some(value) = line.strip_prefix("TOS 0 Metric:") {
                entry.tos0_metric = value.trim().parse().ok();
            } else if let Some(value) = line.strip_prefix("Local Interface:") {
                entry.local_interface = Some(value.trim().to_string());
            }
        }
    }
    if let Some(entry) = current.take() {
        entries.push(entry);
    }
    entries.retain(|e| !e.link_id.is_empty());
    entries
}

/// Parse network-LSA attached-router sets (spec §4.9 step 4): maps a
/// transit link's `link_state_id` (the DR address) to the routers on
/// that segment.
pub fn parse_network_lsa(text: &str) -> Vec<(String, Vec<String>)> {
    let mut out = Vec::new();
    let mut current_id: Option<String> = None;
    let mut current_routers: Vec<String> = Vec::new();

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if let Some(value) = line.strip_prefix("Link ID:") {
            if let Some(id) = current_id.take() {
                out.push((id, std::mem::take(&mut current_routers)));
            }
            current_id = value.trim().split_whitespace().next().map(str::to_string);
        } else if let Some(value) = line.strip_prefix("Attached Router:") {
            current_routers.push(value.trim().to_string());
        }
    }
    if let Some(id) = current_id {
        out.push((id, current_routers));
    }
    out
}

/// Per-interface row from `show ospf interface brief` (spec §4.9 step 5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceBriefEntry {
    pub interface: String,
    pub cost: u32,
}

/// Parse the interface-brief table. The header row (containing
/// `"Interface"`) is skipped; each remaining non-empty row is expected
/// to have the cost in the 5th whitespace-separated column (`Interface
/// PID Area IP/Mask Cost State ...`).
pub fn parse_interface_brief(text: &str) -> Vec<InterfaceBriefEntry> {
    let mut out = Vec::new();
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("Interface") {
            continue;
        }
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 5 {
            continue;
        }
        if let Ok(cost) = cols[4].parse::<u32>() {
            out.push(InterfaceBriefEntry { interface: cols[0].to_string(), cost });
        }
    }
    out
}

/// One adjacency from `show ospf neighbor` (spec §4.9 step 6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborEntry {
    pub neighbor_router_id: String,
    pub state: String,
    pub local_interface: String,
}

/// True if `state` denotes a fully-converged adjacency, per the
/// `FULL` / `FULL/DR` / `FULL/BDR` / `FULL/DROTHER` forms IOS-family
/// platforms emit.
fn is_full_state(state: &str) -> bool {
    state.split('/').next().unwrap_or("").eq_ignore_ascii_case("full")
}

/// True if `interface` looks like a management interface (spec §4.9
/// step 6: "substring match on Mgmt, Management, Ma0, case-insensitive").
pub fn is_management_interface(interface: &str) -> bool {
    let lower = interface.to_lowercase();
    lower.contains("mgmt") || lower.contains("management") || lower.contains("ma0")
}

/// Parse the neighbor table, retaining only `FULL`-state adjacencies on
/// non-management interfaces (spec §4.9 step 6).
pub fn parse_neighbor_table(text: &str) -> Vec<NeighborEntry> {
    let mut out = Vec::new();
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("Neighbor") {
            continue;
        }
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 6 {
            continue;
        }
        let (neighbor_router_id, state, local_interface) = (cols[0], cols[2], cols[5]);
        if !is_full_state(state) || is_management_interface(local_interface) {
            continue;
        }
        out.push(NeighborEntry {
            neighbor_router_id: neighbor_router_id.to_string(),
            state: state.to_string(),
            local_interface: local_interface.to_string(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_router_id_from_header_line() {
        let text = "OSPF Router with ID (10.0.0.1) (Process ID 1)\nRouter Link States (Area 0)\n";
        assert_eq!(parse_router_id(text), Some("10.0.0.1".to_string()));
    }

    #[test]
    fn parses_point_to_point_and_transit_router_lsa_entries() {
        let text = "\
OSPF Router with ID (10.0.0.1) (Process ID 1)
Router Link States (Area 0)
LSA: self
  Link connected to: Point-to-Point
    Link ID: 10.0.0.2
    TOS 0 Metric: 900
    Local Interface: GigabitEthernet0/0/0/1
  Link connected to: a Transit Network
    Link ID: 10.0.0.9
    TOS 0 Metric: 50
    Local Interface: GigabitEthernet0/0/0/3
";
        let entries = parse_router_lsa(text);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].link_id, "10.0.0.2");
        assert!(!entries[0].is_transit);
        assert_eq!(entries[0].tos0_metric, Some(900));
        assert_eq!(entries[0].local_interface.as_deref(), Some("GigabitEthernet0/0/0/1"));
        assert!(entries[1].is_transit);
    }

    #[test]
    fn parses_attached_routers_per_network_lsa() {
        let text = "\
Net Link States (Area 0)

  Link ID: 10.0.0.9 (address of Designated Router)
    Adv Router: 10.0.0.1
    Attached Router: 10.0.0.1
    Attached Router: 10.0.0.2
";
        let parsed = parse_network_lsa(text);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].0, "10.0.0.9");
        assert_eq!(parsed[0].1, vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
    }

    #[test]
    fn parses_interface_brief_cost_column() {
        let text = "\
Interface    PID   Area       IP Address/Mask  Cost  State Nbrs F/C
Gi0/0/0/1    1     0          10.1.1.1/30      900   P2P   1/1
";
        let entries = parse_interface_brief(text);
        assert_eq!(entries, vec![InterfaceBriefEntry { interface: "Gi0/0/0/1".to_string(), cost: 900 }]);
    }

    #[test]
    fn drops_non_full_and_management_neighbors() {
        let text = "\
Neighbor ID   Pri  State       Dead Time  Address        Interface
10.0.0.2      1    FULL/DR     00:00:39   10.1.1.2       GigabitEthernet0/0/0/1
10.0.0.5      1    2WAY/DROTHER 00:00:35  10.1.1.5       GigabitEthernet0/0/0/9
10.0.0.6      1    FULL        00:00:30   10.1.1.6       Mgmt0/RP0/CPU0/0
";
        let entries = parse_neighbor_table(text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].neighbor_router_id, "10.0.0.2");
        assert_eq!(entries[0].local_interface, "GigabitEthernet0/0/0/1");
    }
}

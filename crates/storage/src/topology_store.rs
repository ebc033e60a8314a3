//! Topology persistence (spec §4.9 step 8): upsert the latest snapshot
//! into queryable tables, and keep a timestamped JSON copy on disk for
//! audit/export.

use netorch_core::{Link, Node, TopologyMetadata, TopologySnapshot};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<TopologyStoreError> for netorch_core::StorageError {
    fn from(e: TopologyStoreError) -> Self {
        netorch_core::StorageError(e.to_string())
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS topology_nodes (
    id TEXT PRIMARY KEY,
    country TEXT NOT NULL,
    platform TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS topology_links (
    id TEXT NOT NULL,
    source TEXT NOT NULL,
    target TEXT NOT NULL,
    cost INTEGER NOT NULL,
    source_interface TEXT NOT NULL,
    target_interface TEXT NOT NULL,
    status TEXT NOT NULL,
    PRIMARY KEY (source, target, source_interface)
);

CREATE TABLE IF NOT EXISTS topology_generations (
    generated_at_ms INTEGER PRIMARY KEY,
    node_count INTEGER NOT NULL,
    link_count INTEGER NOT NULL,
    discovery_method TEXT NOT NULL,
    sources_json TEXT NOT NULL,
    skipped_devices_json TEXT NOT NULL
);
"#;

/// Stores the current topology graph plus a JSON snapshot history on
/// disk. Each `store` call replaces the node/link tables wholesale —
/// the orchestrator only ever cares about the latest discovery run.
pub struct TopologyStore {
    conn: Mutex<Connection>,
    snapshot_dir: PathBuf,
}

impl TopologyStore {
    pub fn open(db_path: &Path, snapshot_dir: &Path) -> Result<Self, TopologyStoreError> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;
        fs::create_dir_all(snapshot_dir)?;
        Ok(Self { conn: Mutex::new(conn), snapshot_dir: snapshot_dir.to_path_buf() })
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn open_in_memory(snapshot_dir: &Path) -> Result<Self, TopologyStoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        fs::create_dir_all(snapshot_dir)?;
        Ok(Self { conn: Mutex::new(conn), snapshot_dir: snapshot_dir.to_path_buf() })
    }

    /// Replace the stored graph with `snapshot` and write a timestamped
    /// JSON copy under `snapshot_dir`. Returns the JSON file path.
    pub fn store(&self, snapshot: &TopologySnapshot) -> Result<PathBuf, TopologyStoreError> {
        {
            let conn = self.conn.lock();
            conn.execute("DELETE FROM topology_nodes", [])?;
            conn.execute("DELETE FROM topology_links", [])?;
            for node in &snapshot.nodes {
                conn.execute(
                    "INSERT INTO topology_nodes (id, country, platform) VALUES (?1, ?2, ?3)",
                    params![node.id, node.country, node.platform.to_string()],
                )?;
            }
            for link in &snapshot.links {
                conn.execute(
                    "INSERT INTO topology_links (id, source, target, cost, source_interface,
                        target_interface, status) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        link.id,
                        link.source,
                        link.target,
                        link.cost,
                        link.source_interface,
                        link.target_interface,
                        link.status,
                    ],
                )?;
            }
            conn.execute(
                "INSERT OR REPLACE INTO topology_generations
                    (generated_at_ms, node_count, link_count, discovery_method, sources_json, skipped_devices_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    snapshot.metadata.generated_at_ms as i64,
                    snapshot.metadata.node_count as i64,
                    snapshot.metadata.link_count as i64,
                    snapshot.metadata.discovery_method,
                    serde_json::to_string(&snapshot.metadata.sources)?,
                    serde_json::to_string(&snapshot.metadata.skipped_devices)?,
                ],
            )?;
        }
        let file_name = format!("{}.json", snapshot.metadata.generated_at_ms);
        let path = self.snapshot_dir.join(file_name);
        let body = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&path, body)?;
        Ok(path)
    }

    pub fn latest(&self) -> Result<Option<TopologySnapshot>, TopologyStoreError> {
        let conn = self.conn.lock();
        let generation = conn
            .query_row(
                "SELECT generated_at_ms, node_count, link_count, discovery_method, sources_json, skipped_devices_json
                 FROM topology_generations ORDER BY generated_at_ms DESC LIMIT 1",
                [],
                |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, i64>(1)?,
                        r.get::<_, i64>(2)?,
                        r.get::<_, String>(3)?,
                        r.get::<_, String>(4)?,
                        r.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;
        let Some((generated_at_ms, node_count, link_count, discovery_method, sources_json, skipped_json)) =
            generation
        else {
            return Ok(None);
        };

        let mut node_stmt = conn.prepare("SELECT id, country, platform FROM topology_nodes")?;
        let nodes: Vec<Node> = node_stmt
            .query_map([], |r| {
                Ok(Node {
                    id: r.get(0)?,
                    country: r.get(1)?,
                    platform: parse_platform(&r.get::<_, String>(2)?),
                })
            })?
            .collect::<Result<_, _>>()?;

        let mut link_stmt = conn.prepare(
            "SELECT id, source, target, cost, source_interface, target_interface, status FROM topology_links",
        )?;
        let links: Vec<Link> = link_stmt
            .query_map([], |r| {
                Ok(Link {
                    id: r.get(0)?,
                    source: r.get(1)?,
                    target: r.get(2)?,
                    cost: r.get::<_, i64>(3)? as u32,
                    source_interface: r.get(4)?,
                    target_interface: r.get(5)?,
                    status: r.get(6)?,
                })
            })?
            .collect::<Result<_, _>>()?;

        Ok(Some(TopologySnapshot {
            nodes,
            links,
            metadata: TopologyMetadata {
                node_count: node_count as usize,
                link_count: link_count as usize,
                generated_at_ms: generated_at_ms as u64,
                discovery_method,
                sources: serde_json::from_str(&sources_json)?,
                skipped_devices: serde_json::from_str(&skipped_json)?,
            },
        }))
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }
}

fn parse_platform(s: &str) -> netorch_core::PlatformHint {
    match s {
        "ios" => netorch_core::PlatformHint::Ios,
        "ios-xr" => netorch_core::PlatformHint::IosXr,
        "nx-os" => netorch_core::PlatformHint::NxOs,
        _ => netorch_core::PlatformHint::Auto,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netorch_core::PlatformHint;

    fn sample_snapshot(generated_at_ms: u64) -> TopologySnapshot {
        TopologySnapshot {
            nodes: vec![
                Node { id: "r1".to_string(), country: "us".to_string(), platform: PlatformHint::IosXr },
                Node { id: "r2".to_string(), country: "us".to_string(), platform: PlatformHint::IosXr },
            ],
            links: vec![Link {
                id: netorch_core::link_id("r1", "r2", 0),
                source: "r1".to_string(),
                target: "r2".to_string(),
                cost: 10,
                source_interface: "Gi0/0/0/1".to_string(),
                target_interface: "Gi0/0/0/2".to_string(),
                status: "up".to_string(),
            }],
            metadata: TopologyMetadata {
                node_count: 2,
                link_count: 1,
                generated_at_ms,
                discovery_method: "ospf".to_string(),
                sources: vec!["r1".to_string(), "r2".to_string()],
                skipped_devices: vec![],
            },
        }
    }

    #[test]
    fn store_then_latest_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = TopologyStore::open_in_memory(&tmp.path().join("snapshots")).unwrap();
        let snap = sample_snapshot(1_700_000_000_000);
        store.store(&snap).unwrap();
        let latest = store.latest().unwrap().expect("snapshot exists");
        assert_eq!(latest.nodes.len(), 2);
        assert_eq!(latest.links.len(), 1);
        assert_eq!(latest.metadata.generated_at_ms, 1_700_000_000_000);
    }

    #[test]
    fn store_replaces_previous_generation() {
        let tmp = tempfile::tempdir().unwrap();
        let store = TopologyStore::open_in_memory(&tmp.path().join("snapshots")).unwrap();
        store.store(&sample_snapshot(1)).unwrap();
        store.store(&sample_snapshot(2)).unwrap();
        let latest = store.latest().unwrap().expect("snapshot exists");
        assert_eq!(latest.metadata.generated_at_ms, 2);
        let entries: Vec<_> = fs::read_dir(store.snapshot_dir()).unwrap().collect();
        assert_eq!(entries.len(), 2, "both JSON snapshots are retained on disk");
    }
}

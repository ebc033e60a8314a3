//! Artifact Store (spec §4.3, C3): append-only per-command text+json files
//! under a rooted data directory.

use chrono::{DateTime, NaiveDateTime, Utc};
use netorch_core::StorageError as CoreStorageError;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("io error writing artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error writing artifact: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl From<ArtifactError> for CoreStorageError {
    fn from(e: ArtifactError) -> Self {
        CoreStorageError(e.to_string())
    }
}

/// Command kinds the Topology Builder recognises (spec §4.3, §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    OspfNeighbor,
    OspfDatabaseRouter,
    OspfDatabaseNetwork,
    OspfInterface,
    Other,
}

/// Fixed table mapping a sanitised command to the kind the Topology
/// Builder cares about (spec §4.3 "Kind is derived from filename by
/// matching the sanitised command against a fixed table").
pub fn classify(sanitised_command: &str) -> CommandKind {
    match sanitised_command {
        "show_ip_ospf_neighbor" | "show_ospf_neighbor" => CommandKind::OspfNeighbor,
        "show_ip_ospf_database_router" | "show_ospf_database_router" => {
            CommandKind::OspfDatabaseRouter
        }
        "show_ip_ospf_database_network" | "show_ospf_database_network" => {
            CommandKind::OspfDatabaseNetwork
        }
        "show_ip_ospf_interface_brief" | "show_ospf_interface_brief" | "show_ospf_interface" => {
            CommandKind::OspfInterface
        }
        _ => CommandKind::Other,
    }
}

/// Sanitise a command for use in a filename: lowercase, spaces -> `_`,
/// non-word characters stripped (spec §3 "Artifact file").
pub fn sanitise_command(command: &str) -> String {
    command
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

const TS_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

fn format_ts(dt: DateTime<Utc>) -> String {
    dt.format(TS_FORMAT).to_string()
}

/// Parse a timestamp produced by [`format_ts`]. Exposed for the filename
/// round-trip property (spec §8 property 9).
pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Metadata about a stored artifact file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub device_name: String,
    pub sanitised_command: String,
    pub timestamp: String,
    pub kind: ArtifactKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Text,
    Json,
}

impl ArtifactKind {
    fn dir_name(self) -> &'static str {
        match self {
            ArtifactKind::Text => "TEXT",
            ArtifactKind::Json => "JSON",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Text => "txt",
            ArtifactKind::Json => "json",
        }
    }
}

/// Parse `{device}_{sanitised_cmd}_{ts}.{ext}` back into its parts (spec §6
/// "Filename grammar"). Returns `None` for anything that doesn't match.
pub fn parse_filename(stem: &str) -> Option<(String, String, String)> {
    // Timestamp is the last two underscore-delimited segments: a date and a
    // time, e.g. `..._2026-01-02_03-04-05`.
    let parts: Vec<&str> = stem.rsplitn(3, '_').collect();
    if parts.len() != 3 {
        return None;
    }
    let time = parts[0];
    let date = parts[1];
    let rest = parts[2];
    let ts = format!("{date}_{time}");
    if parse_ts(&ts).is_none() {
        return None;
    }
    let (device, cmd) = rest.split_once('_')?;
    if device.is_empty() || cmd.is_empty() {
        return None;
    }
    Some((device.to_string(), cmd.to_string(), ts))
}

/// Append-only artifact storage rooted at `<root>/TEXT` and `<root>/JSON`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let root = root.into();
        let store = Self { root };
        store.ensure_dirs()?;
        Ok(store)
    }

    fn ensure_dirs(&self) -> Result<(), ArtifactError> {
        for kind in [ArtifactKind::Text, ArtifactKind::Json] {
            let dir = self.root.join(kind.dir_name());
            std::fs::create_dir_all(&dir)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mut perms = std::fs::metadata(&dir)?.permissions();
                perms.set_mode(0o700);
                std::fs::set_permissions(&dir, perms)?;
            }
        }
        Ok(())
    }

    fn file_path(&self, kind: ArtifactKind, device_name: &str, sanitised_cmd: &str, ts: &str) -> PathBuf {
        self.root
            .join(kind.dir_name())
            .join(format!("{device_name}_{sanitised_cmd}_{ts}.{}", kind.extension()))
    }

    /// Write a text+json artifact pair. Atomic per file (temp + rename);
    /// never overwrites an existing file (spec §4.3 invariants).
    pub fn write(
        &self,
        device_name: &str,
        command: &str,
        text: &str,
        json: &serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<(PathBuf, PathBuf), ArtifactError> {
        let sanitised = sanitise_command(command);
        let ts = format_ts(at);
        let text_path = self.file_path(ArtifactKind::Text, device_name, &sanitised, &ts);
        let json_path = self.file_path(ArtifactKind::Json, device_name, &sanitised, &ts);
        Self::atomic_write(&text_path, text.as_bytes())?;
        Self::atomic_write(&json_path, serde_json::to_vec_pretty(json)?.as_slice())?;
        Ok((text_path, json_path))
    }

    fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
        if path.exists() {
            return Err(ArtifactError::InvalidPath(format!(
                "artifact already exists: {}",
                path.display()
            )));
        }
        let dir = path.parent().ok_or_else(|| {
            ArtifactError::InvalidPath(format!("no parent dir for {}", path.display()))
        })?;
        let mut tmp = tempfile_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        let (file, tmp_path) = tmp.into_parts();
        drop(file);
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// List artifacts of the given kind, newest first.
    pub fn list(&self, kind: ArtifactKind) -> Result<Vec<FileInfo>, ArtifactError> {
        let dir = self.root.join(kind.dir_name());
        let mut out = Vec::new();
        if !dir.exists() {
            return Ok(out);
        }
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let Some((device, cmd, ts)) = parse_filename(stem) else { continue };
            out.push(FileInfo { path, device_name: device, sanitised_command: cmd, timestamp: ts, kind });
        }
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(out)
    }

    /// Latest artifact for a `(device, sanitised command kind)` pair
    /// (spec §4.3 "the latest per (device, command) is the authoritative
    /// source for the Topology Builder").
    pub fn latest(&self, device_name: &str, sanitised_command: &str) -> Result<Option<FileInfo>, ArtifactError> {
        let all = self.list(ArtifactKind::Text)?;
        Ok(all
            .into_iter()
            .filter(|f| f.device_name == device_name && f.sanitised_command == sanitised_command)
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp)))
    }

    /// Read the raw bytes of an already-resolved path. Callers at the API
    /// boundary must validate the path separately (spec §6 `FileRead`).
    pub fn read(&self, path: &Path) -> Result<Vec<u8>, ArtifactError> {
        Ok(std::fs::read(path)?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Validate a caller-supplied relative artifact path per spec §6
/// `FileRead`: no `..`, no absolute paths, no extra separators beyond the
/// kind directory and filename.
pub fn validate_file_path(root: &Path, requested: &str) -> Result<PathBuf, netorch_core::ValidationError> {
    if requested.contains("..") {
        return Err(netorch_core::ValidationError::new("path traversal rejected"));
    }
    let rel = Path::new(requested);
    if rel.is_absolute() {
        return Err(netorch_core::ValidationError::new("absolute paths rejected"));
    }
    let mut components = rel.components();
    let Some(first) = components.next() else {
        return Err(netorch_core::ValidationError::new("empty path"));
    };
    let first = first.as_os_str().to_string_lossy();
    if first != "TEXT" && first != "JSON" {
        return Err(netorch_core::ValidationError::new("path must be under TEXT/ or JSON/"));
    }
    let Some(second) = components.next() else {
        return Err(netorch_core::ValidationError::new("missing filename"));
    };
    if components.next().is_some() {
        return Err(netorch_core::ValidationError::new("path separators in filename rejected"));
    }
    Ok(root.join(first.as_ref()).join(second.as_os_str()))
}

/// Thin wrapper so we don't need the `tempfile` crate as a runtime
/// dependency just for one atomic-write helper.
struct NamedTemp {
    file: std::fs::File,
    path: PathBuf,
}

impl NamedTemp {
    fn into_parts(self) -> (std::fs::File, PathBuf) {
        (self.file, self.path)
    }
}

impl std::io::Write for NamedTemp {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

fn tempfile_in(dir: &Path) -> std::io::Result<NamedTemp> {
    use std::os::unix::fs::OpenOptionsExt;
    for _ in 0..8 {
        let name = format!(".tmp-{:016x}", rand_suffix());
        let path = dir.join(name);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)
        {
            Ok(file) => return Ok(NamedTemp { file, path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(std::io::Error::other("could not allocate a temp file name"))
}

fn rand_suffix() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64;
    nanos ^ (std::process::id() as u64).wrapping_mul(0x9E3779B97F4A7C15)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sanitise_lowercases_and_strips_punctuation() {
        assert_eq!(sanitise_command("show ip ospf neighbor"), "show_ip_ospf_neighbor");
        assert_eq!(sanitise_command("show ospf database router!"), "show_ospf_database_router");
    }

    #[test]
    fn filename_round_trips() {
        let device = "r1";
        let cmd = "show_ip_ospf_neighbor";
        let ts = "2026-01-02_03-04-05";
        let stem = format!("{device}_{cmd}_{ts}");
        let (d, c, t) = parse_filename(&stem).expect("should parse");
        assert_eq!(d, device);
        assert_eq!(c, cmd);
        assert_eq!(t, ts);
    }

    #[test]
    fn write_then_latest_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path()).unwrap();
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        store
            .write("r1", "show ip ospf neighbor", "neighbor output", &serde_json::json!({}), at)
            .unwrap();
        let found = store.latest("r1", "show_ip_ospf_neighbor").unwrap();
        assert!(found.is_some());
        assert_eq!(classify(&found.unwrap().sanitised_command), CommandKind::OspfNeighbor);
    }

    #[test]
    fn write_never_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path()).unwrap();
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        store.write("r1", "show version", "a", &serde_json::json!({}), at).unwrap();
        let second = store.write("r1", "show version", "b", &serde_json::json!({}), at);
        assert!(second.is_err());
    }

    #[test]
    fn validate_file_path_rejects_traversal() {
        let root = Path::new("/data");
        assert!(validate_file_path(root, "../../etc/passwd").is_err());
        assert!(validate_file_path(root, "/etc/passwd").is_err());
        assert!(validate_file_path(root, "TEXT/../../x").is_err());
        assert!(validate_file_path(root, "TEXT/r1_show_version_2026-01-02_03-04-05.txt").is_ok());
    }
}

//! Snapshot stores.
//!
//! [`FileSnapshotStore`] layout under its root directory:
//!
//! ```text
//! CURRENT                      name of the published snapshot directory
//! snapshots/<name>/meta.json
//! snapshots/<name>/territories.geojson
//! snapshots/<name>/profiles.json
//! snapshots/<name>/report.json
//! staging/<uuid>/              a snapshot being written
//! ```
//!
//! A publish writes a complete directory under `staging/`, moves it into
//! `snapshots/`, then replaces `CURRENT` through a temp file and a rename.
//! Readers resolve `CURRENT` once per load, so they see the old snapshot or
//! the new one. After the swap every directory except the new and the
//! previous snapshot is pruned.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gridscope_core::{PersistenceError, RunReport, Snapshot, SnapshotMeta, SnapshotStore, TerritoryProfile};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::geojson::{territories_from_value, territories_to_value};

const CURRENT: &str = "CURRENT";
const SNAPSHOTS: &str = "snapshots";
const STAGING: &str = "staging";
const META: &str = "meta.json";
const TERRITORIES: &str = "territories.geojson";
const PROFILES: &str = "profiles.json";
const REPORT: &str = "report.json";

/// Directory-backed store with atomic publication.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of the published snapshot, `None` before the first publish.
    pub fn current_dir(&self) -> Result<Option<PathBuf>, PersistenceError> {
        let pointer = self.root.join(CURRENT);
        match fs::read_to_string(&pointer) {
            Ok(name) => {
                let name = name.trim();
                if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
                    return Err(PersistenceError::Corrupt {
                        path: pointer,
                        reason: format!("invalid snapshot name '{name}'"),
                    });
                }
                Ok(Some(self.root.join(SNAPSHOTS).join(name)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::io(pointer, e)),
        }
    }

    fn write_snapshot(&self, dir: &Path, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        fs::create_dir_all(dir).map_err(|e| PersistenceError::io(dir, e))?;
        write_json(&dir.join(META), "snapshot metadata", &snapshot.meta)?;
        let territories = territories_to_value(&snapshot.territories, |_| Default::default());
        write_json(&dir.join(TERRITORIES), "territories", &territories)?;
        write_json(&dir.join(PROFILES), "profiles", &snapshot.profiles)?;
        if let Some(report) = &snapshot.report {
            write_json(&dir.join(REPORT), "run report", report)?;
        }
        Ok(())
    }

    fn swap_current(&self, name: &str) -> Result<(), PersistenceError> {
        let tmp = self.root.join(format!("{CURRENT}.tmp"));
        let mut file = fs::File::create(&tmp).map_err(|e| PersistenceError::io(&tmp, e))?;
        file.write_all(name.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| PersistenceError::io(&tmp, e))?;
        let target = self.root.join(CURRENT);
        fs::rename(&tmp, &target).map_err(|e| PersistenceError::io(&target, e))
    }

    /// Remove snapshot directories other than `keep`.
    fn prune(&self, keep: &[&str]) {
        let dir = self.root.join(SNAPSHOTS);
        let Ok(entries) = fs::read_dir(&dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if keep.iter().any(|k| name.to_string_lossy() == *k) {
                continue;
            }
            if let Err(e) = fs::remove_dir_all(entry.path()) {
                warn!("Could not prune {}: {}", entry.path().display(), e);
            }
        }
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn publish(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let name = Uuid::new_v4().to_string();
        let previous = self.current_dir().ok().flatten();
        let staging = self.root.join(STAGING).join(&name);
        let published = self.root.join(SNAPSHOTS).join(&name);

        let result = self
            .write_snapshot(&staging, snapshot)
            .and_then(|_| {
                let parent = self.root.join(SNAPSHOTS);
                fs::create_dir_all(&parent).map_err(|e| PersistenceError::io(&parent, e))
            })
            .and_then(|_| fs::rename(&staging, &published).map_err(|e| PersistenceError::io(&published, e)))
            .and_then(|_| self.swap_current(&name));

        if let Err(e) = result {
            let _ = fs::remove_dir_all(&staging);
            let _ = fs::remove_dir_all(&published);
            return Err(e);
        }

        debug!("Published snapshot {} as {}", snapshot.meta.run_id, published.display());
        // the previous directory stays until the next publish so readers
        // that resolved CURRENT before the swap can finish
        let previous_name = previous
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned());
        let mut keep = vec![name.as_str()];
        keep.extend(previous_name.as_deref());
        self.prune(&keep);
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Snapshot, PersistenceError> {
        let dir = self.current_dir()?.ok_or(PersistenceError::NoSnapshot)?;
        let meta: SnapshotMeta = read_json(&dir.join(META))?;
        let territories_path = dir.join(TERRITORIES);
        let document: Value = read_json(&territories_path)?;
        let territories =
            territories_from_value(&document).map_err(|e| PersistenceError::Corrupt {
                path: territories_path,
                reason: format!("{e:#}"),
            })?;
        let profiles: Vec<TerritoryProfile> = read_json(&dir.join(PROFILES))?;
        let report_path = dir.join(REPORT);
        let report: Option<RunReport> = if report_path.exists() {
            Some(read_json(&report_path)?)
        } else {
            None
        };
        Ok(Snapshot {
            meta,
            territories,
            profiles,
            report,
        })
    }

    fn meta(&self) -> Result<Option<SnapshotMeta>, PersistenceError> {
        match self.current_dir()? {
            Some(dir) => read_json(&dir.join(META)).map(Some),
            None => Ok(None),
        }
    }
}

fn write_json<T: Serialize + ?Sized>(
    path: &Path,
    what: &'static str,
    value: &T,
) -> Result<(), PersistenceError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| PersistenceError::Serialization {
        what,
        message: e.to_string(),
    })?;
    let mut file = fs::File::create(path).map_err(|e| PersistenceError::io(path, e))?;
    file.write_all(&bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| PersistenceError::io(path, e))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistenceError> {
    let text = fs::read_to_string(path).map_err(|e| PersistenceError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| PersistenceError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// In-process store; a publish swaps one `Arc`.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the published snapshot without cloning it.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.read().clone()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn publish(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        *self.current.write() = Some(Arc::new(snapshot.clone()));
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Snapshot, PersistenceError> {
        self.current()
            .map(|snapshot| snapshot.as_ref().clone())
            .ok_or(PersistenceError::NoSnapshot)
    }
}

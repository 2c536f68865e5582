//! Run manifests: one `run-<id>.json` per command invocation that produced
//! output, so a published snapshot can be traced to the inputs behind it.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub run_id: String,
    pub command: String,
    pub version: String,
    pub timestamp: String,
    pub outputs: Vec<String>,
    pub params: Vec<Param>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: String,
}

impl ManifestEntry {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

/// Write `run-<run_id>.json` into `dir`.
pub fn record_manifest(
    dir: &Path,
    run_id: &str,
    command: &str,
    outputs: &[&Path],
    params: &[(&str, &str)],
) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let manifest = ManifestEntry {
        run_id: run_id.to_string(),
        command: command.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        outputs: outputs.iter().map(|p| p.display().to_string()).collect(),
        params: params
            .iter()
            .map(|(k, v)| Param {
                name: k.to_string(),
                value: v.to_string(),
            })
            .collect(),
    };
    let json = serde_json::to_string_pretty(&manifest)?;
    let path = dir.join(format!("run-{}.json", run_id));
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    info!("Recorded run manifest {}", path.display());
    Ok(path)
}

pub fn read_manifest(path: &Path) -> Result<ManifestEntry> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let manifest = serde_json::from_str(&json)
        .with_context(|| format!("parsing manifest {}", path.display()))?;
    Ok(manifest)
}

/// The manifest with the latest timestamp in `dir`, if any.
pub fn latest_manifest(dir: &Path) -> Result<Option<ManifestEntry>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("listing {}", dir.display())),
    };
    let mut latest: Option<(DateTime<FixedOffset>, ManifestEntry)> = None;
    for entry in entries {
        let path = entry?.path();
        let is_manifest = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("run-") && n.ends_with(".json"));
        if !is_manifest {
            continue;
        }
        let manifest = read_manifest(&path)?;
        let Ok(at) = DateTime::parse_from_rfc3339(&manifest.timestamp) else {
            warn!("Skipping manifest {} with bad timestamp", path.display());
            continue;
        };
        if latest.as_ref().map_or(true, |(seen, _)| at > *seen) {
            latest = Some((at, manifest));
        }
    }
    Ok(latest.map(|(_, manifest)| manifest))
}

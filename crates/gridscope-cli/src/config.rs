//! `gridscope.toml`: where the inputs live, where snapshots go and how the
//! pipeline is tuned. Every section is optional; relative paths are taken
//! from the directory holding the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use gridscope_algo::PipelineConfig;
use gridscope_core::{BoundaryProvider, GridError};
use gridscope_io::{FileSnapshotStore, GeoJsonBoundary, NominatimBoundary, TableAssets, DEFAULT_NOMINATIM_URL};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridscopeConfig {
    /// Place name handed to the boundary provider
    pub place: String,
    pub boundary: BoundaryConfig,
    pub assets: AssetsConfig,
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
}

/// A GeoJSON file when `file` is set, the Nominatim geocoder otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    pub file: Option<PathBuf>,
    pub nominatim_url: String,
    pub timeout_secs: u64,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            file: None,
            nominatim_url: DEFAULT_NOMINATIM_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

/// Parquet or CSV tables, chosen by extension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub substations: Option<PathBuf>,
    pub transformers: Option<PathBuf>,
    pub consumers: Option<PathBuf>,
    pub generation_units: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub dir: PathBuf,
    /// A published snapshot older than this is stale
    pub max_age_hours: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("store"),
            max_age_hours: 24.0,
        }
    }
}

/// Read and validate the configuration. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<GridscopeConfig> {
    if !path.exists() {
        debug!("No configuration at {}, using defaults", path.display());
        return Ok(GridscopeConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading configuration {}", path.display()))?;
    let mut config: GridscopeConfig = toml::from_str(&contents)
        .map_err(|e| GridError::Config(format!("{}: {}", path.display(), e)))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    config.resolve_paths(base);
    config.validate()?;
    Ok(config)
}

fn resolve(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

impl GridscopeConfig {
    fn resolve_paths(&mut self, base: &Path) {
        let optional = [
            &mut self.boundary.file,
            &mut self.assets.substations,
            &mut self.assets.transformers,
            &mut self.assets.consumers,
            &mut self.assets.generation_units,
        ];
        for path in optional.into_iter().flatten() {
            resolve(base, path);
        }
        resolve(base, &mut self.store.dir);
    }

    pub fn validate(&self) -> Result<(), GridError> {
        if !self.store.max_age_hours.is_finite() || self.store.max_age_hours < 0.0 {
            return Err(GridError::Config(format!(
                "store.max_age_hours must be a finite non-negative number, got {}",
                self.store.max_age_hours
            )));
        }
        self.pipeline.validate()
    }

    /// `--place` wins over the configured place.
    pub fn place(&self, requested: Option<&str>) -> Result<String> {
        match requested.map(str::trim).filter(|p| !p.is_empty()) {
            Some(place) => Ok(place.to_string()),
            None if !self.place.trim().is_empty() => Ok(self.place.trim().to_string()),
            None => bail!("no place given; pass --place or set `place` in the configuration"),
        }
    }

    pub fn boundary_provider(&self) -> Box<dyn BoundaryProvider> {
        match &self.boundary.file {
            Some(file) => Box::new(GeoJsonBoundary::new(file)),
            None => Box::new(
                NominatimBoundary::new(&self.boundary.nominatim_url)
                    .with_timeout(Duration::from_secs(self.boundary.timeout_secs)),
            ),
        }
    }

    /// Table provider. With `require_all` unset only the substation table
    /// has to be configured.
    pub fn asset_provider(&self, require_all: bool) -> Result<TableAssets> {
        let required = |name: &str, path: &Option<PathBuf>| -> Result<PathBuf> {
            path.clone()
                .ok_or_else(|| anyhow::anyhow!("[assets] {name} is not configured"))
        };
        let substations = required("substations", &self.assets.substations)?;
        let (transformers, consumers) = if require_all {
            (
                required("transformers", &self.assets.transformers)?,
                required("consumers", &self.assets.consumers)?,
            )
        } else {
            (
                self.assets.transformers.clone().unwrap_or_default(),
                self.assets.consumers.clone().unwrap_or_default(),
            )
        };
        Ok(TableAssets {
            substations,
            transformers,
            consumers,
            generation_units: self.assets.generation_units.clone(),
        })
    }

    pub fn store(&self) -> FileSnapshotStore {
        FileSnapshotStore::new(&self.store.dir)
    }
}

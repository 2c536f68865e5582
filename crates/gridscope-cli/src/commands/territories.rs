//! `gridscope territories`: tessellate, clip and resolve, then write GeoJSON.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use gridscope_algo::Pipeline;
use gridscope_cli::manifest::record_manifest;
use gridscope_cli::GridscopeConfig;
use gridscope_io::geojson::territories_to_value;
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

pub fn handle(config: &GridscopeConfig, place: Option<&str>, out: &Path) -> Result<()> {
    let place = config.place(place)?;
    let pipeline = Pipeline::new(config.pipeline.clone())?;
    let boundary = config.boundary_provider();
    let assets = config.asset_provider(false)?;

    let run = pipeline.territories(&place, boundary.as_ref(), &assets)?;
    let document = territories_to_value(&run.territories, |territory| {
        let mut properties = Map::new();
        properties.insert("place".into(), Value::from(place.as_str()));
        if territory.geometry.0.len() > 1 {
            properties.insert("parts".into(), Value::from(territory.geometry.0.len()));
        }
        properties
    });

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&document)?;
    fs::write(out, json).with_context(|| format!("writing {}", out.display()))?;
    info!("Wrote {} territories to {}", run.territories.len(), out.display());
    println!("{} territories written to {}", run.territories.len(), out.display());
    if run.diagnostics.has_warnings() {
        warn!("{}", run.diagnostics.summary());
    }

    let dir = out.parent().unwrap_or_else(|| Path::new("."));
    record_manifest(
        dir,
        &Uuid::new_v4().to_string(),
        "territories",
        &[out],
        &[("place", place.as_str())],
    )?;
    Ok(())
}

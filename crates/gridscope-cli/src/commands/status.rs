//! `gridscope status`: what is published and whether it is still fresh.

use anyhow::Result;
use chrono::Utc;
use gridscope_cli::manifest::latest_manifest;
use gridscope_cli::GridscopeConfig;
use gridscope_core::SnapshotStore;

pub fn handle(config: &GridscopeConfig) -> Result<()> {
    let store = config.store();
    let Some(meta) = store.meta()? else {
        println!("No snapshot published in {}", config.store.dir.display());
        return Ok(());
    };

    let now = Utc::now();
    let age = meta.age_at(now);
    let fresh = meta.is_fresh_at(now, config.store.max_age_hours);
    println!("Snapshot : {}", meta.run_id);
    println!("Place    : {}", meta.place);
    println!("Updated  : {}", meta.updated_at.to_rfc3339());
    println!(
        "Age      : {:.1} h ({}, limit {} h)",
        age.num_seconds() as f64 / 3600.0,
        if fresh { "fresh" } else { "stale" },
        config.store.max_age_hours
    );
    if let Some(manifest) = latest_manifest(&config.store.dir.join("runs"))? {
        println!(
            "Last run : {} `{}` v{} at {}",
            manifest.run_id, manifest.command, manifest.version, manifest.timestamp
        );
    }
    Ok(())
}

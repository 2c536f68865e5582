//! `gridscope run`: full regeneration, published to the store.

use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use gridscope_algo::Pipeline;
use gridscope_cli::manifest::record_manifest;
use gridscope_cli::GridscopeConfig;
use gridscope_core::Snapshot;
use tabwriter::TabWriter;
use tracing::info;

pub fn handle(config: &GridscopeConfig, config_path: &Path, place: Option<&str>) -> Result<()> {
    let place = config.place(place)?;
    let pipeline = Pipeline::new(config.pipeline.clone())?;
    let boundary = config.boundary_provider();
    let assets = config.asset_provider(true)?;
    let store = config.store();

    info!("Regenerating territories for '{}'", place);
    let snapshot = pipeline.regenerate(&place, boundary.as_ref(), &assets, &store)?;
    print_summary(&snapshot)?;

    let config_display = config_path.display().to_string();
    record_manifest(
        &config.store.dir.join("runs"),
        &snapshot.meta.run_id,
        "run",
        &[config.store.dir.as_path()],
        &[("place", place.as_str()), ("config", config_display.as_str())],
    )?;
    Ok(())
}

fn print_summary(snapshot: &Snapshot) -> Result<()> {
    let mut writer = TabWriter::new(io::stdout()).padding(2);
    writeln!(
        writer,
        "TERRITORY\tNAME\tCUSTOMERS\tCONSUMPTION (kWh)\tCAPACITY (kW)\tUNITS\tCRITICALITY"
    )?;
    for profile in &snapshot.profiles {
        writeln!(
            writer,
            "{}\t{}\t{}\t{:.1}\t{:.1}\t{}\t{}",
            profile.id,
            profile.name,
            profile.total_customers,
            profile.annual_consumption.value(),
            profile.installed_capacity.value(),
            profile.generation_units,
            profile.criticality_level,
        )?;
    }
    writer.flush()?;

    let Some(report) = &snapshot.report else {
        return Ok(());
    };
    let counts = &report.counts;
    println!();
    println!(
        "Run {} (UTM zone {}{})",
        report.run_id,
        report.utm_zone,
        if report.southern_hemisphere { "S" } else { "N" }
    );
    println!(
        "  Substations  : {} read, {} tessellated",
        counts.substations_read, counts.substations_tessellated
    );
    println!(
        "  Transformers : {} read, {} assigned",
        counts.transformers_read, counts.transformers_assigned
    );
    println!(
        "  Consumers    : {} read, {} attributed",
        counts.consumers_read, counts.consumers_attributed
    );
    println!(
        "  Generation   : {} read, {} attributed",
        counts.generation_units_read, counts.generation_units_attributed
    );

    let quality = report.diagnostics.quality.nonzero();
    if quality.is_empty() {
        println!("Data quality: no issues");
    } else {
        println!("Data quality:");
        for (category, count) in quality {
            println!("  {category}: {count}");
        }
    }
    Ok(())
}

//! `gridscope show`: the published profiles as a table or JSON.

use std::io::{self, Write};

use anyhow::{bail, Result};
use gridscope_cli::{GridscopeConfig, ShowFormat};
use gridscope_core::{CanonicalClass, SnapshotStore};
use gridscope_io::{published_profiles, PublishedProfile};
use tabwriter::TabWriter;

pub fn handle(config: &GridscopeConfig, territory: Option<&str>, format: ShowFormat) -> Result<()> {
    let snapshot = config.store().load_snapshot()?;
    let mut records = published_profiles(&snapshot);
    if let Some(id) = territory {
        records.retain(|r| r.id == id);
        if records.is_empty() {
            bail!("territory '{}' is not in snapshot {}", id, snapshot.meta.run_id);
        }
    }

    match format {
        ShowFormat::Table => print_table(&records),
        ShowFormat::Json => print_json(&records),
    }
}

fn print_table(records: &[PublishedProfile]) -> Result<()> {
    let mut writer = TabWriter::new(io::stdout()).padding(2);
    writeln!(writer, "TERRITORY\tCLASS\tCUSTOMERS\tCONSUMPTION (kWh)\tSHARE %\tGENERATION (kW)")?;
    for record in records {
        for class in CanonicalClass::ALL {
            let Some(stats) = record.per_class.get(class.as_str()) else {
                continue;
            };
            writeln!(
                writer,
                "{}\t{}\t{}\t{:.1}\t{:.2}\t{:.1}",
                record.id,
                class,
                stats.count,
                stats.consumption.value(),
                stats.pct,
                stats.generation_capacity.value(),
            )?;
        }
        writeln!(
            writer,
            "{}\tTOTAL\t{}\t{:.1}\t\t{:.1} ({})",
            record.id,
            record.total_customers,
            record.annual_consumption.value(),
            record.installed_capacity.value(),
            record.criticality_level,
        )?;
    }
    writer.flush()?;
    Ok(())
}

fn print_json(records: &[PublishedProfile]) -> Result<()> {
    serde_json::to_writer_pretty(io::stdout(), records)
        .map_err(|err| anyhow::anyhow!("serializing profiles to JSON: {err}"))?;
    println!();
    Ok(())
}

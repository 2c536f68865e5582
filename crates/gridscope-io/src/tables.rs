//! Asset tables on disk (Parquet or CSV) and an in-memory asset set.
//!
//! Column names follow the distribution-utility geodatabase layers, with
//! plain English aliases:
//!
//! | entity | columns |
//! |--------|---------|
//! | substation | `COD_ID`/`id`, `NOM`/`NOME`/`Nom`/`DS_NOME`/`NO_SUB`/`name`, `lon`/`x`, `lat`/`y` |
//! | transformer | `COD_ID`/`id`, `lon`/`x`, `lat`/`y` |
//! | consumer | `COD_ID`/`id`, `UNI_TR_MT`/`transformer_id`, `CLAS_SUB`/`class_code`, `PN_CON`/`consumer_ref`, `ENE_01`..`ENE_12` |
//! | generation unit | `COD_ID`/`id`, `UNI_TR_MT`/`transformer_id`, `PN_CON`/`consumer_id`, `CLAS_SUB`/`class_code`, `POT_INST`/`installed_capacity` |
//!
//! CSV files are read with every column as text so identifiers keep their
//! leading zeros; numbers are parsed later, accepting decimal commas.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use geo::Point;
use gridscope_core::{
    AssetProvider, AssetSnapshot, Consumer, ConsumerId, GenerationUnit, GenerationUnitId,
    RawValue, Substation, SubstationId, Transformer, TransformerId, PERIODS,
};
use polars::prelude::*;
use tracing::{debug, warn};

const ID: &[&str] = &["COD_ID", "id"];
const NAME: &[&str] = &["NOM", "NOME", "Nom", "DS_NOME", "NO_SUB", "name"];
const LON: &[&str] = &["lon", "x"];
const LAT: &[&str] = &["lat", "y"];
const TRANSFORMER: &[&str] = &["UNI_TR_MT", "transformer_id"];
const CLASS: &[&str] = &["CLAS_SUB", "class_code"];
const CONSUMER_LINK: &[&str] = &["PN_CON", "consumer_ref"];
const UNIT_CONSUMER: &[&str] = &["PN_CON", "consumer_id"];
const CAPACITY: &[&str] = &["POT_INST", "installed_capacity"];

/// Read a `.parquet` or `.csv` table; CSV separator `;` or `,` is sniffed
/// from the header line.
pub fn read_table(path: &Path) -> Result<DataFrame> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    let file = File::open(path).with_context(|| format!("opening table '{}'", path.display()))?;
    match extension.as_str() {
        "parquet" => ParquetReader::new(file)
            .finish()
            .with_context(|| format!("reading Parquet table '{}'", path.display())),
        "csv" => {
            let header = File::open(path).with_context(|| format!("opening '{}'", path.display()))?;
            let separator = sniff_separator(BufReader::new(header))
                .with_context(|| format!("reading header of '{}'", path.display()))?;
            CsvReader::new(file)
                .has_header(true)
                .with_separator(separator)
                .infer_schema(Some(0))
                .finish()
                .with_context(|| format!("reading CSV table '{}'", path.display()))
        }
        other => Err(anyhow!(
            "unsupported table extension '{}' (use .csv or .parquet)",
            other
        )),
    }
}

/// `;` when the header line uses it and has no commas, `,` otherwise.
fn sniff_separator(mut reader: impl BufRead) -> std::io::Result<u8> {
    let mut first = String::new();
    reader.read_line(&mut first)?;
    Ok(if first.contains(';') && !first.contains(',') {
        b';'
    } else {
        b','
    })
}

fn find<'a>(df: &'a DataFrame, aliases: &[&str]) -> Option<&'a Series> {
    aliases.iter().find_map(|name| df.column(name).ok())
}

fn require<'a>(df: &'a DataFrame, table: &str, aliases: &[&str]) -> Result<&'a Series> {
    find(df, aliases).ok_or_else(|| anyhow!("table '{}' has none of the columns {:?}", table, aliases))
}

/// Cells of a column as optional text; numbers are formatted.
fn text_column(series: &Series) -> Result<Vec<Option<String>>> {
    let cast = series.cast(&DataType::Utf8)?;
    Ok(cast
        .utf8()?
        .into_iter()
        .map(|cell| cell.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
        .collect())
}

/// Cells of a column as raw values; numeric columns stay numeric.
fn raw_column(series: &Series) -> Result<Vec<RawValue>> {
    if series.dtype().is_numeric() {
        let cast = series.cast(&DataType::Float64)?;
        return Ok(cast.f64()?.into_iter().map(RawValue::from).collect());
    }
    Ok(text_column(series)?
        .into_iter()
        .map(|cell| cell.map_or(RawValue::Missing, RawValue::Text))
        .collect())
}

fn optional_text(df: &DataFrame, aliases: &[&str]) -> Result<Vec<Option<String>>> {
    match find(df, aliases) {
        Some(series) => text_column(series),
        None => Ok(vec![None; df.height()]),
    }
}

fn optional_raw(df: &DataFrame, aliases: &[&str]) -> Result<Vec<RawValue>> {
    match find(df, aliases) {
        Some(series) => raw_column(series),
        None => Ok(vec![RawValue::Missing; df.height()]),
    }
}

/// Point per row; unparseable coordinates become NaN so later stages report
/// the entity instead of placing it at the origin.
fn points(df: &DataFrame, table: &str) -> Result<Vec<Point<f64>>> {
    let lon = raw_column(require(df, table, LON)?)?;
    let lat = raw_column(require(df, table, LAT)?)?;
    Ok(lon
        .iter()
        .zip(&lat)
        .map(|(x, y)| {
            Point::new(
                x.as_number().unwrap_or(f64::NAN),
                y.as_number().unwrap_or(f64::NAN),
            )
        })
        .collect())
}

fn ids(df: &DataFrame, table: &str) -> Result<Vec<Option<String>>> {
    text_column(require(df, table, ID)?)
}

fn skipped(table: &str, count: usize) {
    if count > 0 {
        warn!("Skipped {} {} rows without an id", count, table);
    }
}

pub fn substations_from_frame(df: &DataFrame) -> Result<Vec<Substation>> {
    let ids = ids(df, "substations")?;
    let names = optional_text(df, NAME)?;
    let points = points(df, "substations")?;
    let mut missing = 0;
    let rows: Vec<Substation> = ids
        .into_iter()
        .zip(names)
        .zip(points)
        .filter_map(|((id, name), location)| {
            let Some(id) = id else {
                missing += 1;
                return None;
            };
            Some(Substation {
                name: name.unwrap_or_else(|| id.clone()),
                id: SubstationId::new(id),
                location,
            })
        })
        .collect();
    skipped("substation", missing);
    Ok(rows)
}

pub fn transformers_from_frame(df: &DataFrame) -> Result<Vec<Transformer>> {
    let ids = ids(df, "transformers")?;
    let points = points(df, "transformers")?;
    let mut missing = 0;
    let rows: Vec<Transformer> = ids
        .into_iter()
        .zip(points)
        .filter_map(|(id, location)| match id {
            Some(id) => Some(Transformer {
                id: TransformerId::new(id),
                location,
            }),
            None => {
                missing += 1;
                None
            }
        })
        .collect();
    skipped("transformer", missing);
    Ok(rows)
}

pub fn consumers_from_frame(df: &DataFrame) -> Result<Vec<Consumer>> {
    let ids = ids(df, "consumers")?;
    let transformers = text_column(require(df, "consumers", TRANSFORMER)?)?;
    let classes = optional_text(df, CLASS)?;
    let links = optional_text(df, CONSUMER_LINK)?;
    let mut periods: Vec<Vec<RawValue>> = Vec::with_capacity(PERIODS);
    for month in 1..=PERIODS {
        let name = format!("ENE_{month:02}");
        periods.push(optional_raw(df, &[name.as_str()])?);
    }

    let mut consumers = Vec::with_capacity(df.height());
    let mut missing = 0;
    for row in 0..df.height() {
        let Some(id) = ids[row].clone() else {
            missing += 1;
            continue;
        };
        consumers.push(Consumer {
            id: ConsumerId::new(id),
            // an empty transformer reference is an orphan, counted downstream
            transformer_id: TransformerId::new(transformers[row].clone().unwrap_or_default()),
            class_code: classes[row].clone(),
            connection_point: links[row].clone(),
            period_values: std::array::from_fn(|month| periods[month][row].clone()),
        });
    }
    skipped("consumer", missing);
    Ok(consumers)
}

pub fn generation_units_from_frame(df: &DataFrame) -> Result<Vec<GenerationUnit>> {
    let ids = ids(df, "generation_units")?;
    let transformers = text_column(require(df, "generation_units", TRANSFORMER)?)?;
    let links = optional_text(df, UNIT_CONSUMER)?;
    let classes = optional_text(df, CLASS)?;
    let capacity = optional_raw(df, CAPACITY)?;

    let mut units = Vec::with_capacity(df.height());
    let mut missing = 0;
    for row in 0..df.height() {
        let Some(id) = ids[row].clone() else {
            missing += 1;
            continue;
        };
        units.push(GenerationUnit {
            id: GenerationUnitId::new(id),
            transformer_id: TransformerId::new(transformers[row].clone().unwrap_or_default()),
            consumer_id: links[row].clone(),
            class_code: classes[row].clone(),
            installed_capacity: capacity[row].clone(),
        });
    }
    skipped("generation unit", missing);
    Ok(units)
}

/// Asset tables on disk. Generation units are optional.
#[derive(Debug, Clone)]
pub struct TableAssets {
    pub substations: PathBuf,
    pub transformers: PathBuf,
    pub consumers: PathBuf,
    pub generation_units: Option<PathBuf>,
}

impl TableAssets {
    fn load<T>(path: &Path, parse: fn(&DataFrame) -> Result<Vec<T>>) -> Result<Vec<T>> {
        let df = read_table(path)?;
        debug!("Read {} rows from {}", df.height(), path.display());
        parse(&df).with_context(|| format!("in table '{}'", path.display()))
    }
}

impl AssetProvider for TableAssets {
    fn get_substations(&self) -> Result<Vec<Substation>> {
        Self::load(&self.substations, substations_from_frame)
    }

    fn get_transformers(&self) -> Result<Vec<Transformer>> {
        Self::load(&self.transformers, transformers_from_frame)
    }

    fn get_consumers(&self) -> Result<Vec<Consumer>> {
        Self::load(&self.consumers, consumers_from_frame)
    }

    fn get_generation_units(&self) -> Result<Vec<GenerationUnit>> {
        match &self.generation_units {
            Some(path) => Self::load(path, generation_units_from_frame),
            None => Ok(Vec::new()),
        }
    }
}

/// Assets held in memory, for embedding callers and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAssets(pub AssetSnapshot);

impl AssetProvider for InMemoryAssets {
    fn get_substations(&self) -> Result<Vec<Substation>> {
        Ok(self.0.substations.clone())
    }

    fn get_transformers(&self) -> Result<Vec<Transformer>> {
        Ok(self.0.transformers.clone())
    }

    fn get_consumers(&self) -> Result<Vec<Consumer>> {
        Ok(self.0.consumers.clone())
    }

    fn get_generation_units(&self) -> Result<Vec<GenerationUnit>> {
        Ok(self.0.generation_units.clone())
    }

    fn snapshot(&self) -> Result<AssetSnapshot> {
        Ok(self.0.clone())
    }
}

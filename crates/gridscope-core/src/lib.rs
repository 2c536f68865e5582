//! # gridscope-core: Distribution Territory Data Model
//!
//! Provides the entities shared by every stage of a territory regeneration
//! run: substations, transformers, consumers and generation units as read
//! from the asset dataset, the territories derived from them, and the
//! per-territory market profiles published at the end of a run.
//!
//! ## Design Philosophy
//!
//! A run reads an immutable [`AssetSnapshot`] and produces a complete new
//! [`Snapshot`]; nothing from a previous run is mutated. Entities are kept
//! as flat record arenas keyed by type-safe string ids so later stages can
//! build plain lookup indexes (territory id → polygon, transformer id →
//! territory id, consumer id → class) instead of nested mutable structures.
//!
//! ## Core Data Structures
//!
//! - [`Substation`], [`Transformer`], [`Consumer`], [`GenerationUnit`] - raw inputs
//! - [`Territory`] - one clipped service-area polygon per substation
//! - [`TerritoryProfile`] - aggregated market statistics per territory
//! - [`CanonicalClass`], [`Criticality`] - the fixed reporting vocabularies
//! - Type-safe IDs: [`SubstationId`], [`TransformerId`], [`ConsumerId`], [`GenerationUnitId`]
//!
//! ## Modules
//!
//! - [`error`] - fatal error taxonomy ([`GridError`])
//! - [`diagnostics`] - non-fatal data-quality counters
//! - [`sources`] - traits for boundary/asset providers and the snapshot store
//! - [`report`] - the result of a run
//! - [`units`] - kWh / kW newtypes

use std::collections::BTreeMap;

use geo::{MultiPolygon, Point};
use serde::{Deserialize, Serialize};

pub mod diagnostics;
pub mod error;
pub mod report;
pub mod sources;
pub mod units;

pub use diagnostics::{DataQuality, DiagnosticIssue, Diagnostics, QualityCategory};
pub use error::{GeometryError, GridError, GridResult, InputError, PersistenceError};
pub use report::{RunReport, Snapshot, SnapshotMeta, StageCounts};
pub use sources::{AssetProvider, BoundaryProvider, SnapshotStore};
pub use units::{KilowattHours, Kilowatts};

/// Number of billing periods carried per consumer record.
pub const PERIODS: usize = 12;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[inline]
            pub fn new(value: impl Into<String>) -> Self {
                $name(value.into())
            }
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name(value)
            }
        }
    };
}

string_id!(
    /// Substation identity; territories share it.
    SubstationId
);
string_id!(TransformerId);
string_id!(ConsumerId);
string_id!(GenerationUnitId);

/// A territory is identified by the substation that owns it.
pub type TerritoryId = SubstationId;

#[derive(Debug, Clone, PartialEq)]
pub struct Substation {
    pub id: SubstationId,
    pub name: String,
    pub location: Point<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transformer {
    pub id: TransformerId,
    pub location: Point<f64>,
}

/// A raw cell from the asset dataset before numeric coercion.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawValue {
    Number(f64),
    Text(String),
    #[default]
    Missing,
}

impl RawValue {
    /// Numeric value of the cell, `None` when it is missing, non-finite or
    /// does not parse.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Number(v) if v.is_finite() => Some(*v),
            RawValue::Number(_) | RawValue::Missing => None,
            RawValue::Text(text) => parse_decimal(text),
        }
    }
}

/// Parse a number that may use a decimal comma and dot thousands
/// separators ("1.234,5" → 1234.5). Non-finite results are rejected, as
/// is a comma ahead of a dot ("1,234.5"), which has no single reading.
pub fn parse_decimal(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let (Some(comma), Some(dot)) = (trimmed.find(','), trimmed.rfind('.')) {
        if comma < dot {
            return None;
        }
    }
    let normalized = if trimmed.contains(',') {
        trimmed.replace('.', "").replace(',', ".")
    } else {
        trimmed.to_string()
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<Option<f64>> for RawValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(RawValue::Missing, RawValue::Number)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

/// End customer connected to a transformer.
#[derive(Debug, Clone, PartialEq)]
pub struct Consumer {
    pub id: ConsumerId,
    pub transformer_id: TransformerId,
    /// Raw tariff class code (e.g. "RE1", "CO3")
    pub class_code: Option<String>,
    /// Connection point shared with generation units at the same premises
    pub connection_point: Option<String>,
    /// Monthly energy readings, kWh, as delivered
    pub period_values: [RawValue; PERIODS],
}

/// Distributed-generation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationUnit {
    pub id: GenerationUnitId,
    pub transformer_id: TransformerId,
    /// Originating consumer (id or connection point) to inherit the class from
    pub consumer_id: Option<String>,
    /// Direct class code, when the dataset carries one
    pub class_code: Option<String>,
    /// Installed capacity, kW, as delivered
    pub installed_capacity: RawValue,
}

/// Everything a run reads, captured once at the start.
#[derive(Debug, Clone, Default)]
pub struct AssetSnapshot {
    pub substations: Vec<Substation>,
    pub transformers: Vec<Transformer>,
    pub consumers: Vec<Consumer>,
    pub generation_units: Vec<GenerationUnit>,
}

/// Service area of one substation.
#[derive(Debug, Clone, PartialEq)]
pub struct Territory {
    pub id: TerritoryId,
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

/// Fixed customer categories used for aggregation and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CanonicalClass {
    Residential,
    Commercial,
    Industrial,
    Rural,
    PublicPower,
    Other,
}

impl CanonicalClass {
    pub const ALL: [CanonicalClass; 6] = [
        CanonicalClass::Residential,
        CanonicalClass::Commercial,
        CanonicalClass::Industrial,
        CanonicalClass::Rural,
        CanonicalClass::PublicPower,
        CanonicalClass::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalClass::Residential => "Residential",
            CanonicalClass::Commercial => "Commercial",
            CanonicalClass::Industrial => "Industrial",
            CanonicalClass::Rural => "Rural",
            CanonicalClass::PublicPower => "PublicPower",
            CanonicalClass::Other => "Other",
        }
    }
}

impl std::fmt::Display for CanonicalClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CanonicalClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CanonicalClass::ALL
            .into_iter()
            .find(|class| class.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown canonical class '{s}'"))
    }
}

/// Distributed-generation penetration level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Criticality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Criticality::Low => "low",
            Criticality::Medium => "medium",
            Criticality::High => "high",
        })
    }
}

/// Per-class slice of a territory profile.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassStats {
    pub count: u64,
    pub consumption: KilowattHours,
    /// Share of the territory's total consumption, 0–100
    pub pct: f64,
    pub generation_capacity: Kilowatts,
}

/// Aggregated market statistics of one territory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerritoryProfile {
    /// Territory (and substation) id; also the reference to its polygon
    pub id: TerritoryId,
    pub name: String,
    pub total_customers: u64,
    pub annual_consumption: KilowattHours,
    pub installed_capacity: Kilowatts,
    pub generation_units: u64,
    pub criticality_level: Criticality,
    pub per_class: BTreeMap<CanonicalClass, ClassStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_order_and_display() {
        let a = SubstationId::new("SE-01");
        let b: SubstationId = "SE-02".into();
        assert!(a < b);
        assert_eq!(a.to_string(), "SE-01");
        assert_eq!(b.as_str(), "SE-02");
    }

    #[test]
    fn test_canonical_class_parse() {
        assert_eq!(
            "publicpower".parse::<CanonicalClass>().unwrap(),
            CanonicalClass::PublicPower
        );
        assert!("Farming".parse::<CanonicalClass>().is_err());
    }

    #[test]
    fn test_raw_value_conversions() {
        assert_eq!(RawValue::from(Some(2.0)), RawValue::Number(2.0));
        assert_eq!(RawValue::from(None::<f64>), RawValue::Missing);
        assert_eq!(RawValue::from("1,5"), RawValue::Text("1,5".into()));
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("1.234,5"), Some(1234.5));
        assert_eq!(parse_decimal("12,75"), Some(12.75));
        assert_eq!(parse_decimal(" 42 "), Some(42.0));
        assert_eq!(parse_decimal("3.5"), Some(3.5));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("n/d"), None);
        assert_eq!(parse_decimal("NaN"), None);
        assert_eq!(parse_decimal("inf"), None);
        assert_eq!(parse_decimal("1,234.5"), None);
        assert_eq!(parse_decimal("1.234.567,8"), Some(1234567.8));
    }

    #[test]
    fn test_raw_value_as_number() {
        assert_eq!(RawValue::Number(7.0).as_number(), Some(7.0));
        assert_eq!(RawValue::Number(f64::NAN).as_number(), None);
        assert_eq!(RawValue::Missing.as_number(), None);
        assert_eq!(RawValue::Text("0,5".into()).as_number(), Some(0.5));
        assert_eq!(RawValue::Text("1,234.5".into()).as_number(), None);
    }

    #[test]
    fn test_profile_serializes_class_names() {
        let mut per_class = BTreeMap::new();
        per_class.insert(CanonicalClass::PublicPower, ClassStats::default());
        let profile = TerritoryProfile {
            id: "SE-01".into(),
            name: "Centro".into(),
            total_customers: 0,
            annual_consumption: KilowattHours(0.0),
            installed_capacity: Kilowatts(0.0),
            generation_units: 0,
            criticality_level: Criticality::Low,
            per_class,
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["criticality_level"], "low");
        assert!(json["per_class"].get("PublicPower").is_some());
        assert_eq!(json["id"], "SE-01");
    }
}

//! Records handed to API and dashboard consumers: one per territory, the
//! profile joined with its lon/lat geometry.

use std::collections::{BTreeMap, HashMap};

use gridscope_core::{ClassStats, Criticality, KilowattHours, Kilowatts, Snapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::geojson::geometry_to_value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedProfile {
    pub id: String,
    pub name: String,
    /// GeoJSON geometry, `null` when the territory is missing
    pub geometry: Value,
    pub total_customers: u64,
    pub annual_consumption: KilowattHours,
    pub installed_capacity: Kilowatts,
    pub generation_units: u64,
    pub criticality_level: Criticality,
    pub per_class: BTreeMap<String, ClassStats>,
}

/// Published records in territory-id order.
pub fn published_profiles(snapshot: &Snapshot) -> Vec<PublishedProfile> {
    let geometry: HashMap<&str, Value> = snapshot
        .territories
        .iter()
        .map(|t| (t.id.as_str(), geometry_to_value(&t.geometry)))
        .collect();

    let mut records: Vec<PublishedProfile> = snapshot
        .profiles
        .iter()
        .map(|p| PublishedProfile {
            id: p.id.to_string(),
            name: p.name.clone(),
            geometry: geometry.get(p.id.as_str()).cloned().unwrap_or(Value::Null),
            total_customers: p.total_customers,
            annual_consumption: p.annual_consumption,
            installed_capacity: p.installed_capacity,
            generation_units: p.generation_units,
            criticality_level: p.criticality_level,
            per_class: p
                .per_class
                .iter()
                .map(|(class, stats)| (class.as_str().to_string(), *stats))
                .collect(),
        })
        .collect();
    records.sort_by(|a, b| a.id.cmp(&b.id));
    records
}

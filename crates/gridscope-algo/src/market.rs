//! Market aggregation: consumers and generation units → territory profiles.
//!
//! The aggregation is a pure function of the transformer assignment and the
//! raw records. Joins go through flat indexes (transformer id → territory
//! id, consumer reference → canonical class per territory); nothing here
//! touches geometry.
//!
//! Missing or unparseable numbers become zero, and every such substitution
//! is counted in the run diagnostics.

use std::collections::{BTreeMap, HashMap, HashSet};

use gridscope_core::{
    CanonicalClass, ClassStats, Consumer, Criticality, Diagnostics, GenerationUnit, KilowattHours,
    Kilowatts, QualityCategory, Territory, TerritoryId, TerritoryProfile, TransformerId,
};
use serde::{Deserialize, Serialize};

use crate::classes::ClassTable;
use crate::resolve::TransformerAssignment;

/// Installed-capacity thresholds for the criticality level, kW.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriticalityThresholds {
    pub medium_kw: f64,
    pub high_kw: f64,
}

impl Default for CriticalityThresholds {
    fn default() -> Self {
        Self {
            medium_kw: 1000.0,
            high_kw: 5000.0,
        }
    }
}

impl CriticalityThresholds {
    /// Below `medium_kw` → low, `[medium_kw, high_kw)` → medium, else high.
    pub fn level(&self, capacity: Kilowatts) -> Criticality {
        let kw = capacity.value();
        if kw >= self.high_kw {
            Criticality::High
        } else if kw >= self.medium_kw {
            Criticality::Medium
        } else {
            Criticality::Low
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.medium_kw.is_finite() || !self.high_kw.is_finite() {
            return Err("criticality thresholds must be finite".into());
        }
        if self.medium_kw < 0.0 || self.medium_kw >= self.high_kw {
            return Err(format!(
                "criticality thresholds need 0 <= medium_kw < high_kw, got {} and {}",
                self.medium_kw, self.high_kw
            ));
        }
        Ok(())
    }
}

/// Profiles plus attribution counts.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSummary {
    /// One profile per territory, sorted by territory id
    pub profiles: Vec<TerritoryProfile>,
    pub consumers_attributed: usize,
    pub generation_units_attributed: usize,
}

#[derive(Default)]
struct TerritoryTotals {
    customers: u64,
    consumption: KilowattHours,
    capacity: Kilowatts,
    generation_units: u64,
    per_class: BTreeMap<CanonicalClass, ClassStats>,
    /// consumer id and connection point → class, first record wins
    class_of: HashMap<String, CanonicalClass>,
}

impl TerritoryTotals {
    fn new() -> Self {
        Self {
            per_class: CanonicalClass::ALL
                .iter()
                .map(|c| (*c, ClassStats::default()))
                .collect(),
            ..Default::default()
        }
    }

    fn class_slot(&mut self, class: CanonicalClass) -> &mut ClassStats {
        self.per_class.entry(class).or_default()
    }
}

fn territory_of<'t>(
    totals: &'t mut BTreeMap<TerritoryId, TerritoryTotals>,
    assignment: &TransformerAssignment,
    transformer: &TransformerId,
) -> Option<&'t mut TerritoryTotals> {
    let territory = assignment.get(transformer)?;
    totals.get_mut(territory)
}

pub struct MarketAggregator<'a> {
    classes: &'a ClassTable,
    thresholds: CriticalityThresholds,
}

impl<'a> MarketAggregator<'a> {
    pub fn new(classes: &'a ClassTable, thresholds: CriticalityThresholds) -> Self {
        Self {
            classes,
            thresholds,
        }
    }

    /// Aggregate every attributable record into its territory's profile.
    /// Territories without any record still get an all-zero profile.
    pub fn aggregate(
        &self,
        territories: &[Territory],
        assignment: &TransformerAssignment,
        consumers: &[Consumer],
        generation_units: &[GenerationUnit],
        diagnostics: &mut Diagnostics,
    ) -> MarketSummary {
        let mut totals: BTreeMap<TerritoryId, TerritoryTotals> = territories
            .iter()
            .map(|t| (t.id.clone(), TerritoryTotals::new()))
            .collect();

        let consumers_attributed = self.add_consumers(&mut totals, assignment, consumers, diagnostics);
        let generation_units_attributed =
            self.add_generation_units(&mut totals, assignment, generation_units, diagnostics);

        let names: HashMap<&TerritoryId, &str> =
            territories.iter().map(|t| (&t.id, t.name.as_str())).collect();
        let profiles = totals
            .into_iter()
            .map(|(id, t)| {
                let name = names.get(&id).copied().unwrap_or_default().to_string();
                self.profile(id, name, t)
            })
            .collect();

        MarketSummary {
            profiles,
            consumers_attributed,
            generation_units_attributed,
        }
    }

    fn add_consumers(
        &self,
        totals: &mut BTreeMap<TerritoryId, TerritoryTotals>,
        assignment: &TransformerAssignment,
        consumers: &[Consumer],
        diagnostics: &mut Diagnostics,
    ) -> usize {
        let mut seen: HashSet<&str> = HashSet::with_capacity(consumers.len());
        let mut attributed = 0;

        for consumer in consumers {
            let id = consumer.id.as_str();
            if !seen.insert(id) {
                diagnostics.record(
                    QualityCategory::DuplicateConsumerId,
                    id,
                    "consumer id repeated in the dataset",
                );
            }

            let mut annual = 0.0;
            let mut zero_filled = 0u64;
            for value in &consumer.period_values {
                match value.as_number() {
                    Some(v) => annual += v,
                    None => zero_filled += 1,
                }
            }
            diagnostics.record_n(
                QualityCategory::ZeroFilledEnergy,
                zero_filled,
                id,
                &format!("{zero_filled} period value(s) missing or non-numeric, treated as 0"),
            );

            let classification = self.classes.classify(consumer.class_code.as_deref());
            if !classification.mapped {
                diagnostics.record(
                    QualityCategory::UnmappedClassCode,
                    id,
                    &format!(
                        "class code '{}' has no rule, counted as Other",
                        consumer.class_code.as_deref().unwrap_or_default()
                    ),
                );
            }

            let Some(territory) = territory_of(totals, assignment, &consumer.transformer_id) else {
                diagnostics.record(
                    QualityCategory::OrphanedConsumer,
                    id,
                    &format!("transformer '{}' is not in any territory", consumer.transformer_id),
                );
                continue;
            };

            attributed += 1;
            let class = classification.class;
            let annual = KilowattHours(annual);
            territory.customers += 1;
            territory.consumption += annual;
            let slot = territory.class_slot(class);
            slot.count += 1;
            slot.consumption += annual;

            territory.class_of.entry(id.to_string()).or_insert(class);
            if let Some(point) = consumer.connection_point.as_deref().map(str::trim) {
                if !point.is_empty() {
                    territory.class_of.entry(point.to_string()).or_insert(class);
                }
            }
        }
        attributed
    }

    fn add_generation_units(
        &self,
        totals: &mut BTreeMap<TerritoryId, TerritoryTotals>,
        assignment: &TransformerAssignment,
        units: &[GenerationUnit],
        diagnostics: &mut Diagnostics,
    ) -> usize {
        let mut attributed = 0;

        for unit in units {
            let id = unit.id.as_str();
            let Some(territory) = territory_of(totals, assignment, &unit.transformer_id) else {
                diagnostics.record(
                    QualityCategory::OrphanedGenerationUnit,
                    id,
                    &format!("transformer '{}' is not in any territory", unit.transformer_id),
                );
                continue;
            };

            let capacity = match unit.installed_capacity.as_number() {
                Some(kw) => kw,
                None => {
                    diagnostics.record(
                        QualityCategory::ZeroFilledCapacity,
                        id,
                        "installed capacity missing or non-numeric, treated as 0",
                    );
                    0.0
                }
            };

            let direct = unit
                .class_code
                .as_deref()
                .map(str::trim)
                .filter(|code| !code.is_empty());
            let class = match direct {
                Some(code) => {
                    let classification = self.classes.classify(Some(code));
                    if !classification.mapped {
                        diagnostics.record(
                            QualityCategory::UnmappedClassCode,
                            id,
                            &format!("class code '{code}' has no rule, counted as Other"),
                        );
                    }
                    classification.class
                }
                None => {
                    let inherited = unit
                        .consumer_id
                        .as_deref()
                        .map(str::trim)
                        .and_then(|reference| territory.class_of.get(reference).copied());
                    match inherited {
                        Some(class) => class,
                        None => {
                            diagnostics.record(
                                QualityCategory::UnlinkedGenerationUnit,
                                id,
                                "no class code and no consumer link in its territory, counted as Other",
                            );
                            CanonicalClass::Other
                        }
                    }
                }
            };

            attributed += 1;
            let capacity = Kilowatts(capacity);
            territory.capacity += capacity;
            territory.generation_units += 1;
            territory.class_slot(class).generation_capacity += capacity;
        }
        attributed
    }

    fn profile(&self, id: TerritoryId, name: String, mut totals: TerritoryTotals) -> TerritoryProfile {
        let total = totals.consumption;
        // a negative net total still splits into shares summing to 100
        for stats in totals.per_class.values_mut() {
            stats.pct = if total.value() != 0.0 {
                stats.consumption / total * 100.0
            } else {
                0.0
            };
        }
        TerritoryProfile {
            id,
            name,
            total_customers: totals.customers,
            annual_consumption: total,
            installed_capacity: totals.capacity,
            generation_units: totals.generation_units,
            criticality_level: self.thresholds.level(totals.capacity),
            per_class: totals.per_class,
        }
    }
}

//! Data-quality accounting for regeneration runs.
//!
//! Nothing a run drops or substitutes may disappear silently. Every
//! occurrence of a non-fatal problem (a zero-filled energy reading, an
//! orphaned consumer, a sliver discarded after clipping, ...) increments a
//! counter in [`DataQuality`]. [`Diagnostics`] wraps those counters together
//! with a bounded sample of the affected entities so an operator can trace
//! what was excluded without the run report growing with the dataset.
//!
//! # Example
//!
//! ```
//! use gridscope_core::diagnostics::{Diagnostics, QualityCategory};
//!
//! let mut diag = Diagnostics::with_sample_limit(1);
//! diag.record(QualityCategory::OrphanedConsumer, "UC-1", "transformer T-9 unassigned");
//! diag.record(QualityCategory::OrphanedConsumer, "UC-2", "transformer T-9 unassigned");
//!
//! assert_eq!(diag.quality.orphaned_consumers, 2);
//! assert_eq!(diag.issues.len(), 1); // only the first sample is kept
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Kinds of non-fatal data-quality warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityCategory {
    /// Period energy value missing or non-numeric, replaced by 0
    ZeroFilledEnergy,
    /// Installed capacity missing or non-numeric, replaced by 0
    ZeroFilledCapacity,
    /// Class code matched no rule and fell into `Other`
    UnmappedClassCode,
    /// Transformer contained by no territory
    OrphanedTransformer,
    /// Consumer whose transformer is unknown or unassigned
    OrphanedConsumer,
    /// Generation unit whose transformer is unknown or unassigned
    OrphanedGenerationUnit,
    /// Generation unit with neither a class code nor a resolvable consumer
    UnlinkedGenerationUnit,
    /// Substation outside the boundary, excluded before tessellation
    SubstationOutsideBoundary,
    /// Transformer on a shared territory edge, assigned to the lowest id
    EdgeTiedTransformer,
    /// Clipped fragment below the minimum area
    DroppedSliver,
    /// Tessellation cell that does not intersect the boundary
    EmptyCell,
    /// Cell clipped with the inside-only fallback instead of overlay
    FallbackClip,
    /// Consumer id seen more than once
    DuplicateConsumerId,
}

impl QualityCategory {
    pub const ALL: [QualityCategory; 13] = [
        QualityCategory::ZeroFilledEnergy,
        QualityCategory::ZeroFilledCapacity,
        QualityCategory::UnmappedClassCode,
        QualityCategory::OrphanedTransformer,
        QualityCategory::OrphanedConsumer,
        QualityCategory::OrphanedGenerationUnit,
        QualityCategory::UnlinkedGenerationUnit,
        QualityCategory::SubstationOutsideBoundary,
        QualityCategory::EdgeTiedTransformer,
        QualityCategory::DroppedSliver,
        QualityCategory::EmptyCell,
        QualityCategory::FallbackClip,
        QualityCategory::DuplicateConsumerId,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityCategory::ZeroFilledEnergy => "zero_filled_energy",
            QualityCategory::ZeroFilledCapacity => "zero_filled_capacity",
            QualityCategory::UnmappedClassCode => "unmapped_class_code",
            QualityCategory::OrphanedTransformer => "orphaned_transformer",
            QualityCategory::OrphanedConsumer => "orphaned_consumer",
            QualityCategory::OrphanedGenerationUnit => "orphaned_generation_unit",
            QualityCategory::UnlinkedGenerationUnit => "unlinked_generation_unit",
            QualityCategory::SubstationOutsideBoundary => "substation_outside_boundary",
            QualityCategory::EdgeTiedTransformer => "edge_tied_transformer",
            QualityCategory::DroppedSliver => "dropped_sliver",
            QualityCategory::EmptyCell => "empty_cell",
            QualityCategory::FallbackClip => "fallback_clip",
            QualityCategory::DuplicateConsumerId => "duplicate_consumer_id",
        }
    }
}

impl std::fmt::Display for QualityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable warning counters surfaced in every run result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataQuality {
    pub zero_filled_energy_values: u64,
    pub zero_filled_capacity_values: u64,
    pub unmapped_class_codes: u64,
    pub orphaned_transformers: u64,
    pub orphaned_consumers: u64,
    pub orphaned_generation_units: u64,
    pub unlinked_generation_units: u64,
    pub substations_outside_boundary: u64,
    pub edge_tied_transformers: u64,
    pub dropped_slivers: u64,
    pub empty_cells: u64,
    pub fallback_clips: u64,
    pub duplicate_consumer_ids: u64,
}

impl DataQuality {
    fn slot(&mut self, category: QualityCategory) -> &mut u64 {
        match category {
            QualityCategory::ZeroFilledEnergy => &mut self.zero_filled_energy_values,
            QualityCategory::ZeroFilledCapacity => &mut self.zero_filled_capacity_values,
            QualityCategory::UnmappedClassCode => &mut self.unmapped_class_codes,
            QualityCategory::OrphanedTransformer => &mut self.orphaned_transformers,
            QualityCategory::OrphanedConsumer => &mut self.orphaned_consumers,
            QualityCategory::OrphanedGenerationUnit => &mut self.orphaned_generation_units,
            QualityCategory::UnlinkedGenerationUnit => &mut self.unlinked_generation_units,
            QualityCategory::SubstationOutsideBoundary => &mut self.substations_outside_boundary,
            QualityCategory::EdgeTiedTransformer => &mut self.edge_tied_transformers,
            QualityCategory::DroppedSliver => &mut self.dropped_slivers,
            QualityCategory::EmptyCell => &mut self.empty_cells,
            QualityCategory::FallbackClip => &mut self.fallback_clips,
            QualityCategory::DuplicateConsumerId => &mut self.duplicate_consumer_ids,
        }
    }

    /// Increment the counter for `category` by `n`.
    pub fn add(&mut self, category: QualityCategory, n: u64) {
        *self.slot(category) += n;
    }

    /// Read the counter for `category`.
    pub fn get(&self, category: QualityCategory) -> u64 {
        let mut copy = *self;
        *copy.slot(category)
    }

    /// Sum of all counters.
    pub fn total(&self) -> u64 {
        QualityCategory::ALL.iter().map(|c| self.get(*c)).sum()
    }

    /// Non-zero counters in category order.
    pub fn nonzero(&self) -> Vec<(QualityCategory, u64)> {
        QualityCategory::ALL
            .iter()
            .map(|c| (*c, self.get(*c)))
            .filter(|(_, n)| *n > 0)
            .collect()
    }

    /// Add every counter of `other` into `self`.
    pub fn merge(&mut self, other: &DataQuality) {
        for category in QualityCategory::ALL {
            self.add(category, other.get(category));
        }
    }
}

/// A sampled occurrence of a data-quality warning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticIssue {
    pub category: QualityCategory,
    /// Entity the warning is about (e.g. "UC 1234", "cell #3")
    pub entity: String,
    /// Human-readable description
    pub message: String,
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[warning:{}] {} ({})", self.category, self.message, self.entity)
    }
}

/// Counters plus a bounded per-category sample of issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
    pub quality: DataQuality,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub issues: Vec<DiagnosticIssue>,
    #[serde(skip, default = "default_sample_limit")]
    sample_limit: usize,
    #[serde(skip)]
    sampled: BTreeMap<QualityCategory, usize>,
}

fn default_sample_limit() -> usize {
    Diagnostics::DEFAULT_SAMPLE_LIMIT
}

/// Equal when counters and sampled issues match; sampling state is ignored.
impl PartialEq for Diagnostics {
    fn eq(&self, other: &Self) -> bool {
        self.quality == other.quality && self.issues == other.issues
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::with_sample_limit(Self::DEFAULT_SAMPLE_LIMIT)
    }
}

impl Diagnostics {
    pub const DEFAULT_SAMPLE_LIMIT: usize = 50;

    /// Create new empty diagnostics
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` sampled issues per category.
    pub fn with_sample_limit(limit: usize) -> Self {
        Self {
            quality: DataQuality::default(),
            issues: Vec::new(),
            sample_limit: limit,
            sampled: BTreeMap::new(),
        }
    }

    /// Count one occurrence and keep it as a sample while under the limit.
    pub fn record(&mut self, category: QualityCategory, entity: &str, message: &str) {
        self.record_n(category, 1, entity, message);
    }

    /// Count `n` occurrences that share one entity and message.
    pub fn record_n(&mut self, category: QualityCategory, n: u64, entity: &str, message: &str) {
        if n == 0 {
            return;
        }
        self.quality.add(category, n);
        let kept = self.sampled.entry(category).or_insert(0);
        if *kept < self.sample_limit {
            *kept += 1;
            self.issues.push(DiagnosticIssue {
                category,
                entity: entity.to_string(),
                message: message.to_string(),
            });
        }
    }

    /// Get sampled issues of one category
    pub fn issues_by_category(
        &self,
        category: QualityCategory,
    ) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    /// Check if anything was recorded
    pub fn has_warnings(&self) -> bool {
        self.quality.total() > 0
    }

    /// Merge another diagnostics into this one, respecting this sample limit.
    pub fn merge(&mut self, other: Diagnostics) {
        self.quality.merge(&other.quality);
        for issue in other.issues {
            let kept = self.sampled.entry(issue.category).or_insert(0);
            if *kept < self.sample_limit {
                *kept += 1;
                self.issues.push(issue);
            }
        }
    }

    /// Get summary string
    pub fn summary(&self) -> String {
        match self.quality.total() {
            0 => "No data-quality warnings".to_string(),
            1 => "1 data-quality warning".to_string(),
            n => format!("{} data-quality warnings", n),
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for (category, count) in self.quality.nonzero() {
            writeln!(f, "  {:<28} {}", category.as_str(), count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_increments_counter() {
        let mut diag = Diagnostics::new();
        diag.record(QualityCategory::ZeroFilledEnergy, "UC 1", "ENE_03 missing");
        diag.record_n(QualityCategory::ZeroFilledEnergy, 4, "UC 2", "4 periods missing");

        assert_eq!(diag.quality.zero_filled_energy_values, 5);
        assert_eq!(diag.issues.len(), 2);
        assert!(diag.has_warnings());
    }

    #[test]
    fn test_sample_limit_is_per_category() {
        let mut diag = Diagnostics::with_sample_limit(2);
        for i in 0..5 {
            diag.record(QualityCategory::OrphanedConsumer, &format!("UC {i}"), "orphan");
        }
        diag.record(QualityCategory::DroppedSliver, "cell #1", "sliver");

        assert_eq!(diag.quality.orphaned_consumers, 5);
        assert_eq!(diag.issues_by_category(QualityCategory::OrphanedConsumer).count(), 2);
        assert_eq!(diag.issues_by_category(QualityCategory::DroppedSliver).count(), 1);
    }

    #[test]
    fn test_record_zero_is_noop() {
        let mut diag = Diagnostics::new();
        diag.record_n(QualityCategory::EmptyCell, 0, "cell #0", "nothing");
        assert!(!diag.has_warnings());
        assert!(diag.issues.is_empty());
    }

    #[test]
    fn test_merge_adds_counters() {
        let mut a = Diagnostics::new();
        a.record(QualityCategory::FallbackClip, "cell #1", "overlay failed");
        let mut b = Diagnostics::new();
        b.record(QualityCategory::FallbackClip, "cell #2", "overlay failed");
        b.record(QualityCategory::OrphanedTransformer, "T 9", "outside");

        a.merge(b);
        assert_eq!(a.quality.fallback_clips, 2);
        assert_eq!(a.quality.orphaned_transformers, 1);
        assert_eq!(a.quality.total(), 3);
    }

    #[test]
    fn test_nonzero_and_summary() {
        let mut quality = DataQuality::default();
        assert!(quality.nonzero().is_empty());
        quality.add(QualityCategory::UnmappedClassCode, 3);
        assert_eq!(quality.nonzero(), vec![(QualityCategory::UnmappedClassCode, 3)]);
        assert_eq!(quality.get(QualityCategory::UnmappedClassCode), 3);

        let diag = Diagnostics::new();
        assert_eq!(diag.summary(), "No data-quality warnings");
    }

    #[test]
    fn test_quality_serializes_every_counter() {
        let json = serde_json::to_value(DataQuality::default()).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), QualityCategory::ALL.len());
        assert!(object.contains_key("orphaned_consumers"));
    }
}

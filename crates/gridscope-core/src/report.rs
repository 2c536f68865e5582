//! Result of a regeneration run and the published snapshot.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostics;
use crate::{Territory, TerritoryProfile};

/// How many entities survived each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageCounts {
    pub substations_read: usize,
    pub substations_tessellated: usize,
    pub cells: usize,
    pub territories: usize,
    pub transformers_read: usize,
    pub transformers_assigned: usize,
    pub consumers_read: usize,
    pub consumers_attributed: usize,
    pub generation_units_read: usize,
    pub generation_units_attributed: usize,
}

/// Summary of one run, serialized next to every published snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub place: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// UTM zone used for planar geometry
    pub utm_zone: u8,
    pub southern_hemisphere: bool,
    pub counts: StageCounts,
    pub diagnostics: Diagnostics,
}

impl RunReport {
    pub fn elapsed(&self) -> Duration {
        self.finished_at - self.started_at
    }
}

/// Identity and age of a published snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub run_id: String,
    pub place: String,
    pub updated_at: DateTime<Utc>,
}

impl SnapshotMeta {
    pub fn new(run_id: impl Into<String>, place: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            place: place.into(),
            updated_at: Utc::now(),
        }
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.updated_at
    }

    /// Whether the snapshot is younger than `max_age_hours` at `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, max_age_hours: f64) -> bool {
        if !max_age_hours.is_finite() || max_age_hours <= 0.0 {
            return false;
        }
        let max_age = Duration::milliseconds((max_age_hours * 3_600_000.0) as i64);
        self.age_at(now) < max_age
    }
}

/// Territories, profiles and the run report, always published together.
///
/// Territory geometry is in geographic coordinates (lon/lat).
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub territories: Vec<Territory>,
    pub profiles: Vec<TerritoryProfile>,
    pub report: Option<RunReport>,
}

impl Snapshot {
    pub fn empty(place: impl Into<String>) -> Self {
        Self {
            meta: SnapshotMeta::new("none", place),
            territories: Vec::new(),
            profiles: Vec::new(),
            report: None,
        }
    }

    pub fn profile(&self, id: &str) -> Option<&TerritoryProfile> {
        self.profiles.iter().find(|p| p.id.as_str() == id)
    }

    pub fn territory(&self, id: &str) -> Option<&Territory> {
        self.territories.iter().find(|t| t.id.as_str() == id)
    }
}

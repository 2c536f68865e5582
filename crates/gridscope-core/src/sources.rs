//! Collaborator interfaces of a regeneration run.
//!
//! Boundary and asset providers are the upstream datasets; a
//! [`SnapshotStore`] is the persistence gateway the results are published
//! to. Providers report failures as `anyhow` errors; the pipeline maps them
//! into [`crate::InputError::Provider`].

use anyhow::Result;
use chrono::Utc;
use geo::MultiPolygon;

use crate::error::PersistenceError;
use crate::report::{Snapshot, SnapshotMeta};
use crate::{AssetSnapshot, Consumer, GenerationUnit, Substation, Territory, TerritoryProfile, Transformer};

/// Supplies the municipal boundary in geographic coordinates (lon/lat).
pub trait BoundaryProvider {
    fn get_boundary(&self, place: &str) -> Result<MultiPolygon<f64>>;
}

/// Supplies the raw network assets in geographic coordinates.
pub trait AssetProvider {
    fn get_substations(&self) -> Result<Vec<Substation>>;
    fn get_transformers(&self) -> Result<Vec<Transformer>>;
    fn get_consumers(&self) -> Result<Vec<Consumer>>;
    fn get_generation_units(&self) -> Result<Vec<GenerationUnit>>;

    /// Read every dataset once.
    fn snapshot(&self) -> Result<AssetSnapshot> {
        Ok(AssetSnapshot {
            substations: self.get_substations()?,
            transformers: self.get_transformers()?,
            consumers: self.get_consumers()?,
            generation_units: self.get_generation_units()?,
        })
    }
}

/// Persistence gateway. Every write is a full replace; readers observe
/// either the previous snapshot or the new one.
pub trait SnapshotStore {
    /// Atomically replace the published snapshot.
    fn publish(&self, snapshot: &Snapshot) -> Result<(), PersistenceError>;

    /// The currently published snapshot.
    fn load_snapshot(&self) -> Result<Snapshot, PersistenceError>;

    fn load_territories(&self) -> Result<Vec<Territory>, PersistenceError> {
        Ok(self.load_snapshot()?.territories)
    }

    fn load_profiles(&self) -> Result<Vec<TerritoryProfile>, PersistenceError> {
        Ok(self.load_snapshot()?.profiles)
    }

    /// Replace the territories, carrying the published profiles forward.
    fn save_territories(&self, territories: &[Territory]) -> Result<(), PersistenceError> {
        let mut snapshot = self.current_or_empty()?;
        snapshot.territories = territories.to_vec();
        snapshot.meta.updated_at = Utc::now();
        self.publish(&snapshot)
    }

    /// Replace the profiles, carrying the published territories forward.
    fn save_profiles(&self, profiles: &[TerritoryProfile]) -> Result<(), PersistenceError> {
        let mut snapshot = self.current_or_empty()?;
        snapshot.profiles = profiles.to_vec();
        snapshot.meta.updated_at = Utc::now();
        self.publish(&snapshot)
    }

    /// Metadata of the published snapshot, `None` when nothing is published.
    fn meta(&self) -> Result<Option<SnapshotMeta>, PersistenceError> {
        match self.load_snapshot() {
            Ok(snapshot) => Ok(Some(snapshot.meta)),
            Err(PersistenceError::NoSnapshot) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether a snapshot younger than `max_age_hours` is published.
    fn is_fresh(&self, max_age_hours: f64) -> Result<bool, PersistenceError> {
        Ok(self
            .meta()?
            .is_some_and(|meta| meta.is_fresh_at(Utc::now(), max_age_hours)))
    }

    #[doc(hidden)]
    fn current_or_empty(&self) -> Result<Snapshot, PersistenceError> {
        match self.load_snapshot() {
            Ok(snapshot) => Ok(snapshot),
            Err(PersistenceError::NoSnapshot) => Ok(Snapshot::empty("")),
            Err(e) => Err(e),
        }
    }
}

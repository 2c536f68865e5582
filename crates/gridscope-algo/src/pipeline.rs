//! End-to-end regeneration run.
//!
//! [`Pipeline::run`] reads the boundary and the asset snapshot once, builds
//! territories in a UTM plane, aggregates the market and returns a complete
//! [`Snapshot`] in lon/lat. Nothing is published until the whole run has
//! succeeded; [`Pipeline::regenerate`] hands the finished snapshot to a
//! [`SnapshotStore`] in one call.

use std::collections::HashSet;

use chrono::Utc;
use geo::{Area, BoundingRect, Centroid, Coord, Intersects, MultiPolygon};
use gridscope_core::{
    AssetProvider, AssetSnapshot, BoundaryProvider, Diagnostics, GeometryError, GridError,
    GridResult, InputError, QualityCategory, RunReport, Snapshot, SnapshotMeta, SnapshotStore,
    StageCounts, Substation, Territory, Transformer,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classes::{ClassRule, ClassTable};
use crate::clip::clip_cells;
use crate::market::{CriticalityThresholds, MarketAggregator};
use crate::partition::check_coverage;
use crate::projection::UtmProjection;
use crate::resolve::{assign_transformers, resolve_territories};
use crate::voronoi::{tessellate, Site, TessellationOptions};

/// Tunables of a run, the `[pipeline]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Clipped fragments at or below this area are discarded, m²
    pub min_fragment_area_m2: f64,
    /// Substations closer than this are coincident, m
    pub coincident_epsilon_m: f64,
    pub far_point_factor: f64,
    /// Allowed relative gap between territory area and boundary area
    pub coverage_tolerance: f64,
    /// Derived from the boundary centroid when absent
    pub utm_zone: Option<u8>,
    pub southern_hemisphere: Option<bool>,
    /// Sampled issues kept per data-quality category
    pub issue_sample_limit: usize,
    pub criticality: CriticalityThresholds,
    /// Evaluated before the built-in class prefixes
    pub class_rules: Vec<ClassRule>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_fragment_area_m2: 1.0,
            coincident_epsilon_m: 0.01,
            far_point_factor: 2.0,
            coverage_tolerance: 1e-3,
            utm_zone: None,
            southern_hemisphere: None,
            issue_sample_limit: Diagnostics::DEFAULT_SAMPLE_LIMIT,
            criticality: CriticalityThresholds::default(),
            class_rules: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> GridResult<()> {
        let non_negative = [
            ("min_fragment_area_m2", self.min_fragment_area_m2),
            ("coincident_epsilon_m", self.coincident_epsilon_m),
            ("coverage_tolerance", self.coverage_tolerance),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(GridError::Config(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        if !self.far_point_factor.is_finite() || self.far_point_factor < 2.0 {
            return Err(GridError::Config(format!(
                "far_point_factor must be at least 2, got {}",
                self.far_point_factor
            )));
        }
        if let Some(zone) = self.utm_zone {
            UtmProjection::new(zone, false)?;
        }
        self.criticality.validate().map_err(GridError::Config)?;
        for (i, rule) in self.class_rules.iter().enumerate() {
            rule.validate()
                .map_err(|e| GridError::Config(format!("class_rules[{i}]: {e}")))?;
        }
        Ok(())
    }
}

/// Territories in the projected plane plus what it took to build them.
struct Partition {
    projection: UtmProjection,
    territories: Vec<Territory>,
    counts: StageCounts,
}

/// Result of a territories-only run.
#[derive(Debug, Clone)]
pub struct TerritoryRun {
    /// Lon/lat geometry, sorted by id
    pub territories: Vec<Territory>,
    pub counts: StageCounts,
    pub diagnostics: Diagnostics,
}

pub struct Pipeline {
    config: PipelineConfig,
    classes: ClassTable,
}

impl Pipeline {
    /// Validate `config` and build the class table once.
    pub fn new(config: PipelineConfig) -> GridResult<Self> {
        config.validate()?;
        let classes = ClassTable::new(&config.class_rules);
        Ok(Self { config, classes })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Full regeneration from the providers. Provider failures become
    /// [`InputError::Provider`].
    pub fn run(
        &self,
        place: &str,
        boundary: &dyn BoundaryProvider,
        assets: &dyn AssetProvider,
    ) -> GridResult<Snapshot> {
        let boundary = fetch_boundary(place, boundary)?;
        let snapshot = assets.snapshot().map_err(|source| InputError::Provider {
            provider: "asset",
            source,
        })?;
        self.run_snapshot(place, &boundary, &snapshot)
    }

    /// Run, then publish the result. A failed run publishes nothing.
    pub fn regenerate(
        &self,
        place: &str,
        boundary: &dyn BoundaryProvider,
        assets: &dyn AssetProvider,
        store: &dyn SnapshotStore,
    ) -> GridResult<Snapshot> {
        let snapshot = self.run(place, boundary, assets)?;
        store.publish(&snapshot)?;
        info!(
            "Published snapshot {} with {} territories",
            snapshot.meta.run_id,
            snapshot.territories.len()
        );
        Ok(snapshot)
    }

    /// Full regeneration over already-loaded inputs (boundary in lon/lat).
    pub fn run_snapshot(
        &self,
        place: &str,
        boundary: &MultiPolygon<f64>,
        assets: &AssetSnapshot,
    ) -> GridResult<Snapshot> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        info!("Starting run {} for '{}'", run_id, place);

        if assets.transformers.is_empty() {
            return Err(InputError::EmptyDataset { dataset: "transformers" }.into());
        }
        if assets.consumers.is_empty() {
            return Err(InputError::EmptyDataset { dataset: "consumers" }.into());
        }
        check_unique("transformer", assets.transformers.iter().map(|t| t.id.as_str()))?;

        let mut diagnostics = Diagnostics::with_sample_limit(self.config.issue_sample_limit);
        let partition = self.partition(place, boundary, &assets.substations, &mut diagnostics)?;
        let mut counts = partition.counts;
        let projection = partition.projection;

        let transformers: Vec<_> = assets
            .transformers
            .iter()
            .map(|t| Transformer {
                id: t.id.clone(),
                location: projection.forward_point(t.location),
            })
            .collect();
        let assignment = assign_transformers(&partition.territories, &transformers, &mut diagnostics);
        counts.transformers_read = transformers.len();
        counts.transformers_assigned = assignment.len();
        info!(
            "Assigned {} of {} transformers",
            counts.transformers_assigned, counts.transformers_read
        );

        let aggregator = MarketAggregator::new(&self.classes, self.config.criticality);
        let market = aggregator.aggregate(
            &partition.territories,
            &assignment,
            &assets.consumers,
            &assets.generation_units,
            &mut diagnostics,
        );
        counts.consumers_read = assets.consumers.len();
        counts.consumers_attributed = market.consumers_attributed;
        counts.generation_units_read = assets.generation_units.len();
        counts.generation_units_attributed = market.generation_units_attributed;
        info!(
            "Aggregated {} consumers and {} generation units into {} profiles",
            counts.consumers_attributed,
            counts.generation_units_attributed,
            market.profiles.len()
        );

        log_quality(&diagnostics);

        let territories = unproject(&projection, partition.territories);
        let finished_at = Utc::now();
        let report = RunReport {
            run_id: run_id.clone(),
            place: place.to_string(),
            started_at,
            finished_at,
            utm_zone: projection.zone(),
            southern_hemisphere: projection.is_south(),
            counts,
            diagnostics,
        };
        info!(
            "Run {} finished in {} ms",
            run_id,
            report.elapsed().num_milliseconds()
        );

        Ok(Snapshot {
            meta: SnapshotMeta {
                run_id,
                place: place.to_string(),
                updated_at: finished_at,
            },
            territories,
            profiles: market.profiles,
            report: Some(report),
        })
    }

    /// Tessellate, clip and resolve only; needs just the substations.
    pub fn territories(
        &self,
        place: &str,
        boundary: &dyn BoundaryProvider,
        assets: &dyn AssetProvider,
    ) -> GridResult<TerritoryRun> {
        let boundary = fetch_boundary(place, boundary)?;
        let substations = assets.get_substations().map_err(|source| InputError::Provider {
            provider: "asset",
            source,
        })?;
        let mut diagnostics = Diagnostics::with_sample_limit(self.config.issue_sample_limit);
        let partition = self.partition(place, &boundary, &substations, &mut diagnostics)?;
        log_quality(&diagnostics);
        Ok(TerritoryRun {
            territories: unproject(&partition.projection, partition.territories),
            counts: partition.counts,
            diagnostics,
        })
    }

    fn projection_for(&self, boundary: &MultiPolygon<f64>) -> GridResult<UtmProjection> {
        let centroid = boundary.centroid();
        match (self.config.utm_zone, centroid) {
            (Some(zone), c) => {
                let south = self
                    .config
                    .southern_hemisphere
                    .or(c.map(|p| p.y() < 0.0))
                    .unwrap_or(false);
                UtmProjection::new(zone, south)
            }
            (None, Some(c)) => {
                let derived = UtmProjection::for_lon_lat(c.x(), c.y());
                match self.config.southern_hemisphere {
                    Some(south) => UtmProjection::new(derived.zone(), south),
                    None => Ok(derived),
                }
            }
            (None, None) => Err(GeometryError::InvalidBoundary {
                reason: "boundary has no centroid".into(),
            }
            .into()),
        }
    }

    fn partition(
        &self,
        place: &str,
        boundary_lonlat: &MultiPolygon<f64>,
        substations: &[Substation],
        diagnostics: &mut Diagnostics,
    ) -> GridResult<Partition> {
        if boundary_lonlat.0.is_empty() {
            return Err(InputError::MissingBoundary {
                place: place.to_string(),
                reason: "boundary has no polygons".into(),
            }
            .into());
        }
        if substations.is_empty() {
            return Err(InputError::EmptyDataset { dataset: "substations" }.into());
        }
        check_unique("substation", substations.iter().map(|s| s.id.as_str()))?;

        let projection = self.projection_for(boundary_lonlat)?;
        let boundary = projection.project(boundary_lonlat);
        validate_boundary(&boundary)?;
        debug!(
            "Projected boundary to UTM zone {}{} ({:.0} m²)",
            projection.zone(),
            if projection.is_south() { "S" } else { "N" },
            boundary.unsigned_area()
        );

        let mut counts = StageCounts {
            substations_read: substations.len(),
            ..Default::default()
        };
        let mut inside = Vec::with_capacity(substations.len());
        for substation in substations {
            let location = projection.forward_point(substation.location);
            if !(location.x().is_finite() && location.y().is_finite()) {
                return Err(GeometryError::InvalidCoordinate {
                    id: substation.id.to_string(),
                    reason: format!(
                        "({}, {}) does not project",
                        substation.location.x(),
                        substation.location.y()
                    ),
                }
                .into());
            }
            if boundary.intersects(&location) {
                inside.push(Substation {
                    id: substation.id.clone(),
                    name: substation.name.clone(),
                    location,
                });
            } else {
                diagnostics.record(
                    QualityCategory::SubstationOutsideBoundary,
                    substation.id.as_str(),
                    "outside the boundary, excluded from tessellation",
                );
            }
        }
        if inside.len() < 2 {
            return Err(InputError::TooFewSubstations { found: inside.len() }.into());
        }
        counts.substations_tessellated = inside.len();

        let sites: Vec<Site> = inside
            .iter()
            .map(|s| Site::new(s.id.as_str(), s.location.x(), s.location.y()))
            .collect();
        let options = TessellationOptions {
            coincident_epsilon: self.config.coincident_epsilon_m,
            far_point_factor: self.config.far_point_factor,
            extent: boundary.bounding_rect(),
        };
        let cells = tessellate(&sites, &options)?;
        info!("Tessellated {} substations", cells.len());

        let clipped = clip_cells(&cells, &boundary, self.config.min_fragment_area_m2, diagnostics)?;
        counts.cells = clipped.len();
        let territories = resolve_territories(&clipped, &inside)?;
        counts.territories = territories.len();

        let coverage = check_coverage(&territories, &boundary, self.config.coverage_tolerance)?;
        info!(
            "Resolved {} territories covering {:.0} of {:.0} m²",
            territories.len(),
            coverage.covered_area,
            coverage.boundary_area
        );

        Ok(Partition {
            projection,
            territories,
            counts,
        })
    }
}

fn fetch_boundary(place: &str, provider: &dyn BoundaryProvider) -> GridResult<MultiPolygon<f64>> {
    provider.get_boundary(place).map_err(|source| {
        // providers report an unusable boundary as an `InputError` of their own
        match source.downcast::<InputError>() {
            Ok(input) => GridError::from(input),
            Err(source) => GridError::from(InputError::Provider {
                provider: "boundary",
                source,
            }),
        }
    })
}

fn check_unique<'a>(kind: &'static str, ids: impl Iterator<Item = &'a str>) -> GridResult<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(InputError::DuplicateId {
                kind,
                id: id.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

fn validate_boundary(boundary: &MultiPolygon<f64>) -> Result<(), GeometryError> {
    let finite = boundary
        .iter()
        .flat_map(|p| p.exterior().coords().chain(p.interiors().iter().flat_map(|r| r.coords())))
        .all(|c: &Coord<f64>| c.x.is_finite() && c.y.is_finite());
    if !finite {
        return Err(GeometryError::InvalidBoundary {
            reason: "non-finite coordinate after projection".into(),
        });
    }
    let area = boundary.unsigned_area();
    if area.is_nan() || area <= 0.0 {
        return Err(GeometryError::InvalidBoundary {
            reason: format!("boundary area is {area}"),
        });
    }
    Ok(())
}

fn unproject(projection: &UtmProjection, territories: Vec<Territory>) -> Vec<Territory> {
    territories
        .into_iter()
        .map(|t| Territory {
            geometry: projection.unproject(&t.geometry),
            ..t
        })
        .collect()
}

fn log_quality(diagnostics: &Diagnostics) {
    for (category, count) in diagnostics.quality.nonzero() {
        warn!("{}: {}", category.as_str(), count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_rejections() {
        let cases = [
            PipelineConfig {
                far_point_factor: 1.5,
                ..Default::default()
            },
            PipelineConfig {
                min_fragment_area_m2: -1.0,
                ..Default::default()
            },
            PipelineConfig {
                utm_zone: Some(61),
                ..Default::default()
            },
            PipelineConfig {
                criticality: CriticalityThresholds {
                    medium_kw: 5000.0,
                    high_kw: 1000.0,
                },
                ..Default::default()
            },
            PipelineConfig {
                class_rules: vec![ClassRule {
                    code: None,
                    prefix: None,
                    class: gridscope_core::CanonicalClass::Other,
                }],
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(Pipeline::new(config.clone()), Err(GridError::Config(_))),
                "accepted {config:?}"
            );
        }
    }

    #[test]
    fn test_partial_toml_section() {
        let config: PipelineConfig = toml::from_str(
            r#"
            utm_zone = 24
            southern_hemisphere = true

            [criticality]
            high_kw = 8000.0

            [[class_rules]]
            code = "B1"
            class = "Residential"
            "#,
        )
        .unwrap();
        assert_eq!(config.utm_zone, Some(24));
        assert_eq!(config.criticality.medium_kw, 1000.0);
        assert_eq!(config.criticality.high_kw, 8000.0);
        assert_eq!(config.min_fragment_area_m2, 1.0);
        assert_eq!(config.class_rules.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = check_unique("substation", ["A", "B", "A"].into_iter()).unwrap_err();
        assert!(matches!(
            err,
            GridError::Input(InputError::DuplicateId { kind: "substation", ref id }) if id == "A"
        ));
    }
}

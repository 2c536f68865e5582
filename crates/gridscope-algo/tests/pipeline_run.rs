//! End-to-end runs over a small lon/lat municipality near Aracaju.

use anyhow::anyhow;
use geo::{polygon, Area, MultiPolygon, Point};
use gridscope_algo::partition::max_overlap;
use gridscope_algo::{Pipeline, PipelineConfig};
use gridscope_core::{
    AssetProvider, AssetSnapshot, BoundaryProvider, CanonicalClass, Consumer, Criticality,
    GenerationUnit, GeometryError, GridError, InputError, RawValue, SnapshotStore, Substation,
    Transformer,
};
use gridscope_io::{InMemoryAssets, MemorySnapshotStore, StaticBoundary};

const PLACE: &str = "Aracaju";

fn boundary() -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon![
        (x: -37.10, y: -11.00),
        (x: -37.00, y: -11.00),
        (x: -37.00, y: -10.90),
        (x: -37.10, y: -10.90),
    ]])
}

fn substation(id: &str, lon: f64, lat: f64) -> Substation {
    Substation {
        id: id.into(),
        name: format!("SE {id}"),
        location: Point::new(lon, lat),
    }
}

fn transformer(id: &str, lon: f64, lat: f64) -> Transformer {
    Transformer {
        id: id.into(),
        location: Point::new(lon, lat),
    }
}

fn consumer(id: &str, transformer: &str, class: &str, monthly: f64) -> Consumer {
    Consumer {
        id: id.into(),
        transformer_id: transformer.into(),
        class_code: Some(class.to_string()),
        connection_point: Some(format!("PC-{id}")),
        period_values: std::array::from_fn(|_| RawValue::Number(monthly)),
    }
}

fn generation_unit(id: &str, transformer: &str, consumer: &str, kw: f64) -> GenerationUnit {
    GenerationUnit {
        id: id.into(),
        transformer_id: transformer.into(),
        consumer_id: Some(consumer.to_string()),
        class_code: None,
        installed_capacity: RawValue::Number(kw),
    }
}

fn assets() -> AssetSnapshot {
    AssetSnapshot {
        substations: vec![
            substation("SE-1", -37.08, -10.98),
            substation("SE-2", -37.02, -10.98),
            substation("SE-3", -37.05, -10.92),
            substation("SE-9", -36.50, -10.90),
        ],
        transformers: vec![
            transformer("T-1", -37.079, -10.979),
            transformer("T-2", -37.021, -10.979),
            transformer("T-3", -37.05, -10.921),
            transformer("T-9", -36.0, -10.0),
        ],
        consumers: vec![
            consumer("UC-1", "T-1", "RE1", 100.0),
            consumer("UC-2", "T-2", "CO1", 300.0),
            consumer("UC-3", "T-2", "RE2", 100.0),
            consumer("UC-4", "T-3", "IN", 50.0),
            consumer("UC-9", "T-9", "RE1", 1000.0),
        ],
        generation_units: vec![
            generation_unit("GD-1", "T-2", "UC-2", 6000.0),
            generation_unit("GD-2", "T-3", "UC-4", 1500.0),
            generation_unit("GD-9", "T-9", "UC-9", 10.0),
        ],
    }
}

fn pipeline() -> Pipeline {
    Pipeline::new(PipelineConfig::default()).unwrap()
}

struct FailingAssets;

impl AssetProvider for FailingAssets {
    fn get_substations(&self) -> anyhow::Result<Vec<Substation>> {
        Err(anyhow!("connection refused"))
    }
    fn get_transformers(&self) -> anyhow::Result<Vec<Transformer>> {
        Err(anyhow!("connection refused"))
    }
    fn get_consumers(&self) -> anyhow::Result<Vec<Consumer>> {
        Err(anyhow!("connection refused"))
    }
    fn get_generation_units(&self) -> anyhow::Result<Vec<GenerationUnit>> {
        Err(anyhow!("connection refused"))
    }
}

struct FailingBoundary;

impl BoundaryProvider for FailingBoundary {
    fn get_boundary(&self, _place: &str) -> anyhow::Result<MultiPolygon<f64>> {
        Err(anyhow!("geocoder timed out"))
    }
}

#[test]
fn full_run_partitions_and_aggregates() {
    let snapshot = pipeline()
        .run(PLACE, &StaticBoundary(boundary()), &InMemoryAssets(assets()))
        .unwrap();

    let ids: Vec<&str> = snapshot.territories.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, ["SE-1", "SE-2", "SE-3"]);
    assert_eq!(snapshot.profiles.len(), 3);

    let report = snapshot.report.as_ref().unwrap();
    assert_eq!(report.utm_zone, 24);
    assert!(report.southern_hemisphere);
    assert_eq!(report.counts.substations_read, 4);
    assert_eq!(report.counts.substations_tessellated, 3);
    assert_eq!(report.counts.transformers_assigned, 3);
    assert_eq!(report.counts.consumers_attributed, 4);
    assert_eq!(report.counts.generation_units_attributed, 2);

    let quality = &report.diagnostics.quality;
    assert_eq!(quality.substations_outside_boundary, 1);
    assert_eq!(quality.orphaned_transformers, 1);
    assert_eq!(quality.orphaned_consumers, 1);
    assert_eq!(quality.orphaned_generation_units, 1);
    assert_eq!(quality.zero_filled_energy_values, 0);

    let se1 = snapshot.profile("SE-1").unwrap();
    assert_eq!(se1.criticality_level, Criticality::Low);
    assert_eq!(se1.per_class[&CanonicalClass::Residential].consumption.value(), 1200.0);

    let se2 = snapshot.profile("SE-2").unwrap();
    assert_eq!(se2.total_customers, 2);
    assert_eq!(se2.annual_consumption.value(), 4800.0);
    assert_eq!(se2.criticality_level, Criticality::High);
    assert_eq!(se2.per_class[&CanonicalClass::Commercial].generation_capacity.value(), 6000.0);
    assert_eq!(se2.per_class[&CanonicalClass::Commercial].pct, 75.0);

    let se3 = snapshot.profile("SE-3").unwrap();
    assert_eq!(se3.criticality_level, Criticality::Medium);
    assert_eq!(se3.per_class[&CanonicalClass::Industrial].generation_capacity.value(), 1500.0);
}

#[test]
fn territories_tile_the_boundary_in_lon_lat() {
    let snapshot = pipeline()
        .run(PLACE, &StaticBoundary(boundary()), &InMemoryAssets(assets()))
        .unwrap();

    let boundary_area = boundary().unsigned_area();
    let covered: f64 = snapshot.territories.iter().map(|t| t.geometry.unsigned_area()).sum();
    assert!((covered - boundary_area).abs() / boundary_area < 1e-5);

    if let Some((overlap, a, b)) = max_overlap(&snapshot.territories) {
        assert!(overlap / boundary_area < 1e-9, "{a} and {b} overlap by {overlap}");
    }
}

#[test]
fn consumption_is_conserved_and_shares_sum_to_100() {
    let snapshot = pipeline()
        .run(PLACE, &StaticBoundary(boundary()), &InMemoryAssets(assets()))
        .unwrap();

    // UC-9 is orphaned; everything else lands in exactly one territory
    let attributed: f64 = 12.0 * (100.0 + 300.0 + 100.0 + 50.0);
    let total: f64 = snapshot.profiles.iter().map(|p| p.annual_consumption.value()).sum();
    assert!((total - attributed).abs() < 1e-9);

    let customers: u64 = snapshot.profiles.iter().map(|p| p.total_customers).sum();
    assert_eq!(customers, 4);

    for profile in &snapshot.profiles {
        assert_eq!(profile.per_class.len(), CanonicalClass::ALL.len());
        let shares: f64 = profile.per_class.values().map(|s| s.pct).sum();
        assert!((shares - 100.0).abs() < 1e-9, "{} shares sum to {shares}", profile.id);
    }
}

#[test]
fn runs_are_deterministic() {
    let pipeline = pipeline();
    let first = pipeline
        .run(PLACE, &StaticBoundary(boundary()), &InMemoryAssets(assets()))
        .unwrap();
    let second = pipeline
        .run(PLACE, &StaticBoundary(boundary()), &InMemoryAssets(assets()))
        .unwrap();

    assert_eq!(first.territories, second.territories);
    assert_eq!(first.profiles, second.profiles);
    assert_ne!(first.meta.run_id, second.meta.run_id);
}

#[test]
fn coincident_substations_fail_the_run() {
    let mut input = assets();
    input.substations.push(substation("SE-4", -37.05, -10.92));
    let err = pipeline()
        .run(PLACE, &StaticBoundary(boundary()), &InMemoryAssets(input))
        .unwrap_err();
    match err {
        GridError::Geometry(GeometryError::CoincidentSites { first, second, .. }) => {
            assert_eq!(first, "SE-3");
            assert_eq!(second, "SE-4");
        }
        other => panic!("expected coincident substations, got {other:?}"),
    }
}

#[test]
fn one_substation_inside_is_too_few() {
    let mut input = assets();
    input.substations.retain(|s| s.id.as_str() == "SE-1" || s.id.as_str() == "SE-9");
    let err = pipeline()
        .run(PLACE, &StaticBoundary(boundary()), &InMemoryAssets(input))
        .unwrap_err();
    assert!(matches!(
        err,
        GridError::Input(InputError::TooFewSubstations { found: 1 })
    ));
}

#[test]
fn failed_regeneration_keeps_previous_snapshot() {
    let pipeline = pipeline();
    let store = MemorySnapshotStore::new();
    let published = pipeline
        .regenerate(PLACE, &StaticBoundary(boundary()), &InMemoryAssets(assets()), &store)
        .unwrap();

    let mut broken = assets();
    broken.consumers.clear();
    let err = pipeline
        .regenerate(PLACE, &StaticBoundary(boundary()), &InMemoryAssets(broken), &store)
        .unwrap_err();
    assert!(matches!(
        err,
        GridError::Input(InputError::EmptyDataset { dataset: "consumers" })
    ));

    let current = store.load_snapshot().unwrap();
    assert_eq!(current.meta.run_id, published.meta.run_id);
    assert_eq!(current.profiles, published.profiles);
}

#[test]
fn provider_failures_are_input_errors() {
    let pipeline = pipeline();

    let err = pipeline
        .run(PLACE, &StaticBoundary(boundary()), &FailingAssets)
        .unwrap_err();
    assert!(matches!(
        err,
        GridError::Input(InputError::Provider { provider: "asset", .. })
    ));

    let err = pipeline
        .run(PLACE, &FailingBoundary, &InMemoryAssets(assets()))
        .unwrap_err();
    assert!(matches!(
        err,
        GridError::Input(InputError::Provider { provider: "boundary", .. })
    ));
}

#[test]
fn empty_boundary_is_missing_not_provider_failure() {
    let err = pipeline()
        .run(PLACE, &StaticBoundary(MultiPolygon::new(vec![])), &InMemoryAssets(assets()))
        .unwrap_err();
    assert!(matches!(
        err,
        GridError::Input(InputError::MissingBoundary { .. })
    ));
}

#[test]
fn territories_only_needs_substations() {
    let input = AssetSnapshot {
        substations: assets().substations,
        ..Default::default()
    };
    let run = pipeline()
        .territories(PLACE, &StaticBoundary(boundary()), &InMemoryAssets(input))
        .unwrap();
    assert_eq!(run.territories.len(), 3);
    assert_eq!(run.counts.territories, 3);
    assert_eq!(run.diagnostics.quality.substations_outside_boundary, 1);
}

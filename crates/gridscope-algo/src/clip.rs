//! Clip tessellation cells against the municipal boundary.
//!
//! Boolean overlay (`geo::BooleanOps`) is the primary method. The overlay
//! engine can panic on invalid input, so it runs under `catch_unwind`; a
//! panic, or a result larger than either operand, falls back to clipping the
//! boundary rings against the convex cell (Sutherland–Hodgman), which keeps
//! only what lies inside. Fragments below the minimum area are discarded.

use std::panic::{self, AssertUnwindSafe};

use geo::{Area, BooleanOps, Coord, LineString, MultiPolygon, Polygon};
use gridscope_core::{Diagnostics, GeometryError, QualityCategory};
use tracing::debug;

/// A cell after clipping, still unattributed. `index` is the cell's
/// position in the tessellation output.
#[derive(Debug, Clone, PartialEq)]
pub struct ClippedCell {
    pub index: usize,
    pub geometry: MultiPolygon<f64>,
}

/// Relative slack when comparing an overlay result with its operands.
const AREA_SLACK: f64 = 1e-6;

/// Intersect every cell with `boundary`. Cells that end up empty are
/// dropped and counted; slivers below `min_fragment_area` are discarded.
pub fn clip_cells(
    cells: &[Polygon<f64>],
    boundary: &MultiPolygon<f64>,
    min_fragment_area: f64,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<ClippedCell>, GeometryError> {
    let boundary_area = boundary.unsigned_area();
    clip_with(cells, boundary, min_fragment_area, diagnostics, |cell| {
        overlay(cell, boundary, boundary_area)
    })
}

/// `clip_cells` with the overlay step supplied; `None` selects the fallback.
fn clip_with(
    cells: &[Polygon<f64>],
    boundary: &MultiPolygon<f64>,
    min_fragment_area: f64,
    diagnostics: &mut Diagnostics,
    overlay: impl Fn(&Polygon<f64>) -> Option<MultiPolygon<f64>>,
) -> Result<Vec<ClippedCell>, GeometryError> {
    let mut clipped = Vec::with_capacity(cells.len());

    for (index, cell) in cells.iter().enumerate() {
        let entity = format!("cell #{index}");
        let raw = match overlay(cell) {
            Some(result) => result,
            None => {
                debug!("overlay failed for {}, using inside-only clip", entity);
                diagnostics.record(
                    QualityCategory::FallbackClip,
                    &entity,
                    "boolean overlay failed; clipped boundary rings against the cell",
                );
                inside_clip(cell, boundary)
            }
        };

        let mut kept = Vec::new();
        for part in raw.0 {
            let area = part.unsigned_area();
            if area > min_fragment_area && area > 0.0 {
                kept.push(part);
            } else if !part.exterior().0.is_empty() {
                diagnostics.record(
                    QualityCategory::DroppedSliver,
                    &entity,
                    &format!("fragment of {area:.6} m² below the {min_fragment_area} m² minimum"),
                );
            }
        }

        if kept.is_empty() {
            diagnostics.record(
                QualityCategory::EmptyCell,
                &entity,
                "cell does not intersect the boundary",
            );
            continue;
        }

        let geometry = MultiPolygon::new(kept);
        check_valid(index, &geometry)?;
        clipped.push(ClippedCell { index, geometry });
    }

    Ok(clipped)
}

fn overlay(
    cell: &Polygon<f64>,
    boundary: &MultiPolygon<f64>,
    boundary_area: f64,
) -> Option<MultiPolygon<f64>> {
    let subject = MultiPolygon::new(vec![cell.clone()]);
    let result = panic::catch_unwind(AssertUnwindSafe(|| subject.intersection(boundary))).ok()?;
    let area = result.unsigned_area();
    let limit = cell.unsigned_area().min(boundary_area) * (1.0 + AREA_SLACK);
    (area.is_finite() && area <= limit).then_some(result)
}

/// Keep-only-inside clip of every boundary ring against a convex cell.
fn inside_clip(cell: &Polygon<f64>, boundary: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    let mut window: Vec<Coord<f64>> = open_ring(cell.exterior());
    if signed_area(&window) < 0.0 {
        window.reverse();
    }

    let polygons = boundary
        .iter()
        .filter_map(|polygon| {
            let exterior = sutherland_hodgman(&open_ring(polygon.exterior()), &window);
            if exterior.len() < 3 {
                return None;
            }
            let holes = polygon
                .interiors()
                .iter()
                .map(|ring| sutherland_hodgman(&open_ring(ring), &window))
                .filter(|ring| ring.len() >= 3)
                .map(LineString::from)
                .collect();
            Some(Polygon::new(LineString::from(exterior), holes))
        })
        .collect();
    MultiPolygon::new(polygons)
}

fn sutherland_hodgman(subject: &[Coord<f64>], window: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let mut output = subject.to_vec();
    for (i, &a) in window.iter().enumerate() {
        let b = window[(i + 1) % window.len()];
        let input = std::mem::take(&mut output);
        let Some(&last) = input.last() else {
            break;
        };
        let mut prev = last;
        for &current in &input {
            let current_in = side(a, b, current) >= 0.0;
            let prev_in = side(a, b, prev) >= 0.0;
            if current_in {
                if !prev_in {
                    output.push(intersect(prev, current, a, b));
                }
                output.push(current);
            } else if prev_in {
                output.push(intersect(prev, current, a, b));
            }
            prev = current;
        }
    }
    output
}

/// Positive when `p` is left of the directed edge `a → b`.
fn side(a: Coord<f64>, b: Coord<f64>, p: Coord<f64>) -> f64 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn intersect(p: Coord<f64>, q: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> Coord<f64> {
    let sp = side(a, b, p);
    let sq = side(a, b, q);
    let t = sp / (sp - sq);
    p + (q - p) * t
}

fn open_ring(ring: &LineString<f64>) -> Vec<Coord<f64>> {
    let mut coords = ring.0.clone();
    if coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    coords
}

fn signed_area(ring: &[Coord<f64>]) -> f64 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (a, b) = (ring[i], ring[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum::<f64>()
        / 2.0
}

fn check_valid(index: usize, geometry: &MultiPolygon<f64>) -> Result<(), GeometryError> {
    for polygon in geometry {
        let finite = polygon
            .exterior()
            .coords()
            .chain(polygon.interiors().iter().flat_map(|r| r.coords()))
            .all(|c| c.x.is_finite() && c.y.is_finite());
        if !finite {
            return Err(GeometryError::InvalidClippedPolygon {
                polygon: index,
                reason: "non-finite coordinate".into(),
            });
        }
        if polygon.exterior().0.len() < 4 {
            return Err(GeometryError::InvalidClippedPolygon {
                polygon: index,
                reason: format!("ring of {} coordinates", polygon.exterior().0.len()),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Contains, Point};

    fn square(min: f64, max: f64) -> Polygon<f64> {
        polygon![
            (x: min, y: min),
            (x: max, y: min),
            (x: max, y: max),
            (x: min, y: max),
        ]
    }

    #[test]
    fn test_clip_keeps_inside_part() {
        let boundary = MultiPolygon::new(vec![square(0.0, 20.0)]);
        let cell = polygon![(x: -10.0, y: -10.0), (x: 10.0, y: -10.0), (x: 10.0, y: 30.0), (x: -10.0, y: 30.0)];
        let mut diag = Diagnostics::new();
        let clipped = clip_cells(&[cell], &boundary, 1.0, &mut diag).unwrap();

        assert_eq!(clipped.len(), 1);
        assert!((clipped[0].geometry.unsigned_area() - 200.0).abs() < 1e-6);
        assert!(!diag.has_warnings());
    }

    #[test]
    fn test_cell_outside_boundary_is_dropped() {
        let boundary = MultiPolygon::new(vec![square(0.0, 20.0)]);
        let inside = square(5.0, 15.0);
        let outside = square(100.0, 120.0);
        let mut diag = Diagnostics::new();
        let clipped = clip_cells(&[inside, outside], &boundary, 1.0, &mut diag).unwrap();

        assert_eq!(clipped.len(), 1);
        assert_eq!(clipped[0].index, 0);
        assert_eq!(diag.quality.empty_cells, 1);
    }

    #[test]
    fn test_sliver_is_discarded_and_counted() {
        // boundary with a thin tooth reaching into the cell
        let boundary = MultiPolygon::new(vec![
            square(0.0, 10.0),
            polygon![(x: 20.0, y: 0.0), (x: 20.1, y: 0.0), (x: 20.1, y: 5.0), (x: 20.0, y: 5.0)],
        ]);
        let cell = polygon![(x: -5.0, y: -5.0), (x: 30.0, y: -5.0), (x: 30.0, y: 30.0), (x: -5.0, y: 30.0)];
        let mut diag = Diagnostics::new();
        let clipped = clip_cells(&[cell], &boundary, 1.0, &mut diag).unwrap();

        assert_eq!(clipped[0].geometry.0.len(), 1);
        assert_eq!(diag.quality.dropped_slivers, 1);
    }

    #[test]
    fn test_inside_clip_matches_overlay_on_convex_input() {
        let boundary = MultiPolygon::new(vec![square(0.0, 20.0)]);
        let cell = polygon![(x: 5.0, y: -40.0), (x: 40.0, y: 20.0), (x: 5.0, y: 60.0)];
        let fallback = inside_clip(&cell, &boundary);
        let overlay = MultiPolygon::new(vec![cell.clone()]).intersection(&boundary);
        assert!((fallback.unsigned_area() - overlay.unsigned_area()).abs() < 1e-6);
        assert!(fallback.contains(&Point::new(15.0, 10.0)));
        assert!(!fallback.contains(&Point::new(2.0, 10.0)));
    }

    #[test]
    fn test_inside_clip_handles_clockwise_cell() {
        let boundary = MultiPolygon::new(vec![square(0.0, 20.0)]);
        let mut ring = open_ring(square(10.0, 30.0).exterior());
        ring.reverse();
        let cell = Polygon::new(LineString::from(ring), vec![]);
        let clipped = inside_clip(&cell, &boundary);
        assert!((clipped.unsigned_area() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_failed_overlay_falls_back_on_concave_boundary() {
        // U shape: notch between the arms from x 10..20, y 10..20
        let boundary = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 30.0, y: 0.0),
            (x: 30.0, y: 20.0),
            (x: 20.0, y: 20.0),
            (x: 20.0, y: 10.0),
            (x: 10.0, y: 10.0),
            (x: 10.0, y: 20.0),
            (x: 0.0, y: 20.0),
        ]]);
        let west = polygon![(x: -10.0, y: -10.0), (x: 15.0, y: -10.0), (x: 15.0, y: 30.0), (x: -10.0, y: 30.0)];
        let east = polygon![(x: 15.0, y: -10.0), (x: 40.0, y: -10.0), (x: 40.0, y: 30.0), (x: 15.0, y: 30.0)];
        let mut diag = Diagnostics::new();
        let clipped = clip_with(&[west, east], &boundary, 1.0, &mut diag, |_| None).unwrap();

        assert_eq!(diag.quality.fallback_clips, 2);
        assert_eq!(clipped.len(), 2);
        for cell in &clipped {
            assert!((cell.geometry.unsigned_area() - 250.0).abs() < 1e-9);
        }
        assert!(clipped[0].geometry.contains(&Point::new(5.0, 15.0)));
        assert!(!clipped[0].geometry.contains(&Point::new(12.0, 15.0)));
        assert!(clipped[1].geometry.contains(&Point::new(25.0, 15.0)));
    }

    #[test]
    fn test_fallback_keeps_boundary_holes() {
        let hole = LineString::from(vec![(5.0, 5.0), (15.0, 5.0), (15.0, 15.0), (5.0, 15.0), (5.0, 5.0)]);
        let boundary = MultiPolygon::new(vec![Polygon::new(square(0.0, 20.0).exterior().clone(), vec![hole])]);
        let cell = polygon![(x: -10.0, y: -10.0), (x: 10.0, y: -10.0), (x: 10.0, y: 30.0), (x: -10.0, y: 30.0)];
        let mut diag = Diagnostics::new();
        let clipped = clip_with(&[cell], &boundary, 1.0, &mut diag, |_| None).unwrap();

        assert_eq!(diag.quality.fallback_clips, 1);
        assert!((clipped[0].geometry.unsigned_area() - 150.0).abs() < 1e-9);
        assert!(!clipped[0].geometry.contains(&Point::new(7.0, 10.0)));
        assert!(clipped[0].geometry.contains(&Point::new(2.0, 10.0)));
    }
}

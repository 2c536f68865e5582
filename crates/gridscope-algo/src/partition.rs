//! Checks that a set of territories tiles the boundary.

use geo::{Area, BooleanOps, BoundingRect, Intersects, MultiPolygon};
use gridscope_core::{GeometryError, Territory};

/// Areas measured by [`check_coverage`], square metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coverage {
    pub boundary_area: f64,
    pub covered_area: f64,
}

impl Coverage {
    /// Relative difference between covered and boundary area.
    pub fn relative_gap(&self) -> f64 {
        if self.boundary_area > 0.0 {
            (self.covered_area - self.boundary_area).abs() / self.boundary_area
        } else {
            f64::INFINITY
        }
    }
}

/// Compare the summed territory area with the boundary area.
///
/// Cells are disjoint by construction, so the sum equals the union area and
/// a relative gap within `tolerance` means the territories cover the
/// boundary.
pub fn check_coverage(
    territories: &[Territory],
    boundary: &MultiPolygon<f64>,
    tolerance: f64,
) -> Result<Coverage, GeometryError> {
    let coverage = Coverage {
        boundary_area: boundary.unsigned_area(),
        covered_area: territories.iter().map(|t| t.geometry.unsigned_area()).sum(),
    };
    if coverage.relative_gap() > tolerance {
        return Err(GeometryError::CoverageMismatch {
            boundary_area: coverage.boundary_area,
            covered_area: coverage.covered_area,
            tolerance,
        });
    }
    Ok(coverage)
}

/// Largest pairwise intersection area among territories, with the ids of
/// the pair. `None` when fewer than two territories overlap in bounding box.
pub fn max_overlap(territories: &[Territory]) -> Option<(f64, &str, &str)> {
    let bounds: Vec<_> = territories.iter().map(|t| t.geometry.bounding_rect()).collect();
    let mut worst: Option<(f64, &str, &str)> = None;

    for i in 0..territories.len() {
        for j in (i + 1)..territories.len() {
            let (Some(a), Some(b)) = (bounds[i], bounds[j]) else {
                continue;
            };
            if !a.intersects(&b) {
                continue;
            }
            let area = territories[i]
                .geometry
                .intersection(&territories[j].geometry)
                .unsigned_area();
            if worst.map_or(true, |(w, _, _)| area > w) {
                worst = Some((area, territories[i].id.as_str(), territories[j].id.as_str()));
            }
        }
    }
    worst
}

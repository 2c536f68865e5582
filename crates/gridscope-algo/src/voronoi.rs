//! Voronoi tessellation with finite reconstruction of unbounded cells.
//!
//! The diagram is read off a Delaunay triangulation (`spade`): every
//! triangulation edge is a ridge between two sites, and its Voronoi
//! vertices are the circumcenters of the triangles on either side. A ridge
//! on the convex hull has the outer face on one side, so one of its
//! vertices is at infinity. That vertex is replaced by a far point placed
//! along the ridge normal, oriented away from the centroid of the sites.
//! Each cell's vertices are then ordered by angle around their mean.
//!
//! Sites are translated to their centroid before triangulating so that
//! UTM-sized coordinates do not cost circumcenter precision.
//!
//! When every site lies on one line there are no triangles; the cells are
//! then parallel strips bounded by the perpendicular bisectors.

use std::cmp::Ordering;

use geo::{Coord, LineString, Polygon, Rect};
use gridscope_core::GeometryError;
use spade::{DelaunayTriangulation, HasPosition, Point2, Triangulation};
use tracing::debug;

/// A generating point: a substation in the projected plane.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub id: String,
    pub location: Coord<f64>,
}

impl Site {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            location: Coord { x, y },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TessellationOptions {
    /// Sites closer than this (metres) are rejected as coincident
    pub coincident_epsilon: f64,
    /// Far-point radius as a multiple of the larger of the maximum pairwise
    /// site distance and the extent diagonal; at least 2
    pub far_point_factor: f64,
    /// Region the reconstructed cells must cover, usually the boundary's
    /// bounding box
    pub extent: Option<Rect<f64>>,
}

impl Default for TessellationOptions {
    fn default() -> Self {
        Self {
            coincident_epsilon: 0.01,
            far_point_factor: 2.0,
            extent: None,
        }
    }
}

/// Cosine of the half-angle below which far points stop being pushed out.
const MIN_WEDGE_COS: f64 = 1e-3;

struct SiteVertex {
    position: Point2<f64>,
    site: usize,
}

impl HasPosition for SiteVertex {
    type Scalar = f64;

    fn position(&self) -> Point2<f64> {
        self.position
    }
}

struct InfiniteRidge {
    sites: [usize; 2],
    finite: Coord<f64>,
    direction: Coord<f64>,
}

/// One closed polygon per site, in input order.
pub fn tessellate(
    sites: &[Site],
    options: &TessellationOptions,
) -> Result<Vec<Polygon<f64>>, GeometryError> {
    validate_sites(sites, options.coincident_epsilon)?;

    let origin = mean(sites.iter().map(|s| s.location));
    let local: Vec<Coord<f64>> = sites.iter().map(|s| s.location - origin).collect();

    let mut triangulation = DelaunayTriangulation::<SiteVertex>::new();
    for (i, p) in local.iter().enumerate() {
        triangulation
            .insert(SiteVertex {
                position: Point2::new(p.x, p.y),
                site: i,
            })
            .map_err(|e| GeometryError::InvalidCoordinate {
                id: sites[i].id.clone(),
                reason: e.to_string(),
            })?;
    }

    let base = base_radius(&local, options, origin);
    let rings = if triangulation.num_inner_faces() == 0 {
        debug!("{} sites are collinear, building strip cells", sites.len());
        strip_cells(&local, base)
    } else {
        hull_cells(&triangulation, local.len(), base)
    };

    rings
        .into_iter()
        .enumerate()
        .map(|(i, ring)| {
            if ring.len() < 3 {
                return Err(GeometryError::DegenerateCell {
                    id: sites[i].id.clone(),
                    reason: format!("{} distinct vertices", ring.len()),
                });
            }
            let exterior: LineString<f64> = ring.into_iter().map(|c| c + origin).collect();
            Ok(Polygon::new(exterior, vec![]))
        })
        .collect()
}

fn validate_sites(sites: &[Site], epsilon: f64) -> Result<(), GeometryError> {
    if sites.len() < 2 {
        return Err(GeometryError::TooFewSites {
            found: sites.len(),
            ids: sites.iter().map(|s| s.id.clone()).collect(),
        });
    }
    for site in sites {
        if !site.location.x.is_finite() || !site.location.y.is_finite() {
            return Err(GeometryError::InvalidCoordinate {
                id: site.id.clone(),
                reason: format!("({}, {})", site.location.x, site.location.y),
            });
        }
    }
    for (i, a) in sites.iter().enumerate() {
        for b in &sites[i + 1..] {
            let distance = length(a.location - b.location);
            if distance <= epsilon {
                return Err(GeometryError::CoincidentSites {
                    first: a.id.clone(),
                    second: b.id.clone(),
                    distance,
                });
            }
        }
    }
    Ok(())
}

fn base_radius(local: &[Coord<f64>], options: &TessellationOptions, origin: Coord<f64>) -> f64 {
    let mut max_pairwise = 0.0f64;
    for (i, a) in local.iter().enumerate() {
        for b in &local[i + 1..] {
            max_pairwise = max_pairwise.max(length(*a - *b));
        }
    }
    // the extent must be reachable from the local origin, not just as wide
    let extent_reach = options.extent.map_or(0.0, |rect| {
        let corners = [
            rect.min(),
            rect.max(),
            Coord { x: rect.min().x, y: rect.max().y },
            Coord { x: rect.max().x, y: rect.min().y },
        ];
        corners
            .iter()
            .map(|c| length(*c - origin))
            .fold(length(rect.max() - rect.min()), f64::max)
    });
    options.far_point_factor.max(2.0) * max_pairwise.max(extent_reach)
}

fn hull_cells(
    triangulation: &DelaunayTriangulation<SiteVertex>,
    n: usize,
    base: f64,
) -> Vec<Vec<Coord<f64>>> {
    let mut vertices: Vec<Vec<Coord<f64>>> = vec![Vec::new(); n];

    for face in triangulation.inner_faces() {
        let cc = face.circumcenter();
        let cc = Coord { x: cc.x, y: cc.y };
        for vertex in face.vertices() {
            vertices[vertex.data().site].push(cc);
        }
    }

    let mut ridges = Vec::new();
    for edge in triangulation.undirected_edges() {
        let directed = edge.as_directed();
        let left = directed.face();
        let right = directed.rev().face();
        let (inner, outer_on_left) = match (left.as_inner(), right.as_inner()) {
            (Some(_), Some(_)) | (None, None) => continue,
            (Some(inner), None) => (inner, false),
            (None, Some(inner)) => (inner, true),
        };
        let a = directed.from();
        let b = directed.to();
        let pa = to_coord(a.position());
        let pb = to_coord(b.position());

        let tangent = unit(pb - pa);
        let normal = Coord { x: -tangent.y, y: tangent.x };
        // sites are centered, so the point-set centroid is the origin
        let midpoint = (pa + pb) / 2.0;
        let side = dot(midpoint, normal);
        let outward = if side.abs() > 1e-12 * length(midpoint).max(1.0) {
            side > 0.0
        } else {
            outer_on_left
        };
        let direction = if outward { normal } else { -normal };

        let cc = inner.circumcenter();
        ridges.push(InfiniteRidge {
            sites: [a.data().site, b.data().site],
            finite: Coord { x: cc.x, y: cc.y },
            direction,
        });
    }

    let radius = widened_radius(&ridges, n, base);
    for ridge in &ridges {
        let far = ridge.finite + ridge.direction * radius;
        for site in ridge.sites {
            vertices[site].push(far);
        }
    }

    vertices.into_iter().map(order_ring).collect()
}

/// Grow the radius so the chord closing the widest hull wedge still clears
/// the base radius and every finite vertex it starts from.
fn widened_radius(ridges: &[InfiniteRidge], n: usize, base: f64) -> f64 {
    let mut directions: Vec<Vec<Coord<f64>>> = vec![Vec::new(); n];
    let mut reach = 0.0f64;
    for ridge in ridges {
        reach = reach.max(length(ridge.finite));
        for site in ridge.sites {
            directions[site].push(ridge.direction);
        }
    }
    let mut min_cos = 1.0f64;
    for dirs in &directions {
        for (i, d1) in dirs.iter().enumerate() {
            for d2 in &dirs[i + 1..] {
                let half = ((1.0 + dot(*d1, *d2)) / 2.0).max(0.0).sqrt();
                min_cos = min_cos.min(half);
            }
        }
    }
    (base + reach) / min_cos.max(MIN_WEDGE_COS)
}

fn strip_cells(local: &[Coord<f64>], radius: f64) -> Vec<Vec<Coord<f64>>> {
    let anchor = local[0];
    let far = local
        .iter()
        .copied()
        .max_by(|a, b| length(*a - anchor).total_cmp(&length(*b - anchor)))
        .unwrap_or(anchor);
    let u = unit(far - anchor);
    let n = Coord { x: -u.y, y: u.x };

    let t: Vec<f64> = local.iter().map(|p| dot(*p - anchor, u)).collect();
    let mut order: Vec<usize> = (0..local.len()).collect();
    order.sort_by(|&i, &j| t[i].total_cmp(&t[j]).then(i.cmp(&j)));

    let mut rings = vec![Vec::new(); local.len()];
    for (rank, &i) in order.iter().enumerate() {
        let lo = match rank {
            0 => t[i] - radius,
            _ => (t[order[rank - 1]] + t[i]) / 2.0,
        };
        let hi = match order.get(rank + 1) {
            Some(&next) => (t[i] + t[next]) / 2.0,
            None => t[i] + radius,
        };
        let at = |along: f64, across: f64| anchor + u * along + n * across;
        rings[i] = vec![
            at(lo, -radius),
            at(hi, -radius),
            at(hi, radius),
            at(lo, radius),
        ];
    }
    rings
}

/// Sort vertices counter-clockwise around their mean and drop repeats.
fn order_ring(mut ring: Vec<Coord<f64>>) -> Vec<Coord<f64>> {
    if ring.is_empty() {
        return ring;
    }
    let center = mean(ring.iter().copied());
    ring.sort_by(|a, b| {
        let angle_a = (a.y - center.y).atan2(a.x - center.x);
        let angle_b = (b.y - center.y).atan2(b.x - center.x);
        angle_a
            .total_cmp(&angle_b)
            .then_with(|| length(*a - center).total_cmp(&length(*b - center)))
            .then_with(|| lexical(a, b))
    });
    let scale = ring.iter().map(|c| length(*c - center)).fold(1.0, f64::max);
    ring.dedup_by(|a, b| length(*a - *b) <= 1e-12 * scale);
    if ring.len() > 1 && length(ring[0] - ring[ring.len() - 1]) <= 1e-12 * scale {
        ring.pop();
    }
    ring
}

fn lexical(a: &Coord<f64>, b: &Coord<f64>) -> Ordering {
    a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y))
}

fn to_coord(p: Point2<f64>) -> Coord<f64> {
    Coord { x: p.x, y: p.y }
}

fn mean(points: impl Iterator<Item = Coord<f64>>) -> Coord<f64> {
    let (sum, count) = points.fold((Coord { x: 0.0, y: 0.0 }, 0usize), |(s, n), p| (s + p, n + 1));
    if count == 0 {
        sum
    } else {
        sum / count as f64
    }
}

fn dot(a: Coord<f64>, b: Coord<f64>) -> f64 {
    a.x * b.x + a.y * b.y
}

fn length(c: Coord<f64>) -> f64 {
    c.x.hypot(c.y)
}

fn unit(c: Coord<f64>) -> Coord<f64> {
    let len = length(c);
    if len == 0.0 {
        c
    } else {
        c / len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, Contains, Point};

    fn sites(points: &[(&str, f64, f64)]) -> Vec<Site> {
        points.iter().map(|(id, x, y)| Site::new(*id, *x, *y)).collect()
    }

    #[test]
    fn test_too_few_sites() {
        let err = tessellate(&sites(&[("SE-1", 0.0, 0.0)]), &TessellationOptions::default())
            .unwrap_err();
        assert_eq!(
            err,
            GeometryError::TooFewSites {
                found: 1,
                ids: vec!["SE-1".into()]
            }
        );
    }

    #[test]
    fn test_coincident_sites_name_both_ids() {
        let input = sites(&[("A", 0.0, 0.0), ("B", 10.0, 0.0), ("C", 10.0, 0.005)]);
        match tessellate(&input, &TessellationOptions::default()) {
            Err(GeometryError::CoincidentSites { first, second, .. }) => {
                assert_eq!(first, "B");
                assert_eq!(second, "C");
            }
            other => panic!("expected coincident error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_finite_site_rejected() {
        let input = sites(&[("A", 0.0, 0.0), ("B", f64::NAN, 1.0)]);
        assert!(matches!(
            tessellate(&input, &TessellationOptions::default()),
            Err(GeometryError::InvalidCoordinate { id, .. }) if id == "B"
        ));
    }

    #[test]
    fn test_two_sites_split_along_bisector() {
        let input = sites(&[("W", 0.0, 0.0), ("E", 10.0, 0.0)]);
        let cells = tessellate(&input, &TessellationOptions::default()).unwrap();
        assert_eq!(cells.len(), 2);
        assert!(cells[0].contains(&Point::new(4.0, 7.0)));
        assert!(cells[0].contains(&Point::new(-15.0, -7.0)));
        assert!(!cells[0].contains(&Point::new(6.0, 0.0)));
        assert!(cells[1].contains(&Point::new(6.0, -3.0)));
    }

    #[test]
    fn test_collinear_sites_make_strips() {
        let input = sites(&[("B", 10.0, 10.0), ("A", 0.0, 0.0), ("C", 30.0, 30.0)]);
        let cells = tessellate(&input, &TessellationOptions::default()).unwrap();
        // B owns the band between the bisectors at 5√2 and 20√2 along the line
        assert!(cells[0].contains(&Point::new(10.0, 10.0)));
        assert!(cells[0].contains(&Point::new(15.0, 5.0)));
        assert!(cells[1].contains(&Point::new(0.0, 0.0)));
        assert!(cells[2].contains(&Point::new(30.0, 30.0)));
        assert!(!cells[0].contains(&Point::new(25.0, 25.0)));
    }

    #[test]
    fn test_cocircular_square_gives_quadrants() {
        let input = sites(&[
            ("SW", 0.0, 0.0),
            ("SE", 10.0, 0.0),
            ("NE", 10.0, 10.0),
            ("NW", 0.0, 10.0),
        ]);
        let cells = tessellate(&input, &TessellationOptions::default()).unwrap();
        assert!(cells[0].contains(&Point::new(2.0, 2.0)));
        assert!(cells[0].contains(&Point::new(-10.0, -10.0)));
        assert!(cells[0].contains(&Point::new(0.0, -20.0)));
        assert!(!cells[0].contains(&Point::new(6.0, 6.0)));
        assert!(cells[2].contains(&Point::new(6.0, 6.0)));
        for cell in &cells {
            // the shared circumcenter (5, 5) appears once per ring
            let hits = cell
                .exterior()
                .coords()
                .filter(|c| (c.x - 5.0).abs() < 1e-9 && (c.y - 5.0).abs() < 1e-9)
                .count();
            assert!(hits <= 2, "closing coordinate repeats only the first vertex");
        }
    }

    #[test]
    fn test_cells_reach_beyond_extent() {
        let input = sites(&[("A", 0.0, 0.0), ("B", 10.0, 0.0), ("C", 5.0, 10.0)]);
        let options = TessellationOptions {
            extent: Some(Rect::new(Coord { x: -500.0, y: -500.0 }, Coord { x: 500.0, y: 500.0 })),
            ..Default::default()
        };
        let cells = tessellate(&input, &options).unwrap();
        assert!(cells[0].contains(&Point::new(-499.0, -499.0)));
        assert!(cells[1].contains(&Point::new(499.0, -499.0)));
        assert!(cells[2].contains(&Point::new(0.0, 499.0)));
        let total: f64 = cells.iter().map(|c| c.unsigned_area()).sum();
        assert!(total > 1000.0 * 1000.0);
    }

    #[test]
    fn test_tessellation_is_deterministic() {
        let input = sites(&[
            ("A", 711_000.0, 8_793_000.0),
            ("B", 713_250.5, 8_795_120.0),
            ("C", 709_870.0, 8_797_400.25),
            ("D", 715_010.0, 8_791_900.0),
            ("E", 712_400.0, 8_790_100.0),
        ]);
        let first = tessellate(&input, &TessellationOptions::default()).unwrap();
        let second = tessellate(&input, &TessellationOptions::default()).unwrap();
        assert_eq!(first, second);
        for (cell, site) in first.iter().zip(&input) {
            assert!(cell.contains(&Point(site.location)), "{} outside its cell", site.id);
        }
    }
}

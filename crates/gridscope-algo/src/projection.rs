//! UTM (Transverse Mercator) projection on the GRS80 ellipsoid.
//!
//! Tessellation and clipping need a metric plane; providers deliver lon/lat.
//! Forward and inverse series follow Snyder, *Map Projections: A Working
//! Manual* (USGS PP 1395), §8, accurate to well below a millimetre inside
//! a zone.

use geo::{Coord, MapCoords, Point};
use gridscope_core::{GridError, GridResult};

const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_222_101;
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A UTM zone, northern or southern hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtmProjection {
    zone: u8,
    south: bool,
}

impl UtmProjection {
    pub fn new(zone: u8, south: bool) -> GridResult<Self> {
        if !(1..=60).contains(&zone) {
            return Err(GridError::Config(format!(
                "UTM zone must be within 1..=60, got {zone}"
            )));
        }
        Ok(Self { zone, south })
    }

    /// Zone and hemisphere containing a lon/lat position.
    pub fn for_lon_lat(lon: f64, lat: f64) -> Self {
        let zone = (((lon + 180.0) / 6.0).floor() as i64 + 1).clamp(1, 60) as u8;
        Self {
            zone,
            south: lat < 0.0,
        }
    }

    pub fn zone(&self) -> u8 {
        self.zone
    }

    pub fn is_south(&self) -> bool {
        self.south
    }

    fn central_meridian(&self) -> f64 {
        (f64::from(self.zone) - 1.0) * 6.0 - 180.0 + 3.0
    }

    fn false_northing(&self) -> f64 {
        if self.south {
            FALSE_NORTHING_SOUTH
        } else {
            0.0
        }
    }

    /// lon/lat degrees → easting/northing metres.
    pub fn forward(&self, c: Coord<f64>) -> Coord<f64> {
        let e2 = F * (2.0 - F);
        let ep2 = e2 / (1.0 - e2);
        let phi = c.y.to_radians();
        let lambda = (c.x - self.central_meridian()).to_radians();

        let (sin_phi, cos_phi) = phi.sin_cos();
        let n = A / (1.0 - e2 * sin_phi * sin_phi).sqrt();
        let t = phi.tan().powi(2);
        let cc = ep2 * cos_phi * cos_phi;
        let a = cos_phi * lambda;
        let m = meridian_arc(phi, e2);

        let x = K0
            * n
            * (a + (1.0 - t + cc) * a.powi(3) / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * cc - 58.0 * ep2) * a.powi(5) / 120.0)
            + FALSE_EASTING;
        let y = K0
            * (m + n
                * phi.tan()
                * (a * a / 2.0
                    + (5.0 - t + 9.0 * cc + 4.0 * cc * cc) * a.powi(4) / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * cc - 330.0 * ep2) * a.powi(6) / 720.0))
            + self.false_northing();
        Coord { x, y }
    }

    /// easting/northing metres → lon/lat degrees.
    pub fn inverse(&self, c: Coord<f64>) -> Coord<f64> {
        let e2 = F * (2.0 - F);
        let ep2 = e2 / (1.0 - e2);
        let e4 = e2 * e2;
        let e6 = e4 * e2;

        let m = (c.y - self.false_northing()) / K0;
        let mu = m / (A * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
        let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());
        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let (sin1, cos1) = phi1.sin_cos();
        let c1 = ep2 * cos1 * cos1;
        let t1 = phi1.tan().powi(2);
        let n1 = A / (1.0 - e2 * sin1 * sin1).sqrt();
        let r1 = A * (1.0 - e2) / (1.0 - e2 * sin1 * sin1).powf(1.5);
        let d = (c.x - FALSE_EASTING) / (n1 * K0);

        let phi = phi1
            - (n1 * phi1.tan() / r1)
                * (d * d / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                        * d.powi(6)
                        / 720.0);
        let lambda = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / cos1;

        Coord {
            x: self.central_meridian() + lambda.to_degrees(),
            y: phi.to_degrees(),
        }
    }

    pub fn forward_point(&self, p: Point<f64>) -> Point<f64> {
        Point(self.forward(p.0))
    }

    /// Project any geometry from lon/lat to the zone plane.
    pub fn project<G: MapCoords<f64, f64>>(&self, geometry: &G) -> G::Output {
        let proj = *self;
        geometry.map_coords(move |c| proj.forward(c))
    }

    /// Project any geometry from the zone plane back to lon/lat.
    pub fn unproject<G: MapCoords<f64, f64>>(&self, geometry: &G) -> G::Output {
        let proj = *self;
        geometry.map_coords(move |c| proj.inverse(c))
    }
}

fn meridian_arc(phi: f64, e2: f64) -> f64 {
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    A * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
        - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

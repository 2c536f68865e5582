//! Municipal boundary providers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use geo::MultiPolygon;
use gridscope_core::{BoundaryProvider, InputError};
use serde_json::Value;
use tracing::debug;

use crate::geojson::select_boundary;

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";

const USER_AGENT: &str = concat!("gridscope/", env!("CARGO_PKG_VERSION"));

fn missing(place: &str, reason: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(InputError::MissingBoundary {
        place: place.to_string(),
        reason: reason.into(),
    })
}

/// Boundary read from a GeoJSON file on disk.
#[derive(Debug, Clone)]
pub struct GeoJsonBoundary {
    path: PathBuf,
}

impl GeoJsonBoundary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BoundaryProvider for GeoJsonBoundary {
    fn get_boundary(&self, place: &str) -> Result<MultiPolygon<f64>> {
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading boundary file '{}'", self.path.display()))?;
        let document: Value = serde_json::from_str(&text)
            .with_context(|| format!("parsing '{}' as GeoJSON", self.path.display()))?;
        select_boundary(&document, place)?.ok_or_else(|| {
            missing(
                place,
                format!("'{}' holds no polygon", self.path.display()),
            )
        })
    }
}

/// Boundary looked up on an OpenStreetMap Nominatim endpoint.
#[derive(Debug, Clone)]
pub struct NominatimBoundary {
    url: String,
    timeout: Duration,
}

impl Default for NominatimBoundary {
    fn default() -> Self {
        Self::new(DEFAULT_NOMINATIM_URL)
    }
}

impl NominatimBoundary {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl BoundaryProvider for NominatimBoundary {
    fn get_boundary(&self, place: &str) -> Result<MultiPolygon<f64>> {
        debug!("Querying {} for '{}'", self.url, place);
        let response = ureq::get(&self.url)
            .timeout(self.timeout)
            .set("User-Agent", USER_AGENT)
            .query("q", place)
            .query("format", "geojson")
            .query("polygon_geojson", "1")
            .query("limit", "1")
            .call()
            .with_context(|| format!("Nominatim request for '{}' failed", place))?;

        let document: Value = response
            .into_json()
            .context("Failed to parse Nominatim GeoJSON response")?;
        select_boundary(&document, place)?
            .ok_or_else(|| missing(place, "Nominatim returned no polygon"))
    }
}

/// A fixed boundary, for embedding callers and tests.
#[derive(Debug, Clone)]
pub struct StaticBoundary(pub MultiPolygon<f64>);

impl BoundaryProvider for StaticBoundary {
    fn get_boundary(&self, place: &str) -> Result<MultiPolygon<f64>> {
        if self.0 .0.is_empty() {
            return Err(missing(place, "empty boundary"));
        }
        Ok(self.0.clone())
    }
}

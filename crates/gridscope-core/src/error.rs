//! Error taxonomy for territory regeneration runs.
//!
//! [`GridError`] is the single error type surfaced by a run. It separates the
//! fatal categories a run can end in:
//!
//! - [`InputError`]: the snapshot itself is unusable (too few substations,
//!   missing boundary, empty dataset, provider failure)
//! - [`GeometryError`]: tessellation, clipping or territory resolution hit a
//!   degenerate or inconsistent configuration; always names the entities
//! - [`PersistenceError`]: the backing store refused the new snapshot
//!
//! Non-fatal data-quality problems are never errors; they are counted in
//! [`crate::diagnostics::DataQuality`].
//!
//! # Example
//!
//! ```
//! use gridscope_core::{GeometryError, GridError, GridResult};
//!
//! fn check() -> GridResult<()> {
//!     Err(GeometryError::CoincidentSites {
//!         first: "SE-01".into(),
//!         second: "SE-02".into(),
//!         distance: 0.0,
//!     }
//!     .into())
//! }
//!
//! let err = check().unwrap_err();
//! assert_eq!(err.category(), "geometry");
//! assert!(err.to_string().contains("SE-02"));
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// Any fatal outcome of a run.
#[derive(Error, Debug)]
pub enum GridError {
    /// The input snapshot is unusable
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// Degenerate or inconsistent geometry
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// The store could not publish or read a snapshot
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Invalid run configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GridError {
    /// Short category label used in logs and manifests.
    pub fn category(&self) -> &'static str {
        match self {
            GridError::Input(_) => "input",
            GridError::Geometry(_) => "geometry",
            GridError::Persistence(_) => "persistence",
            GridError::Config(_) => "config",
        }
    }
}

/// Convenience type alias for Results using GridError.
pub type GridResult<T> = Result<T, GridError>;

/// The snapshot handed to a run cannot be processed.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("at least 2 substations inside the boundary are required, found {found}")]
    TooFewSubstations { found: usize },

    #[error("no usable boundary for '{place}': {reason}")]
    MissingBoundary { place: String, reason: String },

    #[error("asset dataset '{dataset}' is empty")]
    EmptyDataset { dataset: &'static str },

    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },

    #[error("{provider} provider failed: {source:#}")]
    Provider {
        provider: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Geometry failures. Every variant names the polygon index or entity ids involved.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("tessellation needs at least 2 sites, got {found} ({ids:?})")]
    TooFewSites { found: usize, ids: Vec<String> },

    #[error("sites '{first}' and '{second}' are coincident (distance {distance:.6} m)")]
    CoincidentSites {
        first: String,
        second: String,
        distance: f64,
    },

    #[error("cell of site '{id}' is degenerate: {reason}")]
    DegenerateCell { id: String, reason: String },

    #[error("site '{id}' has an unusable coordinate: {reason}")]
    InvalidCoordinate { id: String, reason: String },

    #[error("boundary polygon is invalid: {reason}")]
    InvalidBoundary { reason: String },

    #[error("clipped polygon #{polygon} is invalid: {reason}")]
    InvalidClippedPolygon { polygon: usize, reason: String },

    #[error("polygon #{polygon} contains no substation")]
    UnmatchedTerritory { polygon: usize },

    #[error("polygon #{polygon} contains several substations: {substations:?}")]
    AmbiguousTerritory {
        polygon: usize,
        substations: Vec<String>,
    },

    #[error("substation '{substation}' resolves to polygons {polygons:?}")]
    SplitSubstation {
        substation: String,
        polygons: Vec<usize>,
    },

    #[error(
        "territories cover {covered_area:.3} m² of a {boundary_area:.3} m² boundary (tolerance {tolerance})"
    )]
    CoverageMismatch {
        boundary_area: f64,
        covered_area: f64,
        tolerance: f64,
    },
}

/// Failures of the backing store. A failed write never replaces the published snapshot.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not serialize {what}: {message}")]
    Serialization { what: &'static str, message: String },

    #[error("stored snapshot at '{path}' is unreadable: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("no snapshot has been published yet")]
    NoSnapshot,
}

impl PersistenceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err: GridError = InputError::TooFewSubstations { found: 1 }.into();
        assert!(err.to_string().contains("Input error"));
        assert!(err.to_string().contains("found 1"));
        assert_eq!(err.category(), "input");
    }

    #[test]
    fn test_geometry_error_names_entities() {
        let err = GeometryError::AmbiguousTerritory {
            polygon: 3,
            substations: vec!["SE-A".into(), "SE-B".into()],
        };
        let text = err.to_string();
        assert!(text.contains("#3"));
        assert!(text.contains("SE-A"));
        assert!(text.contains("SE-B"));
    }

    #[test]
    fn test_persistence_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: GridError = PersistenceError::io("/tmp/store", io_err).into();
        assert!(matches!(err, GridError::Persistence(PersistenceError::Io { .. })));
        assert_eq!(err.category(), "persistence");
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> Result<(), GeometryError> {
            Err(GeometryError::UnmatchedTerritory { polygon: 0 })
        }

        fn outer() -> GridResult<()> {
            inner()?;
            Ok(())
        }

        assert!(matches!(outer(), Err(GridError::Geometry(_))));
    }
}

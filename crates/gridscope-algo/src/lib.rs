//! # gridscope-algo: Territory Partitioning and Market Aggregation
//!
//! Turns substation points and a municipal boundary into one service
//! territory per substation, then attributes transformers, consumers and
//! generation units to those territories and aggregates them into
//! [`TerritoryProfile`](gridscope_core::TerritoryProfile)s.
//!
//! ## Stages
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | Projection | [`projection`] | lon/lat → UTM metres and back |
//! | Tessellation | [`voronoi`] | one finite cell per substation |
//! | Clipping | [`clip`] | cells intersected with the boundary |
//! | Resolution | [`resolve`] | substation identity per cell, transformer assignment |
//! | Validation | [`partition`] | coverage and overlap checks |
//! | Aggregation | [`classes`], [`market`] | per-territory profiles |
//!
//! [`Pipeline`] runs the stages in order over an immutable input snapshot
//! and returns a complete [`Snapshot`](gridscope_core::Snapshot); every
//! fatal condition is a [`GridError`](gridscope_core::GridError) and every
//! non-fatal one a counter in the run's diagnostics.
//!
//! ## Example
//!
//! ```
//! use gridscope_algo::voronoi::{tessellate, Site, TessellationOptions};
//!
//! let sites = [
//!     Site::new("A", 0.0, 0.0),
//!     Site::new("B", 10.0, 0.0),
//!     Site::new("C", 5.0, 10.0),
//! ];
//! let cells = tessellate(&sites, &TessellationOptions::default()).unwrap();
//! assert_eq!(cells.len(), 3);
//! ```

pub mod classes;
pub mod clip;
pub mod market;
pub mod partition;
pub mod pipeline;
pub mod projection;
pub mod resolve;
pub mod voronoi;

pub use classes::{ClassRule, ClassTable, Classification};
pub use market::{CriticalityThresholds, MarketAggregator, MarketSummary};
pub use pipeline::{Pipeline, PipelineConfig, TerritoryRun};
pub use projection::UtmProjection;
pub use resolve::TransformerAssignment;

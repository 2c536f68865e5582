//! # gridscope-io: Boundaries, Asset Tables and Snapshot Stores
//!
//! Implementations of the collaborator traits in
//! [`gridscope_core::sources`]:
//!
//! | Trait | Implementations |
//! |-------|-----------------|
//! | [`BoundaryProvider`](gridscope_core::BoundaryProvider) | [`GeoJsonBoundary`], [`NominatimBoundary`], [`StaticBoundary`] |
//! | [`AssetProvider`](gridscope_core::AssetProvider) | [`TableAssets`] (Parquet / CSV via polars), [`InMemoryAssets`] |
//! | [`SnapshotStore`](gridscope_core::SnapshotStore) | [`FileSnapshotStore`], [`MemorySnapshotStore`] |
//!
//! plus GeoJSON conversion ([`geojson`]) and the published per-territory
//! record ([`published`]).
//!
//! ## Error Handling
//!
//! Providers return `anyhow::Result` with context on every I/O step. An
//! unusable boundary is reported as
//! [`InputError::MissingBoundary`](gridscope_core::InputError) inside the
//! `anyhow::Error` so callers can downcast it. Stores return
//! [`PersistenceError`](gridscope_core::PersistenceError) and never leave a
//! half-written snapshot visible.

pub mod boundary;
pub mod geojson;
pub mod published;
pub mod store;
pub mod tables;

pub use boundary::{GeoJsonBoundary, NominatimBoundary, StaticBoundary, DEFAULT_NOMINATIM_URL};
pub use published::{published_profiles, PublishedProfile};
pub use store::{FileSnapshotStore, MemorySnapshotStore};
pub use tables::{read_table, InMemoryAssets, TableAssets};

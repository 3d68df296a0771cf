//! Nursery Locator
//!
//! Serves a map of plant nurseries and measures the geodesic distance from the
//! visitor's browser location to each of them.
//!
//! - `catalog`: spreadsheet/CSV/Parquet loading with Polars, schema validation
//! - `boundary`: optional GeoJSON overlay
//! - `geodesy`: reference points and distance annotation
//! - `lookup`: label lookup and nearest nursery
//! - `session`: per-session location state machine
//! - `api_server` / `web`: Axum router, JSON endpoints and Askama pages

pub mod boundary;
pub mod catalog;
pub mod config;
pub mod geodesy;
pub mod lookup;
pub mod session;

#[cfg(feature = "api")]
pub mod api_server;

#[cfg(feature = "api")]
pub mod web;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogError, NurseryRecord, REQUIRED_COLUMNS};
pub use config::ServerConfig;
pub use geodesy::{annotate, distance_km, format_km, AnnotatedRecord, ReferencePoint};
pub use lookup::{find_by_label, nearest, LookupError};

#[cfg(feature = "api")]
pub use api_server::{create_router, AppState};

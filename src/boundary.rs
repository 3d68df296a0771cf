//! Boundary overlay loading
//!
//! The boundary file is optional. Any problem reading or parsing it disables
//! the overlay and is only logged.

use std::path::Path;

use geo::{BoundingRect, Geometry, Rect};
use geojson::GeoJson;

/// Validated overlay document, kept as JSON for the map page
#[derive(Debug, Clone)]
pub struct BoundaryShape {
    pub geojson: serde_json::Value,
    pub feature_count: usize,
    /// `[[south, west], [north, east]]`, the order Leaflet's fitBounds takes
    pub bounds: Option<[[f64; 2]; 2]>,
}

#[derive(Debug, thiserror::Error)]
pub enum BoundaryLoadError {
    #[error("Failed to read boundary file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed GeoJSON: {0}")]
    Parse(#[from] geojson::Error),

    #[error("Boundary must be a Feature or FeatureCollection, got a bare geometry")]
    BareGeometry,

    #[error("Failed to encode boundary: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Load the overlay, or `None` when it is missing or unusable
pub fn load_boundary(path: &Path) -> Option<BoundaryShape> {
    match try_load_boundary(path) {
        Ok(shape) => {
            tracing::info!(
                "Loaded boundary overlay from {} ({} features)",
                path.display(),
                shape.feature_count
            );
            Some(shape)
        }
        Err(BoundaryLoadError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No boundary file at {}, overlay disabled", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("Boundary overlay disabled: {}", e);
            None
        }
    }
}

pub fn try_load_boundary(path: &Path) -> Result<BoundaryShape, BoundaryLoadError> {
    let text = std::fs::read_to_string(path)?;
    parse_boundary(&text)
}

pub fn parse_boundary(text: &str) -> Result<BoundaryShape, BoundaryLoadError> {
    let document: GeoJson = text.parse()?;

    let geometries: Vec<geojson::Geometry> = match &document {
        GeoJson::FeatureCollection(collection) => collection
            .features
            .iter()
            .filter_map(|f| f.geometry.clone())
            .collect(),
        GeoJson::Feature(feature) => feature.geometry.iter().cloned().collect(),
        GeoJson::Geometry(_) => return Err(BoundaryLoadError::BareGeometry),
    };

    let feature_count = match &document {
        GeoJson::FeatureCollection(collection) => collection.features.len(),
        _ => 1,
    };

    Ok(BoundaryShape {
        bounds: overall_bounds(geometries),
        feature_count,
        geojson: serde_json::to_value(&document)?,
    })
}

fn overall_bounds(geometries: Vec<geojson::Geometry>) -> Option<[[f64; 2]; 2]> {
    let rect = geometries
        .into_iter()
        .filter_map(|g| Geometry::<f64>::try_from(g).ok())
        .filter_map(|g| g.bounding_rect())
        .reduce(merge_rects)?;

    // geo coordinates are (x = longitude, y = latitude)
    Some([[rect.min().y, rect.min().x], [rect.max().y, rect.max().x]])
}

fn merge_rects(a: Rect<f64>, b: Rect<f64>) -> Rect<f64> {
    Rect::new(
        geo::coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
        geo::coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
    )
}

//! Distance Annotation
//!
//! Computes ellipsoidal (WGS84) geodesic distances from a reference point to
//! every catalog record. Distances are always derived from the reference point
//! passed in; nothing here caches a previous result.

use geo::{GeodesicDistance, Point};
use serde::Serialize;

use crate::catalog::NurseryRecord;

/// Where a reference point came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Browser,
    Fallback,
}

/// Point every distance is measured from
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReferencePoint {
    pub latitude: f64,
    pub longitude: f64,
    pub source: LocationSource,
}

impl ReferencePoint {
    pub fn browser(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude, source: LocationSource::Browser }
    }

    pub fn fallback(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude, source: LocationSource::Fallback }
    }

    /// Validate both components
    pub fn validate(&self) -> Result<(), GeoError> {
        validate_coordinate("reference point", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoError {
    #[error("Invalid coordinate for {subject}: ({latitude}, {longitude})")]
    InvalidCoordinate {
        subject: String,
        latitude: f64,
        longitude: f64,
    },
}

/// Catalog record plus its distance from the current reference point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedRecord {
    #[serde(flatten)]
    pub record: NurseryRecord,
    pub distance_km: f64,
}

impl AnnotatedRecord {
    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn distance_label(&self) -> String {
        format_km(self.distance_km)
    }
}

/// Check latitude in [-90, 90], longitude in [-180, 180], both finite
pub fn validate_coordinate(subject: &str, latitude: f64, longitude: f64) -> Result<(), GeoError> {
    let lat_ok = latitude.is_finite() && (-90.0..=90.0).contains(&latitude);
    let lon_ok = longitude.is_finite() && (-180.0..=180.0).contains(&longitude);

    if lat_ok && lon_ok {
        Ok(())
    } else {
        Err(GeoError::InvalidCoordinate {
            subject: subject.to_string(),
            latitude,
            longitude,
        })
    }
}

/// Geodesic distance in kilometres (Karney's algorithm on WGS84)
///
/// Coincident points return exactly 0.0.
pub fn distance_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    if from == to {
        return 0.0;
    }

    // geo points are (x = longitude, y = latitude)
    let a = Point::new(from.1, from.0);
    let b = Point::new(to.1, to.0);
    a.geodesic_distance(&b) / 1000.0
}

/// Annotate every record with its distance from `reference`
///
/// Output keeps the catalog's length and order. Any invalid coordinate
/// rejects the whole batch.
pub fn annotate(
    reference: &ReferencePoint,
    records: &[NurseryRecord],
) -> Result<Vec<AnnotatedRecord>, GeoError> {
    reference.validate()?;
    let origin = (reference.latitude, reference.longitude);

    records
        .iter()
        .map(|record| {
            validate_coordinate(&record.name, record.latitude, record.longitude)?;
            Ok(AnnotatedRecord {
                distance_km: distance_km(origin, (record.latitude, record.longitude)),
                record: record.clone(),
            })
        })
        .collect()
}

/// Render a distance the way the detail panel shows it ("12.34 km")
pub fn format_km(distance_km: f64) -> String {
    format!("{:.2} km", distance_km)
}

//! Record lookup by display label, plus nearest-nursery selection

use crate::geodesy::AnnotatedRecord;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("No nursery named '{0}'")]
    RecordNotFound(String),
}

/// Resolve a marker label to its record
///
/// Names are expected to be unique; with duplicates the first row wins.
pub fn find_by_label<'a>(
    records: &'a [AnnotatedRecord],
    label: &str,
) -> Result<&'a AnnotatedRecord, LookupError> {
    records
        .iter()
        .find(|r| r.record.name == label)
        .ok_or_else(|| LookupError::RecordNotFound(label.to_string()))
}

/// Closest record; ties keep catalog order
pub fn nearest(records: &[AnnotatedRecord]) -> Option<&AnnotatedRecord> {
    records.iter().reduce(|best, candidate| {
        if candidate.distance_km < best.distance_km {
            candidate
        } else {
            best
        }
    })
}

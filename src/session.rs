//! Per-session context and the reference-point state machine
//!
//! Each page view gets its own `Session`. The browser reports its location
//! once; the session moves from awaiting to either granted or fallback and
//! stays there. Transitions are pure functions of (state, event).

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::geodesy::{validate_coordinate, AnnotatedRecord, ReferencePoint};
use crate::lookup::{find_by_label, LookupError};

/// Why the fallback point is in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    Denied,
    Timeout,
    Unavailable,
    Malformed,
}

impl UnavailableReason {
    fn describe(&self) -> &'static str {
        match self {
            UnavailableReason::Denied => "location permission was denied",
            UnavailableReason::Timeout => "the browser did not answer in time",
            UnavailableReason::Unavailable => "the browser could not determine a position",
            UnavailableReason::Malformed => "the browser sent an invalid position",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationState {
    AwaitingBrowserLocation { since: Instant },
    LocationGranted(ReferencePoint),
    LocationDeniedOrUnavailable {
        fallback: ReferencePoint,
        reason: UnavailableReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationEvent {
    BrowserLocation { latitude: f64, longitude: f64 },
    Denied,
    Unavailable,
    Malformed,
    TimedOut,
}

/// Severity of the status line shown above the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationStatus {
    pub state: &'static str,
    pub level: StatusLevel,
    pub message: String,
}

impl LocationState {
    pub fn awaiting(now: Instant) -> Self {
        LocationState::AwaitingBrowserLocation { since: now }
    }

    /// Apply one event; resolved states ignore everything
    pub fn apply(self, event: LocationEvent, fallback: ReferencePoint) -> Self {
        let LocationState::AwaitingBrowserLocation { .. } = self else {
            return self;
        };

        let to_fallback = |reason| LocationState::LocationDeniedOrUnavailable {
            fallback: ReferencePoint::fallback(fallback.latitude, fallback.longitude),
            reason,
        };

        match event {
            LocationEvent::BrowserLocation { latitude, longitude } => {
                match validate_coordinate("browser location", latitude, longitude) {
                    Ok(()) => LocationState::LocationGranted(ReferencePoint::browser(latitude, longitude)),
                    Err(e) => {
                        tracing::debug!("Rejecting browser location: {}", e);
                        to_fallback(UnavailableReason::Malformed)
                    }
                }
            }
            LocationEvent::Denied => to_fallback(UnavailableReason::Denied),
            LocationEvent::Unavailable => to_fallback(UnavailableReason::Unavailable),
            LocationEvent::Malformed => to_fallback(UnavailableReason::Malformed),
            LocationEvent::TimedOut => to_fallback(UnavailableReason::Timeout),
        }
    }

    /// Treat a wait longer than `timeout` as a timeout event
    pub fn expire(self, now: Instant, timeout: Duration, fallback: ReferencePoint) -> Self {
        match self {
            LocationState::AwaitingBrowserLocation { since }
                if now.saturating_duration_since(since) >= timeout =>
            {
                self.apply(LocationEvent::TimedOut, fallback)
            }
            other => other,
        }
    }

    pub fn reference_point(&self) -> Option<ReferencePoint> {
        match self {
            LocationState::AwaitingBrowserLocation { .. } => None,
            LocationState::LocationGranted(point) => Some(*point),
            LocationState::LocationDeniedOrUnavailable { fallback, .. } => Some(*fallback),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.reference_point().is_some()
    }

    pub fn status(&self) -> LocationStatus {
        match self {
            LocationState::AwaitingBrowserLocation { .. } => LocationStatus {
                state: "awaiting_browser_location",
                level: StatusLevel::Info,
                message: "Detecting your current location...".to_string(),
            },
            LocationState::LocationGranted(_) => LocationStatus {
                state: "location_granted",
                level: StatusLevel::Success,
                message: "Location found.".to_string(),
            },
            LocationState::LocationDeniedOrUnavailable { fallback, reason } => LocationStatus {
                state: "location_denied_or_unavailable",
                level: StatusLevel::Warning,
                message: format!(
                    "Could not get your location ({}). Using default location ({:.2}, {:.2}).",
                    reason.describe(),
                    fallback.latitude,
                    fallback.longitude
                ),
            },
        }
    }
}

/// Explicit per-page-view context
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_at: Instant,
    pub location: LocationState,
}

impl Session {
    pub fn new(id: String, now: Instant) -> Self {
        Self {
            id,
            created_at: now,
            location: LocationState::awaiting(now),
        }
    }

    /// Location-resolved handler
    pub fn on_location(self, event: LocationEvent, fallback: ReferencePoint) -> Self {
        let location = self.location.apply(event, fallback);
        Self { location, ..self }
    }

    /// Resolve a pending location that has waited too long
    pub fn on_tick(self, now: Instant, timeout: Duration, fallback: ReferencePoint) -> Self {
        let location = self.location.expire(now, timeout, fallback);
        Self { location, ..self }
    }
}

/// What the detail panel shows
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Nursery(AnnotatedRecord),
    NothingSelected,
}

/// Marker-selected handler; unknown or missing labels show the prompt
pub fn select_marker(records: &[AnnotatedRecord], label: Option<&str>) -> Selection {
    let Some(label) = label.map(str::trim).filter(|l| !l.is_empty()) else {
        return Selection::NothingSelected;
    };

    match find_by_label(records, label) {
        Ok(record) => Selection::Nursery(record.clone()),
        Err(LookupError::RecordNotFound(missing)) => {
            tracing::debug!("Selected label '{}' is not in the catalog", missing);
            Selection::NothingSelected
        }
    }
}

#[cfg(feature = "api")]
pub use store::SessionStore;

#[cfg(feature = "api")]
mod store {
    use super::Session;
    use moka::future::Cache;
    use std::time::{Duration, Instant};

    /// Sessions keyed by id, dropped after sitting idle
    #[derive(Clone)]
    pub struct SessionStore {
        cache: Cache<String, Session>,
    }

    impl SessionStore {
        pub fn new(idle: Duration, max_sessions: u64) -> Self {
            let cache = Cache::builder()
                .max_capacity(max_sessions)
                .time_to_idle(idle)
                .build();
            Self { cache }
        }

        pub async fn create(&self) -> Session {
            let id = format!("{:016x}", rand::random::<u64>());
            let session = Session::new(id.clone(), Instant::now());
            self.cache.insert(id, session.clone()).await;
            tracing::debug!("Created session {}", session.id);
            session
        }

        pub async fn get(&self, id: &str) -> Option<Session> {
            self.cache.get(id).await
        }

        pub async fn update(&self, session: Session) {
            self.cache.insert(session.id.clone(), session).await;
        }
    }
}

// Axum API Server Module
//
// Purpose: serve the nursery map page plus the JSON endpoints its script drives
// State: read-only catalog + optional boundary shared process-wide, location per session

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};

use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::TraceLayer,
};

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use serde::Deserialize;

use crate::boundary::{load_boundary, BoundaryShape};
use crate::catalog::Catalog;
use crate::config::ServerConfig;
use crate::geodesy::{annotate, AnnotatedRecord, GeoError};
use crate::lookup::nearest;
use crate::session::{LocationEvent, Session, SessionStore};
use crate::web::handlers::pages;

// ============================================================================
// Application State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub boundary: Option<Arc<BoundaryShape>>,
    pub sessions: SessionStore,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Load the catalog (fatal on error) and the optional boundary
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        tracing::info!("Loading nursery catalog...");
        let catalog = Catalog::load(&config.catalog_path)
            .with_context(|| format!("Failed to load catalog {}", config.catalog_path.display()))?;

        tracing::info!("Loading boundary overlay...");
        let boundary = load_boundary(&config.boundary_path);

        Ok(Self::from_parts(catalog, boundary, config))
    }

    pub fn from_parts(catalog: Catalog, boundary: Option<BoundaryShape>, config: ServerConfig) -> Self {
        let sessions = SessionStore::new(config.session_idle, config.max_sessions);

        Self {
            catalog: Arc::new(catalog),
            boundary: boundary.map(Arc::new),
            sessions,
            config: Arc::new(config),
        }
    }

    /// Fetch a session, resolving a location wait that has run past the timeout
    pub async fn session(&self, id: &str) -> Result<Session, AppError> {
        if !is_session_id(id) {
            return Err(AppError::BadRequest(format!("Malformed session id '{}'", id)));
        }

        let session = self
            .sessions
            .get(id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))?;

        let before = session.location;
        let session = session.on_tick(Instant::now(), self.config.location_timeout, self.config.fallback);
        if session.location != before {
            tracing::info!("Session {} timed out waiting for browser location", session.id);
            self.sessions.update(session.clone()).await;
        }

        Ok(session)
    }

    /// Distances for the session's current reference point
    pub fn annotate_for(&self, session: &Session) -> Result<Vec<AnnotatedRecord>, AppError> {
        let reference = session
            .location
            .reference_point()
            .ok_or_else(|| AppError::Conflict("Location not resolved yet".to_string()))?;

        Ok(annotate(&reference, self.catalog.records())?)
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))

        // HTML pages
        .route("/", get(pages::map_page))
        .route("/sessions/:id/detail", get(pages::nursery_detail))

        // Session endpoints (JSON API)
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id/location", post(report_location))
        .route("/api/sessions/:id/nurseries", get(get_nurseries))
        .route("/api/sessions/:id/nearest", get(get_nearest))

        // Overlay
        .route("/api/boundary", get(get_boundary))

        // Middleware (applied in reverse order)
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Endpoint Handlers
// ============================================================================

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "nurseries": state.catalog.len(),
        "boundary": state.boundary.is_some(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.sessions.create().await;
    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "session_id": session.id,
            "location": session.location.status(),
        })),
    )
}

async fn report_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = state.session(&id).await?;

    let event = location_event(&body);
    tracing::debug!("Session {} location event: {:?}", id, event);

    let session = session.on_location(event, state.config.fallback);
    state.sessions.update(session.clone()).await;
    tracing::info!("Session {} location: {}", id, session.location.status().state);

    let records = state.annotate_for(&session)?;
    Ok(Json(session_json(&session, &records)))
}

async fn get_nurseries(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = state.session(&id).await?;
    let records = state.annotate_for(&session)?;
    Ok(Json(session_json(&session, &records)))
}

async fn get_nearest(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = state.session(&id).await?;
    let records = state.annotate_for(&session)?;

    let closest = nearest(&records)
        .ok_or_else(|| AppError::NotFound("Catalog is empty".to_string()))?;

    Ok(Json(nursery_json(closest)))
}

async fn get_boundary(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state
        .boundary
        .as_ref()
        .map(|b| Json(b.geojson.clone()))
        .ok_or_else(|| AppError::NotFound("No boundary overlay loaded".to_string()))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// What the page script posts after asking the browser for its position
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum LocationReport {
    Position { latitude: f64, longitude: f64 },
    Failure { error: LocationFailure },
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "snake_case")]
enum LocationFailure {
    Denied,
    Unavailable,
    Timeout,
}

/// Anything that is not a recognised report, including non-JSON bodies,
/// counts as a malformed response
fn location_event(body: &[u8]) -> LocationEvent {
    match serde_json::from_slice::<LocationReport>(body) {
        Ok(LocationReport::Position { latitude, longitude }) => {
            LocationEvent::BrowserLocation { latitude, longitude }
        }
        Ok(LocationReport::Failure { error: LocationFailure::Denied }) => LocationEvent::Denied,
        Ok(LocationReport::Failure { error: LocationFailure::Unavailable }) => LocationEvent::Unavailable,
        Ok(LocationReport::Failure { error: LocationFailure::Timeout }) => LocationEvent::TimedOut,
        Err(_) => LocationEvent::Malformed,
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Ids are 16 lowercase hex digits, as minted by `SessionStore::create`
fn is_session_id(id: &str) -> bool {
    id.len() == 16 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

pub(crate) fn nursery_json(r: &AnnotatedRecord) -> serde_json::Value {
    serde_json::json!({
        "name": r.record.name,
        "latitude": r.record.latitude,
        "longitude": r.record.longitude,
        "capacity": r.record.capacity,
        "plants_available": r.record.plants_available,
        "contact": r.record.contact,
        "distance_km": r.distance_km,
        "distance_label": r.distance_label(),
    })
}

fn session_json(session: &Session, records: &[AnnotatedRecord]) -> serde_json::Value {
    let data: Vec<serde_json::Value> = records.iter().map(nursery_json).collect();

    serde_json::json!({
        "session_id": session.id,
        "location": session.location.status(),
        "reference": session.location.reference_point(),
        "nearest": nearest(records).map(|r| r.name()),
        "rows": data.len(),
        "data": data,
    })
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<GeoError> for AppError {
    fn from(e: GeoError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

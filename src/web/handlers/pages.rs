// Page handlers for HTML rendering with Askama

use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse},
};
use askama::Template;
use serde::Deserialize;

use crate::api_server::{AppError, AppState};
use crate::session::{select_marker, Selection};

// ============================================================================
// Map Page
// ============================================================================

#[derive(Template)]
#[template(path = "pages/map.html")]
pub struct MapTemplate {
    pub title: String,
    pub session_id: String,
    pub nursery_count: usize,
    pub status_message: String,
    pub markers_json: String,
    pub boundary_json: String,
    pub bounds_json: String,
    pub fallback_lat: f64,
    pub fallback_lon: f64,
    pub timeout_ms: u128,
}

/// One map page per session; the page script resolves the location afterwards
pub async fn map_page(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.sessions.create().await;

    let markers: Vec<serde_json::Value> = state
        .catalog
        .records()
        .iter()
        .map(|r| {
            serde_json::json!({
                "name": r.name,
                "latitude": r.latitude,
                "longitude": r.longitude,
            })
        })
        .collect();

    let template = MapTemplate {
        title: "Public Nursery Locator".to_string(),
        session_id: session.id,
        nursery_count: state.catalog.len(),
        status_message: session.location.status().message,
        markers_json: script_json(&serde_json::Value::from(markers)),
        boundary_json: state
            .boundary
            .as_ref()
            .map(|b| script_json(&b.geojson))
            .unwrap_or_else(|| "null".to_string()),
        bounds_json: state
            .boundary
            .as_ref()
            .and_then(|b| b.bounds)
            .map(|bounds| script_json(&serde_json::json!(bounds)))
            .unwrap_or_else(|| "null".to_string()),
        fallback_lat: state.config.fallback.latitude,
        fallback_lon: state.config.fallback.longitude,
        timeout_ms: state.config.location_timeout.as_millis(),
    };

    Html(template.render().unwrap_or_else(|e| {
        format!("Template error: {}", e)
    }))
}

// ============================================================================
// Detail Panel Fragment
// ============================================================================

pub struct NurseryDetail {
    pub name: String,
    pub capacity: u64,
    pub plants_available: u64,
    pub contact: String,
    pub distance_label: String,
}

#[derive(Template)]
#[template(path = "partials/nursery_detail.html")]
pub struct DetailTemplate {
    pub nursery: Option<NurseryDetail>,
}

#[derive(Debug, Deserialize)]
pub struct DetailQuery {
    pub label: Option<String>,
}

/// Marker-selected: unknown labels fall back to the "click a marker" prompt
pub async fn nursery_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DetailQuery>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.session(&id).await?;
    let records = state.annotate_for(&session)?;

    let nursery = match select_marker(&records, query.label.as_deref()) {
        Selection::Nursery(r) => Some(NurseryDetail {
            distance_label: r.distance_label(),
            name: r.record.name,
            capacity: r.record.capacity,
            plants_available: r.record.plants_available,
            contact: r.record.contact,
        }),
        Selection::NothingSelected => None,
    };

    let template = DetailTemplate { nursery };
    Ok(Html(template.render().unwrap_or_else(|e| {
        format!("Template error: {}", e)
    })))
}

/// JSON safe to inline inside a <script> element
fn script_json(value: &serde_json::Value) -> String {
    value.to_string().replace("</", "<\\/")
}

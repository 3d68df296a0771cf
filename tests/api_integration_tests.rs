// API Integration Tests
//
// Purpose: drive the router end to end against the fixture catalog and boundary
// Run with: cargo test --test api_integration_tests

#[cfg(feature = "api")]
mod api_tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use nursery_locator::{create_router, AppState, Catalog, ServerConfig};
    use serde_json::Value;
    use std::path::PathBuf;
    use std::time::Duration;
    use tower::ServiceExt; // for oneshot

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(name)
    }

    fn test_config(catalog: &str, boundary: &str) -> ServerConfig {
        ServerConfig {
            catalog_path: fixture(catalog),
            boundary_path: fixture(boundary),
            ..ServerConfig::default()
        }
    }

    // Helper: Create test app with the fixture catalog and boundary
    fn create_test_app() -> axum::Router {
        let state = AppState::new(test_config("nurseries.csv", "khariar_boundary.geojson"))
            .expect("fixture catalog should load");
        create_router(state)
    }

    // Helper: Parse JSON response
    async fn json_response(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");
        serde_json::from_slice(&body).expect("Failed to parse JSON")
    }

    async fn text_response(response: axum::response::Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");
        String::from_utf8(body.to_vec()).expect("Body should be UTF-8")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn new_session(app: &axum::Router) -> String {
        let response = app
            .clone()
            .oneshot(post_json("/api/sessions", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = json_response(response).await;
        assert_eq!(body["location"]["state"], "awaiting_browser_location");
        body["session_id"].as_str().unwrap().to_string()
    }

    // =========================================================================
    // Section 1: Health Check + Startup
    // =========================================================================

    #[tokio::test]
    async fn test_health_check() {
        let app = create_test_app();

        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = json_response(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["nurseries"], 3);
        assert_eq!(body["boundary"], true);
        assert!(body["timestamp"].is_string());
    }

    #[test]
    fn test_missing_contact_column_stops_startup() {
        let err = match AppState::new(test_config(
            "nurseries_missing_contact.csv",
            "khariar_boundary.geojson",
        )) {
            Ok(_) => panic!("catalog without Contact should not load"),
            Err(e) => e,
        };

        let message = format!("{:#}", err);
        assert!(message.contains("Contact"), "message was: {}", message);
        assert!(message.contains("PlantsAvailable"), "message should list all columns: {}", message);
    }

    #[test]
    fn test_spreadsheet_catalog_loads() {
        let catalog = Catalog::load(&fixture("nurseries.xlsx")).unwrap();
        assert_eq!(catalog.len(), 3);

        let first = &catalog.records()[0];
        assert_eq!(first.name, "GreenHouse A");
        assert_eq!(first.latitude, 20.56);
        assert_eq!(first.capacity, 100);
        assert_eq!(first.contact, "555-1111");

        // Numeric phone cells keep their digits without a trailing ".0"
        assert_eq!(catalog.records()[2].contact, "5553333");
    }

    // =========================================================================
    // Section 2: Map Page
    // =========================================================================

    #[tokio::test]
    async fn test_map_page_renders_markers_and_boundary() {
        let app = create_test_app();

        let response = app.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let html = text_response(response).await;
        assert!(html.contains("Public Nursery Locator"));
        assert!(html.contains("GreenHouse A"));
        assert!(html.contains("Khariar Central Nursery"));
        assert!(html.contains("FeatureCollection"));
        assert!(html.contains("Click a marker on the map"));
    }

    #[tokio::test]
    async fn test_map_page_without_boundary() {
        let state = AppState::new(test_config("nurseries.csv", "does_not_exist.geojson")).unwrap();
        assert!(state.boundary.is_none());
        let app = create_router(state);

        let response = app.clone().oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let html = text_response(response).await;
        assert!(html.contains("const BOUNDARY = null;"));
        assert!(html.contains("GreenHouse A"));
        assert!(!html.contains("Template error"));

        let response = app.oneshot(get("/api/boundary")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_map_page_reports_timeout_when_browser_is_silent() {
        let app = create_test_app();

        let response = app.oneshot(get("/")).await.unwrap();
        let html = text_response(response).await;

        // The page resolves its own location after the deadline even if the
        // browser never calls back
        assert!(html.contains("const LOCATION_TIMEOUT_MS = 5000;"));
        assert!(html.contains(r#"setTimeout(() => reportLocation({ error: "timeout" }), LOCATION_TIMEOUT_MS);"#));
        assert!(html.contains("response.status === 409"));
    }

    #[tokio::test]
    async fn test_boundary_endpoint() {
        let app = create_test_app();

        let response = app.oneshot(get("/api/boundary")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_response(response).await;
        assert_eq!(body["type"], "FeatureCollection");
        assert_eq!(body["features"][0]["properties"]["name"], "Khariar Division");
    }

    // =========================================================================
    // Section 3: Location Resolution
    // =========================================================================

    #[tokio::test]
    async fn test_denied_location_falls_back() {
        let app = create_test_app();
        let id = new_session(&app).await;

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/api/sessions/{}/location", id),
                serde_json::json!({ "error": "denied" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_response(response).await;
        assert_eq!(body["location"]["state"], "location_denied_or_unavailable");
        assert_eq!(body["location"]["level"], "warning");
        assert_eq!(body["reference"]["latitude"], 20.56);
        assert_eq!(body["reference"]["longitude"], 84.14);
        assert_eq!(body["reference"]["source"], "fallback");
        assert_eq!(body["rows"], 3);
    }

    #[tokio::test]
    async fn test_granted_location_annotates_catalog() {
        let app = create_test_app();
        let id = new_session(&app).await;

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/api/sessions/{}/location", id),
                serde_json::json!({ "latitude": 20.56, "longitude": 84.14 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_response(response).await;
        assert_eq!(body["location"]["state"], "location_granted");
        assert_eq!(body["reference"]["source"], "browser");
        assert_eq!(body["nearest"], "GreenHouse A");

        // Catalog order is preserved and every distance is non-negative
        let data = body["data"].as_array().unwrap();
        let names: Vec<&str> = data.iter().map(|n| n["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["GreenHouse A", "Khariar Central Nursery", "Sinapali Forest Nursery"]);
        for nursery in data {
            assert!(nursery["distance_km"].as_f64().unwrap() >= 0.0);
        }

        assert_eq!(data[0]["distance_label"], "0.00 km");
        let khariar = data[1]["distance_km"].as_f64().unwrap();
        assert!(khariar > 100.0 && khariar < 200.0, "got {}", khariar);
    }

    #[tokio::test]
    async fn test_malformed_location_falls_back() {
        let app = create_test_app();
        let id = new_session(&app).await;

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/api/sessions/{}/location", id),
                serde_json::json!({ "latitude": 123.0, "longitude": 84.14 }),
            ))
            .await
            .unwrap();

        let body = json_response(response).await;
        assert_eq!(body["location"]["state"], "location_denied_or_unavailable");
        assert_eq!(body["reference"]["latitude"], 20.56);
    }

    #[tokio::test]
    async fn test_non_json_location_report_falls_back() {
        let app = create_test_app();
        let id = new_session(&app).await;

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/sessions/{}/location", id))
            .header("content-type", "application/json")
            .body(Body::from("garbage"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_response(response).await;
        assert_eq!(body["location"]["state"], "location_denied_or_unavailable");
        assert_eq!(body["reference"]["source"], "fallback");

        // The session is resolved, so the catalog is available right away
        let response = app
            .oneshot(get(&format!("/api/sessions/{}/nurseries", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_location_report_without_content_type_falls_back() {
        let app = create_test_app();
        let id = new_session(&app).await;

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/sessions/{}/location", id))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_response(response).await;
        assert_eq!(body["location"]["state"], "location_denied_or_unavailable");
    }

    #[tokio::test]
    async fn test_location_resolves_once() {
        let app = create_test_app();
        let id = new_session(&app).await;
        let uri = format!("/api/sessions/{}/location", id);

        app.clone()
            .oneshot(post_json(&uri, serde_json::json!({ "error": "denied" })))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(post_json(&uri, serde_json::json!({ "latitude": 20.3, "longitude": 82.7 })))
            .await
            .unwrap();

        let body = json_response(response).await;
        assert_eq!(body["reference"]["source"], "fallback");
    }

    #[tokio::test]
    async fn test_nurseries_pending_until_location() {
        let app = create_test_app();
        let id = new_session(&app).await;

        let response = app
            .oneshot(get(&format!("/api/sessions/{}/nurseries", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_location_wait_times_out() {
        let config = ServerConfig {
            location_timeout: Duration::ZERO,
            ..test_config("nurseries.csv", "khariar_boundary.geojson")
        };
        let app = create_router(AppState::new(config).unwrap());
        let id = new_session(&app).await;

        let response = app
            .oneshot(get(&format!("/api/sessions/{}/nurseries", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_response(response).await;
        assert_eq!(body["location"]["level"], "warning");
        assert_eq!(body["reference"]["source"], "fallback");
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let app = create_test_app();

        let response = app
            .oneshot(get("/api/sessions/0000000000000000/nurseries"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = json_response(response).await;
        assert!(body["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_malformed_session_id() {
        let app = create_test_app();

        let response = app
            .clone()
            .oneshot(get("/api/sessions/not-a-session/nurseries"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_response(response).await;
        assert!(body["error"].as_str().unwrap().contains("not-a-session"));

        let response = app
            .oneshot(post_json(
                "/api/sessions/not-a-session/location",
                serde_json::json!({ "error": "denied" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_nearest_endpoint() {
        let app = create_test_app();
        let id = new_session(&app).await;

        // Close to Khariar
        app.clone()
            .oneshot(post_json(
                &format!("/api/sessions/{}/location", id),
                serde_json::json!({ "latitude": 20.29, "longitude": 82.77 }),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(get(&format!("/api/sessions/{}/nearest", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_response(response).await;
        assert_eq!(body["name"], "Khariar Central Nursery");
        assert!(body["distance_km"].as_f64().unwrap() < 2.0);
    }

    // =========================================================================
    // Section 4: Detail Panel
    // =========================================================================

    #[tokio::test]
    async fn test_detail_for_selected_marker() {
        let app = create_test_app();
        let id = new_session(&app).await;

        app.clone()
            .oneshot(post_json(
                &format!("/api/sessions/{}/location", id),
                serde_json::json!({ "latitude": 20.56, "longitude": 84.14 }),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(get(&format!("/sessions/{}/detail?label=GreenHouse%20A", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let html = text_response(response).await;
        assert!(html.contains("GreenHouse A"));
        assert!(html.contains("100"));
        assert!(html.contains("50"));
        assert!(html.contains("555-1111"));
        assert!(html.contains("0.00 km"));
    }

    #[tokio::test]
    async fn test_detail_for_unknown_label_shows_prompt() {
        let app = create_test_app();
        let id = new_session(&app).await;

        app.clone()
            .oneshot(post_json(
                &format!("/api/sessions/{}/location", id),
                serde_json::json!({ "error": "unavailable" }),
            ))
            .await
            .unwrap();

        for uri in [
            format!("/sessions/{}/detail?label=Nowhere%20Nursery", id),
            format!("/sessions/{}/detail", id),
        ] {
            let response = app.clone().oneshot(get(&uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let html = text_response(response).await;
            assert!(html.contains("Click a marker on the map"));
        }
    }
}

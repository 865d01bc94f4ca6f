//! Routing and layering checks against the assembled application.

use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use tower::ServiceExt;

use pulsehub_api::handlers::health::HealthResponse;
use pulsehub_api::{AppState, build_app};
use pulsehub_auth::JwtDecoder;
use pulsehub_cache::CacheManager;
use pulsehub_core::config::AppConfig;
use pulsehub_database::DatabasePool;
use pulsehub_realtime::Hub;
use pulsehub_realtime::testing::InMemoryDirectory;

fn state() -> AppState {
    let config = Arc::new(AppConfig::default());
    let cache = Arc::new(CacheManager::in_memory(&config.cache));
    let db = DatabasePool::connect_lazy(&config.database).expect("lazy pool");
    let jwt_decoder = Arc::new(JwtDecoder::new(&config.auth, Arc::clone(&cache)));
    let directory = Arc::new(InMemoryDirectory::new());
    let hub = Hub::start(
        config.realtime.clone(),
        Arc::clone(&cache),
        directory.collaborators(),
    );

    AppState {
        config,
        cache,
        db,
        jwt_decoder,
        hub,
        started_at: Instant::now(),
    }
}

#[tokio::test]
async fn test_health_reports_ok() {
    let state = state();
    let app = build_app(state.clone(), &state.config.server.cors);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), 64 * 1024).await.expect("body");
    let health: HealthResponse = serde_json::from_slice(&body).expect("json");
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));

    state.hub.shutdown().await;
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let state = state();
    let app = build_app(state.clone(), &state.config.server.cors);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/messages")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    state.hub.shutdown().await;
}

#[tokio::test]
async fn test_cors_preflight_allows_any_origin_by_default() {
    let state = state();
    let app = build_app(state.clone(), &state.config.server.cors);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/health")
                .header(header::ORIGIN, "https://app.example.com")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    state.hub.shutdown().await;
}

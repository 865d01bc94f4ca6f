//! Health check handlers.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use pulsehub_core::traits::CacheProvider;
use pulsehub_realtime::MetricsSnapshot;

use crate::state::AppState;

/// Liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Detailed health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedHealthResponse {
    /// `ok` when every dependency answered, `degraded` otherwise.
    pub status: String,
    /// Database status.
    pub database: String,
    /// Shared store status.
    pub cache: String,
    /// Live Sessions on this instance.
    pub sessions: usize,
    /// Distinct users with a live Session on this instance.
    pub online_users: usize,
    /// Hub counters.
    pub metrics: MetricsSnapshot,
}

/// GET /api/health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// GET /api/health/detailed
pub async fn detailed_health(State(state): State<AppState>) -> Json<DetailedHealthResponse> {
    let (db_ok, cache_ok) = tokio::join!(state.db.health_check(), state.cache.health_check());
    let database = dependency_status(db_ok.unwrap_or(false));
    let cache = dependency_status(cache_ok.unwrap_or(false));
    let status = if database == "connected" && cache == "connected" {
        "ok"
    } else {
        "degraded"
    };

    let registry = state.hub.registry();
    Json(DetailedHealthResponse {
        status: status.to_string(),
        database: database.to_string(),
        cache: cache.to_string(),
        sessions: registry.session_count(),
        online_users: registry.user_count(),
        metrics: state.hub.metrics().snapshot(),
    })
}

fn dependency_status(healthy: bool) -> &'static str {
    if healthy { "connected" } else { "unavailable" }
}

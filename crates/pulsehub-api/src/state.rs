//! Application state shared across all handlers.

use std::sync::Arc;
use std::time::Instant;

use pulsehub_auth::jwt::JwtDecoder;
use pulsehub_cache::provider::CacheManager;
use pulsehub_core::config::AppConfig;
use pulsehub_database::DatabasePool;
use pulsehub_realtime::Hub;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`. Fields are either
/// `Arc`-wrapped or cheap handles, so cloning per request is fine.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Shared store (Redis or in-memory)
    pub cache: Arc<CacheManager>,
    /// PostgreSQL pool backing the collaborator lookups
    pub db: DatabasePool,
    /// Access-token verifier for the upgrade
    pub jwt_decoder: Arc<JwtDecoder>,
    /// The real-time hub
    pub hub: Arc<Hub>,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

//! # pulsehub-api
//!
//! HTTP surface for pulsehub built on Axum.
//!
//! Serves the authenticated WebSocket upgrade that feeds the real-time hub,
//! plus health endpoints. CORS and request tracing are applied as tower
//! layers.

pub mod app;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{build_app, run_server};
pub use error::ApiError;
pub use state::AppState;

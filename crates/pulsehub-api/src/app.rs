//! Application builder and server bootstrap.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use pulsehub_auth::JwtDecoder;
use pulsehub_cache::CacheManager;
use pulsehub_core::config::{AppConfig, CorsConfig};
use pulsehub_core::error::AppError;
use pulsehub_database::DatabasePool;
use pulsehub_realtime::{Collaborators, Hub};

use crate::middleware::cors::build_cors_layer;
use crate::router::build_router;
use crate::state::AppState;

/// Builds the complete Axum application with all layers.
pub fn build_app(state: AppState, cors_config: &CorsConfig) -> Router {
    build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(build_cors_layer(cors_config)),
    )
}

/// Wires the shared store, the database adapters, token verification and
/// the hub, then serves HTTP until a shutdown signal arrives.
pub async fn run_server(config: AppConfig) -> Result<(), AppError> {
    let config = Arc::new(config);

    tracing::info!(provider = %config.cache.provider, "Initializing shared store");
    let cache = Arc::new(CacheManager::new(&config.cache).await?);

    let db = DatabasePool::connect_lazy(&config.database)?;
    let collaborators = Collaborators {
        relations: Arc::new(db.relationships()),
        groups: Arc::new(db.groups()),
        messages: Arc::new(db.messages()),
        content: Arc::new(db.content()),
        counterparts: Arc::new(db.marketplace()),
    };

    let jwt_decoder = Arc::new(JwtDecoder::new(&config.auth, Arc::clone(&cache)));
    let hub = Hub::start(config.realtime.clone(), Arc::clone(&cache), collaborators);

    let state = AppState {
        config: Arc::clone(&config),
        cache,
        db: db.clone(),
        jwt_decoder,
        hub: Arc::clone(&hub),
        started_at: Instant::now(),
    };

    let app = build_app(state, &config.server.cors);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!("pulsehub listening on {}", addr);

    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        // Closing every Session ends the socket loops so connections drain
        hub.shutdown().await;
        let _ = shutdown_tx.send(true);
    });

    let served = server.into_future();
    tokio::pin!(served);
    let result = tokio::select! {
        res = &mut served => res,
        _ = async {
            let _ = shutdown_rx.wait_for(|done| *done).await;
            tokio::time::sleep(grace).await;
        } => {
            tracing::warn!(grace_seconds = grace.as_secs(), "Connections did not drain in time");
            Ok(())
        }
    };

    db.close().await;
    result.map_err(|e| AppError::internal(format!("Server error: {e}")))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

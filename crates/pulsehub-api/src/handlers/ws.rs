//! WebSocket upgrade handler and the per-Session read/write loops.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pulsehub_auth::Claims;
use pulsehub_core::events::{InboundEvent, OutboundEvent, PresenceRefresh};
use pulsehub_realtime::Session;
use pulsehub_realtime::connection::{HeartbeatConfig, ReadDeadline, handle_client_frame};

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameter for WebSocket authentication.
#[derive(Debug, serde::Deserialize)]
pub struct WsQuery {
    /// JWT access token.
    pub token: String,
}

/// GET /ws?token={jwt}: WebSocket upgrade
pub async fn ws_upgrade(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
) -> Result<Response, ApiError> {
    // Authenticate before upgrade
    let claims = state.jwt_decoder.decode_access_token(&query.token).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(state, claims, socket)))
}

/// Runs an established connection until either side goes away.
async fn handle_socket(state: AppState, claims: Claims, socket: WebSocket) {
    let (mut ws_tx, ws_rx) = socket.split();

    let (session, outbound) = match state.hub.connect(claims.sub).await {
        Ok(pair) => pair,
        Err(e) => {
            warn!(user_id = %claims.sub, error = %e, "Connection refused");
            let frame = OutboundEvent::error("UNAVAILABLE", e.message);
            if let Ok(text) = frame.to_json() {
                let _ = ws_tx.send(Message::Text(text.into())).await;
            }
            let _ = ws_tx
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::AGAIN,
                    reason: "unavailable".into(),
                })))
                .await;
            return;
        }
    };

    info!(
        conn_id = %session.id,
        user_id = %session.user_id,
        username = %claims.username,
        "WebSocket connection established"
    );

    let heartbeat = HeartbeatConfig::from(state.hub.config());
    let writer = tokio::spawn(write_loop(ws_tx, outbound, heartbeat, Arc::clone(&session)));

    read_loop(&state, &session, ws_rx, heartbeat, writer).await;

    state.hub.disconnect(&session);

    info!(
        conn_id = %session.id,
        user_id = %session.user_id,
        "WebSocket connection closed"
    );
}

/// Forwards the Session's outbound mailbox to the socket and pings on the
/// heartbeat interval. Ends when the mailbox closes or the socket fails.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<OutboundEvent>,
    heartbeat: HeartbeatConfig,
    session: Arc<Session>,
) {
    let mut ticker = heartbeat.ticker();

    loop {
        tokio::select! {
            event = outbound.recv() => {
                let Some(event) = event else {
                    break;
                };
                let text = match event.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(conn_id = %session.id, error = %e, "Failed to encode outbound event");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                if let Ok(text) = OutboundEvent::ping().to_json() {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    let _ = ws_tx.send(Message::Close(None)).await;
    debug!(conn_id = %session.id, "Write loop ended");
}

/// Reads client frames under a renewable deadline.
async fn read_loop(
    state: &AppState,
    session: &Arc<Session>,
    mut ws_rx: SplitStream<WebSocket>,
    heartbeat: HeartbeatConfig,
    mut writer: JoinHandle<()>,
) {
    let hub = &state.hub;
    let max_frame_bytes = hub.config().max_frame_bytes;
    let mut deadline = ReadDeadline::new(heartbeat.read_timeout);

    loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            _ = tokio::time::sleep_until(deadline.deadline()) => {
                info!(conn_id = %session.id, "Read deadline passed, closing connection");
                break;
            }
            _ = &mut writer => {
                debug!(conn_id = %session.id, "Outbound side closed");
                return;
            }
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                deadline.renew();
                handle_client_frame(
                    session,
                    text.as_str(),
                    hub.ingress(),
                    max_frame_bytes,
                    hub.metrics(),
                );
            }
            Some(Ok(Message::Pong(_))) => {
                deadline.renew();
                session.touch();
                hub.submit(InboundEvent::Presence(PresenceRefresh {
                    user_id: session.user_id,
                }));
            }
            Some(Ok(Message::Close(_))) | None => break,
            // Pings are answered by axum
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(conn_id = %session.id, error = %e, "WebSocket read error");
                break;
            }
        }
    }

    writer.abort();
}

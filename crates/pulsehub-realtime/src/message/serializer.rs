//! JSON decoding of inbound payloads and client frames.

use serde_json::Value;

use pulsehub_core::error::AppError;
use pulsehub_core::events::{ChatMessage, InboundEvent};
use pulsehub_core::result::AppResult;

use super::frame::ClientFrame;

/// Tags of [`InboundEvent`].
const INBOUND_TAGS: &[&str] = &[
    "message",
    "reaction",
    "read_receipt",
    "edit",
    "delivered",
    "conversation_seen",
    "typing",
    "call_signal",
    "rsvp_update",
    "feed_event",
    "presence",
];

/// Tags of [`ClientFrame`].
const CLIENT_TAGS: &[&str] = &["typing", "message", "call_signal", "presence"];

/// Decode an inbound payload from a producer or a peer instance.
///
/// Accepts the `{type, payload}` envelope, or a bare chat message as
/// published by older republishers.
pub fn decode_inbound_value(value: Value) -> AppResult<InboundEvent> {
    if value.get("type").is_none() {
        let message: ChatMessage = serde_json::from_value(value)
            .map_err(|e| AppError::validation(format!("Untagged payload is not a message: {e}")))?;
        return Ok(InboundEvent::Message(message));
    }
    decode_tagged(value, INBOUND_TAGS)
}

/// Decode a client frame.
pub fn decode_client_frame(raw: &str) -> AppResult<ClientFrame> {
    let value: Value = serde_json::from_str(raw)?;
    decode_tagged(value, CLIENT_TAGS)
}

fn decode_tagged<T: serde::de::DeserializeOwned>(value: Value, known: &[&str]) -> AppResult<T> {
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_default();
    serde_json::from_value(value).map_err(|e| {
        if known.contains(&tag.as_str()) {
            AppError::validation(format!("Malformed '{tag}' payload: {e}"))
        } else {
            AppError::not_found(format!("Unknown event type '{tag}'"))
        }
    })
}

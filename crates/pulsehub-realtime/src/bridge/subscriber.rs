//! Subscribing side of the bridge: a reconnecting loop that feeds the
//! router's ingress.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pulsehub_cache::CacheManager;
use pulsehub_core::config::BridgeConfig;
use pulsehub_core::error::ErrorKind;
use pulsehub_core::events::InboundEvent;
use pulsehub_core::result::AppResult;
use pulsehub_core::traits::PubSubProvider;

use crate::message::decode_inbound_value;
use crate::metrics::HubMetrics;
use crate::router::ingress::Ingress;

/// Relays broadcast-channel payloads into the local router.
#[derive(Debug)]
pub struct BridgeSubscriber {
    bus: Arc<CacheManager>,
    channel: String,
    origin: Uuid,
    reconnect_delay: Duration,
    ingress: Ingress,
    metrics: Arc<HubMetrics>,
}

impl BridgeSubscriber {
    pub fn new(
        bus: Arc<CacheManager>,
        config: &BridgeConfig,
        origin: Uuid,
        ingress: Ingress,
        metrics: Arc<HubMetrics>,
    ) -> Self {
        Self {
            bus,
            channel: config.channel.clone(),
            origin,
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            ingress,
            metrics,
        }
    }

    /// Subscribes until `cancel` fires, re-subscribing after
    /// `reconnect_delay` whenever the subscription fails or ends.
    pub async fn run(self, cancel: CancellationToken) {
        info!(channel = %self.channel, "Bridge subscriber started");
        loop {
            let subscription = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.bus.subscribe(&self.channel) => result,
            };

            match subscription {
                Ok(mut stream) => {
                    debug!(channel = %self.channel, "Bridge subscribed");
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                info!("Bridge subscriber stopped");
                                return;
                            }
                            next = stream.next() => match next {
                                Some(raw) => self.relay(&raw),
                                None => {
                                    warn!(channel = %self.channel, "Bridge subscription ended");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => warn!(channel = %self.channel, error = %e, "Bridge subscribe failed"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
        info!("Bridge subscriber stopped");
    }

    /// Decodes one payload and submits it unless this instance sent it.
    fn relay(&self, raw: &str) {
        match self.decode(raw) {
            Ok(Some(event)) => {
                self.metrics.bridge_received();
                self.ingress.submit_relayed(event);
            }
            Ok(None) => {}
            Err(e) if e.kind == ErrorKind::NotFound => {
                debug!(error = %e, "Dropping bridge payload with unknown type");
                self.metrics.unknown_event();
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed bridge payload");
                self.metrics.unknown_event();
            }
        }
    }

    /// Accepts a [`super::BridgeEnvelope`], a bare tagged event, or a bare
    /// chat message. Returns `None` for this instance's own envelopes.
    fn decode(&self, raw: &str) -> AppResult<Option<InboundEvent>> {
        let mut value: Value = serde_json::from_str(raw)?;
        let Some(inner) = value.get_mut("event").map(Value::take) else {
            return decode_inbound_value(value).map(Some);
        };
        let origin = value
            .get("origin")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Uuid>().ok());
        if origin == Some(self.origin) {
            return Ok(None);
        }
        decode_inbound_value(inner).map(Some)
    }
}

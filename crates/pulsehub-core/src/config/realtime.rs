//! Real-time hub configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Real-time (WebSocket) hub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Capacity of each Session's outbound mailbox.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer_size: usize,
    /// Capacity of each typed inbound mailbox feeding the router.
    #[serde(default = "default_inbound_buffer")]
    pub inbound_buffer_size: usize,
    /// WebSocket ping interval in seconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_seconds: u64,
    /// Read deadline in seconds, renewed by every pong or client frame.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_seconds: u64,
    /// Interval between stale-connection sweeps in seconds.
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_seconds: u64,
    /// A Session unseen for longer than this is evicted by the reaper.
    #[serde(default = "default_stale_after")]
    pub stale_after_seconds: u64,
    /// TTL of the shared online-presence record in seconds.
    #[serde(default = "default_presence_ttl")]
    pub presence_ttl_seconds: u64,
    /// TTL of the shared offline-presence record (last seen) in seconds.
    #[serde(default = "default_offline_presence_ttl")]
    pub offline_presence_ttl_seconds: u64,
    /// Per-call deadline for external collaborators in milliseconds.
    #[serde(default = "default_collaborator_timeout")]
    pub collaborator_timeout_ms: u64,
    /// Maximum number of concurrently running background tasks.
    #[serde(default = "default_background_concurrency")]
    pub background_concurrency: usize,
    /// Maximum accepted size of a client frame in bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Offline queue settings.
    #[serde(default)]
    pub pending: PendingConfig,
    /// Cross-instance bridge settings.
    #[serde(default)]
    pub bridge: BridgeConfig,
}

impl RealtimeConfig {
    /// Collaborator deadline as a [`Duration`].
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    /// Staleness threshold as a [`Duration`].
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_seconds)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            outbound_buffer_size: default_outbound_buffer(),
            inbound_buffer_size: default_inbound_buffer(),
            ping_interval_seconds: default_ping_interval(),
            ping_timeout_seconds: default_ping_timeout(),
            reaper_interval_seconds: default_reaper_interval(),
            stale_after_seconds: default_stale_after(),
            presence_ttl_seconds: default_presence_ttl(),
            offline_presence_ttl_seconds: default_offline_presence_ttl(),
            collaborator_timeout_ms: default_collaborator_timeout(),
            background_concurrency: default_background_concurrency(),
            max_frame_bytes: default_max_frame_bytes(),
            pending: PendingConfig::default(),
            bridge: BridgeConfig::default(),
        }
    }
}

/// Offline (pending) queue policy.
///
/// Each owner list keeps at most `max_per_owner` newest identifiers and
/// expires `ttl_seconds` after its last append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConfig {
    /// Overall deadline for draining one Session's pending lists, in seconds.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_seconds: u64,
    /// Maximum identifiers retained per owner list.
    #[serde(default = "default_max_per_owner")]
    pub max_per_owner: usize,
    /// Owner list expiry in seconds.
    #[serde(default = "default_pending_ttl")]
    pub ttl_seconds: u64,
    /// Expiry of cached message bodies in seconds.
    #[serde(default = "default_pending_ttl")]
    pub message_ttl_seconds: u64,
}

impl Default for PendingConfig {
    fn default() -> Self {
        Self {
            drain_timeout_seconds: default_drain_timeout(),
            max_per_owner: default_max_per_owner(),
            ttl_seconds: default_pending_ttl(),
            message_ttl_seconds: default_pending_ttl(),
        }
    }
}

/// Cross-instance broadcast bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Whether this instance subscribes to the broadcast channel.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Broadcast channel name.
    #[serde(default = "default_bridge_channel")]
    pub channel: String,
    /// Delay before re-subscribing after the stream ends, in milliseconds.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: default_bridge_channel(),
            reconnect_delay_ms: default_reconnect_delay(),
        }
    }
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_inbound_buffer() -> usize {
    1024
}

fn default_ping_interval() -> u64 {
    30
}

fn default_ping_timeout() -> u64 {
    60
}

fn default_reaper_interval() -> u64 {
    30
}

fn default_stale_after() -> u64 {
    90
}

fn default_presence_ttl() -> u64 {
    120
}

fn default_offline_presence_ttl() -> u64 {
    7 * 24 * 3600
}

fn default_collaborator_timeout() -> u64 {
    3000
}

fn default_background_concurrency() -> usize {
    64
}

fn default_max_frame_bytes() -> usize {
    65_536
}

fn default_drain_timeout() -> u64 {
    30
}

fn default_max_per_owner() -> usize {
    500
}

fn default_pending_ttl() -> u64 {
    7 * 24 * 3600
}

fn default_true() -> bool {
    true
}

fn default_bridge_channel() -> String {
    "pulsehub:bridge".to_string()
}

fn default_reconnect_delay() -> u64 {
    1000
}

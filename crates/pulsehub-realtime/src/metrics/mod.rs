//! Hub metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Hub-level metrics counters.
#[derive(Debug, Default)]
pub struct HubMetrics {
    /// Sessions ever registered
    pub connections_opened: AtomicU64,
    /// Sessions currently registered
    pub connections_active: AtomicU64,
    /// Events accepted into an inbound mailbox
    pub events_received: AtomicU64,
    /// Events enqueued onto a Session's outbound mailbox
    pub events_delivered: AtomicU64,
    /// Pending entries appended
    pub pending_enqueued: AtomicU64,
    /// Pending entries delivered on reconnect and removed
    pub pending_drained: AtomicU64,
    /// Events dropped because an inbound mailbox was full or closed
    pub inbound_dropped: AtomicU64,
    /// Sessions closed because their outbound mailbox was full
    pub slow_consumer_evictions: AtomicU64,
    /// Payloads with an unknown tag or an unusable body
    pub unknown_events: AtomicU64,
    /// Client frames rejected with an error frame
    pub frames_rejected: AtomicU64,
    /// Background tasks dropped because every slot was busy
    pub background_dropped: AtomicU64,
    /// Background tasks that failed or timed out
    pub background_failed: AtomicU64,
    /// Sessions evicted by the reaper
    pub sessions_reaped: AtomicU64,
    /// Payloads received from the cross-instance bridge
    pub bridge_received: AtomicU64,
}

impl HubMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a registered Session
    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a removed Session
    pub fn connection_closed(&self) {
        let _ = self
            .connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    /// Record an event accepted by the ingress
    pub fn event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `n` successful outbound enqueues
    pub fn events_delivered(&self, n: usize) {
        self.events_delivered.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Record a pending append
    pub fn pending_enqueued(&self) {
        self.pending_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a drained pending entry
    pub fn pending_drained(&self) {
        self.pending_drained.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an inbound drop
    pub fn inbound_dropped(&self) {
        self.inbound_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a slow-consumer eviction
    pub fn slow_consumer_evicted(&self) {
        self.slow_consumer_evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an unknown or undecodable event
    pub fn unknown_event(&self) {
        self.unknown_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected client frame
    pub fn frame_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dropped background task
    pub fn background_dropped(&self) {
        self.background_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed background task
    pub fn background_failed(&self) {
        self.background_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a reaped Session
    pub fn session_reaped(&self) {
        self.sessions_reaped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a bridge payload
    pub fn bridge_received(&self) {
        self.bridge_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            pending_enqueued: self.pending_enqueued.load(Ordering::Relaxed),
            pending_drained: self.pending_drained.load(Ordering::Relaxed),
            inbound_dropped: self.inbound_dropped.load(Ordering::Relaxed),
            slow_consumer_evictions: self.slow_consumer_evictions.load(Ordering::Relaxed),
            unknown_events: self.unknown_events.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            background_dropped: self.background_dropped.load(Ordering::Relaxed),
            background_failed: self.background_failed.load(Ordering::Relaxed),
            sessions_reaped: self.sessions_reaped.load(Ordering::Relaxed),
            bridge_received: self.bridge_received.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_active: u64,
    pub events_received: u64,
    pub events_delivered: u64,
    pub pending_enqueued: u64,
    pub pending_drained: u64,
    pub inbound_dropped: u64,
    pub slow_consumer_evictions: u64,
    pub unknown_events: u64,
    pub frames_rejected: u64,
    pub background_dropped: u64,
    pub background_failed: u64,
    pub sessions_reaped: u64,
    pub bridge_received: u64,
}

//! # pulsehub-realtime
//!
//! Real-time delivery core for pulsehub. Provides:
//!
//! - Session lifecycle and a registry of live Sessions by user and group
//! - A single event router over typed, bounded inbound mailboxes
//! - Non-blocking delivery with slow-consumer eviction
//! - An offline queue drained on reconnect
//! - Relationship-scoped presence
//! - Privacy-scoped fan-out of feed events
//! - A cross-instance bridge over the shared broadcast channel
//! - A stale-connection reaper

pub mod background;
pub mod bridge;
pub mod connection;
mod context;
pub mod delivery;
pub mod fanout;
pub mod message;
pub mod metrics;
pub mod pending;
pub mod presence;
pub mod reaper;
pub mod router;
pub mod server;
pub mod testing;

pub use connection::registry::Registry;
pub use connection::session::Session;
pub use metrics::{HubMetrics, MetricsSnapshot};
pub use router::ingress::{CloseReason, Ingress};
pub use server::{Collaborators, Hub};

//! Stale-connection reaper.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::connection::registry::Registry;
use crate::metrics::HubMetrics;
use crate::router::ingress::{CloseReason, Ingress};

/// Periodically evicts Sessions that have gone silent.
///
/// Evictions go through the router like any other disconnect.
#[derive(Debug)]
pub struct Reaper {
    registry: Arc<Registry>,
    ingress: Ingress,
    metrics: Arc<HubMetrics>,
    interval: Duration,
    stale_after: Duration,
}

impl Reaper {
    pub fn new(
        registry: Arc<Registry>,
        ingress: Ingress,
        metrics: Arc<HubMetrics>,
        interval: Duration,
        stale_after: Duration,
    ) -> Self {
        Self {
            registry,
            ingress,
            metrics,
            interval,
            stale_after,
        }
    }

    /// Sweeps every `interval` until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let period = self.interval.max(Duration::from_millis(10));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(?period, stale_after = ?self.stale_after, "Reaper started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep(Utc::now());
                }
            }
        }
        info!("Reaper stopped");
    }

    /// Requests removal of every Session silent for longer than the
    /// staleness threshold at `now`. Returns how many were evicted.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut evicted = 0;
        for session in self.registry.all() {
            if session.is_closing() || !session.is_stale_at(now, self.stale_after) {
                continue;
            }
            debug!(conn_id = %session.id, user_id = %session.user_id, last_seen = %session.last_seen(), "Evicting stale Session");
            self.ingress.unregister(session.id, CloseReason::Stale);
            self.metrics.session_reaped();
            evicted += 1;
        }
        if evicted > 0 {
            info!(evicted, "Reaper sweep evicted stale Sessions");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::connection::session::Session;
    use crate::router::ingress::mailboxes;
    use pulsehub_core::types::id::UserId;

    #[test]
    fn test_sweep_only_targets_silent_sessions() {
        let metrics = Arc::new(HubMetrics::new());
        let registry = Arc::new(Registry::new(Arc::clone(&metrics)));
        let (ingress, mut mb) = mailboxes(8, Arc::clone(&metrics));

        let (quiet, _rx1) = Session::new(UserId::new(), HashSet::new(), 4);
        let (chatty, _rx2) = Session::new(UserId::new(), HashSet::new(), 4);
        registry.add(Arc::clone(&quiet));
        registry.add(Arc::clone(&chatty));

        let now = Utc::now();
        quiet.set_last_seen(now - chrono::Duration::seconds(300));

        let reaper = Reaper::new(
            registry,
            ingress,
            Arc::clone(&metrics),
            Duration::from_secs(30),
            Duration::from_secs(90),
        );
        assert_eq!(reaper.sweep(now), 1);
        assert_eq!(mb.unregister.try_recv().unwrap(), (quiet.id, CloseReason::Stale));
        assert!(mb.unregister.try_recv().is_err());
        assert_eq!(metrics.snapshot().sessions_reaped, 1);
    }
}

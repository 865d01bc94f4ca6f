//! Ping/pong heartbeat and read deadline for WebSocket keepalive.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

use pulsehub_core::config::RealtimeConfig;

/// Heartbeat configuration
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// Interval between pings
    pub ping_interval: Duration,
    /// Silence after which the connection is considered dead
    pub read_timeout: Duration,
}

impl From<&RealtimeConfig> for HeartbeatConfig {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            ping_interval: Duration::from_secs(config.ping_interval_seconds.max(1)),
            read_timeout: Duration::from_secs(config.ping_timeout_seconds.max(1)),
        }
    }
}

impl HeartbeatConfig {
    /// Ping ticker whose first tick fires one interval from now.
    pub fn ticker(&self) -> Interval {
        let mut interval =
            tokio::time::interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }
}

/// Read deadline renewed by every pong or client frame.
#[derive(Debug, Clone)]
pub struct ReadDeadline {
    timeout: Duration,
    deadline: Instant,
}

impl ReadDeadline {
    /// Deadline starting now.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    /// Push the deadline one full timeout into the future.
    pub fn renew(&mut self) {
        self.deadline = Instant::now() + self.timeout;
    }

    /// Instant at which the connection is considered dead.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Whether the deadline has passed.
    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_renew_extends_deadline() {
        let mut deadline = ReadDeadline::new(Duration::from_secs(60));
        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(!deadline.expired());
        deadline.renew();
        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(!deadline.expired());
        tokio::time::advance(Duration::from_secs(16)).await;
        assert!(deadline.expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_skips_immediate_tick() {
        let config = HeartbeatConfig {
            ping_interval: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
        };
        let start = Instant::now();
        let mut ticker = config.ticker();
        ticker.tick().await;
        assert!(Instant::now() - start >= Duration::from_secs(30));
    }

    #[test]
    fn test_config_from_realtime_settings() {
        let realtime = RealtimeConfig::default();
        let hb = HeartbeatConfig::from(&realtime);
        assert_eq!(hb.ping_interval, Duration::from_secs(30));
        assert_eq!(hb.read_timeout, Duration::from_secs(60));
    }
}

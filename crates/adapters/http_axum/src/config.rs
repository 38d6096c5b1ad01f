//! Per-session tunables.

use std::time::Duration;

/// How each WebSocket subscriber session behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Capacity of the per-subscriber outbound queue. A subscriber whose
    /// queue is full when a measurement arrives is dropped.
    pub queue_capacity: usize,
    /// Upper bound on a single frame write.
    pub write_timeout: Duration,
    /// How often a ping frame is sent to detect dead peers. Zero disables
    /// idle pings.
    pub ping_interval: Duration,
    /// Largest inbound frame accepted.
    pub max_message_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            write_timeout: Duration::from_secs(2),
            ping_interval: Duration::from_secs(30),
            max_message_bytes: 64 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_have_sensible_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.queue_capacity, 32);
        assert_eq!(config.write_timeout, Duration::from_secs(2));
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(config.max_message_bytes, 65_536);
    }
}

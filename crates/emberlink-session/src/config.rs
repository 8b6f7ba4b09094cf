//! Session configuration.

use std::time::Duration;

/// Optional behaviors a session is constructed with. Declared up front
/// rather than probed at runtime.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    /// Relay `chat` messages between participants.
    pub chat: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self { chat: true }
    }
}

/// Configuration for a session coordinator.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Human-readable session name, carried in snapshots.
    pub name: String,

    /// Minimum non-spectator participants required to start.
    pub min_participants: usize,

    /// Hard cap on participants.
    pub max_participants: usize,

    /// How long the current turn owner gets before a default action is
    /// synthesized on their behalf.
    pub turn_timeout: Duration,

    /// Cadence of the full-state repair broadcast.
    pub snapshot_interval: Duration,

    /// Cadence of liveness probes. A participant silent for twice this
    /// long is treated as disconnected.
    pub ping_interval: Duration,

    /// Command channel depth for the coordinator actor.
    pub channel_size: usize,

    pub capabilities: Capabilities,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "emberlink session".to_string(),
            min_participants: 2,
            max_participants: 8,
            turn_timeout: Duration::from_secs(30),
            snapshot_interval: Duration::from_secs(1),
            ping_interval: Duration::from_secs(30),
            channel_size: 64,
            capabilities: Capabilities::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.min_participants, 2);
        assert_eq!(config.max_participants, 8);
        assert_eq!(config.turn_timeout, Duration::from_secs(30));
        assert_eq!(config.snapshot_interval, Duration::from_secs(1));
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert!(config.capabilities.chat);
    }
}

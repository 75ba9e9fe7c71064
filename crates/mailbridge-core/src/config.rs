//! Pool configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Session pool limits and timeouts
///
/// Durations are whole seconds on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolConfig {
    /// Concurrent sessions per `username@host:port`
    pub max_sessions_per_key: usize,
    /// Sessions older than this are never lent
    pub max_age_secs: u64,
    /// Idle sessions unused for longer than this are closed
    pub max_idle_secs: u64,
    pub connect_timeout_secs: u64,
    /// How long an acquire may wait for a free session
    pub acquire_timeout_secs: u64,
    /// Bound on the protocol exchanges of one operation
    pub operation_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sessions_per_key: 2,
            max_age_secs: 30 * 60,
            max_idle_secs: 5 * 60,
            connect_timeout_secs: 30,
            acquire_timeout_secs: 30,
            operation_timeout_secs: 60,
            sweep_interval_secs: 30,
        }
    }
}

impl PoolConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Never zero; a zero interval would spin the sweeper
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_sessions_per_key, 2);
        assert_eq!(config.max_age(), Duration::from_secs(1800));
        assert_eq!(config.max_idle(), Duration::from_secs(300));
        assert_eq!(config.operation_timeout(), Duration::from_secs(60));
        assert_eq!(config.sweep_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_override() {
        let config: PoolConfig =
            serde_json::from_str(r#"{"maxSessionsPerKey": 4, "acquireTimeoutSecs": 5}"#).unwrap();
        assert_eq!(config.max_sessions_per_key, 4);
        assert_eq!(config.acquire_timeout(), Duration::from_secs(5));
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
    }
}

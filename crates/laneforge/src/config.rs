//! Server configuration.

use std::path::Path;
use std::time::Duration;

use laneforge_lane::LaneConfig;
use laneforge_tick::TickConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::LaneforgeError;

/// Everything needed to start a server.
///
/// Missing fields in a JSON file take their defaults:
///
/// ```rust
/// use laneforge::ServerConfig;
///
/// let config = ServerConfig::from_json_str(r#"{ "lane_count": 4 }"#).unwrap();
/// assert_eq!(config.lane_count, 4);
/// assert_eq!(config.coordinator_rate_hz, 120);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,

    /// Lanes started at boot. Fixed for the server's lifetime.
    pub lane_count: u16,

    /// Connection slots the transport hands out. Connections beyond
    /// this are closed on accept.
    pub max_connections: usize,

    pub coordinator_rate_hz: u32,

    /// Time a connection gets to finish hello and authentication.
    pub handshake_timeout_ms: u64,

    pub lane: LaneConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7000".to_string(),
            lane_count: 2,
            max_connections: 256,
            coordinator_rate_hz: 120,
            handshake_timeout_ms: 10_000,
            lane: LaneConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, LaneforgeError> {
        serde_json::from_str(json).map_err(LaneforgeError::Config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LaneforgeError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Clamp nonsense values, logging each fix.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if self.lane_count == 0 {
            warn!("lane_count is 0, using 1");
            self.lane_count = 1;
        }
        if self.max_connections == 0 {
            warn!(
                fallback = defaults.max_connections,
                "max_connections is 0, using default"
            );
            self.max_connections = defaults.max_connections;
        }
        if self.handshake_timeout_ms == 0 {
            warn!(
                fallback = defaults.handshake_timeout_ms,
                "handshake_timeout_ms is 0, using default"
            );
            self.handshake_timeout_ms = defaults.handshake_timeout_ms;
        }
        self.coordinator_rate_hz = TickConfig::with_rate(self.coordinator_rate_hz)
            .validated()
            .rate_hz;
        self.lane = self.lane.validated();
        self
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Pacing for the Coordinator thread.
    pub fn coordinator_tick_config(&self) -> TickConfig {
        TickConfig::with_rate(self.coordinator_rate_hz)
    }
}

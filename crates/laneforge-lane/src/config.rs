//! Lane configuration.

use laneforge_replication::ReplicationConfig;
use laneforge_tick::{OverrunPolicy, TickConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration shared by every Lane of a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    /// Simulation rate in Hz.
    pub tick_rate_hz: u32,

    /// Clients a lane accepts before the Coordinator stops assigning to
    /// it. 0 means unlimited.
    pub max_clients: usize,

    /// Run missed ticks back to back (up to this many) instead of
    /// skipping them. 0 keeps the default skip behavior.
    pub max_catchup_ticks: u32,

    pub replication: ReplicationConfig,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 30,
            max_clients: 64,
            max_catchup_ticks: 0,
            replication: ReplicationConfig::default(),
        }
    }
}

impl LaneConfig {
    /// Clamp nonsense values, logging each fix.
    pub fn validated(mut self) -> Self {
        if self.tick_rate_hz == 0 || self.tick_rate_hz > TickConfig::MAX_RATE_HZ {
            let fallback = Self::default().tick_rate_hz;
            warn!(
                rate = self.tick_rate_hz,
                fallback, "lane tick_rate_hz out of range, using default"
            );
            self.tick_rate_hz = fallback;
        }
        self.replication = self.replication.validated();
        self
    }

    /// Whether a lane holding `clients` can take one more.
    pub fn has_room(&self, clients: usize) -> bool {
        self.max_clients == 0 || clients < self.max_clients
    }

    /// Pacing for a lane thread.
    pub fn tick_config(&self) -> TickConfig {
        let overrun = match self.max_catchup_ticks {
            0 => OverrunPolicy::Skip,
            max_ticks => OverrunPolicy::CatchUp { max_ticks },
        };
        TickConfig {
            overrun,
            ..TickConfig::with_rate(self.tick_rate_hz)
        }
    }
}

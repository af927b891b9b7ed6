//! Error types for the lane layer.

use laneforge_protocol::LaneId;

/// Errors from starting, feeding or stopping a Lane.
#[derive(Debug, thiserror::Error)]
pub enum LaneError {
    /// The OS refused to start the lane thread.
    #[error("failed to spawn thread for {lane}: {source}")]
    Spawn {
        lane: LaneId,
        #[source]
        source: std::io::Error,
    },

    /// The lane thread panicked. Its clients' views can no longer be
    /// trusted.
    #[error("{0} panicked")]
    Panicked(LaneId),

    #[error("{0} is shutting down")]
    ShuttingDown(LaneId),
}

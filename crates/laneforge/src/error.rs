//! Unified error type for Laneforge.

use laneforge_lane::LaneError;
use laneforge_protocol::ProtocolError;
use laneforge_session::SessionError;
use laneforge_transport::TransportError;

/// Everything that can go wrong starting or running a server.
///
/// Errors from the layer crates convert with `?`.
#[derive(Debug, thiserror::Error)]
pub enum LaneforgeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Handshake refused: bad token, wrong phase or account in use.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A lane failed to start, panicked or is shutting down.
    #[error(transparent)]
    Lane(#[from] LaneError),

    /// Every lane is full or stopping.
    #[error("no lane can take another client")]
    NoLaneAvailable,

    /// A configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[source] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A server thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A server thread panicked.
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

#[cfg(test)]
mod tests {
    use laneforge_protocol::LaneId;

    use super::*;

    #[test]
    fn test_transport_error_converts_and_keeps_message() {
        let err: LaneforgeError = TransportError::Truncated { len: 2 }.into();
        assert!(matches!(err, LaneforgeError::Transport(_)));
        assert!(err.to_string().contains("2 bytes"));
    }

    #[test]
    fn test_protocol_error_converts() {
        let framing = TransportError::Oversized(70_000);
        let err: LaneforgeError = ProtocolError::from(framing).into();
        assert!(matches!(err, LaneforgeError::Protocol(ProtocolError::Framing(_))));
    }

    #[test]
    fn test_session_error_converts_and_keeps_reason() {
        let err: LaneforgeError = SessionError::AuthFailed("nope".into()).into();
        assert!(matches!(err, LaneforgeError::Session(_)));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_lane_error_names_lane() {
        let err: LaneforgeError = LaneError::ShuttingDown(LaneId(3)).into();
        assert!(matches!(err, LaneforgeError::Lane(_)));
        assert!(err.to_string().contains("lane-3"));
    }

    #[test]
    fn test_config_error_reports_parse_failure() {
        let parse = serde_json::from_str::<u32>("{").unwrap_err();
        let err = LaneforgeError::Config(parse);
        assert!(err.to_string().starts_with("invalid configuration"));
    }

    #[test]
    fn test_thread_panicked_names_thread() {
        let err = LaneforgeError::ThreadPanicked("coordinator");
        assert_eq!(err.to_string(), "coordinator thread panicked");
    }
}

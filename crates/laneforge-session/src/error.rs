use laneforge_transport::ConnectionSlot;

use crate::SessionPhase;

/// Errors raised while moving a connection through the handshake.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The [`Authenticator`](crate::Authenticator) rejected the token.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("no session for {0}")]
    NotFound(ConnectionSlot),

    /// A Connected event arrived for a slot that still has a record.
    #[error("{0} already has a session")]
    AlreadyOpen(ConnectionSlot),

    /// A handshake message arrived out of order.
    #[error("{slot} is {phase}, expected {expected}")]
    UnexpectedPhase {
        slot: ConnectionSlot,
        phase: SessionPhase,
        expected: &'static str,
    },

    /// The account is already bound to another live connection.
    #[error("account {0} is already logged in")]
    AccountInUse(u64),
}

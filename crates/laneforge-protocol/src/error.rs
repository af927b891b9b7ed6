use laneforge_transport::TransportError;

/// Failures turning message bodies into units and back.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[cfg(feature = "json")]
    #[error("cannot encode message body: {0}")]
    Encode(#[source] serde_json::Error),

    /// The body is not valid for the type it was decoded as.
    #[cfg(feature = "json")]
    #[error("malformed message body: {0}")]
    Decode(#[source] serde_json::Error),

    /// The encoded body could not be framed into a unit.
    #[error(transparent)]
    Framing(#[from] TransportError),
}

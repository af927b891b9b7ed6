use std::io;
use std::net::SocketAddr;

/// Failures below the Coordinator: sockets, upgrades and unit framing.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The listener failed while waiting for a peer.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// A TCP peer connected but never completed the WebSocket upgrade.
    #[cfg(feature = "websocket")]
    #[error("websocket upgrade from {peer} failed: {source}")]
    Upgrade {
        peer: SocketAddr,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    /// Reading or writing an established connection failed.
    #[cfg(feature = "websocket")]
    #[error("websocket error on {peer}: {source}")]
    Socket {
        peer: SocketAddr,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("{0} is closed")]
    Closed(String),

    /// A message was shorter than the fixed header.
    #[error("truncated unit: {len} bytes is shorter than the header")]
    Truncated { len: usize },

    /// The header's declared size disagrees with the bytes received.
    #[error("size mismatch: header declares {declared} bytes, got {actual}")]
    SizeMismatch { declared: usize, actual: usize },

    /// An outbound payload does not fit the 16-bit size field.
    #[error("payload of {0} bytes does not fit in one unit")]
    Oversized(usize),
}

impl TransportError {
    /// The remote end the error concerns, when one is known.
    pub fn peer(&self) -> Option<SocketAddr> {
        match self {
            #[cfg(feature = "websocket")]
            Self::Upgrade { peer, .. } | Self::Socket { peer, .. } => Some(*peer),
            _ => None,
        }
    }
}

//! WebSocket transport over `tokio-tungstenite`.
//!
//! Every binary message is exactly one framed unit, so no stream
//! reassembly is needed here; [`InboundUnit::parse`](crate::InboundUnit::parse)
//! checks the framing above this layer.

use std::net::SocketAddr;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace};

use crate::{Connection, Transport, TransportError};

type Socket = WebSocketStream<TcpStream>;

/// Listens for TCP peers and upgrades each one to a WebSocket.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_owned(),
                source,
            })?;
        info!(addr, "websocket transport listening");
        Ok(Self { listener })
    }

    /// The address actually bound, which differs from the requested one
    /// when binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener.local_addr().map_err(TransportError::Accept)
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;

    async fn accept(&mut self) -> Result<WebSocketConnection, TransportError> {
        let (tcp, peer) = self.listener.accept().await.map_err(TransportError::Accept)?;
        // Units are small and latency bound.
        if let Err(err) = tcp.set_nodelay(true) {
            debug!(%peer, %err, "could not disable nagle");
        }
        let socket = tokio_tungstenite::accept_async(tcp)
            .await
            .map_err(|source| TransportError::Upgrade { peer, source })?;
        debug!(%peer, "websocket peer connected");

        let (sink, stream) = socket.split();
        Ok(WebSocketConnection {
            peer,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }

    fn bound_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }
}

/// One upgraded peer.
///
/// The two halves are locked separately, so a reader parked in
/// [`Connection::recv`] never blocks a writer.
pub struct WebSocketConnection {
    peer: SocketAddr,
    sink: Mutex<SplitSink<Socket, Message>>,
    stream: Mutex<SplitStream<Socket>>,
}

impl WebSocketConnection {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn socket_error(&self, source: tokio_tungstenite::tungstenite::Error) -> TransportError {
        TransportError::Socket {
            peer: self.peer,
            source,
        }
    }
}

impl Connection for WebSocketConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .send(Message::Binary(data.to_vec().into()))
            .await
            .map_err(|source| self.socket_error(source))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut stream = self.stream.lock().await;
        while let Some(message) = stream.next().await {
            match message.map_err(|source| self.socket_error(source))? {
                Message::Binary(data) => return Ok(Some(data.into())),
                Message::Close(_) => return Ok(None),
                other => trace!(peer = %self.peer, kind = ?other, "non-binary frame skipped"),
            }
        }
        Ok(None)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|source| self.socket_error(source))
    }
}

//! Transport layer for Laneforge.
//!
//! Everything below the Coordinator lives here:
//!
//! - [`ConnectionSlot`]: the small integer a transport uses to name a
//!   live connection, and [`ClientHandle`], a slot plus the generation
//!   of its current occupant.
//! - [`NetHeader`] / [`InboundUnit`]: the framed unit every transport
//!   delivers: `(slot, {total_size, message_type}, payload)`.
//! - [`HandoffQueue`] / [`OutboundQueue`]: the single-mutex buffers that
//!   carry work between the transport thread, the Coordinator and Lanes.
//! - [`Transport`] / [`Connection`]: async traits over a concrete
//!   network protocol.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
mod frame;
mod queue;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use frame::{InboundUnit, NetHeader, HEADER_SIZE};
pub use queue::{HandoffQueue, OutboundCommand, OutboundQueue};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;

/// Index of a live connection inside the transport's slot table.
///
/// Slots are recycled: once a connection closes, its slot may be handed
/// to the next accepted connection. Anything held across threads uses a
/// [`ClientHandle`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionSlot(u32);

impl ConnectionSlot {
    /// Creates a `ConnectionSlot` from a raw index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the underlying index.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ConnectionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot-{}", self.0)
    }
}

/// A connection slot plus the generation of its current occupant.
///
/// The transport bumps a slot's generation every time it hands the slot
/// to a new connection. Every record that crosses a thread boundary
/// carries a `ClientHandle`; the receiver compares the generation with
/// the slot's current occupant and drops anything stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientHandle {
    pub slot: ConnectionSlot,
    pub generation: u32,
}

impl ClientHandle {
    pub fn new(slot: ConnectionSlot, generation: u32) -> Self {
        Self { slot, generation }
    }
}

impl fmt::Display for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.slot, self.generation)
    }
}

/// Something the transport observed on a slot, in receive order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connection was accepted; the handle names its slot and the
    /// generation the transport assigned to it.
    Connected(ClientHandle),
    /// A fully framed unit arrived.
    Unit(InboundUnit),
    /// The connection is gone (clean close or I/O failure).
    Disconnected(ConnectionSlot),
}

impl TransportEvent {
    /// The slot this event concerns.
    pub fn slot(&self) -> ConnectionSlot {
        match self {
            Self::Connected(client) => client.slot,
            Self::Disconnected(slot) => *slot,
            Self::Unit(unit) => unit.slot,
        }
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, TransportError>;

    /// The address clients connect to, if this transport has one.
    fn bound_addr(&self) -> Option<std::net::SocketAddr> {
        None
    }
}

/// A single connection that can send and receive whole messages.
pub trait Connection: Send + Sync + 'static {
    /// Sends one message to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_slot_new_and_index() {
        let slot = ConnectionSlot::new(42);
        assert_eq!(slot.index(), 42);
    }

    #[test]
    fn test_connection_slot_display() {
        assert_eq!(ConnectionSlot::new(7).to_string(), "slot-7");
    }

    #[test]
    fn test_connection_slot_orders_by_index() {
        assert!(ConnectionSlot::new(1) < ConnectionSlot::new(2));
    }

    #[test]
    fn test_client_handles_differ_by_generation() {
        let slot = ConnectionSlot::new(1);
        assert_ne!(ClientHandle::new(slot, 1), ClientHandle::new(slot, 2));
        assert_eq!(ClientHandle::new(slot, 2).to_string(), "slot-1#2");
    }

    #[test]
    fn test_transport_event_slot_reports_owner() {
        let slot = ConnectionSlot::new(3);
        let unit = InboundUnit::new(slot, 9, vec![1, 2]).unwrap();
        let client = ClientHandle::new(slot, 2);
        assert_eq!(TransportEvent::Connected(client).slot(), slot);
        assert_eq!(TransportEvent::Unit(unit).slot(), slot);
        assert_eq!(TransportEvent::Disconnected(slot).slot(), slot);
    }
}

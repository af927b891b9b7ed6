//! Coordinator → Lane hand-off.
//!
//! Two queues, each behind its own mutex. The Coordinator appends; the
//! lane thread swaps both out once per tick and works on the copies with
//! no lock held.

use laneforge_protocol::{AccountInfo, ClientHandle};
use laneforge_transport::{HandoffQueue, InboundUnit};

/// One record for a lane, in the order the Coordinator produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum LaneInbound {
    /// The client was assigned to this lane.
    Joined {
        client: ClientHandle,
        account: AccountInfo,
    },
    /// Traffic forwarded verbatim after assignment.
    Packet {
        client: ClientHandle,
        unit: InboundUnit,
    },
}

impl LaneInbound {
    pub fn client(&self) -> ClientHandle {
        match self {
            Self::Joined { client, .. } | Self::Packet { client, .. } => *client,
        }
    }
}

/// A lane's inbound queues.
#[derive(Debug, Default)]
pub struct LaneInbox {
    inbound: HandoffQueue<LaneInbound>,
    disconnects: HandoffQueue<ClientHandle>,
}

impl LaneInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_joined(&self, client: ClientHandle, account: AccountInfo) {
        self.inbound.push(LaneInbound::Joined { client, account });
    }

    pub fn push_packet(&self, client: ClientHandle, unit: InboundUnit) {
        self.inbound.push(LaneInbound::Packet { client, unit });
    }

    pub fn push_disconnect(&self, client: ClientHandle) {
        self.disconnects.push(client);
    }

    /// Swaps out both queues.
    ///
    /// Disconnects are taken first. The Coordinator always queues a
    /// client's `Joined` before its disconnect, so every disconnect in
    /// the batch refers to a client whose `Joined` was already taken,
    /// now or on an earlier tick.
    pub fn drain(&self, inbound: &mut Vec<LaneInbound>, disconnects: &mut Vec<ClientHandle>) {
        self.disconnects.swap_out(disconnects);
        self.inbound.swap_out(inbound);
    }

    /// Records waiting for the next tick.
    pub fn pending(&self) -> usize {
        self.inbound.len() + self.disconnects.len()
    }
}

//! What a [`World`](crate::World) can touch while its lane is ticking.

use laneforge_protocol::{
    ActorUid, ClientHandle, Codec, ConnectionState, LaneId, LocalId, ProtocolError, encode_unit,
};
use laneforge_replication::{Actor, PlayerRecord, Replicator};
use laneforge_transport::OutboundCommand;
use serde::Serialize;
use tracing::warn;

/// A World's window onto its lane for the duration of one callback.
///
/// Gives access to the replicator (frame pushes, id queries, pins) and a
/// way to send game messages. Messages are queued and reach the
/// transport together with this tick's replication traffic.
pub struct LaneContext<'a, C: Codec> {
    lane: LaneId,
    tick: u64,
    replicator: &'a mut Replicator,
    codec: &'a C,
    outbound: &'a mut Vec<OutboundCommand>,
}

impl<'a, C: Codec> LaneContext<'a, C> {
    pub(crate) fn new(
        lane: LaneId,
        tick: u64,
        replicator: &'a mut Replicator,
        codec: &'a C,
        outbound: &'a mut Vec<OutboundCommand>,
    ) -> Self {
        Self {
            lane,
            tick,
            replicator,
            codec,
            outbound,
        }
    }

    pub fn lane(&self) -> LaneId {
        self.lane
    }

    /// The tick being processed.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    // -----------------------------------------------------------------------
    // Frame
    // -----------------------------------------------------------------------

    /// Adds a live actor to this tick's frame.
    ///
    /// # Panics
    /// If the uid was already pushed this tick.
    pub fn push_actor(&mut self, actor: Actor) {
        self.replicator.push_actor(actor);
    }

    /// # Panics
    /// If the player was already pushed this tick.
    pub fn push_player(&mut self, player: PlayerRecord) {
        self.replicator.push_player(player);
    }

    // -----------------------------------------------------------------------
    // Ids
    // -----------------------------------------------------------------------

    /// Translates a local id received from `client`.
    ///
    /// A miss is logged and yields `None`; the caller should drop the
    /// request and carry on.
    pub fn resolve_local(&self, client: ClientHandle, local: LocalId) -> Option<ActorUid> {
        let uid = self.replicator.world_uid(client, local);
        if uid.is_none() {
            warn!(lane = %self.lane, %client, %local, "request for unknown local id dropped");
        }
        uid
    }

    pub fn local_id(&self, client: ClientHandle, uid: ActorUid) -> Option<LocalId> {
        self.replicator.local_id(client, uid)
    }

    /// Pins `uid` to `local` for `client` before it first becomes visible.
    ///
    /// Returns `false` for an unknown client.
    ///
    /// # Panics
    /// If `uid` is already pinned or visible for that client, or `local`
    /// is taken.
    pub fn pin_local_id(&mut self, client: ClientHandle, uid: ActorUid, local: LocalId) -> bool {
        self.replicator.force_local_id(client, uid, local)
    }

    // -----------------------------------------------------------------------
    // Clients
    // -----------------------------------------------------------------------

    pub fn state(&self, client: ClientHandle) -> ConnectionState {
        self.replicator.state(client)
    }

    /// Every client currently in this lane.
    pub fn clients(&self) -> impl Iterator<Item = ClientHandle> + '_ {
        self.replicator.clients().map(|view| view.handle())
    }

    /// Sends a game message to one client.
    ///
    /// Messages for clients that already left are dropped with a warning.
    pub fn send<T: Serialize>(
        &mut self,
        client: ClientHandle,
        message_type: u16,
        body: &T,
    ) -> Result<(), ProtocolError> {
        if self.replicator.client(client).is_none() {
            warn!(lane = %self.lane, %client, message_type, "send to departed client dropped");
            return Ok(());
        }
        let bytes = encode_unit(self.codec, message_type, body)?;
        self.outbound.push(OutboundCommand::Send { client, bytes });
        Ok(())
    }

    /// Sends a game message to every client that is in game.
    pub fn broadcast<T: Serialize>(
        &mut self,
        message_type: u16,
        body: &T,
    ) -> Result<(), ProtocolError> {
        let bytes = encode_unit(self.codec, message_type, body)?;
        for view in self.replicator.clients() {
            if view.state().is_replicating() {
                self.outbound.push(OutboundCommand::Send {
                    client: view.handle(),
                    bytes: bytes.clone(),
                });
            }
        }
        Ok(())
    }

    /// Asks the transport to drop `client`'s connection.
    ///
    /// The lane learns about it like any other disconnect, on a later tick.
    pub fn kick(&mut self, client: ClientHandle) {
        if self.replicator.client(client).is_some() {
            self.outbound.push(OutboundCommand::Close { client });
        }
    }
}

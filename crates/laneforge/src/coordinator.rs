//! The Coordinator: handshake, authentication and lane dispatch.
//!
//! The Coordinator owns the only view of connections that are not yet
//! in a lane. Each tick it swaps out the transport's event queue and,
//! per event:
//!
//! - `Connected` opens a session under the handle the transport assigned,
//! - `Unit` on an assigned slot is forwarded verbatim to that lane,
//!   `Unit` on an unassigned slot drives the hello/authenticate
//!   handshake,
//! - `Disconnected` tells the owning lane, clears the assignment and
//!   releases the session.
//!
//! Connections that linger in the handshake past the timeout are closed.

use std::mem;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use laneforge_lane::{LaneConfig, LaneSender};
use laneforge_protocol::{
    AccountInfo, AuthResult, Authenticate, ClientHandle, Codec, Hello, HelloAck, LaneId,
    PROTOCOL_VERSION, decode_unit, encode_unit, message_type,
};
use laneforge_session::{Authenticator, SessionRegistry};
use laneforge_tick::TickPacer;
use laneforge_transport::{
    ConnectionSlot, HandoffQueue, InboundUnit, OutboundQueue, TransportEvent,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{AssignmentTable, LaneforgeError, ServerConfig};

pub struct Coordinator<A, C> {
    auth: A,
    codec: C,
    sessions: SessionRegistry,
    assignments: Arc<AssignmentTable>,
    lanes: Vec<LaneSender>,
    /// Clients assigned per lane, indexed like `lanes`.
    lane_load: Vec<usize>,
    lane_config: LaneConfig,
    handshake_timeout: Duration,
    events: Arc<HandoffQueue<TransportEvent>>,
    outbound: OutboundQueue,
    scratch: Vec<TransportEvent>,
}

impl<A, C> Coordinator<A, C>
where
    A: Authenticator,
    C: Codec,
{
    /// Builds a Coordinator over `lanes`. Lane `i` must have id `i`.
    pub fn new(
        config: &ServerConfig,
        auth: A,
        codec: C,
        lanes: Vec<LaneSender>,
        outbound: OutboundQueue,
    ) -> Self {
        for (index, lane) in lanes.iter().enumerate() {
            assert_eq!(
                usize::from(lane.id().0),
                index,
                "lanes must be ordered by id"
            );
        }
        Self {
            auth,
            codec,
            sessions: SessionRegistry::new(),
            assignments: Arc::new(AssignmentTable::new()),
            lane_load: vec![0; lanes.len()],
            lanes,
            lane_config: config.lane.clone(),
            handshake_timeout: config.handshake_timeout(),
            events: Arc::new(HandoffQueue::new()),
            outbound,
            scratch: Vec::new(),
        }
    }

    /// The queue the transport appends to.
    pub fn events(&self) -> Arc<HandoffQueue<TransportEvent>> {
        Arc::clone(&self.events)
    }

    pub fn assignments(&self) -> Arc<AssignmentTable> {
        Arc::clone(&self.assignments)
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Clients currently assigned to `lane`.
    pub fn lane_load(&self, lane: LaneId) -> usize {
        self.lane_load
            .get(usize::from(lane.0))
            .copied()
            .unwrap_or(0)
    }

    /// Processes everything the transport queued since the last call.
    pub fn tick(&mut self) {
        self.events.swap_out(&mut self.scratch);
        let mut events = mem::take(&mut self.scratch);
        for event in events.drain(..) {
            match event {
                TransportEvent::Connected(client) => self.on_connected(client),
                TransportEvent::Unit(unit) => self.on_unit(unit),
                TransportEvent::Disconnected(slot) => self.on_disconnected(slot),
            }
        }
        self.scratch = events;

        for client in self.sessions.expire_stale(self.handshake_timeout) {
            self.outbound.close(client);
        }
    }

    // -----------------------------------------------------------------------
    // Transport events
    // -----------------------------------------------------------------------

    fn on_connected(&mut self, client: ClientHandle) {
        if self.sessions.get(client.slot).is_some() {
            warn!(%client, "connect on an occupied slot, dropping the old session");
            self.on_disconnected(client.slot);
        }
        match self.sessions.open(client) {
            Ok(client) => debug!(%client, "connection opened"),
            Err(err) => error!(%client, %err, "failed to open session"),
        }
    }

    fn on_unit(&mut self, unit: InboundUnit) {
        let slot = unit.slot;
        let Some(session) = self.sessions.get(slot) else {
            warn!(%slot, message_type = unit.message_type(), "unit for unknown slot dropped");
            return;
        };
        if session.is_closing() {
            debug!(client = %session.handle(), "unit on closing slot dropped");
            return;
        }
        let client = session.handle();

        if let Some(lane) = self.assignments.get(slot) {
            if message_type::is_handshake(unit.message_type()) {
                warn!(%client, message_type = unit.message_type(), "repeated handshake ignored");
                return;
            }
            let Some(sender) = self.lanes.get(usize::from(lane.0)) else {
                error!(%client, %lane, "assigned to a lane that does not exist");
                return;
            };
            if let Err(err) = sender.push_packet(client, unit) {
                warn!(%client, %err, "packet not forwarded");
            }
            return;
        }

        match unit.message_type() {
            message_type::CN_HELLO => self.on_hello(client, &unit),
            message_type::CN_AUTHENTICATE => self.on_authenticate(client, &unit),
            other => warn!(%client, message_type = other, "traffic before authentication dropped"),
        }
    }

    fn on_disconnected(&mut self, slot: ConnectionSlot) {
        let Some(session) = self.sessions.close(slot) else {
            debug!(%slot, "disconnect for unknown slot ignored");
            return;
        };
        let Some(lane) = self.assignments.clear(slot) else {
            return;
        };
        let index = usize::from(lane.0);
        if let Some(sender) = self.lanes.get(index) {
            sender.push_disconnect(session.handle());
        }
        if let Some(load) = self.lane_load.get_mut(index) {
            *load = load.saturating_sub(1);
        }
        info!(client = %session.handle(), %lane, "client left");
    }

    // -----------------------------------------------------------------------
    // Handshake
    // -----------------------------------------------------------------------

    fn on_hello(&mut self, client: ClientHandle, unit: &InboundUnit) {
        let hello: Hello = match decode_unit(&self.codec, unit) {
            Ok(hello) => hello,
            Err(err) => {
                warn!(%client, %err, "malformed hello");
                self.refuse(client);
                return;
            }
        };
        if hello.protocol_version != PROTOCOL_VERSION {
            warn!(
                %client,
                theirs = hello.protocol_version,
                ours = PROTOCOL_VERSION,
                "protocol version mismatch"
            );
            self.reply(client, message_type::SN_HELLO, &hello_ack(false));
            self.refuse(client);
            return;
        }
        match self.sessions.hello(client.slot) {
            Ok(_) => {
                self.reply(client, message_type::SN_HELLO, &hello_ack(true));
                debug!(%client, "hello accepted");
            }
            Err(err) => {
                warn!(%client, %err, "unexpected hello");
                self.refuse(client);
            }
        }
    }

    fn on_authenticate(&mut self, client: ClientHandle, unit: &InboundUnit) {
        let (lane, account) = match self.admit(client.slot, unit) {
            Ok(admitted) => admitted,
            Err(err) => {
                warn!(%client, %err, "authentication refused");
                self.reply(
                    client,
                    message_type::SN_AUTH_RESULT,
                    &AuthResult::rejected(err.to_string()),
                );
                self.refuse(client);
                return;
            }
        };

        // The result goes out before the lane can send anything.
        self.reply(
            client,
            message_type::SN_AUTH_RESULT,
            &AuthResult::accepted(account.clone()),
        );
        let index = usize::from(lane.0);
        if let Err(err) = self.lanes[index].push_joined(client, account) {
            warn!(%client, %err, "lane refused join");
            self.refuse(client);
        }
    }

    /// Authenticates `slot` and binds it to the least-loaded lane.
    fn admit(
        &mut self,
        slot: ConnectionSlot,
        unit: &InboundUnit,
    ) -> Result<(LaneId, AccountInfo), LaneforgeError> {
        self.sessions.expect_auth(slot)?;
        let request: Authenticate = decode_unit(&self.codec, unit)?;
        let account = self.auth.authenticate(&request.token)?;
        let lane = self.pick_lane().ok_or(LaneforgeError::NoLaneAvailable)?;

        self.sessions.assign(slot, account.clone(), lane)?;
        self.assignments.set(slot, lane);
        self.lane_load[usize::from(lane.0)] += 1;
        Ok((lane, account))
    }

    /// Least-loaded running lane with room; ties go to the lowest id.
    fn pick_lane(&self) -> Option<LaneId> {
        self.lanes
            .iter()
            .zip(&self.lane_load)
            .filter(|&(lane, &load)| !lane.is_stopping() && self.lane_config.has_room(load))
            .min_by_key(|&(_, &load)| load)
            .map(|(lane, _)| lane.id())
    }

    fn refuse(&mut self, client: ClientHandle) {
        self.sessions.mark_closing(client.slot);
        self.outbound.close(client);
    }

    fn reply<T: Serialize>(&self, client: ClientHandle, message_type: u16, body: &T) {
        match encode_unit(&self.codec, message_type, body) {
            Ok(bytes) => self.outbound.send(client, bytes),
            Err(err) => warn!(%client, message_type, %err, "failed to encode reply"),
        }
    }
}

fn hello_ack(accepted: bool) -> HelloAck {
    HelloAck {
        protocol_version: PROTOCOL_VERSION,
        accepted,
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Runs `coordinator` on a thread named `coordinator` until `stop` is set.
pub(crate) fn spawn_coordinator<A, C>(
    mut coordinator: Coordinator<A, C>,
    config: &ServerConfig,
    stop: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, LaneforgeError>
where
    A: Authenticator,
    C: Codec,
{
    let tick_config = config.coordinator_tick_config();
    thread::Builder::new()
        .name("coordinator".into())
        .spawn(move || {
            let mut pacer = TickPacer::new(tick_config);
            info!(rate_hz = pacer.rate_hz(), "coordinator started");
            pacer.run_until(&stop, |_| coordinator.tick());
            info!(
                ticks = pacer.ticks(),
                sessions = coordinator.sessions().len(),
                "coordinator stopped"
            );
        })
        .map_err(|source| LaneforgeError::ThreadSpawn {
            name: "coordinator",
            source,
        })
}

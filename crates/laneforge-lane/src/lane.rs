//! The Lane: one independently ticking shard of the simulation.
//!
//! A Lane owns a [`World`] and a [`Replicator`] and nothing it owns is
//! shared. Each tick it:
//!
//! 1. swaps out its inbox (disconnects, then joins and packets),
//! 2. tears down departed clients,
//! 3. applies joins, lifecycle messages and game messages in order,
//! 4. opens a frame and steps the World,
//! 5. runs the replication diff,
//! 6. encodes everything and hands it to the transport in one batch.
//!
//! [`Lane::tick`] is public so a Lane can be driven without a thread;
//! [`spawn_lane`](crate::spawn_lane) is the threaded runner.

use std::collections::HashSet;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use laneforge_protocol::{
    AccountInfo, ClientHandle, Codec, ConnectionState, JsonCodec, LaneId, LoadingComplete,
    encode_unit, message_type,
};
use laneforge_replication::{Outgoing, Replicator, TickSummary};
use laneforge_transport::{InboundUnit, OutboundCommand, OutboundQueue};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{LaneConfig, LaneContext, LaneInbound, LaneInbox, World};

// ---------------------------------------------------------------------------
// LaneStats
// ---------------------------------------------------------------------------

/// Counters a lane publishes for other threads to read.
#[derive(Debug, Default)]
pub struct LaneStats {
    clients: AtomicUsize,
    ticks: AtomicU64,
    events_sent: AtomicU64,
}

impl LaneStats {
    /// Clients known to the lane as of its last tick.
    pub fn clients(&self) -> usize {
        self.clients.load(Ordering::Relaxed)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Replication events sent since the lane started.
    pub fn events_sent(&self) -> u64 {
        self.events_sent.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Lane
// ---------------------------------------------------------------------------

pub struct Lane<W, C = JsonCodec> {
    id: LaneId,
    config: LaneConfig,
    world: W,
    codec: C,
    replicator: Replicator,
    inbox: Arc<LaneInbox>,
    outbound: OutboundQueue,
    stats: Arc<LaneStats>,
    tick: u64,
    // Per-tick scratch, kept to reuse allocations.
    inbound_buf: Vec<LaneInbound>,
    disconnect_buf: Vec<ClientHandle>,
    departed: HashSet<ClientHandle>,
    events: Vec<Outgoing>,
    commands: Vec<OutboundCommand>,
}

impl<W, C> Lane<W, C>
where
    W: World<C>,
    C: Codec,
{
    pub fn new(id: LaneId, config: LaneConfig, world: W, codec: C, outbound: OutboundQueue) -> Self {
        let config = config.validated();
        Self {
            id,
            replicator: Replicator::new(config.replication.clone()),
            config,
            world,
            codec,
            inbox: Arc::new(LaneInbox::new()),
            outbound,
            stats: Arc::new(LaneStats::default()),
            tick: 0,
            inbound_buf: Vec::new(),
            disconnect_buf: Vec::new(),
            departed: HashSet::new(),
            events: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn id(&self) -> LaneId {
        self.id
    }

    pub fn config(&self) -> &LaneConfig {
        &self.config
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn replicator(&self) -> &Replicator {
        &self.replicator
    }

    /// The queues the Coordinator feeds.
    pub fn inbox(&self) -> Arc<LaneInbox> {
        Arc::clone(&self.inbox)
    }

    pub fn stats(&self) -> Arc<LaneStats> {
        Arc::clone(&self.stats)
    }

    /// Runs one full tick.
    pub fn tick(&mut self, tick: u64, dt: Duration) -> TickSummary {
        self.tick = tick;
        self.inbox
            .drain(&mut self.inbound_buf, &mut self.disconnect_buf);

        self.departed.clear();
        let mut disconnects = mem::take(&mut self.disconnect_buf);
        for client in disconnects.drain(..) {
            self.apply_disconnect(client);
            self.departed.insert(client);
        }
        self.disconnect_buf = disconnects;

        let mut inbound = mem::take(&mut self.inbound_buf);
        for record in inbound.drain(..) {
            if self.departed.contains(&record.client()) {
                debug!(lane = %self.id, client = %record.client(), "record for departed client skipped");
                continue;
            }
            match record {
                LaneInbound::Joined { client, account } => self.apply_join(client, &account),
                LaneInbound::Packet { client, unit } => self.apply_packet(client, &unit),
            }
        }
        self.inbound_buf = inbound;

        self.replicator.begin_frame();
        {
            let mut ctx = LaneContext::new(
                self.id,
                tick,
                &mut self.replicator,
                &self.codec,
                &mut self.commands,
            );
            self.world.step(&mut ctx, dt);
        }

        let summary = self.replicator.end_of_tick(&mut self.events);
        for out in self.events.drain(..) {
            match encode_unit(&self.codec, out.event.message_type(), &out.event) {
                Ok(bytes) => self.commands.push(OutboundCommand::Send {
                    client: out.client,
                    bytes,
                }),
                Err(err) => {
                    warn!(lane = %self.id, client = %out.client, %err, "failed to encode replication event")
                }
            }
        }
        if !self.commands.is_empty() {
            self.outbound.send_batch(self.commands.drain(..));
        }

        self.stats
            .clients
            .store(self.replicator.client_count(), Ordering::Relaxed);
        self.stats.ticks.store(tick, Ordering::Relaxed);
        self.stats
            .events_sent
            .fetch_add(summary.total() as u64, Ordering::Relaxed);

        if summary.total() > 0 {
            debug!(
                lane = %self.id,
                tick,
                spawns = summary.spawns,
                updates = summary.updates,
                destroys = summary.destroys,
                tags = summary.tags,
                "replicated"
            );
        }
        summary
    }

    // -----------------------------------------------------------------------
    // Inbound records
    // -----------------------------------------------------------------------

    fn apply_disconnect(&mut self, client: ClientHandle) {
        if self.replicator.client(client).is_none() {
            debug!(lane = %self.id, %client, "disconnect for unknown client ignored");
            return;
        }
        {
            let mut ctx = LaneContext::new(
                self.id,
                self.tick,
                &mut self.replicator,
                &self.codec,
                &mut self.commands,
            );
            self.world.on_client_disconnected(&mut ctx, client);
        }
        self.replicator.disconnect(client);
        info!(lane = %self.id, %client, "client left lane");
    }

    fn apply_join(&mut self, client: ClientHandle, account: &AccountInfo) {
        let evicted = self.replicator.connect(client);
        let mut ctx = LaneContext::new(
            self.id,
            self.tick,
            &mut self.replicator,
            &self.codec,
            &mut self.commands,
        );
        if let Some(previous) = evicted.filter(|&old| old != client) {
            // The previous occupant's disconnect is still in flight; it
            // will be ignored when it arrives, so tear down now.
            self.world.on_client_disconnected(&mut ctx, previous);
        }
        self.world.on_client_joined(&mut ctx, client, account);
        info!(
            lane = %self.id,
            %client,
            account_id = account.account_id,
            "client joined lane"
        );
    }

    fn apply_packet(&mut self, client: ClientHandle, unit: &InboundUnit) {
        if self.replicator.client(client).is_none() {
            warn!(
                lane = %self.id,
                %client,
                message_type = unit.message_type(),
                "packet from stale client dropped"
            );
            return;
        }
        match unit.message_type() {
            message_type::CN_READY_TO_LOAD => {
                self.transition(client, ConnectionState::InGame);
            }
            message_type::CN_MAP_LOADED => {
                if self.transition(client, ConnectionState::Loaded) {
                    let reply = LoadingComplete { tick: self.tick };
                    self.reply(client, message_type::SN_LOADING_COMPLETE, &reply);
                }
            }
            _ => {
                let mut ctx = LaneContext::new(
                    self.id,
                    self.tick,
                    &mut self.replicator,
                    &self.codec,
                    &mut self.commands,
                );
                self.world.handle_message(&mut ctx, client, unit);
            }
        }
    }

    /// Advances `client` to `target` and tells the World. Out-of-order
    /// requests are logged by the replicator and ignored.
    fn transition(&mut self, client: ClientHandle, target: ConnectionState) -> bool {
        let Some(from) = self.replicator.advance(client, target) else {
            return false;
        };
        let mut ctx = LaneContext::new(
            self.id,
            self.tick,
            &mut self.replicator,
            &self.codec,
            &mut self.commands,
        );
        self.world.on_state_changed(&mut ctx, client, from, target);
        true
    }

    fn reply<T: Serialize>(&mut self, client: ClientHandle, message_type: u16, body: &T) {
        match encode_unit(&self.codec, message_type, body) {
            Ok(bytes) => self.commands.push(OutboundCommand::Send { client, bytes }),
            Err(err) => warn!(lane = %self.id, %client, message_type, %err, "failed to encode reply"),
        }
    }
}

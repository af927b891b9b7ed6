//! The Replicator: per-tick visibility sync and diffing.
//!
//! Each tick the World pushes every live actor into the current
//! [`Frame`]. [`Replicator::end_of_tick`] then, for every in-game client:
//!
//! 1. diffs the frame's uid set against the client's visible set,
//! 2. sends Destroy for what disappeared and frees its local id,
//! 3. allocates (or takes the pinned) local id for what appeared and
//!    sends Spawn with full state,
//!
//! after which the visible set equals the frame's uid set. Actors present
//! in both the previous and the current frame are compared field by field
//! and an Update carrying only the changed fields goes to every client
//! that can see them. Finally the two frames swap roles.
//!
//! A client that just entered the game has an empty visible set, so its
//! first tick spawns everything; no separate "initial snapshot" path is
//! needed. Disconnecting drops the client's view in one step and sends
//! nothing, since the connection is already gone.

use std::collections::HashSet;

use laneforge_protocol::{
    ActorDelta, ActorUid, ClientHandle, ConnectionState, LocalId, Motion, PlayerSummary,
    ReplicationEvent, SpawnState,
};
use tracing::{debug, warn};

use crate::client::{ClientTable, ClientView};
use crate::frame::{Actor, Frame, PlayerRecord};
use crate::local_id::LocalIdCategory;
use crate::ReplicationConfig;

/// One event addressed to one client.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub client: ClientHandle,
    pub event: ReplicationEvent,
}

/// Counts of what a call to [`Replicator::end_of_tick`] emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub spawns: usize,
    pub updates: usize,
    pub destroys: usize,
    pub tags: usize,
}

impl TickSummary {
    pub fn total(&self) -> usize {
        self.spawns + self.updates + self.destroys + self.tags
    }
}

/// Replication engine for one Lane.
#[derive(Debug)]
pub struct Replicator {
    config: ReplicationConfig,
    frames: [Frame; 2],
    /// Index of the frame being built this tick.
    current: usize,
    clients: ClientTable,
    /// (client, uid) pairs spawned during the running `end_of_tick`.
    spawned: HashSet<(ClientHandle, ActorUid)>,
    scratch: Vec<ActorUid>,
    ticks: u64,
}

impl Replicator {
    pub fn new(config: ReplicationConfig) -> Self {
        Self {
            config: config.validated(),
            frames: [Frame::new(), Frame::new()],
            current: 0,
            clients: ClientTable::new(),
            spawned: HashSet::new(),
            scratch: Vec::new(),
            ticks: 0,
        }
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Number of completed `end_of_tick` passes.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    // -----------------------------------------------------------------------
    // Frame building
    // -----------------------------------------------------------------------

    /// Marks this tick's frame as built, even if the World pushes nothing.
    ///
    /// Without it an empty world would never destroy what clients still
    /// see; with it, `end_of_tick` on an untouched frame stays a no-op.
    pub fn begin_frame(&mut self) {
        self.frames[self.current].open();
    }

    /// Adds a live actor to this tick's frame.
    ///
    /// # Panics
    /// If the uid was already pushed this tick.
    pub fn push_actor(&mut self, actor: Actor) {
        self.frames[self.current].push_actor(actor);
    }

    /// Adds a player record (satellite data for its characters).
    ///
    /// # Panics
    /// If the player was already pushed this tick.
    pub fn push_player(&mut self, player: PlayerRecord) {
        self.frames[self.current].push_player(player);
    }

    /// The frame being built this tick.
    pub fn current_frame(&self) -> &Frame {
        &self.frames[self.current]
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Starts tracking a connection in the `Connected` state.
    ///
    /// If the slot still holds a previous occupant whose disconnect has
    /// not arrived yet, that view is dropped and its handle returned.
    pub fn connect(&mut self, client: ClientHandle) -> Option<ClientHandle> {
        let evicted = self.clients.insert(client).map(|old| old.handle());
        if let Some(previous) = evicted {
            debug!(%client, %previous, "slot reused, dropping stale view");
        }
        debug!(%client, "client connected");
        evicted
    }

    /// Moves a connection one step along its state machine.
    ///
    /// Returns the previous state, or `None` if the handle is stale or the
    /// transition is out of order.
    pub fn advance(&mut self, client: ClientHandle, target: ConnectionState) -> Option<ConnectionState> {
        let Some(view) = self.clients.get_mut(client) else {
            warn!(%client, %target, "state change for unknown client");
            return None;
        };
        let from = view.state();
        if target == ConnectionState::Disconnected || !from.can_transition_to(target) {
            warn!(%client, %from, %target, "invalid state transition");
            return None;
        }
        view.set_state(target);
        debug!(%client, %from, %target, "client state changed");
        Some(from)
    }

    /// Shorthand for advancing to `InGame`.
    pub fn set_in_game(&mut self, client: ClientHandle) -> bool {
        self.advance(client, ConnectionState::InGame).is_some()
    }

    /// Shorthand for advancing to `Loaded`.
    pub fn set_loaded(&mut self, client: ClientHandle) -> bool {
        self.advance(client, ConnectionState::Loaded).is_some()
    }

    /// Forgets a connection. Emits nothing.
    pub fn disconnect(&mut self, client: ClientHandle) -> bool {
        let removed = self.clients.remove(client).is_some();
        if removed {
            debug!(%client, "client disconnected, view dropped");
        }
        removed
    }

    /// Current state of a connection; `Disconnected` for unknown handles.
    pub fn state(&self, client: ClientHandle) -> ConnectionState {
        self.clients
            .get(client)
            .map_or(ConnectionState::Disconnected, ClientView::state)
    }

    pub fn client(&self, client: ClientHandle) -> Option<&ClientView> {
        self.clients.get(client)
    }

    pub fn clients(&self) -> impl Iterator<Item = &ClientView> {
        self.clients.iter()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    // -----------------------------------------------------------------------
    // Id queries
    // -----------------------------------------------------------------------

    /// The local id `client` uses for `uid`, if it can see it.
    pub fn local_id(&self, client: ClientHandle, uid: ActorUid) -> Option<LocalId> {
        self.clients.get(client)?.local_id(uid)
    }

    /// The actor behind a client-supplied local id.
    ///
    /// Misses are expected: the client may reference an actor destroyed
    /// a moment ago. Never trust the id without this lookup.
    pub fn world_uid(&self, client: ClientHandle, local: LocalId) -> Option<ActorUid> {
        self.clients.get(client)?.world_uid(local)
    }

    /// Pins `uid` to a fixed local id for `client` before it is visible.
    ///
    /// Returns `false` if the client is unknown.
    ///
    /// # Panics
    /// If `uid` is already pinned or visible for that client, or the id
    /// is already in use.
    pub fn force_local_id(&mut self, client: ClientHandle, uid: ActorUid, local: LocalId) -> bool {
        let Some(view) = self.clients.get_mut(client) else {
            warn!(%client, %uid, %local, "pin for unknown client");
            return false;
        };
        view.pin(uid, local);
        true
    }

    // -----------------------------------------------------------------------
    // End of tick
    // -----------------------------------------------------------------------

    /// Syncs every in-game client with this tick's frame and appends the
    /// resulting events to `out`.
    ///
    /// A no-op if nothing opened the frame since the last call.
    pub fn end_of_tick(&mut self, out: &mut Vec<Outgoing>) -> TickSummary {
        let mut summary = TickSummary::default();
        if !self.frames[self.current].is_open() {
            return summary;
        }

        let (cur, prev) = if self.current == 0 {
            (&self.frames[0], &self.frames[1])
        } else {
            (&self.frames[1], &self.frames[0])
        };

        self.spawned.clear();
        for view in self.clients.iter_mut() {
            if !view.state().is_replicating() {
                continue;
            }
            sync_visibility(view, cur, &mut self.scratch, &mut self.spawned, out, &mut summary);
            debug_assert!(view.is_consistent(), "{} view out of sync", view.handle());
        }

        for actor in cur.actors() {
            let Some(before) = prev.get(actor.uid) else {
                continue;
            };
            let delta = diff_actor(&self.config, before, actor);
            if delta.is_empty() {
                continue;
            }
            for view in self.clients.iter() {
                let client = view.handle();
                if !view.state().is_replicating()
                    || (self.config.skip_owner_updates && actor.owner == Some(client))
                    || self.spawned.contains(&(client, actor.uid))
                {
                    continue;
                }
                if let Some(local_id) = view.local_id(actor.uid) {
                    out.push(Outgoing {
                        client,
                        event: ReplicationEvent::Update { local_id, delta },
                    });
                    summary.updates += 1;
                }
            }
        }

        for player in cur.players() {
            let Some(before) = prev.player(player.uid) else {
                continue;
            };
            let Some(main) = player.main_character() else {
                continue;
            };
            if before.main_character() == Some(main) {
                continue;
            }
            let sub = player.sub_character();
            for view in self.clients.iter() {
                if !view.state().is_replicating() {
                    continue;
                }
                let Some(main_local) = view.local_id(main) else {
                    continue;
                };
                out.push(Outgoing {
                    client: view.handle(),
                    event: ReplicationEvent::Tag {
                        main: main_local,
                        sub: sub.and_then(|s| view.local_id(s)),
                    },
                });
                summary.tags += 1;
            }
        }

        self.current ^= 1;
        self.frames[self.current].clear();
        self.ticks += 1;
        summary
    }
}

/// Steps 1–4: make `view`'s visible set equal the frame's uid set.
fn sync_visibility(
    view: &mut ClientView,
    frame: &Frame,
    scratch: &mut Vec<ActorUid>,
    spawned: &mut HashSet<(ClientHandle, ActorUid)>,
    out: &mut Vec<Outgoing>,
    summary: &mut TickSummary,
) {
    let client = view.handle();

    scratch.clear();
    scratch.extend(view.visible().difference(frame.uids()).copied());
    for &uid in scratch.iter() {
        // Destroy goes out before the id is freed.
        let Some(local_id) = view.local_id(uid) else {
            panic!("{uid} is visible to {client} without a local id");
        };
        out.push(Outgoing {
            client,
            event: ReplicationEvent::Destroy { local_id },
        });
        view.conceal(uid);
        summary.destroys += 1;
    }

    scratch.clear();
    scratch.extend(frame.uids().difference(view.visible()).copied());
    for &uid in scratch.iter() {
        let Some(actor) = frame.get(uid) else {
            continue;
        };
        let category = LocalIdCategory::for_actor(actor.state.category);
        let Some(local_id) = view.reveal(uid, category) else {
            warn!(%client, %uid, ?category, "local id range exhausted, actor stays hidden");
            continue;
        };
        out.push(Outgoing {
            client,
            event: ReplicationEvent::Spawn {
                local_id,
                state: spawn_state(actor, frame, client),
            },
        });
        spawned.insert((client, uid));
        summary.spawns += 1;
    }
}

fn spawn_state(actor: &Actor, frame: &Frame, client: ClientHandle) -> SpawnState {
    let player = actor
        .player
        .and_then(|uid| frame.player(uid))
        .map(|p| PlayerSummary {
            name: p.name.clone(),
            team: p.team,
            main: p.main_character() == Some(actor.uid),
        });
    SpawnState {
        controlled: actor.owner == Some(client),
        player,
        state: actor.state.clone(),
    }
}

/// Fields of `cur` that moved past their thresholds since `prev`.
fn diff_actor(config: &ReplicationConfig, prev: &Actor, cur: &Actor) -> ActorDelta {
    let (p, c) = (&prev.state, &cur.state);
    let mut delta = ActorDelta::default();

    if c.transform.position.differs(p.transform.position, config.pos_epsilon)
        || c.move_dir.differs(p.move_dir, config.dir_epsilon)
        || (c.speed - p.speed).abs() > config.speed_epsilon
    {
        delta.motion = Some(Motion {
            position: c.transform.position,
            move_dir: c.move_dir,
            speed: c.speed,
        });
    }
    if c.transform.rotation.differs(p.transform.rotation, config.rot_epsilon) {
        delta.rotation = Some(c.transform.rotation);
    }
    if cur.action_fired || c.action != p.action {
        delta.action = Some(c.action);
    }
    delta
}

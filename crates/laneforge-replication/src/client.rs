//! Per-connection replication state.
//!
//! A [`ClientView`] is everything one connection knows about the world:
//! which actors it can see and which local id it uses for each. Views
//! live in a [`ClientTable`] indexed by connection slot; every entry
//! remembers the generation of the connection occupying it, so a handle
//! to a previous occupant of a recycled slot resolves to nothing.

use std::collections::{BTreeSet, HashMap};

use laneforge_protocol::{ActorUid, ClientHandle, ConnectionState, LocalId};

use crate::local_id::{LocalIdCategory, LocalIdPools, LocalIdTable};

// ---------------------------------------------------------------------------
// ClientView
// ---------------------------------------------------------------------------

/// Replication state of one connection, owned by its Lane.
///
/// Invariant: `visible` and the keys of `table` are the same set.
#[derive(Debug, Clone)]
pub struct ClientView {
    handle: ClientHandle,
    state: ConnectionState,
    visible: BTreeSet<ActorUid>,
    table: LocalIdTable,
    /// Ids forced ahead of visibility, consumed by the first spawn.
    pins: HashMap<ActorUid, LocalId>,
    pools: LocalIdPools,
}

impl ClientView {
    pub(crate) fn new(handle: ClientHandle) -> Self {
        Self {
            handle,
            state: ConnectionState::Connected,
            visible: BTreeSet::new(),
            table: LocalIdTable::new(),
            pins: HashMap::new(),
            pools: LocalIdPools::new(),
        }
    }

    pub fn handle(&self) -> ClientHandle {
        self.handle
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    /// Uids this client has received a Spawn for and no Destroy since.
    pub fn visible(&self) -> &BTreeSet<ActorUid> {
        &self.visible
    }

    pub fn is_visible(&self, uid: ActorUid) -> bool {
        self.visible.contains(&uid)
    }

    pub fn local_id(&self, uid: ActorUid) -> Option<LocalId> {
        self.table.local_id(uid)
    }

    pub fn world_uid(&self, local: LocalId) -> Option<ActorUid> {
        self.table.world_uid(local)
    }

    pub fn pinned(&self, uid: ActorUid) -> Option<LocalId> {
        self.pins.get(&uid).copied()
    }

    /// Pins `uid` to `local` until it first becomes visible.
    ///
    /// # Panics
    /// If `uid` is already pinned or visible, or `local` is already taken
    /// by another uid (visible or pinned).
    pub(crate) fn pin(&mut self, uid: ActorUid, local: LocalId) {
        if let Some(existing) = self.pins.get(&uid) {
            panic!("{uid} is already pinned to {existing} for {}", self.handle);
        }
        if let Some(existing) = self.table.local_id(uid) {
            panic!("{uid} is already visible as {existing} for {}", self.handle);
        }
        assert!(
            !self.table.contains_local(local) && !self.pins.values().any(|l| *l == local),
            "local id {local} is already taken for {}",
            self.handle
        );
        if let Some(pool) = self.pools.owner_mut(local) {
            pool.reserve(local);
        }
        self.pins.insert(uid, local);
    }

    /// Makes `uid` visible, using its pin or a fresh id from `category`.
    ///
    /// Returns `None` (and changes nothing) if the range is exhausted.
    pub(crate) fn reveal(&mut self, uid: ActorUid, category: LocalIdCategory) -> Option<LocalId> {
        let local = match self.pins.remove(&uid) {
            Some(pinned) => pinned,
            None => self.pools.pool_mut(category).allocate()?,
        };
        self.table.insert(uid, local);
        self.visible.insert(uid);
        Some(local)
    }

    /// Makes `uid` invisible and frees its id.
    ///
    /// # Panics
    /// If `uid` has no local id; a visible uid always has one.
    pub(crate) fn conceal(&mut self, uid: ActorUid) -> LocalId {
        let Some(local) = self.table.remove(uid) else {
            panic!("{uid} is visible to {} without a local id", self.handle);
        };
        if let Some(pool) = self.pools.owner_mut(local) {
            pool.release(local);
        }
        self.visible.remove(&uid);
        local
    }

    /// Checks that the visible set and the id table agree.
    pub fn is_consistent(&self) -> bool {
        self.table.is_bijective()
            && self.table.len() == self.visible.len()
            && self.table.uids().all(|uid| self.visible.contains(&uid))
    }
}

// ---------------------------------------------------------------------------
// ClientTable
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SlotEntry {
    /// Generation of the latest occupant, kept after it leaves.
    generation: u32,
    view: Option<ClientView>,
}

/// Views indexed by connection slot.
#[derive(Debug, Default)]
pub struct ClientTable {
    slots: Vec<SlotEntry>,
    len: usize,
}

impl ClientTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a fresh view for `handle`.
    ///
    /// Returns the view it displaced, if the slot was still occupied by
    /// another generation.
    pub fn insert(&mut self, handle: ClientHandle) -> Option<ClientView> {
        let index = handle.slot.index() as usize;
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, SlotEntry::default);
        }
        let entry = &mut self.slots[index];
        let evicted = entry.view.replace(ClientView::new(handle));
        entry.generation = handle.generation;
        if evicted.is_none() {
            self.len += 1;
        }
        evicted
    }

    /// Drops the view for `handle`. Stale handles are ignored.
    pub fn remove(&mut self, handle: ClientHandle) -> Option<ClientView> {
        let entry = self.entry_mut(handle)?;
        let view = entry.view.take();
        if view.is_some() {
            self.len -= 1;
        }
        view
    }

    pub fn get(&self, handle: ClientHandle) -> Option<&ClientView> {
        let entry = self.slots.get(handle.slot.index() as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        entry.view.as_ref()
    }

    pub fn get_mut(&mut self, handle: ClientHandle) -> Option<&mut ClientView> {
        self.entry_mut(handle)?.view.as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientView> {
        self.slots.iter().filter_map(|e| e.view.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClientView> {
        self.slots.iter_mut().filter_map(|e| e.view.as_mut())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn entry_mut(&mut self, handle: ClientHandle) -> Option<&mut SlotEntry> {
        let entry = self.slots.get_mut(handle.slot.index() as usize)?;
        (entry.generation == handle.generation).then_some(entry)
    }
}

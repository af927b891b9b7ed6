//! Local id ranges, allocation, and the uid ↔ local id table.
//!
//! Each client addresses actors with small integers drawn from fixed
//! ranges, one per category. Ids are allocated lazily when an actor first
//! becomes visible and released when it stops being visible. Released ids
//! go onto a free set and are handed out again (lowest first) before the
//! range cursor advances, so a long-lived connection never exhausts a
//! range as long as the number of simultaneously visible actors fits.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Range;

use laneforge_protocol::{ActorCategory, ActorUid, LocalId};

/// Pinned ids for self-controlled characters: `21000 + class`.
pub const SELF_MASTER_RANGE: Range<u32> = 21000..21100;
/// Auto-allocated ids for other players' characters.
pub const OTHER_PLAYER_RANGE: Range<u32> = 21100..30000;
/// Auto-allocated ids for NPCs.
pub const NPC_RANGE: Range<u32> = 5000..21000;

// ---------------------------------------------------------------------------
// LocalIdCategory
// ---------------------------------------------------------------------------

/// The sub-range a local id is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalIdCategory {
    /// The client's own character(s). Only ever assigned by pinning.
    SelfMaster,
    OtherPlayer,
    Npc,
}

impl LocalIdCategory {
    pub fn range(self) -> Range<u32> {
        match self {
            Self::SelfMaster => SELF_MASTER_RANGE,
            Self::OtherPlayer => OTHER_PLAYER_RANGE,
            Self::Npc => NPC_RANGE,
        }
    }

    /// The range an actor is auto-allocated from when nothing is pinned.
    pub fn for_actor(category: ActorCategory) -> Self {
        match category {
            ActorCategory::Character => Self::OtherPlayer,
            ActorCategory::Npc => Self::Npc,
        }
    }

    /// The category whose range contains `local`, if any.
    pub fn of(local: LocalId) -> Option<Self> {
        [Self::SelfMaster, Self::OtherPlayer, Self::Npc]
            .into_iter()
            .find(|c| c.range().contains(&local.0))
    }

    /// The fixed id the wire format mandates for a client's own
    /// character of the given class.
    pub fn self_master(class: u32) -> Option<LocalId> {
        let id = SELF_MASTER_RANGE.start.checked_add(class)?;
        SELF_MASTER_RANGE.contains(&id).then_some(LocalId(id))
    }
}

// ---------------------------------------------------------------------------
// LocalIdPool
// ---------------------------------------------------------------------------

/// Allocator for one category range.
#[derive(Debug, Clone)]
pub struct LocalIdPool {
    range: Range<u32>,
    /// Next never-used id.
    cursor: u32,
    /// Released ids, reused lowest first.
    free: BTreeSet<u32>,
    in_use: HashSet<u32>,
}

impl LocalIdPool {
    pub fn new(range: Range<u32>) -> Self {
        Self {
            cursor: range.start,
            range,
            free: BTreeSet::new(),
            in_use: HashSet::new(),
        }
    }

    /// Hands out a free id, or `None` if the range is exhausted.
    pub fn allocate(&mut self) -> Option<LocalId> {
        if let Some(id) = self.free.pop_first() {
            self.in_use.insert(id);
            return Some(LocalId(id));
        }
        // Pinned ids may sit ahead of the cursor.
        while self.cursor < self.range.end {
            let id = self.cursor;
            self.cursor += 1;
            if self.in_use.insert(id) {
                return Some(LocalId(id));
            }
        }
        None
    }

    /// Marks a specific id as taken (used for pinned ids).
    ///
    /// # Panics
    /// If the id is already in use.
    pub fn reserve(&mut self, id: LocalId) {
        assert!(
            self.range.contains(&id.0),
            "local id {id} is outside pool range {:?}",
            self.range
        );
        assert!(self.in_use.insert(id.0), "local id {id} is already in use");
        self.free.remove(&id.0);
    }

    /// Returns an id to the pool.
    ///
    /// # Panics
    /// On a double free.
    pub fn release(&mut self, id: LocalId) {
        assert!(self.in_use.remove(&id.0), "double free of local id {id}");
        self.free.insert(id.0);
    }

    pub fn is_in_use(&self, id: LocalId) -> bool {
        self.in_use.contains(&id.0)
    }

    pub fn in_use(&self) -> usize {
        self.in_use.len()
    }
}

/// One pool per category.
#[derive(Debug, Clone)]
pub(crate) struct LocalIdPools {
    self_master: LocalIdPool,
    other_player: LocalIdPool,
    npc: LocalIdPool,
}

impl LocalIdPools {
    pub(crate) fn new() -> Self {
        Self {
            self_master: LocalIdPool::new(SELF_MASTER_RANGE),
            other_player: LocalIdPool::new(OTHER_PLAYER_RANGE),
            npc: LocalIdPool::new(NPC_RANGE),
        }
    }

    pub(crate) fn pool_mut(&mut self, category: LocalIdCategory) -> &mut LocalIdPool {
        match category {
            LocalIdCategory::SelfMaster => &mut self.self_master,
            LocalIdCategory::OtherPlayer => &mut self.other_player,
            LocalIdCategory::Npc => &mut self.npc,
        }
    }

    /// Pool owning `local`. Ids outside every range are not tracked.
    pub(crate) fn owner_mut(&mut self, local: LocalId) -> Option<&mut LocalIdPool> {
        LocalIdCategory::of(local).map(|c| self.pool_mut(c))
    }
}

// ---------------------------------------------------------------------------
// LocalIdTable
// ---------------------------------------------------------------------------

/// Bidirectional uid ↔ local id map for one client.
///
/// Both directions are kept in lockstep; inserting a pair that collides
/// on either side is a programming error.
#[derive(Debug, Clone, Default)]
pub struct LocalIdTable {
    by_uid: HashMap<ActorUid, LocalId>,
    by_local: HashMap<LocalId, ActorUid>,
}

impl LocalIdTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    /// If `uid` already has an id or `local` already names another uid.
    pub fn insert(&mut self, uid: ActorUid, local: LocalId) {
        match self.by_local.entry(local) {
            Entry::Occupied(e) => {
                panic!("local id {local} already maps to {}, cannot map {uid}", e.get())
            }
            Entry::Vacant(e) => {
                e.insert(uid);
            }
        }
        if let Some(prev) = self.by_uid.insert(uid, local) {
            panic!("{uid} already has local id {prev}");
        }
    }

    /// Removes a uid and returns the id it had.
    pub fn remove(&mut self, uid: ActorUid) -> Option<LocalId> {
        let local = self.by_uid.remove(&uid)?;
        self.by_local.remove(&local);
        Some(local)
    }

    pub fn local_id(&self, uid: ActorUid) -> Option<LocalId> {
        self.by_uid.get(&uid).copied()
    }

    pub fn world_uid(&self, local: LocalId) -> Option<ActorUid> {
        self.by_local.get(&local).copied()
    }

    pub fn contains_local(&self, local: LocalId) -> bool {
        self.by_local.contains_key(&local)
    }

    pub fn len(&self) -> usize {
        self.by_uid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uid.is_empty()
    }

    pub fn uids(&self) -> impl Iterator<Item = ActorUid> + '_ {
        self.by_uid.keys().copied()
    }

    /// `true` if both directions hold the same pairs.
    pub fn is_bijective(&self) -> bool {
        self.by_uid.len() == self.by_local.len()
            && self
                .by_uid
                .iter()
                .all(|(uid, local)| self.by_local.get(local) == Some(uid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_ranges_do_not_overlap() {
        let all = [
            LocalIdCategory::SelfMaster,
            LocalIdCategory::OtherPlayer,
            LocalIdCategory::Npc,
        ];
        for a in all {
            for b in all {
                if a != b {
                    let (ra, rb) = (a.range(), b.range());
                    assert!(ra.end <= rb.start || rb.end <= ra.start, "{a:?} overlaps {b:?}");
                }
            }
        }
    }

    #[test]
    fn test_category_of_local_id() {
        assert_eq!(LocalIdCategory::of(LocalId(5000)), Some(LocalIdCategory::Npc));
        assert_eq!(
            LocalIdCategory::of(LocalId(21005)),
            Some(LocalIdCategory::SelfMaster)
        );
        assert_eq!(
            LocalIdCategory::of(LocalId(21100)),
            Some(LocalIdCategory::OtherPlayer)
        );
        assert_eq!(LocalIdCategory::of(LocalId(12)), None);
    }

    #[test]
    fn test_self_master_offsets_by_class() {
        assert_eq!(LocalIdCategory::self_master(5), Some(LocalId(21005)));
        assert_eq!(LocalIdCategory::self_master(100), None);
    }

    #[test]
    fn test_pool_allocates_sequentially_from_range_start() {
        let mut pool = LocalIdPool::new(10..20);
        assert_eq!(pool.allocate(), Some(LocalId(10)));
        assert_eq!(pool.allocate(), Some(LocalId(11)));
        assert_eq!(pool.in_use(), 2);
    }

    #[test]
    fn test_pool_reuses_released_ids_lowest_first() {
        let mut pool = LocalIdPool::new(10..20);
        for _ in 0..4 {
            pool.allocate();
        }
        pool.release(LocalId(12));
        pool.release(LocalId(11));
        assert_eq!(pool.allocate(), Some(LocalId(11)));
        assert_eq!(pool.allocate(), Some(LocalId(12)));
        assert_eq!(pool.allocate(), Some(LocalId(14)));
    }

    #[test]
    fn test_pool_exhaustion_returns_none() {
        let mut pool = LocalIdPool::new(0..2);
        assert!(pool.allocate().is_some());
        assert!(pool.allocate().is_some());
        assert_eq!(pool.allocate(), None);
        pool.release(LocalId(0));
        assert_eq!(pool.allocate(), Some(LocalId(0)));
    }

    #[test]
    fn test_pool_never_exhausts_with_churn() {
        let mut pool = LocalIdPool::new(0..3);
        for _ in 0..10_000 {
            let id = pool.allocate().expect("churn must not exhaust the range");
            pool.release(id);
        }
    }

    #[test]
    fn test_pool_skips_reserved_ids_ahead_of_cursor() {
        let mut pool = LocalIdPool::new(0..4);
        pool.reserve(LocalId(1));
        assert_eq!(pool.allocate(), Some(LocalId(0)));
        assert_eq!(pool.allocate(), Some(LocalId(2)));
        pool.release(LocalId(1));
        assert_eq!(pool.allocate(), Some(LocalId(1)));
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn test_pool_double_free_panics() {
        let mut pool = LocalIdPool::new(0..4);
        let id = pool.allocate().unwrap();
        pool.release(id);
        pool.release(id);
    }

    #[test]
    #[should_panic(expected = "already in use")]
    fn test_pool_reserving_allocated_id_panics() {
        let mut pool = LocalIdPool::new(0..4);
        let id = pool.allocate().unwrap();
        pool.reserve(id);
    }

    #[test]
    fn test_table_lookups_are_symmetric() {
        let mut table = LocalIdTable::new();
        table.insert(ActorUid(7), LocalId(5000));
        assert_eq!(table.local_id(ActorUid(7)), Some(LocalId(5000)));
        assert_eq!(table.world_uid(LocalId(5000)), Some(ActorUid(7)));
        assert!(table.is_bijective());

        assert_eq!(table.remove(ActorUid(7)), Some(LocalId(5000)));
        assert_eq!(table.world_uid(LocalId(5000)), None);
        assert!(table.is_empty());
    }

    #[test]
    #[should_panic(expected = "already maps to")]
    fn test_table_local_id_collision_panics() {
        let mut table = LocalIdTable::new();
        table.insert(ActorUid(1), LocalId(5000));
        table.insert(ActorUid(2), LocalId(5000));
    }

    #[test]
    #[should_panic(expected = "already has local id")]
    fn test_table_uid_collision_panics() {
        let mut table = LocalIdTable::new();
        table.insert(ActorUid(1), LocalId(5000));
        table.insert(ActorUid(1), LocalId(5001));
    }
}

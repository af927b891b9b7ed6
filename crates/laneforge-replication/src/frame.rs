//! Per-tick snapshots of every replicable actor.

use std::collections::{BTreeSet, HashMap};

use laneforge_protocol::{ActionState, ActorState, ActorUid, ClientHandle};

/// Characters a single player can control at once.
pub const MAX_CHARACTERS_PER_PLAYER: usize = 2;

// ---------------------------------------------------------------------------
// Actor / PlayerRecord
// ---------------------------------------------------------------------------

/// An actor as the World pushes it each tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub uid: ActorUid,
    /// Connection controlling this actor, if any.
    pub owner: Option<ClientHandle>,
    /// The [`PlayerRecord`] this character belongs to.
    pub player: Option<ActorUid>,
    pub state: ActorState,
    /// Set on the tick an action triggers, so it is sent even when the
    /// action id equals last tick's.
    pub action_fired: bool,
}

impl Actor {
    pub fn new(uid: ActorUid, state: ActorState) -> Self {
        Self {
            uid,
            owner: None,
            player: None,
            state,
            action_fired: false,
        }
    }

    pub fn owned_by(mut self, owner: ClientHandle) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn of_player(mut self, player: ActorUid) -> Self {
        self.player = Some(player);
        self
    }

    /// Triggers `action` this tick.
    pub fn fire(mut self, action: ActionState) -> Self {
        self.state.action = action;
        self.action_fired = true;
        self
    }
}

/// A player grouping up to [`MAX_CHARACTERS_PER_PLAYER`] characters.
///
/// Players are not spawned themselves; they are satellite data for the
/// characters that reference them.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub uid: ActorUid,
    pub owner: Option<ClientHandle>,
    pub name: String,
    pub team: u8,
    pub characters: [Option<ActorUid>; MAX_CHARACTERS_PER_PLAYER],
    /// Index into `characters` of the one currently in play.
    pub main: usize,
}

impl PlayerRecord {
    pub fn main_character(&self) -> Option<ActorUid> {
        self.characters.get(self.main).copied().flatten()
    }

    /// The first character that is not the main one.
    pub fn sub_character(&self) -> Option<ActorUid> {
        self.characters
            .iter()
            .enumerate()
            .find(|(i, c)| *i != self.main && c.is_some())
            .and_then(|(_, c)| *c)
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Everything eligible for replication on one tick.
///
/// Built by the World's push calls, read-only while the tick is diffed,
/// then cleared for reuse. Clearing keeps the allocations.
#[derive(Debug, Default)]
pub struct Frame {
    actors: HashMap<ActorUid, Actor>,
    uids: BTreeSet<ActorUid>,
    players: HashMap<ActorUid, PlayerRecord>,
    open: bool,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the frame as built for this tick, even if nothing is pushed.
    pub fn open(&mut self) {
        self.open = true;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// # Panics
    /// If the uid was already pushed this tick.
    pub fn push_actor(&mut self, actor: Actor) {
        self.open = true;
        let uid = actor.uid;
        assert!(self.uids.insert(uid), "{uid} pushed twice in one tick");
        self.actors.insert(uid, actor);
    }

    /// # Panics
    /// If the player was already pushed this tick.
    pub fn push_player(&mut self, player: PlayerRecord) {
        self.open = true;
        let uid = player.uid;
        assert!(
            self.players.insert(uid, player).is_none(),
            "player {uid} pushed twice in one tick"
        );
    }

    pub fn get(&self, uid: ActorUid) -> Option<&Actor> {
        self.actors.get(&uid)
    }

    pub fn player(&self, uid: ActorUid) -> Option<&PlayerRecord> {
        self.players.get(&uid)
    }

    /// Sorted uids, for set differences against a client's visible set.
    pub fn uids(&self) -> &BTreeSet<ActorUid> {
        &self.uids
    }

    /// Actors in uid order.
    pub fn actors(&self) -> impl Iterator<Item = &Actor> {
        self.uids.iter().filter_map(|uid| self.actors.get(uid))
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.uids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }

    pub fn clear(&mut self) {
        self.actors.clear();
        self.uids.clear();
        self.players.clear();
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use laneforge_protocol::{ActorCategory, Vec3};

    use super::*;

    fn npc(uid: u64) -> Actor {
        Actor::new(
            ActorUid(uid),
            ActorState::at(ActorCategory::Npc, 1, Vec3::ZERO),
        )
    }

    #[test]
    fn test_frame_push_indexes_by_uid() {
        let mut frame = Frame::new();
        assert!(!frame.is_open());
        frame.push_actor(npc(3));
        frame.push_actor(npc(1));

        assert!(frame.is_open());
        assert_eq!(frame.len(), 2);
        assert!(frame.get(ActorUid(3)).is_some());
        let order: Vec<_> = frame.actors().map(|a| a.uid).collect();
        assert_eq!(order, vec![ActorUid(1), ActorUid(3)]);
    }

    #[test]
    #[should_panic(expected = "pushed twice")]
    fn test_frame_duplicate_push_panics() {
        let mut frame = Frame::new();
        frame.push_actor(npc(1));
        frame.push_actor(npc(1));
    }

    #[test]
    fn test_frame_clear_resets_contents_and_open_flag() {
        let mut frame = Frame::new();
        frame.push_actor(npc(1));
        frame.clear();
        assert!(frame.is_empty());
        assert!(!frame.is_open());
        // The same uid can be pushed again next tick.
        frame.push_actor(npc(1));
    }

    #[test]
    fn test_player_record_main_and_sub() {
        let player = PlayerRecord {
            uid: ActorUid(100),
            owner: None,
            name: "rook".into(),
            team: 1,
            characters: [Some(ActorUid(1)), Some(ActorUid(2))],
            main: 1,
        };
        assert_eq!(player.main_character(), Some(ActorUid(2)));
        assert_eq!(player.sub_character(), Some(ActorUid(1)));
    }
}

//! Identity types and the per-connection state machine.

use std::fmt;

pub use laneforge_transport::ClientHandle;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ActorUid / LocalId
// ---------------------------------------------------------------------------

/// Process-wide identifier of a simulated entity.
///
/// Issued by the World, monotonic, and never reused while any client
/// could still refer to it. It is never sent to clients; they only see
/// [`LocalId`]s.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ActorUid(pub u64);

impl fmt::Display for ActorUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// Identifier of an actor inside one connection's addressing namespace.
///
/// The same actor usually has a different `LocalId` for every client.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LocalId(pub u32);

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// LaneId
// ---------------------------------------------------------------------------

/// Index of a Lane (an independently ticking simulation shard).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LaneId(pub u16);

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lane-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Lifecycle of one connection inside its Lane.
///
/// Transitions are strictly ordered, and a disconnect can happen from
/// any state:
///
/// ```text
/// Disconnected → Connected → InGame → Loaded
/// ```
///
/// - **Connected**: assigned to a Lane, no replication yet.
/// - **InGame**: the client asked for the world; replication runs. The
///   first tick in this state sends a Spawn for everything, because the
///   client's visible set starts empty.
/// - **Loaded**: the client finished loading its map.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    InGame,
    Loaded,
}

impl ConnectionState {
    /// Returns `true` if replication traffic flows in this state.
    pub fn is_replicating(self) -> bool {
        self >= Self::InGame
    }

    /// The state that follows this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Disconnected => Some(Self::Connected),
            Self::Connected => Some(Self::InGame),
            Self::InGame => Some(Self::Loaded),
            Self::Loaded => None,
        }
    }

    /// Returns `true` if moving to `target` is a valid transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        target == Self::Disconnected || self.next() == Some(target)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connected => write!(f, "Connected"),
            Self::InGame => write!(f, "InGame"),
            Self::Loaded => write!(f, "Loaded"),
        }
    }
}

//! Replication engine for Laneforge.
//!
//! Keeps many connections, each holding a partial and id-virtualized view
//! of one Lane's world, in sync as actors appear, move and disappear.
//!
//! # Key types
//!
//! - [`Replicator`]: frame double buffer plus the end-of-tick diff
//! - [`Frame`]: one tick's snapshot of every replicable actor
//! - [`ClientView`]: a connection's visible set and local id table
//! - [`LocalIdPool`] / [`LocalIdTable`]: id allocation and lookup
//! - [`Arena`]: generational storage for World-side actors
//!
//! # Threading
//!
//! Nothing here is shared. A Replicator and everything it owns belong to
//! exactly one Lane thread, so the diff runs without any locking.

mod arena;
mod client;
mod config;
mod frame;
mod local_id;
mod replicator;

pub use arena::{Arena, Handle};
pub use client::{ClientTable, ClientView};
pub use config::ReplicationConfig;
pub use frame::{Actor, Frame, MAX_CHARACTERS_PER_PLAYER, PlayerRecord};
pub use local_id::{
    LocalIdCategory, LocalIdPool, LocalIdTable, NPC_RANGE, OTHER_PLAYER_RANGE, SELF_MASTER_RANGE,
};
pub use replicator::{Outgoing, Replicator, TickSummary};

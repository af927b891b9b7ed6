//! Lanes for Laneforge.
//!
//! A Lane is an independently ticking shard of the authoritative
//! simulation. It owns a [`World`] (the game) and a
//! [`Replicator`](laneforge_replication::Replicator) (the per-client
//! views), runs on its own thread, and talks to the rest of the server
//! only through hand-off queues:
//!
//! ```text
//! Coordinator ──LaneInbox──→ Lane thread ──OutboundQueue──→ transport
//! ```
//!
//! Nothing a Lane owns is touched by any other thread, so the diff and
//! the World step run without locks.

mod config;
mod context;
mod error;
mod inbox;
mod lane;
mod runner;
mod world;

pub use config::LaneConfig;
pub use context::LaneContext;
pub use error::LaneError;
pub use inbox::{LaneInbound, LaneInbox};
pub use lane::{Lane, LaneStats};
pub use runner::{LaneHandle, LaneSender, spawn_lane};
pub use world::World;

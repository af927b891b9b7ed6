//! # Laneforge
//!
//! Authoritative game server core: connections are handshaken by one
//! Coordinator thread, dispatched to one of several independently
//! ticking Lanes, and every Lane replicates its World to each of its
//! clients in that client's own small-integer id space.
//!
//! ```text
//!            ┌──────────────┐  events   ┌─────────────┐  LaneInbox  ┌────────┐
//! sockets ──→│ transport-io │──────────→│ coordinator │────────────→│ lane-N │
//!            └──────────────┘           └─────────────┘             └────────┘
//!                   ↑                        │  replies                 │
//!                   └──── OutboundQueue ─────┴──────────────────────────┘
//! ```
//!
//! Game code implements [`World`] and is handed to
//! [`LaneforgeServer::builder`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use laneforge::prelude::*;
//!
//! struct Empty;
//!
//! impl World for Empty {
//!     fn step(&mut self, _ctx: &mut LaneContext<'_, JsonCodec>, _dt: Duration) {}
//! }
//!
//! fn main() -> Result<(), LaneforgeError> {
//!     laneforge::init_tracing("info");
//!     let server = LaneforgeServer::builder(ServerConfig::default()).start(|_| Empty)?;
//!     server.wait()
//! }
//! ```

mod assignment;
mod config;
mod coordinator;
mod error;
mod io;
mod server;

pub use assignment::AssignmentTable;
pub use config::ServerConfig;
pub use coordinator::Coordinator;
pub use error::LaneforgeError;
pub use server::{LaneforgeServer, ServerBuilder, ServerHandle};

pub use laneforge_lane as lane;
pub use laneforge_protocol as protocol;
pub use laneforge_replication as replication;
pub use laneforge_session as session;
pub use laneforge_tick as tick;
pub use laneforge_transport as transport;

/// Installs a `tracing` fmt subscriber filtered by `RUST_LOG`, falling
/// back to `default_filter`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}

/// Everything a game needs in one import.
pub mod prelude {
    pub use crate::{LaneforgeError, LaneforgeServer, ServerConfig, ServerHandle};
    pub use laneforge_lane::{LaneConfig, LaneContext, World};
    pub use laneforge_protocol::{
        AccountInfo, ActionState, ActorCategory, ActorState, ActorUid, ClientHandle, Codec,
        ConnectionState, JsonCodec, LaneId, LocalId, Rotation, Transform, Vec2, Vec3,
        decode_unit, message_type,
    };
    pub use laneforge_replication::{Actor, Arena, Handle, PlayerRecord, ReplicationConfig};
    pub use laneforge_session::{AllowAll, Authenticator, SessionError, TokenTable};
    pub use laneforge_transport::InboundUnit;
}

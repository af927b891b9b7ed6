//! Wire protocol for Laneforge.
//!
//! This crate defines the "language" the server speaks with clients:
//!
//! - **Identifiers** ([`ActorUid`], [`LocalId`], [`LaneId`],
//!   [`ClientHandle`]) and the per-connection [`ConnectionState`].
//! - **Replication events** ([`ReplicationEvent`]): spawn, update,
//!   destroy and tag, addressed by local id.
//! - **Handshake bodies** ([`Hello`], [`Authenticate`], [`AuthResult`]).
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) plus the helpers that
//!   wrap an encoded body in a unit header.
//!
//! # Architecture
//!
//! ```text
//! Transport (units) → Protocol (typed bodies) → Coordinator / Lane
//! ```

mod actor;
mod codec;
mod error;
mod event;
mod ids;
mod messages;

pub use actor::{
    ActionState, ActorCategory, ActorDelta, ActorState, Motion, PlayerSummary, Rotation,
    SpawnState, Transform, Vec2, Vec3,
};
pub use codec::{Codec, decode_unit, encode_unit};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use event::{ReplicationEvent, message_type};
pub use ids::{ActorUid, ClientHandle, ConnectionState, LaneId, LocalId};
pub use messages::{
    AccountInfo, AuthResult, Authenticate, Hello, HelloAck, LoadingComplete, PROTOCOL_VERSION,
};

//! Session tracking for the Laneforge coordinator.
//!
//! Before a connection is bound to a Lane, the Coordinator walks it
//! through a short handshake:
//!
//! ```text
//! AwaitingHello ──HELLO──→ AwaitingAuth ──AUTHENTICATE ok──→ Assigned(lane)
//! ```
//!
//! [`SessionRegistry`] holds one record per live connection slot, keyed
//! by the [`ClientHandle`](laneforge_protocol::ClientHandle) the
//! transport assigned on connect. The [`Authenticator`] trait is the hook
//! a game plugs its credential check into.

mod auth;
mod error;
mod registry;

pub use auth::{AllowAll, Authenticator, TokenTable};
pub use error::SessionError;
pub use registry::{Session, SessionPhase, SessionRegistry};

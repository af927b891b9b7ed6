//! The `World` trait: the simulation a Lane drives.

use std::time::Duration;

use laneforge_protocol::{AccountInfo, ClientHandle, Codec, ConnectionState, JsonCodec};
use laneforge_transport::InboundUnit;

use crate::LaneContext;

/// Game simulation owned by one Lane.
///
/// Every method runs on the lane thread, inside a tick, in this order:
///
/// 1. `on_client_disconnected` for connections that went away,
/// 2. `on_client_joined`, `on_state_changed` and `handle_message` for
///    inbound records, in the order the clients sent them,
/// 3. `step`, which must push every live actor into the frame via
///    [`LaneContext::push_actor`].
///
/// After `step` the lane diffs the frame and sends replication traffic.
/// An actor not pushed during a tick is gone from every client's view.
pub trait World<C: Codec = JsonCodec>: Send + 'static {
    /// A client was assigned to this lane. It is `Connected` and sees
    /// nothing yet.
    fn on_client_joined(
        &mut self,
        _ctx: &mut LaneContext<'_, C>,
        _client: ClientHandle,
        _account: &AccountInfo,
    ) {
    }

    /// A client left. Its view is dropped right after this returns; stop
    /// pushing the actors it controlled.
    fn on_client_disconnected(&mut self, _ctx: &mut LaneContext<'_, C>, _client: ClientHandle) {}

    /// A client moved along `Connected → InGame → Loaded`.
    fn on_state_changed(
        &mut self,
        _ctx: &mut LaneContext<'_, C>,
        _client: ClientHandle,
        _from: ConnectionState,
        _to: ConnectionState,
    ) {
    }

    /// A game message from a client. Any local id inside it must go
    /// through [`LaneContext::resolve_local`].
    fn handle_message(
        &mut self,
        _ctx: &mut LaneContext<'_, C>,
        _client: ClientHandle,
        _unit: &InboundUnit,
    ) {
    }

    /// Advances the simulation by `dt` and pushes every live actor.
    fn step(&mut self, ctx: &mut LaneContext<'_, C>, dt: Duration);
}

//! Codec trait and implementations for message bodies.
//!
//! A codec turns message bodies into bytes and back. The framing around
//! a body (the 4-byte header) is the same for every codec; see
//! [`encode_unit`] and [`decode_unit`].

use laneforge_transport::{InboundUnit, NetHeader};
use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Body format shared by the Coordinator and every Lane.
///
/// Each ticking thread holds its own clone.
pub trait Codec: Clone + Send + Sync + 'static {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Fails with [`ProtocolError::Decode`] when `data` is not a `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// Encodes `value` and frames it as a complete unit of `message_type`.
pub fn encode_unit<C: Codec, T: Serialize>(
    codec: &C,
    message_type: u16,
    value: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let body = codec.encode(value)?;
    Ok(NetHeader::frame(message_type, &body)?)
}

/// Decodes the body of a received unit.
pub fn decode_unit<C: Codec, T: DeserializeOwned>(
    codec: &C,
    unit: &InboundUnit,
) -> Result<T, ProtocolError> {
    codec.decode(&unit.payload)
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// JSON bodies through `serde_json`. Units stay readable in logs and
/// packet captures.
///
/// ## Example
///
/// ```rust
/// use laneforge_protocol::{Codec, JsonCodec, LocalId, ReplicationEvent};
///
/// let codec = JsonCodec;
/// let event = ReplicationEvent::Destroy { local_id: LocalId(5000) };
///
/// let bytes = codec.encode(&event).unwrap();
/// let decoded: ReplicationEvent = codec.decode(&bytes).unwrap();
/// assert_eq!(event, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

//! The framed unit transports deliver and accept.
//!
//! Every message on the wire starts with a 4-byte header: the total size
//! of the message (header included) and a message type id, both
//! little-endian `u16`. Transports only hand whole units upward, so the
//! layers above never see partial messages.

use crate::{ConnectionSlot, TransportError};

/// Size of [`NetHeader`] on the wire.
pub const HEADER_SIZE: usize = 4;

/// The fixed header in front of every unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetHeader {
    /// Size of the whole unit, header included.
    pub total_size: u16,
    /// Message type id; meaning is owned by the protocol layer.
    pub message_type: u16,
}

impl NetHeader {
    /// Builds the header for a payload of `payload_len` bytes.
    pub fn for_payload(
        message_type: u16,
        payload_len: usize,
    ) -> Result<Self, TransportError> {
        let total = payload_len + HEADER_SIZE;
        let total_size = u16::try_from(total)
            .map_err(|_| TransportError::Oversized(payload_len))?;
        Ok(Self {
            total_size,
            message_type,
        })
    }

    /// Number of payload bytes that follow the header.
    pub fn payload_len(&self) -> usize {
        usize::from(self.total_size).saturating_sub(HEADER_SIZE)
    }

    /// Reads a header from the front of `bytes`.
    pub fn read(bytes: &[u8]) -> Result<Self, TransportError> {
        if bytes.len() < HEADER_SIZE {
            return Err(TransportError::Truncated { len: bytes.len() });
        }
        Ok(Self {
            total_size: u16::from_le_bytes([bytes[0], bytes[1]]),
            message_type: u16::from_le_bytes([bytes[2], bytes[3]]),
        })
    }

    /// Appends the header to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.total_size.to_le_bytes());
        out.extend_from_slice(&self.message_type.to_le_bytes());
    }

    /// Frames `payload` into a complete unit ready for a connection.
    pub fn frame(
        message_type: u16,
        payload: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        let header = Self::for_payload(message_type, payload.len())?;
        let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
        header.write(&mut out);
        out.extend_from_slice(payload);
        Ok(out)
    }
}

/// One fully framed message received on a slot.
///
/// Invariant: `payload.len() == header.total_size - HEADER_SIZE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundUnit {
    pub slot: ConnectionSlot,
    pub header: NetHeader,
    pub payload: Vec<u8>,
}

impl InboundUnit {
    /// Builds a unit from its parts.
    pub fn new(
        slot: ConnectionSlot,
        message_type: u16,
        payload: Vec<u8>,
    ) -> Result<Self, TransportError> {
        let header = NetHeader::for_payload(message_type, payload.len())?;
        Ok(Self {
            slot,
            header,
            payload,
        })
    }

    /// Parses one whole message as received from a connection.
    ///
    /// Rejects anything shorter than the header or whose declared size
    /// disagrees with the number of bytes actually received.
    pub fn parse(
        slot: ConnectionSlot,
        mut bytes: Vec<u8>,
    ) -> Result<Self, TransportError> {
        let header = NetHeader::read(&bytes)?;
        let declared = usize::from(header.total_size);
        if declared != bytes.len() {
            return Err(TransportError::SizeMismatch {
                declared,
                actual: bytes.len(),
            });
        }
        let payload = bytes.split_off(HEADER_SIZE);
        Ok(Self {
            slot,
            header,
            payload,
        })
    }

    /// Shorthand for `self.header.message_type`.
    pub fn message_type(&self) -> u16 {
        self.header.message_type
    }
}

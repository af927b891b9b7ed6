//! Replication events and the message type ids they travel under.

use serde::{Deserialize, Serialize};

use crate::{ActorDelta, LocalId, SpawnState};

/// Message type ids carried in every unit's header.
///
/// `CN_*` travel client → server, `SN_*` server → client.
pub mod message_type {
    // Handshake, answered by the Coordinator.
    pub const CN_HELLO: u16 = 1;
    pub const CN_AUTHENTICATE: u16 = 2;
    pub const SN_HELLO: u16 = 101;
    pub const SN_AUTH_RESULT: u16 = 102;

    // Lifecycle, handled by the Lane.
    pub const CN_READY_TO_LOAD: u16 = 10;
    pub const CN_MAP_LOADED: u16 = 11;
    pub const SN_LOADING_COMPLETE: u16 = 110;

    // Replication families.
    pub const SN_SPAWN: u16 = 120;
    pub const SN_UPDATE: u16 = 121;
    pub const SN_DESTROY: u16 = 122;
    pub const SN_TAG: u16 = 123;

    /// Returns `true` for the ids the Coordinator consumes itself.
    pub fn is_handshake(message_type: u16) -> bool {
        matches!(message_type, CN_HELLO | CN_AUTHENTICATE)
    }
}

/// One thing a client must learn about its view of the world.
///
/// Every event is addressed by the receiving client's [`LocalId`], never
/// by the actor's process-wide uid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplicationEvent {
    /// The actor became visible. Carries its full state.
    Spawn { local_id: LocalId, state: SpawnState },
    /// Some fields of a visible actor changed.
    Update { local_id: LocalId, delta: ActorDelta },
    /// The actor is no longer visible; the id may be reused afterwards.
    Destroy { local_id: LocalId },
    /// A player swapped which of their characters is in play.
    Tag {
        main: LocalId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sub: Option<LocalId>,
    },
}

impl ReplicationEvent {
    /// The header message type for this event.
    pub fn message_type(&self) -> u16 {
        match self {
            Self::Spawn { .. } => message_type::SN_SPAWN,
            Self::Update { .. } => message_type::SN_UPDATE,
            Self::Destroy { .. } => message_type::SN_DESTROY,
            Self::Tag { .. } => message_type::SN_TAG,
        }
    }

    /// The local id this event is about (the new main for a tag).
    pub fn local_id(&self) -> LocalId {
        match self {
            Self::Spawn { local_id, .. }
            | Self::Update { local_id, .. }
            | Self::Destroy { local_id } => *local_id,
            Self::Tag { main, .. } => *main,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_message_types_are_distinct() {
        let events = [
            ReplicationEvent::Destroy {
                local_id: LocalId(1),
            },
            ReplicationEvent::Update {
                local_id: LocalId(1),
                delta: ActorDelta::default(),
            },
            ReplicationEvent::Tag {
                main: LocalId(1),
                sub: None,
            },
        ];
        let mut types: Vec<u16> = events.iter().map(|e| e.message_type()).collect();
        types.push(message_type::SN_SPAWN);
        types.sort();
        types.dedup();
        assert_eq!(types.len(), 4);
    }

    #[test]
    fn test_handshake_ids() {
        assert!(message_type::is_handshake(message_type::CN_HELLO));
        assert!(message_type::is_handshake(message_type::CN_AUTHENTICATE));
        assert!(!message_type::is_handshake(message_type::CN_MAP_LOADED));
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_destroy_json_shape() {
        let json = serde_json::to_string(&ReplicationEvent::Destroy {
            local_id: LocalId(5001),
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"destroy","local_id":5001}"#);
    }
}

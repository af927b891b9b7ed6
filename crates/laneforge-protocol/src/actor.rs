//! Actor state as it travels on the wire.
//!
//! These are the payloads of the replication events. The server keeps
//! its own bookkeeping (owners, UIDs) out of them: a client only ever
//! learns an actor through its [`LocalId`](crate::LocalId).

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Math
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Returns `true` if any axis differs from `other` by more than `epsilon`.
    pub fn differs(self, other: Self, epsilon: f32) -> bool {
        (self.x - other.x).abs() > epsilon || (self.y - other.y).abs() > epsilon
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Returns `true` if any axis differs from `other` by more than `epsilon`.
    pub fn differs(self, other: Self, epsilon: f32) -> bool {
        (self.x - other.x).abs() > epsilon
            || (self.y - other.y).abs() > epsilon
            || (self.z - other.z).abs() > epsilon
    }
}

/// Orientation of an actor, in radians.
///
/// Characters aim with their upper body independently of where the legs
/// point, hence two yaws.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotation {
    pub upper_yaw: f32,
    pub upper_pitch: f32,
    pub body_yaw: f32,
}

impl Rotation {
    /// Returns `true` if any angle differs from `other` by more than `epsilon`.
    pub fn differs(self, other: Self, epsilon: f32) -> bool {
        (self.upper_yaw - other.upper_yaw).abs() > epsilon
            || (self.upper_pitch - other.upper_pitch).abs() > epsilon
            || (self.body_yaw - other.body_yaw).abs() > epsilon
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Rotation,
}

// ---------------------------------------------------------------------------
// Actor state
// ---------------------------------------------------------------------------

/// Coarse action state (idle, running, jumping, casting...) plus up to two
/// integer parameters. Ids are owned by game content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ActionState {
    pub id: u16,
    pub params: [i32; 2],
}

impl ActionState {
    pub const IDLE: Self = Self {
        id: 0,
        params: [0, 0],
    };

    pub fn new(id: u16) -> Self {
        Self { id, params: [0, 0] }
    }

    pub fn with_params(id: u16, params: [i32; 2]) -> Self {
        Self { id, params }
    }
}

/// What kind of actor this is, which decides its local id range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorCategory {
    /// A player-controlled character.
    Character,
    /// A world-placed non-player actor.
    Npc,
}

/// Everything a client needs to render an actor from scratch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorState {
    pub category: ActorCategory,
    /// Class id for characters, content document id for NPCs.
    pub kind: u32,
    pub faction: u8,
    pub transform: Transform,
    pub move_dir: Vec2,
    pub speed: f32,
    pub action: ActionState,
}

impl ActorState {
    /// A motionless actor at `position`.
    pub fn at(category: ActorCategory, kind: u32, position: Vec3) -> Self {
        Self {
            category,
            kind,
            faction: 0,
            transform: Transform {
                position,
                rotation: Rotation::default(),
            },
            move_dir: Vec2::ZERO,
            speed: 0.0,
            action: ActionState::IDLE,
        }
    }
}

/// The owning player of a character, as seen by one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub name: String,
    pub team: u8,
    /// `true` if this character is the player's main (tagged-in) one.
    pub main: bool,
}

/// Payload of a Spawn event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnState {
    /// `true` when the receiving client controls this actor.
    pub controlled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerSummary>,
    pub state: ActorState,
}

// ---------------------------------------------------------------------------
// Deltas
// ---------------------------------------------------------------------------

/// Where an actor is and how it moves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Motion {
    pub position: Vec3,
    pub move_dir: Vec2,
    pub speed: f32,
}

/// The fields of an actor that changed since the previous tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ActorDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motion: Option<Motion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Rotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionState>,
}

impl ActorDelta {
    /// Returns `true` if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.motion.is_none() && self.rotation.is_none() && self.action.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_differs_checks_each_axis() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        assert!(!a.differs(Vec3::new(1.04, 2.0, 3.0), 0.05));
        assert!(a.differs(Vec3::new(1.0, 2.0, 3.2), 0.05));
        assert!(a.differs(Vec3::new(0.8, 2.0, 3.0), 0.05));
    }

    #[test]
    fn test_rotation_differs_checks_each_angle() {
        let a = Rotation::default();
        let b = Rotation {
            body_yaw: 0.2,
            ..Rotation::default()
        };
        assert!(a.differs(b, 0.1));
        assert!(!a.differs(b, 0.3));
    }

    #[test]
    fn test_actor_delta_is_empty() {
        assert!(ActorDelta::default().is_empty());
        let delta = ActorDelta {
            action: Some(ActionState::new(3)),
            ..ActorDelta::default()
        };
        assert!(!delta.is_empty());
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_actor_delta_omits_unchanged_fields() {
        let delta = ActorDelta {
            rotation: Some(Rotation::default()),
            ..ActorDelta::default()
        };
        let json = serde_json::to_string(&delta).unwrap();
        assert!(json.contains("rotation"));
        assert!(!json.contains("motion"));
        assert!(!json.contains("action"));
    }
}

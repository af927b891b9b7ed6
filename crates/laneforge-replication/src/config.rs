//! Diff thresholds and replication switches.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Tunables for the per-tick diff.
///
/// A field is only replicated when it moved further than its epsilon
/// since the previous tick; small jitter from the simulation is absorbed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Per-axis position threshold, in world units.
    pub pos_epsilon: f32,
    /// Per-axis threshold on the normalized move direction.
    pub dir_epsilon: f32,
    pub speed_epsilon: f32,
    /// Per-angle threshold, in radians.
    pub rot_epsilon: f32,
    /// Don't send Update events for an actor to the connection that
    /// controls it; that client predicts its own movement.
    pub skip_owner_updates: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            pos_epsilon: 0.5,
            dir_epsilon: 0.001,
            speed_epsilon: 0.001,
            rot_epsilon: 0.1,
            skip_owner_updates: true,
        }
    }
}

impl ReplicationConfig {
    /// Replace negative or non-finite thresholds with their defaults.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        for (field, value, fallback) in [
            ("pos_epsilon", &mut self.pos_epsilon, defaults.pos_epsilon),
            ("dir_epsilon", &mut self.dir_epsilon, defaults.dir_epsilon),
            ("speed_epsilon", &mut self.speed_epsilon, defaults.speed_epsilon),
            ("rot_epsilon", &mut self.rot_epsilon, defaults.rot_epsilon),
        ] {
            if !value.is_finite() || *value < 0.0 {
                warn!(field, value = *value, fallback, "invalid epsilon, using default");
                *value = fallback;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replication_config_default() {
        let config = ReplicationConfig::default();
        assert_eq!(config.pos_epsilon, 0.5);
        assert_eq!(config.rot_epsilon, 0.1);
        assert!(config.skip_owner_updates);
    }

    #[test]
    fn test_replication_config_validated_replaces_bad_values() {
        let config = ReplicationConfig {
            pos_epsilon: -1.0,
            rot_epsilon: f32::NAN,
            ..ReplicationConfig::default()
        }
        .validated();
        assert_eq!(config.pos_epsilon, 0.5);
        assert_eq!(config.rot_epsilon, 0.1);
    }

    #[test]
    fn test_replication_config_validated_keeps_zero() {
        let config = ReplicationConfig {
            pos_epsilon: 0.0,
            ..ReplicationConfig::default()
        }
        .validated();
        assert_eq!(config.pos_epsilon, 0.0);
    }

    #[test]
    fn test_replication_config_partial_json_uses_defaults() {
        let config: ReplicationConfig =
            serde_json::from_str(r#"{ "pos_epsilon": 0.05 }"#).unwrap();
        assert_eq!(config.pos_epsilon, 0.05);
        assert_eq!(config.speed_epsilon, 0.001);
    }
}

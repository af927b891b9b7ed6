//! The slot → lane assignment table.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use laneforge_protocol::LaneId;
use laneforge_transport::ConnectionSlot;

/// Which lane each connection slot belongs to.
///
/// Written only by the Coordinator, readable from any thread. An entry
/// is set once when a connection authenticates and cleared when it
/// disconnects; a slot with no entry is unassigned.
#[derive(Debug, Default)]
pub struct AssignmentTable {
    lanes: RwLock<HashMap<ConnectionSlot, LaneId>>,
}

impl AssignmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `slot` to `lane`.
    ///
    /// # Panics
    /// If the slot is already assigned.
    pub fn set(&self, slot: ConnectionSlot, lane: LaneId) {
        let mut lanes = self.lanes.write().unwrap_or_else(PoisonError::into_inner);
        let previous = lanes.insert(slot, lane);
        assert!(
            previous.is_none(),
            "{slot} assigned to {lane} while still assigned to {previous:?}"
        );
    }

    pub fn get(&self, slot: ConnectionSlot) -> Option<LaneId> {
        self.lanes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&slot)
            .copied()
    }

    /// Removes the entry for `slot`, returning the lane it had.
    pub fn clear(&self, slot: ConnectionSlot) -> Option<LaneId> {
        self.lanes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&slot)
    }

    /// Number of assigned slots.
    pub fn len(&self) -> usize {
        self.lanes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_clear() {
        let table = AssignmentTable::new();
        let slot = ConnectionSlot::new(3);
        assert_eq!(table.get(slot), None);

        table.set(slot, LaneId(1));
        assert_eq!(table.get(slot), Some(LaneId(1)));
        assert_eq!(table.len(), 1);

        assert_eq!(table.clear(slot), Some(LaneId(1)));
        assert_eq!(table.get(slot), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_clear_unassigned_is_none() {
        let table = AssignmentTable::new();
        assert_eq!(table.clear(ConnectionSlot::new(0)), None);
    }

    #[test]
    fn test_slot_can_be_reassigned_after_clear() {
        let table = AssignmentTable::new();
        let slot = ConnectionSlot::new(0);
        table.set(slot, LaneId(0));
        table.clear(slot);
        table.set(slot, LaneId(1));
        assert_eq!(table.get(slot), Some(LaneId(1)));
    }

    #[test]
    #[should_panic(expected = "while still assigned")]
    fn test_set_twice_panics() {
        let table = AssignmentTable::new();
        table.set(ConnectionSlot::new(0), LaneId(0));
        table.set(ConnectionSlot::new(0), LaneId(1));
    }
}

//! Bounded table of provisioned nodes.
//!
//! Slots are stable for the lifetime of an entry: deletion leaves a hole
//! rather than compacting, because callers cache slot numbers from
//! provisioning-complete events. Capacity is fixed at construction.

use meshprov_core::constants::MAX_NODE_NAME_LEN;
use meshprov_core::types::{DeviceUuid, UnicastAddr};

use crate::error::NodeTableError;

/// A provisioned node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub uuid: DeviceUuid,
    pub unicast_addr: UnicastAddr,
    pub element_count: u8,
    pub name: Option<String>,
    pub composition_data: Vec<u8>,
}

impl NodeRecord {
    pub fn new(uuid: DeviceUuid, unicast_addr: UnicastAddr, element_count: u8) -> Self {
        Self {
            uuid,
            unicast_addr,
            element_count,
            name: None,
            composition_data: Vec::new(),
        }
    }
}

/// Fixed-capacity table of provisioned nodes with stable slot numbers.
#[derive(Debug, Clone)]
#[must_use]
pub struct NodeTable {
    slots: Vec<Option<NodeRecord>>,
}

impl NodeTable {
    /// Create an empty table with the given fixed capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    /// Add a provisioned node, returning the slot it landed on.
    ///
    /// Fails with `DuplicateNode` when the uuid or unicast address is
    /// already present, and `TableFull` when every slot is occupied.
    pub fn add(
        &mut self,
        uuid: DeviceUuid,
        unicast_addr: UnicastAddr,
        element_count: u8,
    ) -> Result<u16, NodeTableError> {
        for record in self.slots.iter().flatten() {
            if record.uuid == uuid {
                return Err(NodeTableError::DuplicateNode("uuid already provisioned"));
            }
            if record.unicast_addr == unicast_addr {
                return Err(NodeTableError::DuplicateNode(
                    "unicast address already provisioned",
                ));
            }
        }

        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(NodeTableError::TableFull(self.slots.len()))?;
        self.slots[slot] = Some(NodeRecord::new(uuid, unicast_addr, element_count));
        Ok(slot as u16)
    }

    /// Set the name of the node at `slot`.
    pub fn rename(&mut self, slot: u16, name: &str) -> Result<(), NodeTableError> {
        if name.len() > MAX_NODE_NAME_LEN {
            return Err(NodeTableError::InvalidArgument("node name too long"));
        }
        let record = self
            .slots
            .get_mut(slot as usize)
            .and_then(Option::as_mut)
            .ok_or(NodeTableError::NotFound)?;
        record.name = Some(name.to_string());
        Ok(())
    }

    /// The node at `slot`, if occupied.
    #[must_use]
    pub fn get(&self, slot: u16) -> Option<&NodeRecord> {
        self.slots.get(slot as usize).and_then(Option::as_ref)
    }

    /// The name of the node at `slot`, if set.
    #[must_use]
    pub fn get_name(&self, slot: u16) -> Option<&str> {
        self.get(slot).and_then(|r| r.name.as_deref())
    }

    /// Look up a node by device UUID.
    #[must_use]
    pub fn get_by_uuid(&self, uuid: &DeviceUuid) -> Option<&NodeRecord> {
        self.slots
            .iter()
            .flatten()
            .find(|record| record.uuid == *uuid)
    }

    /// Look up a node by primary unicast address.
    #[must_use]
    pub fn get_by_addr(&self, addr: UnicastAddr) -> Option<&NodeRecord> {
        self.slots
            .iter()
            .flatten()
            .find(|record| record.unicast_addr == addr)
    }

    /// Slot number of the node with the given name, if any.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<u16> {
        self.slots.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|record| record.name.as_deref() == Some(name))
        }).map(|slot| slot as u16)
    }

    /// Delete the node with the given UUID, returning the freed slot.
    pub fn delete_by_uuid(&mut self, uuid: &DeviceUuid) -> Result<u16, NodeTableError> {
        let slot = self
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|r| r.uuid == *uuid))
            .ok_or(NodeTableError::NotFound)?;
        self.slots[slot] = None;
        Ok(slot as u16)
    }

    /// Delete the node with the given unicast address, returning the freed slot.
    pub fn delete_by_addr(&mut self, addr: UnicastAddr) -> Result<u16, NodeTableError> {
        let slot = self
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|r| r.unicast_addr == addr))
            .ok_or(NodeTableError::NotFound)?;
        self.slots[slot] = None;
        Ok(slot as u16)
    }

    /// Store composition data for the node with the given unicast address.
    pub fn store_composition_data(
        &mut self,
        addr: UnicastAddr,
        data: &[u8],
    ) -> Result<(), NodeTableError> {
        let record = self
            .slots
            .iter_mut()
            .flatten()
            .find(|r| r.unicast_addr == addr)
            .ok_or(NodeTableError::NotFound)?;
        record.composition_data = data.to_vec();
        Ok(())
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Fixed table capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterate over all slots in order, holes included.
    ///
    /// Emptiness is explicit: callers must skip `None` slots rather than
    /// relying on a sentinel record.
    pub fn slots(&self) -> impl Iterator<Item = Option<&NodeRecord>> {
        self.slots.iter().map(Option::as_ref)
    }

    /// Empty every slot, keeping the capacity.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    /// Rebuild a table from persisted `(slot, record)` pairs.
    ///
    /// Pairs with a slot outside `capacity` are dropped; holes between
    /// occupied slots are preserved.
    pub fn from_slots(
        capacity: usize,
        entries: impl IntoIterator<Item = (u16, NodeRecord)>,
    ) -> Self {
        let mut table = Self::new(capacity);
        for (slot, record) in entries {
            if let Some(entry) = table.slots.get_mut(slot as usize) {
                *entry = Some(record);
            }
        }
        table
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn count_never_exceeds_capacity(adds in 1..40u16, capacity in 1..24usize) {
            let mut table = NodeTable::new(capacity);
            let mut accepted = 0usize;
            for i in 0..adds {
                let uuid = DeviceUuid::new([(i + 1) as u8; 16]);
                let addr = UnicastAddr::new(i + 1).unwrap();
                match table.add(uuid, addr, 1) {
                    Ok(_) => accepted += 1,
                    Err(NodeTableError::TableFull(c)) => prop_assert_eq!(c, capacity),
                    Err(e) => return Err(TestCaseError::fail(format!("unexpected error: {e}"))),
                }
            }
            prop_assert_eq!(table.count(), accepted);
            prop_assert!(table.count() <= capacity);
        }
    }
}

//! Pure serialization of the provisioner working set.
//!
//! A settings context persists one snapshot: the full key store plus the
//! full node table, holes included. The `Storable*` structs are the
//! postcard-facing intermediate representation, kept separate from the
//! live types so the wire layout does not leak into the state engines.

use serde::{Deserialize, Serialize};

use meshprov_core::constants::COMPANY_ID_NONE;
use meshprov_core::types::{DeviceUuid, KeyMaterial, UnicastAddr};
use meshprov_state::{
    AppKeyEntry, KeyStore, ModelBinding, ModelKey, NetKeyEntry, NodeRecord, NodeTable,
};

/// Errors from pure codec operations (no I/O variants).
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("snapshot contains invalid field: {0}")]
    InvalidField(&'static str),
}

#[derive(Debug, Serialize, Deserialize)]
struct StorableNetKey {
    index: u16,
    material: [u8; 16],
}

#[derive(Debug, Serialize, Deserialize)]
struct StorableAppKey {
    index: u16,
    bound_net_index: u16,
    material: [u8; 16],
}

#[derive(Debug, Serialize, Deserialize)]
struct StorableBinding {
    element_addr: u16,
    app_index: u16,
    model_id: u16,
    /// `COMPANY_ID_NONE` encodes a model-id-only binding.
    company_id: u16,
}

#[derive(Debug, Serialize, Deserialize)]
struct StorableNode {
    slot: u16,
    uuid: [u8; 16],
    unicast_addr: u16,
    element_count: u8,
    name: Option<String>,
    composition_data: Vec<u8>,
}

/// On-disk layout of one settings context.
#[derive(Debug, Serialize, Deserialize)]
struct StorableSnapshot {
    node_capacity: u32,
    net_keys: Vec<StorableNetKey>,
    app_keys: Vec<StorableAppKey>,
    bindings: Vec<StorableBinding>,
    nodes: Vec<StorableNode>,
}

/// Serialize a working set to postcard bytes.
pub fn serialize_snapshot(keystore: &KeyStore, table: &NodeTable) -> Result<Vec<u8>, SnapshotError> {
    let snapshot = StorableSnapshot {
        node_capacity: table.capacity() as u32,
        net_keys: keystore
            .net_keys()
            .map(|e| StorableNetKey {
                index: e.index,
                material: *e.material.as_bytes(),
            })
            .collect(),
        app_keys: keystore
            .app_keys()
            .map(|e| StorableAppKey {
                index: e.index,
                bound_net_index: e.bound_net_index,
                material: *e.material.as_bytes(),
            })
            .collect(),
        bindings: keystore
            .bindings()
            .iter()
            .map(|b| {
                let (model_id, company_id) = match b.model {
                    ModelKey::ByModelId { model_id } => (model_id, COMPANY_ID_NONE),
                    ModelKey::ByCompanyModel {
                        company_id,
                        model_id,
                    } => (model_id, company_id),
                };
                StorableBinding {
                    element_addr: b.element_addr.value(),
                    app_index: b.app_index,
                    model_id,
                    company_id,
                }
            })
            .collect(),
        nodes: table
            .slots()
            .enumerate()
            .filter_map(|(slot, record)| {
                record.map(|r| StorableNode {
                    slot: slot as u16,
                    uuid: {
                        let mut arr = [0u8; 16];
                        arr.copy_from_slice(r.uuid.as_ref());
                        arr
                    },
                    unicast_addr: r.unicast_addr.value(),
                    element_count: r.element_count,
                    name: r.name.clone(),
                    composition_data: r.composition_data.clone(),
                })
            })
            .collect(),
    };

    postcard::to_allocvec(&snapshot).map_err(|e| SnapshotError::Serialize(e.to_string()))
}

/// Deserialize a working set from postcard bytes.
pub fn deserialize_snapshot(bytes: &[u8]) -> Result<(KeyStore, NodeTable), SnapshotError> {
    let snapshot: StorableSnapshot =
        postcard::from_bytes(bytes).map_err(|e| SnapshotError::Deserialize(e.to_string()))?;

    let keystore = KeyStore::from_entries(
        snapshot.net_keys.iter().map(|e| NetKeyEntry {
            index: e.index,
            material: KeyMaterial::new(e.material),
        }),
        snapshot.app_keys.iter().map(|e| AppKeyEntry {
            index: e.index,
            bound_net_index: e.bound_net_index,
            material: KeyMaterial::new(e.material),
        }),
        snapshot
            .bindings
            .iter()
            .map(|b| {
                Ok(ModelBinding {
                    element_addr: UnicastAddr::new(b.element_addr)
                        .map_err(|_| SnapshotError::InvalidField("binding element address"))?,
                    app_index: b.app_index,
                    model: ModelKey::from_raw(b.model_id, b.company_id),
                })
            })
            .collect::<Result<Vec<_>, SnapshotError>>()?,
    );

    let nodes = snapshot
        .nodes
        .into_iter()
        .map(|n| {
            let addr = UnicastAddr::new(n.unicast_addr)
                .map_err(|_| SnapshotError::InvalidField("node unicast address"))?;
            let mut record = NodeRecord::new(DeviceUuid::new(n.uuid), addr, n.element_count);
            record.name = n.name;
            record.composition_data = n.composition_data;
            Ok((n.slot, record))
        })
        .collect::<Result<Vec<_>, SnapshotError>>()?;

    let table = NodeTable::from_slots(snapshot.node_capacity as usize, nodes);
    Ok((keystore, table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshprov_core::types::KeyIndex;

    fn material(seed: u8) -> KeyMaterial {
        KeyMaterial::new([seed; 16])
    }

    fn uuid(seed: u8) -> DeviceUuid {
        DeviceUuid::new([seed; 16])
    }

    fn addr(v: u16) -> UnicastAddr {
        UnicastAddr::new(v).unwrap()
    }

    fn populated() -> (KeyStore, NodeTable) {
        let mut ks = KeyStore::new();
        ks.add_net_key(Some(material(1)), KeyIndex::new(0)).unwrap();
        ks.add_net_key(Some(material(2)), KeyIndex::new(3)).unwrap();
        ks.add_app_key(Some(material(3)), 0, KeyIndex::new(1))
            .unwrap();
        ks.bind_local_model(addr(1), 1, 0x1000, 0xFFFF).unwrap();
        ks.bind_local_model(addr(1), 1, 0x1001, 0x05F1).unwrap();

        let mut table = NodeTable::new(8);
        table.add(uuid(1), addr(0x0010), 1).unwrap();
        table.add(uuid(2), addr(0x0020), 3).unwrap();
        table.add(uuid(3), addr(0x0030), 1).unwrap();
        table.rename(1, "bridge").unwrap();
        table
            .store_composition_data(addr(0x0020), &[0xAA, 0xBB])
            .unwrap();
        // Leave a hole at slot 0
        table.delete_by_addr(addr(0x0010)).unwrap();
        (ks, table)
    }

    #[test]
    fn snapshot_roundtrip_preserves_everything() {
        let (ks, table) = populated();
        let bytes = serialize_snapshot(&ks, &table).unwrap();
        let (rks, rtable) = deserialize_snapshot(&bytes).unwrap();

        assert_eq!(rks.get_net_key(0), Some(&material(1)));
        assert_eq!(rks.get_net_key(3), Some(&material(2)));
        assert_eq!(rks.get_app_key(0, 1), Some(&material(3)));
        assert_eq!(rks.bindings(), ks.bindings());

        assert_eq!(rtable.capacity(), 8);
        assert_eq!(rtable.count(), 2);
        assert!(rtable.get(0).is_none(), "hole must survive the roundtrip");
        assert_eq!(rtable.get_name(1), Some("bridge"));
        assert_eq!(
            rtable.get_by_addr(addr(0x0020)).unwrap().composition_data,
            vec![0xAA, 0xBB]
        );
        assert_eq!(rtable.get(2).unwrap().uuid, uuid(3));
    }

    #[test]
    fn empty_snapshot_roundtrip() {
        let ks = KeyStore::new();
        let table = NodeTable::new(4);
        let bytes = serialize_snapshot(&ks, &table).unwrap();
        let (rks, rtable) = deserialize_snapshot(&bytes).unwrap();
        assert!(rks.is_empty());
        assert_eq!(rtable.count(), 0);
        assert_eq!(rtable.capacity(), 4);
    }

    #[test]
    fn corrupt_bytes_fail_to_deserialize() {
        let result = deserialize_snapshot(b"this is not valid postcard");
        assert!(matches!(result, Err(SnapshotError::Deserialize(_))));
    }

    #[test]
    fn truncated_snapshot_fails() {
        let (ks, table) = populated();
        let bytes = serialize_snapshot(&ks, &table).unwrap();
        let result = deserialize_snapshot(&bytes[..bytes.len() / 2]);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_node_address_is_rejected() {
        // Hand-build a snapshot with a group address in the unicast field
        let snapshot = StorableSnapshot {
            node_capacity: 2,
            net_keys: vec![],
            app_keys: vec![],
            bindings: vec![],
            nodes: vec![StorableNode {
                slot: 0,
                uuid: [1; 16],
                unicast_addr: 0xC000,
                element_count: 1,
                name: None,
                composition_data: vec![],
            }],
        };
        let bytes = postcard::to_allocvec(&snapshot).unwrap();
        let result = deserialize_snapshot(&bytes);
        assert!(matches!(
            result,
            Err(SnapshotError::InvalidField("node unicast address"))
        ));
    }
}

//! Local NetKey/AppKey storage for the provisioner.
//!
//! Keys are unique by index. AppKeys must reference an existing NetKey.
//! Index auto-allocation picks the lowest unused index; the caller decides
//! how to report the allocation (the node facade forwards it as an event).

use std::collections::BTreeMap;

use rand::RngCore;

use meshprov_core::constants::COMPANY_ID_NONE;
use meshprov_core::types::{KeyIndex, KeyMaterial, UnicastAddr};

use crate::error::KeyStoreError;

/// A local network key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetKeyEntry {
    pub index: u16,
    pub material: KeyMaterial,
}

/// A local application key, bound to a network key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppKeyEntry {
    pub index: u16,
    pub bound_net_index: u16,
    pub material: KeyMaterial,
}

/// Identifies a local model for AppKey binding.
///
/// A company id of `0xFFFF` selects binding by model id alone (local
/// vendor model); any other value qualifies the model id with the company.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKey {
    ByModelId { model_id: u16 },
    ByCompanyModel { company_id: u16, model_id: u16 },
}

impl ModelKey {
    /// Build from the raw `(model_id, company_id)` pair of the binding call.
    #[must_use]
    pub fn from_raw(model_id: u16, company_id: u16) -> Self {
        if company_id == COMPANY_ID_NONE {
            ModelKey::ByModelId { model_id }
        } else {
            ModelKey::ByCompanyModel {
                company_id,
                model_id,
            }
        }
    }
}

/// An AppKey-to-local-model binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelBinding {
    pub element_addr: UnicastAddr,
    pub app_index: u16,
    pub model: ModelKey,
}

/// Local key storage: NetKeys, AppKeys, and model bindings.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct KeyStore {
    net_keys: BTreeMap<u16, NetKeyEntry>,
    app_keys: BTreeMap<u16, AppKeyEntry>,
    bindings: Vec<ModelBinding>,
}

/// Generate fresh key material from the OS CSPRNG.
fn generate_material() -> KeyMaterial {
    let mut bytes = [0u8; KeyMaterial::LEN];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    KeyMaterial::new(bytes)
}

/// Lowest index in `0..=0xFFFE` absent from the map.
fn lowest_unused(map: &BTreeMap<u16, impl Sized>) -> Result<u16, KeyStoreError> {
    let mut candidate: u16 = 0;
    for &used in map.keys() {
        if used > candidate {
            return Ok(candidate);
        }
        candidate = match used.checked_add(1) {
            Some(next) => next,
            None => return Err(KeyStoreError::IndexExhausted),
        };
    }
    if candidate <= KeyIndex::MAX.value() {
        Ok(candidate)
    } else {
        Err(KeyStoreError::IndexExhausted)
    }
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a local NetKey.
    ///
    /// `material = None` generates fresh key material. `index = KeyIndex::AUTO`
    /// allocates the lowest unused index. Returns the index the key landed on.
    pub fn add_net_key(
        &mut self,
        material: Option<KeyMaterial>,
        index: KeyIndex,
    ) -> Result<u16, KeyStoreError> {
        let index = if index.is_auto() {
            lowest_unused(&self.net_keys)?
        } else {
            let idx = index.value();
            if self.net_keys.contains_key(&idx) {
                return Err(KeyStoreError::DuplicateKey(idx));
            }
            idx
        };

        let material = material.unwrap_or_else(generate_material);
        self.net_keys.insert(index, NetKeyEntry { index, material });
        Ok(index)
    }

    /// Replace the material of an existing NetKey.
    pub fn update_net_key(
        &mut self,
        material: KeyMaterial,
        index: u16,
    ) -> Result<(), KeyStoreError> {
        match self.net_keys.get_mut(&index) {
            Some(entry) => {
                entry.material = material;
                Ok(())
            }
            None => Err(KeyStoreError::NotFound(index)),
        }
    }

    /// Get the material of a NetKey, if present.
    #[must_use]
    pub fn get_net_key(&self, index: u16) -> Option<&KeyMaterial> {
        self.net_keys.get(&index).map(|e| &e.material)
    }

    /// Add a local AppKey bound to an existing NetKey.
    ///
    /// Fails with `NotFound` if the NetKey is absent. `material` and
    /// `app_index` follow the same generate/auto rules as [`add_net_key`].
    ///
    /// [`add_net_key`]: KeyStore::add_net_key
    pub fn add_app_key(
        &mut self,
        material: Option<KeyMaterial>,
        net_index: u16,
        app_index: KeyIndex,
    ) -> Result<u16, KeyStoreError> {
        if !self.net_keys.contains_key(&net_index) {
            return Err(KeyStoreError::NotFound(net_index));
        }

        let app_index = if app_index.is_auto() {
            lowest_unused(&self.app_keys)?
        } else {
            let idx = app_index.value();
            if self.app_keys.contains_key(&idx) {
                return Err(KeyStoreError::DuplicateKey(idx));
            }
            idx
        };

        let material = material.unwrap_or_else(generate_material);
        self.app_keys.insert(
            app_index,
            AppKeyEntry {
                index: app_index,
                bound_net_index: net_index,
                material,
            },
        );
        Ok(app_index)
    }

    /// Replace the material of an existing AppKey.
    ///
    /// The `(net_index, app_index)` pair must match the stored binding.
    pub fn update_app_key(
        &mut self,
        material: KeyMaterial,
        net_index: u16,
        app_index: u16,
    ) -> Result<(), KeyStoreError> {
        let entry = self
            .app_keys
            .get_mut(&app_index)
            .ok_or(KeyStoreError::NotFound(app_index))?;
        if entry.bound_net_index != net_index {
            return Err(KeyStoreError::BindingMismatch {
                app_index,
                net_index,
            });
        }
        entry.material = material;
        Ok(())
    }

    /// Get the material of an AppKey, if present and bound to `net_index`.
    #[must_use]
    pub fn get_app_key(&self, net_index: u16, app_index: u16) -> Option<&KeyMaterial> {
        self.app_keys
            .get(&app_index)
            .filter(|e| e.bound_net_index == net_index)
            .map(|e| &e.material)
    }

    /// Bind an AppKey to a local model.
    ///
    /// The AppKey must exist. Binding the same model twice is a no-op.
    pub fn bind_local_model(
        &mut self,
        element_addr: UnicastAddr,
        app_index: u16,
        model_id: u16,
        company_id: u16,
    ) -> Result<(), KeyStoreError> {
        if !self.app_keys.contains_key(&app_index) {
            return Err(KeyStoreError::NotFound(app_index));
        }

        let binding = ModelBinding {
            element_addr,
            app_index,
            model: ModelKey::from_raw(model_id, company_id),
        };
        if !self.bindings.contains(&binding) {
            self.bindings.push(binding);
        }
        Ok(())
    }

    /// Iterate over NetKeys in index order.
    pub fn net_keys(&self) -> impl Iterator<Item = &NetKeyEntry> {
        self.net_keys.values()
    }

    /// Iterate over AppKeys in index order.
    pub fn app_keys(&self) -> impl Iterator<Item = &AppKeyEntry> {
        self.app_keys.values()
    }

    /// Model bindings in insertion order.
    #[must_use]
    pub fn bindings(&self) -> &[ModelBinding] {
        &self.bindings
    }

    /// Number of NetKeys.
    #[must_use]
    pub fn net_key_count(&self) -> usize {
        self.net_keys.len()
    }

    /// Number of AppKeys.
    #[must_use]
    pub fn app_key_count(&self) -> usize {
        self.app_keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.net_keys.is_empty() && self.app_keys.is_empty() && self.bindings.is_empty()
    }

    /// Drop all keys and bindings.
    pub fn clear(&mut self) {
        self.net_keys.clear();
        self.app_keys.clear();
        self.bindings.clear();
    }

    /// Rebuild a key store from persisted entries.
    ///
    /// Entries are trusted: indices are taken as stored and AppKey/NetKey
    /// referential integrity is assumed from the snapshot.
    pub fn from_entries(
        net_keys: impl IntoIterator<Item = NetKeyEntry>,
        app_keys: impl IntoIterator<Item = AppKeyEntry>,
        bindings: impl IntoIterator<Item = ModelBinding>,
    ) -> Self {
        Self {
            net_keys: net_keys.into_iter().map(|e| (e.index, e)).collect(),
            app_keys: app_keys.into_iter().map(|e| (e.index, e)).collect(),
            bindings: bindings.into_iter().collect(),
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn add_then_get_returns_same_material(
            index in 0..=0xFFFEu16,
            bytes in any::<[u8; 16]>(),
        ) {
            let mut ks = KeyStore::new();
            let mat = KeyMaterial::new(bytes);
            let idx = ks.add_net_key(Some(mat), KeyIndex::new(index)).unwrap();
            prop_assert_eq!(idx, index);
            prop_assert_eq!(ks.get_net_key(index), Some(&mat));
        }

        #[test]
        fn auto_allocation_is_lowest_unused(used in proptest::collection::btree_set(0..32u16, 0..16)) {
            let mut ks = KeyStore::new();
            for &i in &used {
                ks.add_net_key(None, KeyIndex::new(i)).unwrap();
            }
            let allocated = ks.add_net_key(None, KeyIndex::AUTO).unwrap();
            let expected = (0..=0xFFFEu16).find(|i| !used.contains(i)).unwrap();
            prop_assert_eq!(allocated, expected);
        }
    }
}

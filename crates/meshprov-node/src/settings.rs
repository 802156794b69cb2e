//! Settings context lifecycle management.
//!
//! Each context wraps one persisted snapshot of the provisioner working
//! set, addressed by a small integer index or an externally chosen user
//! id. The lifecycle is strictly ordered:
//!
//! `Closed --open--> Opened --restore--> Restored --release--> Released
//! --close--> Closed`
//!
//! with at most one context Restored at a time, so two storage sections
//! can never both claim the live working set. `erase` on release purges
//! the stored snapshot; `erase` on close additionally frees the selector
//! mapping. A storage fault during an erase marks the context `Failed`
//! instead of pretending the data is gone.

use std::fmt;

use meshprov_state::{KeyStore, NodeTable};

use crate::snapshot::{self, SnapshotError};
use crate::storage::{SettingsStorage, StorageError};

/// Addresses one settings context.
///
/// Index- and user-id-addressing are alternative schemes over the same
/// context table; a user id is a persistent alias for the index it was
/// first opened on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Index(u8),
    UserId(String),
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Index(i) => write!(f, "index {i}"),
            Selector::UserId(id) => write!(f, "user id {id:?}"),
        }
    }
}

/// Lifecycle state of one settings context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextState {
    #[default]
    Closed,
    Opened,
    Restored,
    Released,
    /// A storage fault occurred during an erase; the context refuses
    /// further lifecycle operations except `close` without erase.
    Failed,
}

/// Errors from settings lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings context already open")]
    AlreadyOpen,

    #[error("settings context not opened")]
    NotOpened,

    #[error("a settings context is already restored")]
    AlreadyRestored,

    #[error("settings context not restored")]
    NotRestored,

    #[error("settings context is in use")]
    InUse,

    #[error("settings selector not found")]
    NotFound,

    #[error("no free settings slot for a new user id")]
    NoFreeSlot,

    #[error("settings context marked failed by an earlier storage fault")]
    Failed,

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

impl SettingsError {
    /// Whether this is a lifecycle-ordering violation (a caller bug, not
    /// an environmental failure).
    #[must_use]
    pub fn is_wrong_state(&self) -> bool {
        matches!(
            self,
            SettingsError::AlreadyOpen
                | SettingsError::NotOpened
                | SettingsError::AlreadyRestored
                | SettingsError::NotRestored
                | SettingsError::InUse
        )
    }
}

/// Manager for all settings contexts and their backing storage.
pub struct SettingsStore {
    storage: SettingsStorage,
    node_capacity: usize,
    states: Vec<ContextState>,
    user_ids: Vec<Option<String>>,
    /// Index of the context currently holding the live working set.
    restored: Option<u8>,
}

impl SettingsStore {
    /// Load the store, reading the persisted selector mapping.
    pub async fn load(
        storage: SettingsStorage,
        contexts: u8,
        node_capacity: usize,
    ) -> Result<Self, SettingsError> {
        let user_ids = storage.load_map(contexts as usize).await?;
        Ok(Self {
            storage,
            node_capacity,
            states: vec![ContextState::Closed; contexts as usize],
            user_ids,
            restored: None,
        })
    }

    /// Number of configured contexts.
    #[must_use]
    pub fn contexts(&self) -> usize {
        self.states.len()
    }

    /// Resolve a selector to a context index, without creating anything.
    fn resolve(&self, selector: &Selector) -> Result<u8, SettingsError> {
        match selector {
            Selector::Index(i) => {
                if (*i as usize) < self.states.len() {
                    Ok(*i)
                } else {
                    Err(SettingsError::NotFound)
                }
            }
            Selector::UserId(id) => self
                .user_ids
                .iter()
                .position(|u| u.as_deref() == Some(id.as_str()))
                .map(|i| i as u8)
                .ok_or(SettingsError::NotFound),
        }
    }

    /// Resolve for `open`, allocating a slot for a new user id.
    async fn resolve_for_open(&mut self, selector: &Selector) -> Result<u8, SettingsError> {
        match self.resolve(selector) {
            Ok(index) => Ok(index),
            Err(SettingsError::NotFound) => {
                let Selector::UserId(id) = selector else {
                    return Err(SettingsError::NotFound);
                };
                let slot = self
                    .user_ids
                    .iter()
                    .position(Option::is_none)
                    .ok_or(SettingsError::NoFreeSlot)?;
                self.user_ids[slot] = Some(id.clone());
                if let Err(e) = self.storage.save_map(&self.user_ids).await {
                    self.user_ids[slot] = None;
                    return Err(e.into());
                }
                Ok(slot as u8)
            }
            Err(e) => Err(e),
        }
    }

    /// Open the backing storage section for a selector.
    ///
    /// Opening an unknown user id allocates the lowest free slot and
    /// persists the mapping. Returns the context index.
    pub async fn open(&mut self, selector: &Selector) -> Result<u8, SettingsError> {
        let index = self.resolve_for_open(selector).await?;
        match self.states[index as usize] {
            ContextState::Closed => {
                self.states[index as usize] = ContextState::Opened;
                Ok(index)
            }
            ContextState::Failed => Err(SettingsError::Failed),
            _ => Err(SettingsError::AlreadyOpen),
        }
    }

    /// Load the context's snapshot as the live working set.
    ///
    /// A never-written section restores as an empty working set. Only one
    /// context may be restored at a time, system-wide.
    pub async fn restore(
        &mut self,
        selector: &Selector,
    ) -> Result<(KeyStore, NodeTable), SettingsError> {
        let index = self.resolve(selector)?;
        match self.states[index as usize] {
            ContextState::Opened => {}
            ContextState::Failed => return Err(SettingsError::Failed),
            ContextState::Restored => return Err(SettingsError::AlreadyRestored),
            _ => return Err(SettingsError::NotOpened),
        }
        if self.restored.is_some() {
            return Err(SettingsError::AlreadyRestored);
        }

        let working = match self.storage.load_section(index).await? {
            Some(bytes) => snapshot::deserialize_snapshot(&bytes)?,
            None => (KeyStore::new(), NodeTable::new(self.node_capacity)),
        };

        self.states[index as usize] = ContextState::Restored;
        self.restored = Some(index);
        Ok(working)
    }

    /// Write the current working set into the restored context's section.
    pub async fn persist(
        &mut self,
        selector: &Selector,
        keystore: &KeyStore,
        table: &NodeTable,
    ) -> Result<(), SettingsError> {
        let index = self.resolve(selector)?;
        if self.states[index as usize] != ContextState::Restored {
            return Err(SettingsError::NotRestored);
        }
        let bytes = snapshot::serialize_snapshot(keystore, table)?;
        self.storage.save_section(index, &bytes).await?;
        Ok(())
    }

    /// Stop using the restored context's data.
    ///
    /// The caller clears the live working set; this transition frees the
    /// single-restored slot. With `erase` the stored snapshot is purged
    /// too; a fault during that purge marks the context `Failed`.
    pub async fn release(&mut self, selector: &Selector, erase: bool) -> Result<(), SettingsError> {
        let index = self.resolve(selector)?;
        if self.states[index as usize] != ContextState::Restored {
            return Err(SettingsError::NotRestored);
        }

        // The working set is given up either way.
        self.restored = None;

        if erase {
            if let Err(e) = self.storage.erase_section(index).await {
                self.states[index as usize] = ContextState::Failed;
                return Err(e.into());
            }
        }
        self.states[index as usize] = ContextState::Released;
        Ok(())
    }

    /// Close the context's storage handle.
    ///
    /// Valid after release, or after open without a restore. With `erase`
    /// the stored snapshot and the selector's user-id mapping are removed,
    /// freeing the selector for reuse.
    pub async fn close(&mut self, selector: &Selector, erase: bool) -> Result<(), SettingsError> {
        let index = self.resolve(selector)?;
        match self.states[index as usize] {
            ContextState::Opened | ContextState::Released | ContextState::Failed => {}
            ContextState::Restored => return Err(SettingsError::InUse),
            ContextState::Closed => return Err(SettingsError::NotOpened),
        }

        if erase {
            if let Err(e) = self.storage.erase_section(index).await {
                self.states[index as usize] = ContextState::Failed;
                return Err(e.into());
            }
            if self.user_ids[index as usize].is_some() {
                // Write the updated map before forgetting the id, so memory
                // and disk cannot disagree after a failed write.
                let mut updated = self.user_ids.clone();
                updated[index as usize] = None;
                if let Err(e) = self.storage.save_map(&updated).await {
                    self.states[index as usize] = ContextState::Failed;
                    return Err(e.into());
                }
                self.user_ids = updated;
            }
        }
        self.states[index as usize] = ContextState::Closed;
        Ok(())
    }

    /// Erase a stale context without going through the full lifecycle.
    ///
    /// Only valid while the context is Closed in this session.
    pub async fn delete(&mut self, selector: &Selector) -> Result<(), SettingsError> {
        let index = self.resolve(selector)?;
        if self.states[index as usize] != ContextState::Closed {
            return Err(SettingsError::InUse);
        }

        self.storage.erase_section(index).await?;
        if self.user_ids[index as usize].is_some() {
            let mut updated = self.user_ids.clone();
            updated[index as usize] = None;
            self.storage.save_map(&updated).await?;
            self.user_ids = updated;
        }
        Ok(())
    }

    /// Erase every stored section and mapping. Valid only while no
    /// context is open.
    pub async fn direct_erase_all(&mut self) -> Result<(), SettingsError> {
        if self.states.iter().any(|s| *s != ContextState::Closed) {
            return Err(SettingsError::InUse);
        }
        self.storage.erase_all(self.states.len()).await?;
        self.user_ids.fill(None);
        Ok(())
    }

    /// The user id mapped to a context index, if any.
    #[must_use]
    pub fn user_id(&self, index: u8) -> Option<&str> {
        self.user_ids
            .get(index as usize)
            .and_then(|u| u.as_deref())
    }

    /// The context index a user id is mapped to, if any.
    #[must_use]
    pub fn index_of(&self, user_id: &str) -> Option<u8> {
        self.user_ids
            .iter()
            .position(|u| u.as_deref() == Some(user_id))
            .map(|i| i as u8)
    }

    /// Number of context slots with no user id bound.
    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.user_ids.iter().filter(|u| u.is_none()).count()
    }

    /// Lifecycle state of a context index.
    #[must_use]
    pub fn state_of(&self, index: u8) -> Option<ContextState> {
        self.states.get(index as usize).copied()
    }

    /// Index of the context currently holding the working set, if any.
    #[must_use]
    pub fn restored_index(&self) -> Option<u8> {
        self.restored
    }
}

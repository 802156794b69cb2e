//! File-backed storage for settings sections.
//!
//! Each settings context maps to one section file under the base
//! directory; the index-to-user-id mapping lives in its own file. Writes
//! are atomic (write to `.tmp`, then rename) to prevent corruption.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

/// File name of the persisted selector mapping.
const MAP_FILE: &str = "settings_map";

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("failed to determine storage directory: {0}")]
    Directory(String),
}

/// Persisted index-to-user-id mapping, one slot per settings index.
#[derive(Debug, Serialize, Deserialize)]
struct StorableMap {
    user_ids: Vec<Option<String>>,
}

/// Persistent storage for settings sections.
pub struct SettingsStorage {
    base_dir: PathBuf,
}

impl SettingsStorage {
    /// Create a new storage instance, creating the directory if needed.
    ///
    /// # Note
    /// This performs blocking I/O (`create_dir_all`). Call at startup before the async runtime is under load.
    pub fn new(base_dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Create storage at the default path (`~/.meshprov/settings`).
    ///
    /// # Note
    /// This performs blocking I/O (`create_dir_all`). Call at startup before the async runtime is under load.
    pub fn default_path() -> Result<Self, StorageError> {
        let home = dirs::home_dir()
            .ok_or_else(|| StorageError::Directory("could not determine home directory".into()))?;
        Self::new(home.join(".meshprov").join("settings"))
    }

    fn section_path(&self, index: u8) -> PathBuf {
        self.base_dir.join(format!("section_{index}"))
    }

    /// Save a serialized snapshot into a section.
    pub async fn save_section(&self, index: u8, bytes: &[u8]) -> Result<(), StorageError> {
        self.atomic_write(&self.section_path(index), bytes).await
    }

    /// Load a section's snapshot bytes. Returns `Ok(None)` if the section
    /// was never written.
    pub async fn load_section(&self, index: u8) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.section_path(index)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Erase a section's persisted content. Missing sections are fine.
    pub async fn erase_section(&self, index: u8) -> Result<(), StorageError> {
        match fs::remove_file(self.section_path(index)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Whether a section has persisted content.
    pub async fn section_exists(&self, index: u8) -> bool {
        fs::try_exists(self.section_path(index)).await.unwrap_or(false)
    }

    /// Save the selector mapping.
    pub async fn save_map(&self, user_ids: &[Option<String>]) -> Result<(), StorageError> {
        let map = StorableMap {
            user_ids: user_ids.to_vec(),
        };
        let bytes =
            postcard::to_allocvec(&map).map_err(|e| StorageError::Serialize(e.to_string()))?;
        self.atomic_write(&self.base_dir.join(MAP_FILE), &bytes).await
    }

    /// Load the selector mapping, sized to `contexts` slots.
    ///
    /// Returns an all-empty mapping if the file doesn't exist. A stored
    /// mapping with a different length is truncated or padded to fit.
    pub async fn load_map(&self, contexts: usize) -> Result<Vec<Option<String>>, StorageError> {
        let mut user_ids = match fs::read(self.base_dir.join(MAP_FILE)).await {
            Ok(bytes) => {
                let map: StorableMap = postcard::from_bytes(&bytes)
                    .map_err(|e| StorageError::Deserialize(e.to_string()))?;
                map.user_ids
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StorageError::Io(e)),
        };
        user_ids.resize(contexts, None);
        Ok(user_ids)
    }

    /// Erase every section and the selector mapping.
    pub async fn erase_all(&self, contexts: usize) -> Result<(), StorageError> {
        for index in 0..contexts {
            self.erase_section(index as u8).await?;
        }
        match fs::remove_file(self.base_dir.join(MAP_FILE)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Write data atomically: write to a `.tmp` file then rename.
    async fn atomic_write(&self, path: &Path, data: &[u8]) -> Result<(), StorageError> {
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, data).await?;
        fs::rename(&tmp_path, path).await?;
        Ok(())
    }
}

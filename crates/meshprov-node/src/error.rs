//! Error types for the provisioner orchestrator.

use meshprov_state::{FilterError, KeyStoreError, NodeTableError};

use crate::settings::SettingsError;

/// Errors surfaced by the provisioner facade.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionerError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("key store error: {0}")]
    KeyStore(#[from] KeyStoreError),
    #[error("node table error: {0}")]
    NodeTable(#[from] NodeTableError),
    #[error("heartbeat filter error: {0}")]
    Filter(#[from] FilterError),
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
}

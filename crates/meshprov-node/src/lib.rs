//! Provisioner orchestration for the mesh network-state manager.
//!
//! This crate ties the in-memory state engines together, providing
//! configuration, snapshot persistence across settings contexts, the
//! bounded event channel, and the coarse-locked provisioner facade.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod provisioner;
pub mod settings;
pub mod snapshot;
pub mod storage;

pub use config::ProvisionerConfig;
pub use error::ProvisionerError;
pub use events::{event_channel, EventSender, HeartbeatReport, KeyKind, ProvisionerEvent};
pub use provisioner::Provisioner;
pub use settings::{ContextState, Selector, SettingsError, SettingsStore};
pub use storage::{SettingsStorage, StorageError};

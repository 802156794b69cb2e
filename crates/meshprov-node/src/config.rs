//! TOML-based configuration for the provisioner.

use std::path::Path;

use serde::Deserialize;

use crate::error::ProvisionerError;

/// Top-level provisioner configuration loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct ProvisionerConfig {
    #[serde(default)]
    pub provisioner: ProvisionerSection,
    #[serde(default)]
    pub settings: SettingsSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl ProvisionerConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ProvisionerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProvisionerError::Config(format!("failed to read config file: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| ProvisionerError::Config(format!("failed to parse config: {e}")))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ProvisionerError> {
        toml::from_str(s)
            .map_err(|e| ProvisionerError::Config(format!("failed to parse config: {e}")))
    }
}

/// The `[provisioner]` section.
#[derive(Debug, Deserialize)]
pub struct ProvisionerSection {
    /// Capacity of the provisioned node table. Default: 16.
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
    /// Depth of the bounded event queue. Default: 64.
    #[serde(default = "default_event_queue_depth")]
    pub event_queue_depth: usize,
}

fn default_max_nodes() -> usize {
    16
}

fn default_event_queue_depth() -> usize {
    64
}

impl Default for ProvisionerSection {
    fn default() -> Self {
        Self {
            max_nodes: default_max_nodes(),
            event_queue_depth: default_event_queue_depth(),
        }
    }
}

/// The `[settings]` section.
#[derive(Debug, Deserialize)]
pub struct SettingsSection {
    /// Custom storage directory path. Defaults to `~/.meshprov/settings`.
    pub storage_path: Option<String>,
    /// Number of settings contexts. Default: 8.
    #[serde(default = "default_max_contexts")]
    pub max_contexts: u8,
    /// Interval in seconds between periodic state persistence. 0 disables. Default: 300.
    #[serde(default = "default_persist_interval")]
    pub persist_interval: u64,
}

fn default_max_contexts() -> u8 {
    8
}

fn default_persist_interval() -> u64 {
    300
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self {
            storage_path: None,
            max_contexts: default_max_contexts(),
            persist_interval: default_persist_interval(),
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

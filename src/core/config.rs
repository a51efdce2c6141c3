//! Configuration management for exthost.
//!
//! Handles loading and saving configuration from TOML files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plugin::{DuplicatePolicy, EnablementOverrides};

/// Config file looked up in the working directory before the global one.
pub const LOCAL_CONFIG_FILE: &str = ".exthost.toml";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host settings
    pub host: HostConfig,

    /// Extension enablement and settings
    pub plugins: PluginsConfig,
}

/// Host settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Application id exposed to extensions
    pub app_id: String,

    /// Per-extension initializer timeout in milliseconds (none when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_timeout_ms: Option<u64>,

    /// What to do when an id registers twice
    pub duplicate_registrations: DuplicatePolicy,

    /// Default manifest path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            app_id: crate::APP_NAME.to_string(),
            init_timeout_ms: None,
            duplicate_registrations: DuplicatePolicy::default(),
            manifest: None,
        }
    }
}

/// Extension enablement overrides and seeded settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Ids forced on regardless of `enabledByDefault`
    pub enabled: Vec<String>,

    /// Ids forced off; wins over `enabled`
    pub disabled: Vec<String>,

    /// Initial settings per extension id
    pub settings: BTreeMap<String, toml::Table>,
}

impl PluginsConfig {
    /// Seeded settings as JSON values, ready for the settings store.
    pub fn settings_seeds(&self) -> Vec<(String, Value)> {
        self.settings
            .iter()
            .filter_map(|(id, table)| match serde_json::to_value(table) {
                Ok(value) => Some((id.clone(), value)),
                Err(e) => {
                    tracing::warn!(%id, error = %e, "Skipping unrepresentable plugin settings");
                    None
                }
            })
            .collect()
    }
}

impl EnablementOverrides for PluginsConfig {
    fn is_enabled(&self, id: &str) -> Option<bool> {
        if self.disabled.iter().any(|d| d == id) {
            Some(false)
        } else if self.enabled.iter().any(|e| e == id) {
            Some(true)
        } else {
            None
        }
    }
}

impl Config {
    /// Load configuration from the default locations.
    ///
    /// Search order:
    /// 1. `.exthost.toml` in the current directory
    /// 2. `~/.config/exthost/config.toml`
    /// 3. Default values
    pub fn load() -> anyhow::Result<Self> {
        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(global_config) = Self::global_path() {
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Path of the global config file.
    pub fn global_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(crate::APP_NAME).join("config.toml"))
    }
}

//! Manifest parsing and validation.
//!
//! A manifest is an ordered list of extension descriptors. It can be written
//! as JSON, TOML (`[[plugins]]` tables) or YAML. Order is significant: it is
//! the initialization order of the extensions.
//!
//! Malformed entries are dropped one by one and reported as
//! [`ExtensionError::Config`]; only a document that cannot be parsed at all
//! is fatal.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ExtensionError, ExtensionResult, PluginDescriptor};

/// Serialization format of a manifest document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Json,
    Toml,
    Yaml,
}

impl ManifestFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// Descriptor as written in the manifest, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDescriptor {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "entryLocator", alias = "entry_locator")]
    pub entry: Option<String>,
    #[serde(default, alias = "enabledByDefault")]
    pub enabled_by_default: Option<bool>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub lazy: bool,
}

impl From<PluginDescriptor> for RawDescriptor {
    fn from(descriptor: PluginDescriptor) -> Self {
        Self {
            id: Some(descriptor.id),
            entry: Some(descriptor.entry_locator),
            enabled_by_default: Some(descriptor.enabled_by_default),
            dependencies: descriptor.dependencies,
            lazy: descriptor.lazy,
        }
    }
}

impl RawDescriptor {
    /// Check required fields and produce a descriptor.
    pub fn validate(self) -> Result<PluginDescriptor, String> {
        let id = match self.id.map(|id| id.trim().to_string()) {
            Some(id) if !id.is_empty() => id,
            Some(_) => return Err("field 'id' is empty".to_string()),
            None => return Err("missing required field 'id'".to_string()),
        };

        let entry = match self.entry.map(|entry| entry.trim().to_string()) {
            Some(entry) if !entry.is_empty() => entry,
            Some(_) => return Err(format!("extension '{id}': field 'entry' is empty")),
            None => return Err(format!("extension '{id}': missing required field 'entry'")),
        };

        let mut dependencies: Vec<String> = Vec::with_capacity(self.dependencies.len());
        for dep in self.dependencies {
            let dep = dep.trim().to_string();
            if !dep.is_empty() && !dependencies.contains(&dep) {
                dependencies.push(dep);
            }
        }

        Ok(PluginDescriptor {
            id,
            entry_locator: entry,
            enabled_by_default: self.enabled_by_default.unwrap_or(false),
            dependencies,
            lazy: self.lazy,
        })
    }
}

/// Result of reading a manifest: the effective descriptors plus every entry
/// that had to be dropped.
#[derive(Debug, Default)]
pub struct LoadedManifest {
    /// Valid descriptors in declaration order.
    pub descriptors: Vec<PluginDescriptor>,
    /// One `ExtensionError::Config` per dropped entry.
    pub errors: Vec<ExtensionError>,
}

impl LoadedManifest {
    /// Whether every entry was accepted.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Find a descriptor by id.
    pub fn get(&self, id: &str) -> Option<&PluginDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }
}

/// Reads manifests into ordered, validated descriptor lists.
pub struct ManifestLoader;

impl ManifestLoader {
    /// Read a manifest file, picking the format from its extension.
    pub fn from_path(path: &Path) -> ExtensionResult<LoadedManifest> {
        let format = ManifestFormat::from_path(path).ok_or_else(|| {
            ExtensionError::ManifestParse(format!(
                "unsupported manifest extension: {}",
                path.display()
            ))
        })?;
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content, format)
    }

    /// Parse a manifest document.
    pub fn from_str(content: &str, format: ManifestFormat) -> ExtensionResult<LoadedManifest> {
        let document: Value = match format {
            ManifestFormat::Json => serde_json::from_str(content)
                .map_err(|e| ExtensionError::ManifestParse(e.to_string()))?,
            ManifestFormat::Toml => toml::from_str(content)
                .map_err(|e| ExtensionError::ManifestParse(e.to_string()))?,
            ManifestFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| ExtensionError::ManifestParse(e.to_string()))?,
        };

        let entries = match document {
            Value::Array(entries) => entries,
            Value::Object(mut table) => match table.remove("plugins") {
                Some(Value::Array(entries)) => entries,
                Some(_) => {
                    return Err(ExtensionError::ManifestParse(
                        "'plugins' must be a list of descriptors".to_string(),
                    ))
                }
                None => Vec::new(),
            },
            Value::Null => Vec::new(),
            _ => {
                return Err(ExtensionError::ManifestParse(
                    "expected a list of descriptors".to_string(),
                ))
            }
        };

        let raw = entries.into_iter().map(|entry| {
            serde_json::from_value::<RawDescriptor>(entry).map_err(|e| e.to_string())
        });

        Ok(Self::collect(raw))
    }

    /// Validate an in-memory descriptor list.
    pub fn load<I>(descriptors: I) -> LoadedManifest
    where
        I: IntoIterator<Item = PluginDescriptor>,
    {
        Self::collect(descriptors.into_iter().map(|d| Ok(RawDescriptor::from(d))))
    }

    fn collect<I>(entries: I) -> LoadedManifest
    where
        I: IntoIterator<Item = Result<RawDescriptor, String>>,
    {
        let mut manifest = LoadedManifest::default();
        let mut accepted = Vec::new();

        for (index, entry) in entries.into_iter().enumerate() {
            match entry.and_then(RawDescriptor::validate) {
                Ok(descriptor) => accepted.push(descriptor),
                Err(reason) => {
                    tracing::warn!(index, %reason, kind = "ConfigError", "Dropping manifest entry");
                    manifest.errors.push(ExtensionError::Config { index, reason });
                }
            }
        }

        let mut last_seen: HashMap<String, usize> = HashMap::new();
        for (position, descriptor) in accepted.iter().enumerate() {
            last_seen.insert(descriptor.id.clone(), position);
        }

        manifest.descriptors = accepted
            .into_iter()
            .enumerate()
            .filter_map(|(position, descriptor)| {
                if last_seen.get(&descriptor.id) == Some(&position) {
                    Some(descriptor)
                } else {
                    tracing::warn!(
                        id = %descriptor.id,
                        "Duplicate id in manifest, keeping the last occurrence"
                    );
                    None
                }
            })
            .collect();

        manifest
    }
}

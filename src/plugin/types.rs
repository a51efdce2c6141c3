//! Core extension host types.

use serde::{Deserialize, Serialize};

/// A validated manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    /// Unique extension id.
    pub id: String,
    /// Locator of the entry script.
    #[serde(rename = "entry")]
    pub entry_locator: String,
    /// Whether the extension is enabled when no override exists.
    pub enabled_by_default: bool,
    /// Ids that must be ready before this extension initializes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Deferred until explicitly requested.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub lazy: bool,
}

impl PluginDescriptor {
    /// Create a descriptor without dependencies.
    pub fn new(
        id: impl Into<String>,
        entry_locator: impl Into<String>,
        enabled_by_default: bool,
    ) -> Self {
        Self {
            id: id.into(),
            entry_locator: entry_locator.into(),
            enabled_by_default,
            dependencies: Vec::new(),
            lazy: false,
        }
    }

    /// Declare dependencies.
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Mark as lazily loaded.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }
}

/// Kind of loadable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Executable code.
    Script,
    /// Layout-only stylesheet.
    Style,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Script => f.write_str("script"),
            Self::Style => f.write_str("style"),
        }
    }
}

/// Observable state of a cached resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Requested but not settled.
    Pending,
    /// Loaded successfully.
    Loaded,
    /// Load failed; the failure is cached.
    Failed,
}

/// State of a registration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationState {
    Registered,
    Initializing,
    Ready,
    Failed,
}

/// Full per-extension lifecycle as tracked by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Declared in the manifest, not yet processed.
    Discovered,
    /// Declared but not enabled.
    Disabled,
    /// Enabled and lazy; waiting for an explicit load.
    Deferred,
    /// Entry resource requested.
    Loading,
    /// Entry registered an initializer.
    Registered,
    /// Initializer running.
    Initializing,
    /// Initializer settled successfully.
    Ready,
    /// Load, registration or initialization failed.
    Failed,
}

impl LifecycleState {
    /// Whether the extension has reached a final state for this session.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    /// Lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Disabled => "disabled",
            Self::Deferred => "deferred",
            Self::Loading => "loading",
            Self::Registered => "registered",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl From<RegistrationState> for LifecycleState {
    fn from(state: RegistrationState) -> Self {
        match state {
            RegistrationState::Registered => Self::Registered,
            RegistrationState::Initializing => Self::Initializing,
            RegistrationState::Ready => Self::Ready,
            RegistrationState::Failed => Self::Failed,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted after an extension becomes ready (`<id>:ready` is emitted too).
pub const EVENT_PLUGIN_ENABLED: &str = "plugin:enabled";

/// Emitted whenever an extension's settings change.
pub const EVENT_SETTINGS_CHANGED: &str = "plugin:settings-changed";

/// Conventional readiness event for an extension.
pub fn ready_event(id: &str) -> String {
    format!("{id}:ready")
}

//! Capability surface handed to extension initializers.
//!
//! Every initializer receives its own [`HostApi`], bound to its extension id.
//! It can load further resources through the shared cache, talk on the event
//! bus, read and write its settings, and reach capabilities injected by the
//! embedding application.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::{
    EventBus, ExtensionResult, PluginSettings, ResourceCache, StyleAttributes, Subscription,
};

/// Log level for extension logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Trace level (most verbose).
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

/// Typed application capabilities, keyed by type.
#[derive(Clone, Default)]
pub struct Capabilities {
    map: Arc<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities").field("len", &self.map.len()).finish()
    }
}

impl Capabilities {
    /// Add (or replace) the capability of type `T`.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        Arc::make_mut(&mut self.map).insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Capability of type `T`.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let value = Arc::clone(self.map.get(&TypeId::of::<T>())?);
        value.downcast::<T>().ok()
    }

    /// Number of capabilities.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no capability was injected.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Host interface given to one extension.
#[derive(Clone)]
pub struct HostApi {
    plugin_id: Arc<str>,
    app_id: Arc<str>,
    resources: ResourceCache,
    events: EventBus,
    settings: PluginSettings,
    capabilities: Capabilities,
}

impl std::fmt::Debug for HostApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostApi")
            .field("plugin_id", &self.plugin_id)
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

impl HostApi {
    pub(crate) fn new(
        plugin_id: &str,
        app_id: Arc<str>,
        resources: ResourceCache,
        events: EventBus,
        settings: PluginSettings,
        capabilities: Capabilities,
    ) -> Self {
        Self { plugin_id: Arc::from(plugin_id), app_id, resources, events, settings, capabilities }
    }

    /// Id of the extension this handle belongs to.
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Id of the embedding application.
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Load a stylesheet. A failure is a degradation, not an error: it is
    /// logged and reported as `false`.
    pub async fn load_css(&self, locator: &str) -> bool {
        self.load_css_with(locator, &StyleAttributes::new()).await
    }

    /// Load a stylesheet with element attributes.
    pub async fn load_css_with(&self, locator: &str, attributes: &StyleAttributes) -> bool {
        match self.resources.load_style(locator, attributes).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    id = %self.plugin_id,
                    locator,
                    cause = %e.cause,
                    "Stylesheet unavailable, continuing without it"
                );
                false
            }
        }
    }

    /// Load a single script.
    pub async fn load_script(&self, locator: &str) -> ExtensionResult<()> {
        Ok(self.resources.load_script(locator).await?)
    }

    /// Load scripts strictly in order; fails on the first failing locator.
    pub async fn load_scripts_sequential<I, S>(&self, locators: I) -> ExtensionResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.resources.load_scripts_sequential(locators).await
    }

    /// Publish an event.
    pub fn emit(&self, event: &str, payload: Value) {
        self.events.emit(event, payload);
    }

    /// Subscribe to an event.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.events.subscribe(event, handler)
    }

    /// This extension's settings.
    pub fn settings(&self) -> Option<Value> {
        self.settings.get(&self.plugin_id)
    }

    /// Replace this extension's settings.
    pub fn set_settings(&self, settings: Value) {
        self.settings.set(&self.plugin_id, settings);
    }

    /// Merge into this extension's settings.
    pub fn update_settings(&self, patch: Value) {
        self.settings.update(&self.plugin_id, patch);
    }

    /// Capability of type `T` injected by the application.
    pub fn capability<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.capabilities.get::<T>()
    }

    /// Log on behalf of the extension.
    pub fn log(&self, level: LogLevel, message: &str) {
        let id = &*self.plugin_id;
        match level {
            LogLevel::Trace => tracing::trace!(id, "{message}"),
            LogLevel::Debug => tracing::debug!(id, "{message}"),
            LogLevel::Info => tracing::info!(id, "{message}"),
            LogLevel::Warn => tracing::warn!(id, "{message}"),
            LogLevel::Error => tracing::error!(id, "{message}"),
        }
    }

    /// Log a warning on behalf of the extension.
    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    /// Log an error on behalf of the extension.
    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

//! Enablement overrides and per-extension settings.
//!
//! Settings live in memory for the session only. Every change is announced
//! on the event bus as `plugin:settings-changed`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{EventBus, EVENT_SETTINGS_CHANGED};

/// External settings collaborator deciding whether an extension is enabled.
///
/// `None` means "no opinion": the descriptor's `enabledByDefault` applies.
pub trait EnablementOverrides: Send + Sync {
    fn is_enabled(&self, id: &str) -> Option<bool>;
}

impl EnablementOverrides for HashMap<String, bool> {
    fn is_enabled(&self, id: &str) -> Option<bool> {
        self.get(id).copied()
    }
}

/// Session-scoped settings store keyed by extension id.
#[derive(Clone)]
pub struct PluginSettings {
    values: Arc<Mutex<HashMap<String, Value>>>,
    events: EventBus,
}

impl std::fmt::Debug for PluginSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSettings").field("ids", &self.values.lock().len()).finish()
    }
}

impl PluginSettings {
    /// Create an empty store announcing changes on `events`.
    pub fn new(events: EventBus) -> Self {
        Self { values: Arc::new(Mutex::new(HashMap::new())), events }
    }

    /// Seed values without emitting change events.
    pub fn seed<I>(&self, seeds: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.values.lock().extend(seeds);
    }

    /// Settings of `id`.
    pub fn get(&self, id: &str) -> Option<Value> {
        self.values.lock().get(id).cloned()
    }

    /// Replace the settings of `id`.
    pub fn set(&self, id: &str, settings: Value) {
        let old = self.values.lock().insert(id.to_string(), settings.clone());
        self.announce(id, &settings, old);
    }

    /// Shallow-merge `patch` into the settings of `id`. Non-object values
    /// replace the current settings.
    pub fn update(&self, id: &str, patch: Value) {
        let (new, old) = {
            let mut values = self.values.lock();
            let old = values.get(id).cloned();
            let new = match (old.clone(), patch) {
                (Some(Value::Object(mut current)), Value::Object(patch)) => {
                    current.extend(patch);
                    Value::Object(current)
                }
                (_, patch) => patch,
            };
            values.insert(id.to_string(), new.clone());
            (new, old)
        };
        self.announce(id, &new, old);
    }

    /// Remove the settings of `id`.
    pub fn clear(&self, id: &str) -> bool {
        let old = self.values.lock().remove(id);
        let removed = old.is_some();
        if removed {
            self.announce(id, &Value::Null, old);
        }
        removed
    }

    fn announce(&self, id: &str, settings: &Value, old: Option<Value>) {
        self.events.emit(
            EVENT_SETTINGS_CHANGED,
            json!({ "id": id, "settings": settings, "oldSettings": old }),
        );
    }
}

//! Host runtime: drives every extension from manifest entry to a final state.
//!
//! Per extension: `Discovered -> Loading -> Registered -> Initializing ->
//! Ready | Failed`. Entry loads of one activation run concurrently; the
//! initializers then run one at a time in manifest order (dependencies
//! first). No individual failure stops the others.
//!
//! Dropping the future returned by [`HostRuntime::start`] stops the sequence
//! after the current await point; loads still in flight settle into the
//! cache and their results are simply not consumed.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use serde_json::json;

use super::events::panic_message;
use super::{
    ready_event, Capabilities, DependencyGraph, DuplicatePolicy, EnablementOverrides, EventBus,
    ExtensionError, ExtensionResult, HostApi, LifecycleState, ManifestLoader, PluginDescriptor,
    PluginRegistry, PluginSettings, RegistrationState, ResourceCache, ResourceLoader,
    EVENT_PLUGIN_ENABLED,
};
use crate::core::Config;

/// Final state of one manifest entry.
#[derive(Debug, Clone, Serialize)]
pub struct ExtensionStatus {
    pub id: String,
    pub state: LifecycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// States of every manifest entry, in manifest order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupReport {
    pub extensions: Vec<ExtensionStatus>,
    /// Manifest entries dropped before loading, one message each.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub manifest_errors: Vec<String>,
}

impl StartupReport {
    /// Status of `id`.
    pub fn get(&self, id: &str) -> Option<&ExtensionStatus> {
        self.extensions.iter().find(|s| s.id == id)
    }

    /// Ids in `state`, in manifest order.
    pub fn in_state(&self, state: LifecycleState) -> Vec<&str> {
        self.extensions.iter().filter(|s| s.state == state).map(|s| s.id.as_str()).collect()
    }

    /// Ready ids.
    pub fn ready(&self) -> Vec<&str> {
        self.in_state(LifecycleState::Ready)
    }

    /// Failed ids.
    pub fn failed(&self) -> Vec<&str> {
        self.in_state(LifecycleState::Failed)
    }
}

/// One extension host session: owns its registry, resource cache, event
/// bus and settings store.
pub struct HostRuntime {
    app_id: Arc<str>,
    descriptors: Vec<PluginDescriptor>,
    manifest_errors: Vec<String>,
    enabled: HashSet<String>,
    phases: HashMap<String, LifecycleState>,
    registry: PluginRegistry,
    resources: ResourceCache,
    events: EventBus,
    settings: PluginSettings,
    overrides: Option<Arc<dyn EnablementOverrides>>,
    capabilities: Capabilities,
    init_timeout: Option<Duration>,
}

impl std::fmt::Debug for HostRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRuntime")
            .field("app_id", &self.app_id)
            .field("descriptors", &self.descriptors.len())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl HostRuntime {
    /// Create a runtime loading resources through `loader`.
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        let registry = PluginRegistry::new();
        let events = EventBus::new();
        Self {
            app_id: Arc::from(crate::APP_NAME),
            descriptors: Vec::new(),
            manifest_errors: Vec::new(),
            enabled: HashSet::new(),
            phases: HashMap::new(),
            resources: ResourceCache::new(loader, registry.clone()),
            registry,
            settings: PluginSettings::new(events.clone()),
            events,
            overrides: None,
            capabilities: Capabilities::default(),
            init_timeout: None,
        }
    }

    /// Create a runtime configured from the `[host]` and `[plugins]` tables.
    pub fn from_config(loader: Arc<dyn ResourceLoader>, config: &Config) -> Self {
        let mut runtime = Self::new(loader)
            .with_app_id(config.host.app_id.clone())
            .with_duplicate_policy(config.host.duplicate_registrations)
            .with_overrides(config.plugins.clone());

        if let Some(ms) = config.host.init_timeout_ms {
            runtime = runtime.with_init_timeout(Duration::from_millis(ms));
        }

        runtime.settings.seed(config.plugins.settings_seeds());
        runtime
    }

    /// Id exposed to initializers as [`HostApi::app_id`].
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Arc::from(app_id.into());
        self
    }

    /// Policy for a second registration under the same id.
    pub fn with_duplicate_policy(self, policy: DuplicatePolicy) -> Self {
        self.registry.set_policy(policy);
        self
    }

    /// Settings collaborator overriding `enabledByDefault`.
    pub fn with_overrides(mut self, overrides: impl EnablementOverrides + 'static) -> Self {
        self.overrides = Some(Arc::new(overrides));
        self
    }

    /// Fail an initializer that has not settled after `timeout`.
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = Some(timeout);
        self
    }

    /// Inject an application capability reachable via [`HostApi::capability`].
    pub fn with_capability<T: std::any::Any + Send + Sync>(mut self, capability: T) -> Self {
        self.capabilities.insert(capability);
        self
    }

    /// Registration records.
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Resource cache shared by every extension of this session.
    pub fn resources(&self) -> &ResourceCache {
        &self.resources
    }

    /// Event bus of this session.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Settings store of this session.
    pub fn settings(&self) -> &PluginSettings {
        &self.settings
    }

    /// Register a compiled-in extension. Its entry resource will not be
    /// loaded; it goes straight to initialization once enabled.
    pub fn register<F, Fut>(&self, id: impl Into<String>, init: F) -> ExtensionResult<()>
    where
        F: Fn(HostApi) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.registry.register(id, init)
    }

    /// Load, register and initialize every enabled, non-lazy extension of
    /// `descriptors`.
    ///
    /// May be called again: extensions that already settled are left alone,
    /// so no initializer ever runs twice.
    pub async fn start<I>(&mut self, descriptors: I) -> StartupReport
    where
        I: IntoIterator<Item = PluginDescriptor>,
    {
        let manifest = ManifestLoader::load(descriptors);
        self.descriptors = manifest.descriptors;
        self.manifest_errors = manifest.errors.iter().map(ToString::to_string).collect();
        self.registry.set_declaration_order(self.descriptors.iter().map(|d| d.id.clone()).collect());

        let enabled = resolve_enabled(&self.descriptors, self.overrides.as_deref());
        self.enabled.extend(enabled);

        let mut eager = HashSet::new();
        let mut parked = Vec::new();
        {
            let graph = DependencyGraph::new(&self.descriptors);
            for descriptor in &self.descriptors {
                let id = &descriptor.id;
                if !self.enabled.contains(id) {
                    parked.push((id.clone(), LifecycleState::Disabled));
                } else if descriptor.lazy {
                    parked.push((id.clone(), LifecycleState::Deferred));
                } else {
                    eager.extend(graph.closure(id));
                }
            }
        }
        for (id, phase) in parked {
            self.set_phase(&id, phase);
        }

        self.activate(eager).await;

        let report = self.report();
        tracing::info!(
            ready = report.ready().len(),
            failed = report.failed().len(),
            "Extension host started"
        );
        report
    }

    /// Enable `id` (and its dependencies) after start-up and bring it up.
    pub async fn enable_plugin(&mut self, id: &str) -> ExtensionResult<LifecycleState> {
        let closure = self.closure_of(id)?;
        let was_ready = self.state(id) == Some(LifecycleState::Ready);

        self.enabled.extend(closure.iter().cloned());
        self.activate(closure.into_iter().collect()).await;

        let state = self.state(id).unwrap_or(LifecycleState::Failed);
        if state == LifecycleState::Ready && !was_ready {
            self.events.emit(EVENT_PLUGIN_ENABLED, json!({ "id": id }));
        }
        Ok(state)
    }

    /// Load a lazy extension on demand.
    pub async fn load_plugin(&mut self, id: &str) -> ExtensionResult<LifecycleState> {
        let closure = self.closure_of(id)?;
        if !self.enabled.contains(id) {
            return Err(ExtensionError::NotEnabled(id.to_string()));
        }

        self.activate(closure.into_iter().collect()).await;
        Ok(self.state(id).unwrap_or(LifecycleState::Failed))
    }

    /// Effective manifest.
    pub fn manifest(&self) -> &[PluginDescriptor] {
        &self.descriptors
    }

    /// Enabled ids, in manifest order.
    pub fn enabled(&self) -> Vec<String> {
        self.descriptors
            .iter()
            .filter(|d| self.enabled.contains(&d.id))
            .map(|d| d.id.clone())
            .collect()
    }

    /// Whether `id` is enabled.
    pub fn is_enabled(&self, id: &str) -> bool {
        self.enabled.contains(id)
    }

    /// Whether `id` is lazy and still waiting to be loaded.
    pub fn is_lazy(&self, id: &str) -> bool {
        self.state(id) == Some(LifecycleState::Deferred)
    }

    /// Lazy ids still waiting to be loaded, in manifest order.
    pub fn lazy_plugins(&self) -> Vec<String> {
        self.descriptors.iter().filter(|d| self.is_lazy(&d.id)).map(|d| d.id.clone()).collect()
    }

    /// Registered ids, sorted.
    pub fn list_plugins(&self) -> Vec<String> {
        self.registry.ids()
    }

    /// Transitive dependencies of `id`, in initialization order.
    pub fn dependencies(&self, id: &str) -> Vec<String> {
        DependencyGraph::new(&self.descriptors).dependencies(id)
    }

    /// Direct dependents of `id`, in manifest order.
    pub fn dependents(&self, id: &str) -> Vec<String> {
        DependencyGraph::new(&self.descriptors).dependents(id)
    }

    /// Lifecycle state of `id`, or `None` if it is unknown.
    pub fn state(&self, id: &str) -> Option<LifecycleState> {
        let phase = self.phases.get(id).copied();
        match self.registry.state(id) {
            // Compiled-in registrations stay registered while disabled or deferred.
            Some(RegistrationState::Registered) => Some(phase.unwrap_or(LifecycleState::Registered)),
            Some(state) => Some(state.into()),
            None => phase.or_else(|| {
                self.descriptors.iter().any(|d| d.id == id).then_some(LifecycleState::Discovered)
            }),
        }
    }

    /// Error that failed `id`.
    pub fn error(&self, id: &str) -> Option<Arc<ExtensionError>> {
        self.registry.error(id)
    }

    /// Snapshot of every manifest entry.
    pub fn report(&self) -> StartupReport {
        let extensions = self
            .descriptors
            .iter()
            .map(|d| ExtensionStatus {
                id: d.id.clone(),
                state: self.state(&d.id).unwrap_or(LifecycleState::Discovered),
                error: self.error(&d.id).map(|e| e.to_string()),
            })
            .collect();
        StartupReport { extensions, manifest_errors: self.manifest_errors.clone() }
    }

    fn closure_of(&self, id: &str) -> ExtensionResult<Vec<String>> {
        if !self.descriptors.iter().any(|d| d.id == id) {
            return Err(ExtensionError::UnknownPlugin(id.to_string()));
        }
        Ok(DependencyGraph::new(&self.descriptors).closure(id))
    }

    fn descriptor(&self, id: &str) -> Option<&PluginDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    fn set_phase(&mut self, id: &str, phase: LifecycleState) {
        if !self.state(id).is_some_and(LifecycleState::is_settled) {
            self.phases.insert(id.to_string(), phase);
        }
    }

    async fn activate(&mut self, selected: HashSet<String>) {
        let order = DependencyGraph::new(&self.descriptors).order(&selected);

        let mut pending = Vec::new();
        for id in &order {
            self.phases.remove(id);
            let state = self.state(id);
            if state.is_some_and(LifecycleState::is_settled)
                || state == Some(LifecycleState::Initializing)
            {
                continue;
            }
            if self.registry.state(id) == Some(RegistrationState::Registered) {
                continue;
            }
            if let Some(descriptor) = self.descriptor(id) {
                pending.push((id.clone(), descriptor.entry_locator.clone()));
            }
        }

        for (id, _) in &pending {
            self.phases.insert(id.clone(), LifecycleState::Loading);
        }

        let resources = &self.resources;
        let outcomes =
            join_all(pending.iter().map(|(_, entry)| resources.load_script(entry))).await;

        for ((id, entry), outcome) in pending.into_iter().zip(outcomes) {
            self.phases.remove(&id);
            match outcome {
                Err(e) => self.fail(&id, e.into()),
                Ok(()) if !self.registry.contains(&id) => self.fail(
                    &id,
                    ExtensionError::RegistrationMissing {
                        id: id.clone(),
                        reason: format!("entry '{entry}' loaded without calling register"),
                    },
                ),
                Ok(()) => {}
            }
        }

        let position: HashMap<&str, usize> =
            order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();

        for (index, id) in order.iter().enumerate() {
            if self.registry.state(id) != Some(RegistrationState::Registered) {
                continue;
            }

            // A dependency ordered after `id` is the back edge of a cycle.
            let blocked = self.descriptor(id).and_then(|d| {
                d.dependencies
                    .iter()
                    .filter(|dep| self.descriptor(dep).is_some())
                    .filter(|dep| position.get(dep.as_str()).map_or(true, |&p| p < index))
                    .find(|dep| self.state(dep) != Some(LifecycleState::Ready))
                    .cloned()
            });
            if let Some(dependency) = blocked {
                self.fail(id, ExtensionError::DependencyFailed { id: id.clone(), dependency });
                continue;
            }

            self.initialize(id).await;
        }
    }

    async fn initialize(&self, id: &str) {
        let Some(init) = self.registry.initializer(id) else {
            self.fail(
                id,
                ExtensionError::RegistrationMissing {
                    id: id.to_string(),
                    reason: "registration has no initializer".to_string(),
                },
            );
            return;
        };

        self.registry.set_state(id, RegistrationState::Initializing);
        tracing::debug!(id, "Initializing extension");

        let host = HostApi::new(
            id,
            Arc::clone(&self.app_id),
            self.resources.clone(),
            self.events.clone(),
            self.settings.clone(),
            self.capabilities.clone(),
        );

        let future = match panic::catch_unwind(AssertUnwindSafe(|| init(host))) {
            Ok(future) => AssertUnwindSafe(future).catch_unwind(),
            Err(panic) => {
                self.fail(id, panicked(id, panic.as_ref()));
                return;
            }
        };

        let outcome = match self.init_timeout {
            Some(limit) => match tokio::time::timeout(limit, future).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.fail(id, ExtensionError::Timeout { id: id.to_string(), after: limit });
                    return;
                }
            },
            None => future.await,
        };

        match outcome {
            Ok(Ok(())) => {
                self.registry.set_state(id, RegistrationState::Ready);
                tracing::info!(id, "Extension ready");
                self.events.emit(&ready_event(id), json!({ "id": id }));
            }
            Ok(Err(e)) => self.fail(id, ExtensionError::init(id, &e)),
            Err(panic) => self.fail(id, panicked(id, panic.as_ref())),
        }
    }

    fn fail(&self, id: &str, error: ExtensionError) {
        tracing::error!(id, kind = %error.kind(), cause = %error, "Extension failed");
        self.registry.fail(id, error);
    }
}

/// Ids enabled by `overrides` (falling back to `enabledByDefault`), plus
/// every dependency they pull in.
pub fn resolve_enabled(
    descriptors: &[PluginDescriptor],
    overrides: Option<&dyn EnablementOverrides>,
) -> HashSet<String> {
    let graph = DependencyGraph::new(descriptors);
    let mut enabled = HashSet::new();

    for descriptor in descriptors {
        let wanted = overrides
            .and_then(|o| o.is_enabled(&descriptor.id))
            .unwrap_or(descriptor.enabled_by_default);
        if !wanted {
            continue;
        }
        for id in graph.closure(&descriptor.id) {
            if id != descriptor.id && !enabled.contains(&id) {
                tracing::debug!(%id, dependent = %descriptor.id, "Auto-enabling dependency");
            }
            enabled.insert(id);
        }
    }

    enabled
}

fn panicked(id: &str, panic: &(dyn std::any::Any + Send)) -> ExtensionError {
    ExtensionError::Init { id: id.to_string(), cause: format!("panicked: {}", panic_message(panic)) }
}

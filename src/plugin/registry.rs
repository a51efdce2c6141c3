//! Registration records for extensions that announced themselves.
//!
//! An extension's entry resource receives a [`Registrar`] while it is being
//! evaluated and calls [`Registrar::register`] with its id and initializer.
//! After that, only the runtime mutates the record.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{ExtensionError, ExtensionResult, HostApi, RegistrationState};

/// Future returned by an initializer.
pub type InitFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Type-erased initializer.
pub type InitFn = Arc<dyn Fn(HostApi) -> InitFuture + Send + Sync>;

/// What to do when an id registers a second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Last registration wins; a warning is logged.
    #[default]
    Replace,
    /// Keep the first registration and return an error.
    Reject,
}

struct PluginRegistration {
    init: Option<InitFn>,
    state: RegistrationState,
    error: Option<Arc<ExtensionError>>,
}

/// Point-in-time copy of a registration record.
#[derive(Debug, Clone)]
pub struct RegistrationSnapshot {
    pub id: String,
    pub state: RegistrationState,
    pub error: Option<Arc<ExtensionError>>,
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<String, PluginRegistration>,
    order: Vec<String>,
    policy: DuplicatePolicy,
}

/// Registrations keyed by id. Cloning yields another handle to the same
/// registry.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry").field("ids", &self.ids()).finish()
    }
}

impl PluginRegistry {
    /// Create an empty registry with the default duplicate policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with an explicit duplicate policy.
    pub fn with_policy(policy: DuplicatePolicy) -> Self {
        let registry = Self::default();
        registry.set_policy(policy);
        registry
    }

    pub(crate) fn set_policy(&self, policy: DuplicatePolicy) {
        self.inner.lock().policy = policy;
    }

    /// Register an initializer under `id`.
    pub fn register<F, Fut>(&self, id: impl Into<String>, init: F) -> ExtensionResult<()>
    where
        F: Fn(HostApi) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let init: InitFn = Arc::new(move |host| init(host).boxed());
        self.insert(id.into(), init)
    }

    fn insert(&self, id: String, init: InitFn) -> ExtensionResult<()> {
        let id = id.trim().to_string();
        if id.is_empty() {
            return Err(ExtensionError::RegistrationMissing {
                id,
                reason: "registration has an empty id".to_string(),
            });
        }

        let mut inner = self.inner.lock();
        if let Some(existing) = inner.entries.get(&id) {
            // A record past `Registered` has been handed to the runtime.
            if existing.state != RegistrationState::Registered
                || inner.policy == DuplicatePolicy::Reject
            {
                tracing::warn!(%id, kind = "DuplicateRegistrationWarning", "Rejecting duplicate registration");
                return Err(ExtensionError::DuplicateRegistration { id });
            }
            tracing::warn!(%id, kind = "DuplicateRegistrationWarning", "Replacing existing registration");
        } else {
            tracing::debug!(%id, "Extension registered");
        }

        inner.entries.insert(
            id,
            PluginRegistration { init: Some(init), state: RegistrationState::Registered, error: None },
        );
        Ok(())
    }

    /// Whether `id` has a registration record.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().entries.contains_key(id)
    }

    /// Current state of `id`.
    pub fn state(&self, id: &str) -> Option<RegistrationState> {
        self.inner.lock().entries.get(id).map(|r| r.state)
    }

    /// Error recorded for `id`, if it failed.
    pub fn error(&self, id: &str) -> Option<Arc<ExtensionError>> {
        self.inner.lock().entries.get(id).and_then(|r| r.error.clone())
    }

    /// All registrations, in manifest declaration order. Ids the manifest
    /// does not declare follow, sorted by id.
    pub fn all(&self) -> Vec<RegistrationSnapshot> {
        let inner = self.inner.lock();
        let snapshot = |id: &str, r: &PluginRegistration| RegistrationSnapshot {
            id: id.to_string(),
            state: r.state,
            error: r.error.clone(),
        };

        let mut all: Vec<_> = inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id).map(|r| snapshot(id, r)))
            .collect();

        let mut undeclared: Vec<_> =
            inner.entries.iter().filter(|(id, _)| !inner.order.contains(*id)).collect();
        undeclared.sort_by(|a, b| a.0.cmp(b.0));
        all.extend(undeclared.into_iter().map(|(id, r)| snapshot(id, r)));

        all
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.inner.lock().entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether nothing has registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn set_declaration_order(&self, order: Vec<String>) {
        self.inner.lock().order = order;
    }

    pub(crate) fn initializer(&self, id: &str) -> Option<InitFn> {
        self.inner.lock().entries.get(id).and_then(|r| r.init.clone())
    }

    pub(crate) fn set_state(&self, id: &str, state: RegistrationState) {
        if let Some(record) = self.inner.lock().entries.get_mut(id) {
            record.state = state;
        }
    }

    /// Mark `id` failed, synthesizing a record if it never registered.
    pub(crate) fn fail(&self, id: &str, error: ExtensionError) -> Arc<ExtensionError> {
        let error = Arc::new(error);
        let mut inner = self.inner.lock();
        let record = inner.entries.entry(id.to_string()).or_insert_with(|| PluginRegistration {
            init: None,
            state: RegistrationState::Failed,
            error: None,
        });
        record.state = RegistrationState::Failed;
        record.error = Some(Arc::clone(&error));
        error
    }
}

/// Session-scoped registration entry point handed to an entry resource while
/// it is evaluated. It stops accepting registrations once the load settles.
#[derive(Clone)]
pub struct Registrar {
    registry: PluginRegistry,
    locator: Arc<str>,
    open: Arc<AtomicBool>,
}

impl std::fmt::Debug for Registrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrar")
            .field("locator", &self.locator)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Registrar {
    pub(crate) fn open(registry: PluginRegistry, locator: &str) -> Self {
        Self { registry, locator: Arc::from(locator), open: Arc::new(AtomicBool::new(true)) }
    }

    /// Locator of the entry resource being evaluated.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Whether registrations are still accepted.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Register an extension's initializer.
    pub fn register<F, Fut>(&self, id: impl Into<String>, init: F) -> ExtensionResult<()>
    where
        F: Fn(HostApi) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = id.into();
        if !self.is_open() {
            tracing::warn!(%id, locator = %self.locator, "Registration after entry evaluation ignored");
            return Err(ExtensionError::RegistrationClosed { id });
        }
        self.registry.register(id, init)
    }

    pub(crate) fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_host: HostApi) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = PluginRegistry::new();
        registry.register("alpha", noop).unwrap();

        assert!(registry.contains("alpha"));
        assert_eq!(registry.state("alpha"), Some(RegistrationState::Registered));
        assert!(registry.initializer("alpha").is_some());
        assert!(registry.error("alpha").is_none());
    }

    #[test]
    fn test_empty_id_rejected() {
        let registry = PluginRegistry::new();
        let err = registry.register("  ", noop).unwrap_err();
        assert!(matches!(err, ExtensionError::RegistrationMissing { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_replaces_by_default() {
        let registry = PluginRegistry::new();
        registry.register("alpha", noop).unwrap();

        registry.register("alpha", noop).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.state("alpha"), Some(RegistrationState::Registered));
    }

    #[test]
    fn test_duplicate_after_initialization_rejected() {
        let registry = PluginRegistry::new();
        registry.register("alpha", noop).unwrap();
        registry.set_state("alpha", RegistrationState::Ready);

        let err = registry.register("alpha", noop).unwrap_err();
        assert!(matches!(err, ExtensionError::DuplicateRegistration { .. }));
        assert_eq!(registry.state("alpha"), Some(RegistrationState::Ready));
    }

    #[test]
    fn test_duplicate_rejected_by_policy() {
        let registry = PluginRegistry::with_policy(DuplicatePolicy::Reject);
        registry.register("alpha", noop).unwrap();

        let err = registry.register("alpha", noop).unwrap_err();
        assert!(matches!(err, ExtensionError::DuplicateRegistration { .. }));
    }

    #[test]
    fn test_all_follows_declaration_order() {
        let registry = PluginRegistry::new();
        registry.register("zeta", noop).unwrap();
        registry.register("beta", noop).unwrap();
        registry.register("alpha", noop).unwrap();
        registry.register("extra", noop).unwrap();
        registry.set_declaration_order(vec!["alpha".into(), "zeta".into(), "beta".into()]);

        let ids: Vec<_> = registry.all().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["alpha", "zeta", "beta", "extra"]);
        assert_eq!(registry.ids(), ["alpha", "beta", "extra", "zeta"]);
    }

    #[test]
    fn test_fail_synthesizes_record() {
        let registry = PluginRegistry::new();
        registry.fail(
            "ghost",
            ExtensionError::RegistrationMissing { id: "ghost".into(), reason: "no call".into() },
        );

        assert_eq!(registry.state("ghost"), Some(RegistrationState::Failed));
        assert!(registry.initializer("ghost").is_none());
        assert!(registry.error("ghost").is_some());
    }

    #[test]
    fn test_registrar_closes() {
        let registry = PluginRegistry::new();
        let registrar = Registrar::open(registry.clone(), "plugins/a.js");
        registrar.register("alpha", noop).unwrap();
        registrar.close();

        let err = registrar.register("beta", noop).unwrap_err();
        assert!(matches!(err, ExtensionError::RegistrationClosed { .. }));
        assert_eq!(registry.ids(), ["alpha"]);
    }
}

//! Memoized loading of script and style resources.
//!
//! Each locator is physically loaded at most once per cache. The first
//! request inserts a shared load future into the cache and every later
//! request, concurrent or not, awaits that same future. Failures are cached
//! too; only [`ResourceCache::reset`] allows a retry.

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;

use super::events::panic_message;
use super::{
    ExtensionResult, PluginRegistry, Registrar, ResourceKind, ResourceLoadError, ResourceState,
};

/// Extra attributes attached to a style element (`media`, `id`, ...).
pub type StyleAttributes = BTreeMap<String, String>;

/// Platform collaborator that actually fetches and executes resources.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    /// Fetch and execute a script. An entry script registers its extension
    /// through `registrar` while this call is running.
    async fn load_script(&self, locator: &str, registrar: Registrar) -> anyhow::Result<()>;

    /// Fetch and apply a stylesheet.
    async fn load_style(&self, locator: &str, attributes: &StyleAttributes) -> anyhow::Result<()>;
}

type LoadFuture = Shared<BoxFuture<'static, Result<(), ResourceLoadError>>>;

struct ResourceRecord {
    kind: ResourceKind,
    load: LoadFuture,
}

struct CacheInner {
    loader: Arc<dyn ResourceLoader>,
    registry: PluginRegistry,
    records: Mutex<HashMap<String, ResourceRecord>>,
}

/// Locator-keyed load cache. Cloning yields another handle to the same
/// cache.
#[derive(Clone)]
pub struct ResourceCache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache").field("records", &self.len()).finish()
    }
}

impl ResourceCache {
    /// Create a cache whose scripts register into `registry`.
    pub fn new(loader: Arc<dyn ResourceLoader>, registry: PluginRegistry) -> Self {
        Self {
            inner: Arc::new(CacheInner { loader, registry, records: Mutex::new(HashMap::new()) }),
        }
    }

    /// Load a script once; later calls share the outcome.
    pub async fn load_script(&self, locator: &str) -> Result<(), ResourceLoadError> {
        self.request(locator, ResourceKind::Script, None).await
    }

    /// Load a stylesheet once; later calls share the outcome. Only the
    /// attributes of the first request are applied.
    pub async fn load_style(
        &self,
        locator: &str,
        attributes: &StyleAttributes,
    ) -> Result<(), ResourceLoadError> {
        self.request(locator, ResourceKind::Style, Some(attributes)).await
    }

    /// Load `locators` one after another. Stops at the first failure; what
    /// already loaded stays loaded.
    pub async fn load_scripts_sequential<I, S>(&self, locators: I) -> ExtensionResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for locator in locators {
            self.load_script(locator.as_ref()).await?;
        }
        Ok(())
    }

    /// State of `locator`, or `None` if it was never requested.
    pub fn state(&self, locator: &str) -> Option<ResourceState> {
        let records = self.inner.records.lock();
        let record = records.get(locator)?;
        Some(match record.load.peek() {
            None => ResourceState::Pending,
            Some(Ok(())) => ResourceState::Loaded,
            Some(Err(_)) => ResourceState::Failed,
        })
    }

    /// Kind `locator` was first requested as.
    pub fn kind(&self, locator: &str) -> Option<ResourceKind> {
        self.inner.records.lock().get(locator).map(|r| r.kind)
    }

    /// Forget `locator` so the next request loads it again.
    pub fn reset(&self, locator: &str) -> bool {
        self.inner.records.lock().remove(locator).is_some()
    }

    /// Forget every locator.
    pub fn reset_all(&self) {
        self.inner.records.lock().clear();
    }

    /// Number of cached locators.
    pub fn len(&self) -> usize {
        self.inner.records.lock().len()
    }

    /// Whether nothing has been requested.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn request(
        &self,
        locator: &str,
        kind: ResourceKind,
        attributes: Option<&StyleAttributes>,
    ) -> LoadFuture {
        // Lookup and insert happen under one lock with no await in between.
        let mut records = self.inner.records.lock();
        if let Some(record) = records.get(locator) {
            if record.kind != kind {
                tracing::warn!(
                    locator,
                    cached = %record.kind,
                    requested = %kind,
                    "Locator already requested as a different kind, sharing the cached load"
                );
            }
            tracing::debug!(locator, "Resource cache hit");
            return record.load.clone();
        }

        let load = self.start_load(locator, kind, attributes.cloned().unwrap_or_default());
        records.insert(locator.to_string(), ResourceRecord { kind, load: load.clone() });
        load
    }

    fn start_load(
        &self,
        locator: &str,
        kind: ResourceKind,
        attributes: StyleAttributes,
    ) -> LoadFuture {
        let loader = Arc::clone(&self.inner.loader);
        let registry = self.inner.registry.clone();
        let locator = locator.to_string();

        async move {
            tracing::debug!(%locator, %kind, "Loading resource");
            let load = async {
                match kind {
                    ResourceKind::Script => {
                        let registrar = Registrar::open(registry, &locator);
                        let script = loader.load_script(&locator, registrar.clone());
                        let result = AssertUnwindSafe(script).catch_unwind().await;
                        registrar.close();
                        result
                    }
                    ResourceKind::Style => {
                        AssertUnwindSafe(loader.load_style(&locator, &attributes))
                            .catch_unwind()
                            .await
                    }
                }
            };

            // A panicking loader fails this resource only.
            let result = load.await.unwrap_or_else(|panic| {
                Err(anyhow::anyhow!("panicked: {}", panic_message(panic.as_ref())))
            });

            result.map_err(|e| {
                let error = ResourceLoadError { locator, kind, cause: format!("{e:#}") };
                tracing::warn!(locator = %error.locator, %kind, cause = %error.cause, "Resource failed to load");
                error
            })
        }
        .boxed()
        .shared()
    }
}

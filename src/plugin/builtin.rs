//! In-process resource loader for extensions compiled into the host binary.
//!
//! Script locators map to entry functions. "Executing" an entry calls the
//! function with the session [`Registrar`], exactly like a dynamically loaded
//! entry would call `register` during its evaluation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use super::{Registrar, ResourceLoader, StyleAttributes};

/// Entry function of a compiled-in extension.
pub type EntryPoint = Arc<dyn Fn(&Registrar) -> anyhow::Result<()> + Send + Sync>;

/// Table-driven [`ResourceLoader`].
#[derive(Default, Clone)]
pub struct StaticLoader {
    scripts: HashMap<String, EntryPoint>,
    styles: HashSet<String>,
}

impl std::fmt::Debug for StaticLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut scripts: Vec<_> = self.scripts.keys().collect();
        scripts.sort();
        f.debug_struct("StaticLoader").field("scripts", &scripts).field("styles", &self.styles).finish()
    }
}

impl StaticLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `locator` to an entry function.
    pub fn with_entry<F>(mut self, locator: impl Into<String>, entry: F) -> Self
    where
        F: Fn(&Registrar) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.scripts.insert(locator.into(), Arc::new(entry));
        self
    }

    /// Known script with no top-level effect (library code).
    pub fn with_script(self, locator: impl Into<String>) -> Self {
        self.with_entry(locator, |_| Ok(()))
    }

    /// Known stylesheet.
    pub fn with_style(mut self, locator: impl Into<String>) -> Self {
        self.styles.insert(locator.into());
        self
    }
}

#[async_trait]
impl ResourceLoader for StaticLoader {
    async fn load_script(&self, locator: &str, registrar: Registrar) -> anyhow::Result<()> {
        let entry = self
            .scripts
            .get(locator)
            .ok_or_else(|| anyhow::anyhow!("no script registered for '{locator}'"))?;
        entry(&registrar)
    }

    async fn load_style(&self, locator: &str, _attributes: &StyleAttributes) -> anyhow::Result<()> {
        if self.styles.contains(locator) {
            Ok(())
        } else {
            anyhow::bail!("no stylesheet registered for '{locator}'")
        }
    }
}

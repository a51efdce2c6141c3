//! Dependency-aware initialization ordering.
//!
//! Manifest order is the tie-break everywhere: with no declared dependencies
//! the initialization order is exactly the declaration order.

use std::collections::{HashMap, HashSet};

use super::PluginDescriptor;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Read-only view over the dependency edges of a manifest.
pub struct DependencyGraph<'a> {
    descriptors: &'a [PluginDescriptor],
    index: HashMap<&'a str, usize>,
}

impl<'a> DependencyGraph<'a> {
    /// Build the graph. Unknown dependency ids are reported and ignored.
    pub fn new(descriptors: &'a [PluginDescriptor]) -> Self {
        let index: HashMap<&str, usize> =
            descriptors.iter().enumerate().map(|(i, d)| (d.id.as_str(), i)).collect();

        for descriptor in descriptors {
            for dep in &descriptor.dependencies {
                if !index.contains_key(dep.as_str()) {
                    tracing::warn!(
                        id = %descriptor.id,
                        dependency = %dep,
                        "Ignoring dependency that is not declared in the manifest"
                    );
                }
            }
        }

        Self { descriptors, index }
    }

    fn get(&self, id: &str) -> Option<&'a PluginDescriptor> {
        self.index.get(id).map(|&i| &self.descriptors[i])
    }

    /// Order `selected` ids for initialization: manifest order, dependencies
    /// first. Ids outside `selected` are skipped.
    pub fn order(&self, selected: &HashSet<String>) -> Vec<String> {
        let mut marks = HashMap::new();
        let mut ordered = Vec::with_capacity(selected.len());

        for descriptor in self.descriptors {
            if selected.contains(&descriptor.id) {
                self.visit(&descriptor.id, Some(selected), &mut marks, &mut ordered);
            }
        }

        ordered
    }

    /// Transitive dependencies of `id`, in initialization order.
    pub fn dependencies(&self, id: &str) -> Vec<String> {
        let mut marks = HashMap::new();
        let mut ordered = Vec::new();
        self.visit(id, None, &mut marks, &mut ordered);
        ordered.retain(|dep| dep != id);
        ordered
    }

    /// `id` followed by everything it transitively depends on.
    pub fn closure(&self, id: &str) -> Vec<String> {
        let mut ids = self.dependencies(id);
        ids.insert(0, id.to_string());
        ids
    }

    /// Direct dependents of `id`, in manifest order.
    pub fn dependents(&self, id: &str) -> Vec<String> {
        self.descriptors
            .iter()
            .filter(|d| d.id != id && d.dependencies.iter().any(|dep| dep == id))
            .map(|d| d.id.clone())
            .collect()
    }

    fn visit(
        &self,
        id: &str,
        selected: Option<&HashSet<String>>,
        marks: &mut HashMap<String, Mark>,
        ordered: &mut Vec<String>,
    ) {
        match marks.get(id) {
            Some(Mark::Done) => return,
            Some(Mark::Visiting) => {
                tracing::warn!(id, "Circular dependency detected, breaking the cycle here");
                return;
            }
            None => {}
        }

        let Some(descriptor) = self.get(id) else {
            return;
        };

        marks.insert(id.to_string(), Mark::Visiting);
        for dep in &descriptor.dependencies {
            if !self.index.contains_key(dep.as_str()) {
                continue;
            }
            if selected.is_some_and(|set| !set.contains(dep)) {
                continue;
            }
            self.visit(dep, selected, marks, ordered);
        }
        marks.insert(id.to_string(), Mark::Done);
        ordered.push(id.to_string());
    }
}

use super::callable::Dependency;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Dependencies available to routes, keyed by the name `Param::depends`
/// refers to.
///
/// Keys are looked up at route registration; the resolved graph holds the
/// callables directly, so the registry is not consulted per request.
#[derive(Clone, Default, Debug)]
pub struct DependencyRegistry {
    deps: HashMap<Arc<str>, Dependency>,
}

impl DependencyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `dep` under its own name, returning any dependency it replaced.
    pub fn register(&mut self, dep: Dependency) -> Option<Dependency> {
        let key = Arc::clone(dep.name());
        debug!(key = %key, kind = ?dep.kind(), id = %dep.id(), "Dependency registered");
        let previous = self.deps.insert(key, dep);
        if let Some(prev) = &previous {
            warn!(key = %prev.name(), "Dependency re-registered, previous declaration replaced");
        }
        previous
    }

    #[must_use]
    pub fn with(mut self, dep: Dependency) -> Self {
        self.register(dep);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Dependency> {
        self.deps.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.deps.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.deps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.deps.keys().map(AsRef::as_ref)
    }
}

/// Per-route replacements, applied when the route's graph is built.
///
/// An override replaces the dependency wherever its key appears in the
/// route's tree, nested uses included.
#[derive(Clone, Default, Debug)]
pub struct Overrides {
    map: HashMap<Arc<str>, Dependency>,
}

impl Overrides {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<Arc<str>>, replacement: Dependency) -> Option<Dependency> {
        self.map.insert(key.into(), replacement)
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<Arc<str>>, replacement: Dependency) -> Self {
        self.insert(key, replacement);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Dependency> {
        self.map.get(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }
}

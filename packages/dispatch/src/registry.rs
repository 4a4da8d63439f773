use std::sync::Arc;

use dashmap::DashMap;

use crate::router::Router;

// ---------------------------------------------------------------------------
// RouterRegistry
// ---------------------------------------------------------------------------

/// Name-keyed registry of routers.
///
/// Written during setup, read once when the dispatcher starts. Registering a
/// name twice replaces the earlier router.
pub struct RouterRegistry {
    by_name: DashMap<Arc<str>, Arc<dyn Router>>,
}

impl RouterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
        }
    }

    /// Inserts `router` under `name`, returning the router it replaced.
    pub fn register(&self, name: &str, router: Arc<dyn Router>) -> Option<Arc<dyn Router>> {
        self.by_name.insert(Arc::from(name), router)
    }

    /// Retrieves a router by the name it was registered under.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Router>> {
        self.by_name.get(name).map(|entry| entry.value().clone())
    }

    /// Number of registered routers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns `true` if no router has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Copies out every entry, ordered by name so startup logs are stable.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Arc<str>, Arc<dyn Router>)> {
        let mut entries: Vec<_> = self
            .by_name
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

impl Default for RouterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

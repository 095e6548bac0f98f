//! The `services` family (§5): the set of distinct `service.name` values
//! observed so far. Deliberately the simplest family — no merge semantics
//! beyond set union, no HLL, no samples.

use std::collections::HashSet;

use parking_lot::RwLock;

#[derive(Default)]
pub struct ServiceRegistry {
    names: RwLock<HashSet<String>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, service: &str) {
        let already_known = self.names.read().contains(service);
        if !already_known {
            self.names.write().insert(service.to_string());
        }
    }

    /// Sorted, unique service names (§4.F `ListServices`).
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.read().iter().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, service: &str) -> bool {
        self.names.read().contains(service)
    }

    pub fn clear(&self) {
        self.names.write().clear();
    }
}

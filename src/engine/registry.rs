//! Backend registry.
//!
//! Central lookup for the backends the host can offer, keyed by backend id.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::error::{ExplorerError, ExplorerResult};
use crate::engine::traits::BackendFactory;

pub struct BackendRegistry {
    factories: HashMap<String, Arc<dyn BackendFactory>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers a factory under its `backend_id()`.
    pub fn register(&mut self, factory: Arc<dyn BackendFactory>) {
        let id = factory.backend_id().to_string();
        self.factories.insert(id, factory);
    }

    pub fn get(&self, backend_id: &str) -> ExplorerResult<Arc<dyn BackendFactory>> {
        self.factories
            .get(backend_id)
            .cloned()
            .ok_or_else(|| ExplorerError::backend_not_found(backend_id))
    }

    /// Ids of all registered backends, available or not.
    pub fn list(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    /// Ids of the backends the preference layer reports as usable.
    pub fn list_available(&self) -> Vec<&str> {
        self.factories
            .iter()
            .filter(|(_, factory)| factory.availability().available)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

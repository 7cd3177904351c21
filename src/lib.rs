// dbexplorer - Database introspection and row-level editing core
// Core library

pub mod engine;
pub mod explorer;
pub mod observability;

use std::sync::Arc;

use engine::drivers::mysql::MySqlFactory;
use engine::drivers::sqlite::SqliteFactory;
use engine::error::ExplorerResult;
use engine::registry::BackendRegistry;
use engine::types::ConnectionParams;
use explorer::ConnectionNode;

/// Entry point for hosts embedding the explorer: holds the backend registry
/// and mints connection roots for the tree view.
pub struct Explorer {
    registry: BackendRegistry,
}

impl Explorer {
    pub fn new() -> Self {
        let mut registry = BackendRegistry::new();

        registry.register(Arc::new(MySqlFactory));
        registry.register(Arc::new(SqliteFactory));

        Self { registry }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Ids of the backends that can be offered to the user.
    pub fn available_backends(&self) -> Vec<&str> {
        self.registry.list_available()
    }

    /// Root node for one connection target. No I/O happens until the node
    /// is expanded.
    pub fn connection(
        &self,
        backend_id: &str,
        params: ConnectionParams,
    ) -> ExplorerResult<Arc<ConnectionNode>> {
        let factory = self.registry.get(backend_id)?;
        Ok(ConnectionNode::new(factory, params))
    }
}

impl Default for Explorer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_knows_both_backends() {
        let explorer = Explorer::new();
        assert!(explorer.registry().get("mysql").is_ok());
        assert!(explorer.registry().get("sqlite").is_ok());
        assert!(explorer.registry().get("oracle").is_err());
    }

    #[test]
    fn connection_root_carries_params() {
        let explorer = Explorer::new();
        let params = ConnectionParams::new("db.example.com", "ana").with_port(3307);
        let node = explorer
            .connection("mysql", params)
            .expect("mysql factory is registered");
        assert_eq!(node.uri(), "dbexplorer://db.example.com:3307/ana");
        assert_eq!(node.display_name(), "ana@db.example.com");
    }
}

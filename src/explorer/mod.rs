//! Lazy node hierarchy exposed to the host IDE's tree view.
//!
//! Connection → Database → Table → Column. Each node fetches its children
//! when the UI expands it, sorts them case-insensitively for presentation
//! (the catalog itself never sorts), and downgrades an enumeration failure
//! into a single error entry so the tree renders a failure leaf instead of
//! crashing. Parent references are used for URI composition and
//! connection-parameter lookup.

use std::sync::{Arc, OnceLock};

use tracing::error;

use crate::engine::error::ExplorerResult;
use crate::engine::traits::{BackendFactory, DatabaseBackend};
use crate::engine::types::{ColumnInfo, ConnectionParams};

/// Child kinds understood by the host tree view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    Database,
    Table,
    Column,
    Error,
}

/// One entry of a `children()` listing: display label, kind, and the node to
/// expand next. Error entries carry no node.
pub struct ChildEntry {
    pub label: String,
    pub kind: ChildKind,
    pub node: Option<ExplorerChild>,
}

#[derive(Clone)]
pub enum ExplorerChild {
    Database(Arc<DatabaseNode>),
    Table(Arc<TableNode>),
    Column(Arc<ColumnNode>),
}

impl ExplorerChild {
    pub fn is_container(&self) -> bool {
        !matches!(self, ExplorerChild::Column(_))
    }

    pub fn uri(&self) -> String {
        match self {
            ExplorerChild::Database(node) => node.uri(),
            ExplorerChild::Table(node) => node.uri(),
            ExplorerChild::Column(node) => node.uri(),
        }
    }
}

fn error_children(err: impl std::fmt::Display) -> Vec<ChildEntry> {
    vec![ChildEntry {
        label: format!("Error: {}", err),
        kind: ChildKind::Error,
        node: None,
    }]
}

fn sort_for_display(entries: &mut [ChildEntry]) {
    entries.sort_by_key(|entry| entry.label.to_lowercase());
}

/// Root of one connection target's subtree.
pub struct ConnectionNode {
    factory: Arc<dyn BackendFactory>,
    params: ConnectionParams,
}

impl ConnectionNode {
    pub fn new(factory: Arc<dyn BackendFactory>, params: ConnectionParams) -> Arc<Self> {
        Arc::new(Self { factory, params })
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn factory(&self) -> &Arc<dyn BackendFactory> {
        &self.factory
    }

    pub fn display_name(&self) -> String {
        self.params.display_values()
    }

    pub fn uri(&self) -> String {
        self.params.uri()
    }

    pub fn is_container(&self) -> bool {
        true
    }

    pub async fn children(self: &Arc<Self>) -> Vec<ChildEntry> {
        let listed = match self.factory.open(&self.params, None) {
            Ok(backend) => backend.list_databases().await,
            Err(err) => Err(err),
        };
        match listed {
            Ok(names) => {
                let mut entries: Vec<ChildEntry> = names
                    .into_iter()
                    .map(|name| {
                        let node = Arc::new(DatabaseNode {
                            parent: Arc::clone(self),
                            name: name.clone(),
                        });
                        ChildEntry {
                            label: name,
                            kind: ChildKind::Database,
                            node: Some(ExplorerChild::Database(node)),
                        }
                    })
                    .collect();
                sort_for_display(&mut entries);
                entries
            }
            Err(err) => {
                error!("listing databases for {} failed: {}", self.uri(), err);
                error_children(err)
            }
        }
    }
}

pub struct DatabaseNode {
    parent: Arc<ConnectionNode>,
    name: String,
}

impl DatabaseNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection(&self) -> &Arc<ConnectionNode> {
        &self.parent
    }

    pub fn uri(&self) -> String {
        format!("{}/{}", self.parent.uri(), self.name)
    }

    pub fn is_container(&self) -> bool {
        true
    }

    pub async fn children(self: &Arc<Self>) -> Vec<ChildEntry> {
        let connection = &self.parent;
        let listed = match connection
            .factory
            .open(&connection.params, Some(&self.name))
        {
            Ok(backend) => backend.list_tables(&self.name).await,
            Err(err) => Err(err),
        };
        match listed {
            Ok(names) => {
                let mut entries: Vec<ChildEntry> = names
                    .into_iter()
                    .map(|name| {
                        let node = Arc::new(TableNode {
                            parent: Arc::clone(self),
                            name: name.clone(),
                            handle: OnceLock::new(),
                        });
                        ChildEntry {
                            label: name,
                            kind: ChildKind::Table,
                            node: Some(ExplorerChild::Table(node)),
                        }
                    })
                    .collect();
                sort_for_display(&mut entries);
                entries
            }
            Err(err) => {
                error!("listing tables for {} failed: {}", self.uri(), err);
                error_children(err)
            }
        }
    }
}

/// Row-access context bound to one table: the plain and backend-qualified
/// names plus the backend whose cache holds the table's column descriptions.
pub struct TableHandle {
    table: String,
    qualified: String,
    backend: Arc<dyn DatabaseBackend>,
}

impl TableHandle {
    fn new(table: String, backend: Arc<dyn DatabaseBackend>) -> Self {
        let qualified = backend.qualify_table(&table);
        Self {
            table,
            qualified,
            backend,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified
    }

    pub fn backend(&self) -> &Arc<dyn DatabaseBackend> {
        &self.backend
    }

    pub async fn columns(&self) -> ExplorerResult<Arc<[ColumnInfo]>> {
        self.backend.describe_table(&self.table).await
    }

    /// Per-column primary-key flags, in column order, for bulk delete.
    pub async fn key_mask(&self) -> ExplorerResult<Vec<bool>> {
        let columns = self.columns().await?;
        Ok(columns.iter().map(|col| col.is_primary_key).collect())
    }
}

pub struct TableNode {
    parent: Arc<DatabaseNode>,
    name: String,
    handle: OnceLock<TableHandle>,
}

impl TableNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> &Arc<DatabaseNode> {
        &self.parent
    }

    pub fn uri(&self) -> String {
        format!("{}/{}", self.parent.uri(), self.name)
    }

    pub fn is_container(&self) -> bool {
        true
    }

    /// Window title for the host's table view.
    pub fn view_title(&self) -> String {
        format!(
            "{}://{}/{} - Database Explorer",
            self.parent.parent.factory.display_name(),
            self.parent.name,
            self.name
        )
    }

    /// The row-access handle, constructed on first use and kept for the
    /// node's lifetime.
    pub fn handle(&self) -> ExplorerResult<&TableHandle> {
        if let Some(handle) = self.handle.get() {
            return Ok(handle);
        }
        let connection = &self.parent.parent;
        let backend = connection
            .factory
            .open(&connection.params, Some(&self.parent.name))?;
        let handle = TableHandle::new(self.name.clone(), backend);
        Ok(self.handle.get_or_init(move || handle))
    }

    pub async fn children(self: &Arc<Self>) -> Vec<ChildEntry> {
        let connection = &self.parent.parent;
        let listed = match connection
            .factory
            .open(&connection.params, Some(&self.parent.name))
        {
            Ok(backend) => backend.list_columns(&self.parent.name, &self.name).await,
            Err(err) => Err(err),
        };
        match listed {
            Ok(names) => {
                let mut entries: Vec<ChildEntry> = names
                    .into_iter()
                    .map(|name| {
                        let node = Arc::new(ColumnNode {
                            parent: Arc::clone(self),
                            name: name.clone(),
                        });
                        ChildEntry {
                            label: name,
                            kind: ChildKind::Column,
                            node: Some(ExplorerChild::Column(node)),
                        }
                    })
                    .collect();
                sort_for_display(&mut entries);
                entries
            }
            Err(err) => {
                error!("listing columns for {} failed: {}", self.uri(), err);
                error_children(err)
            }
        }
    }
}

/// Terminal node; columns have no children.
pub struct ColumnNode {
    parent: Arc<TableNode>,
    name: String,
}

impl ColumnNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &Arc<TableNode> {
        &self.parent
    }

    pub fn uri(&self) -> String {
        format!("{}/{}", self.parent.uri(), self.name)
    }

    pub fn is_container(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_sort_is_case_insensitive() {
        let mut entries = vec![
            ChildEntry {
                label: "Zeta".into(),
                kind: ChildKind::Database,
                node: None,
            },
            ChildEntry {
                label: "alpha".into(),
                kind: ChildKind::Database,
                node: None,
            },
            ChildEntry {
                label: "Beta".into(),
                kind: ChildKind::Database,
                node: None,
            },
        ];
        sort_for_display(&mut entries);
        let labels: Vec<&str> = entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["alpha", "Beta", "Zeta"]);
    }

    #[test]
    fn error_entries_have_no_node() {
        let entries = error_children("boom");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].label, "Error: boom");
        assert_eq!(entries[0].kind, ChildKind::Error);
        assert!(entries[0].node.is_none());
    }
}

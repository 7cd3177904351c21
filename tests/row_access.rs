//! Behavior of the shared row-access and node-layer logic, exercised through
//! an in-memory backend so no database server is required.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use dbexplorer::engine::error::{ExplorerError, ExplorerResult};
use dbexplorer::engine::format::{TypeProfile, MYSQL_TYPES};
use dbexplorer::engine::traits::{BackendFactory, DatabaseBackend, RowAccess, SchemaCatalog};
use dbexplorer::engine::types::{ColumnInfo, ConnectionParams, QueryOutput, Value};
use dbexplorer::explorer::{ChildKind, ConnectionNode, ExplorerChild};

/// In-memory backend: fixed catalog, row store keyed by the first key value,
/// and a recorder for delete attempts.
#[derive(Debug, Default)]
struct MemoryBackend {
    databases: Vec<String>,
    tables: Vec<String>,
    column_names: Vec<String>,
    columns: Vec<ColumnInfo>,
    fail_listing: bool,
    failing_key: Option<String>,
    rows: Mutex<HashMap<String, Vec<Value>>>,
    delete_attempts: Mutex<Vec<Vec<String>>>,
}

impl MemoryBackend {
    fn delete_attempts(&self) -> Vec<Vec<String>> {
        self.delete_attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SchemaCatalog for MemoryBackend {
    async fn list_databases(&self) -> ExplorerResult<Vec<String>> {
        if self.fail_listing {
            return Err(ExplorerError::connection("server is unreachable"));
        }
        Ok(self.databases.clone())
    }

    async fn list_tables(&self, _database: &str) -> ExplorerResult<Vec<String>> {
        if self.fail_listing {
            return Err(ExplorerError::query("permission denied"));
        }
        Ok(self.tables.clone())
    }

    async fn list_columns(&self, _database: &str, _table: &str) -> ExplorerResult<Vec<String>> {
        Ok(self.column_names.clone())
    }

    async fn list_index_names(&self, _database: &str) -> ExplorerResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn list_trigger_names(&self, _database: &str) -> ExplorerResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn describe_table(&self, _table: &str) -> ExplorerResult<Arc<[ColumnInfo]>> {
        Ok(Arc::from(self.columns.clone().into_boxed_slice()))
    }

    async fn clear_schema_cache(&self) {}
}

#[async_trait]
impl RowAccess for MemoryBackend {
    async fn fetch_row(
        &self,
        _table: &str,
        _key_names: &[String],
        key_values: &[Value],
        _convert_blobs: bool,
    ) -> ExplorerResult<(usize, Vec<String>)> {
        let key = key_values
            .first()
            .map(|v| v.display_string())
            .unwrap_or_default();
        let rows = self.rows.lock().unwrap();
        match rows.get(&key) {
            Some(values) => {
                let rendered: Vec<String> = values.iter().map(|v| v.display_string()).collect();
                Ok((rendered.len(), rendered))
            }
            None => Err(ExplorerError::query(format!("no row for key {:?}", key))),
        }
    }

    async fn delete_by_key(
        &self,
        _table: &str,
        _key_names: &[String],
        key_values: &[Value],
    ) -> bool {
        let shown: Vec<String> = key_values.iter().map(|v| v.display_string()).collect();
        self.delete_attempts.lock().unwrap().push(shown.clone());
        if let Some(bad) = &self.failing_key {
            if shown.iter().any(|v| v == bad) {
                return false;
            }
        }
        if let Some(first) = shown.first() {
            self.rows.lock().unwrap().remove(first);
        }
        true
    }

    async fn insert_row(
        &self,
        _table: &str,
        _names: &[String],
        values: &[Value],
    ) -> ExplorerResult<bool> {
        let key = values
            .first()
            .map(|v| v.display_string())
            .unwrap_or_default();
        self.rows.lock().unwrap().insert(key, values.to_vec());
        Ok(true)
    }

    async fn update_row(
        &self,
        _table: &str,
        _target_names: &[String],
        target_values: &[Value],
        _key_names: &[String],
        key_values: &[Value],
    ) -> bool {
        let key = key_values
            .first()
            .map(|v| v.display_string())
            .unwrap_or_default();
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&key) {
            Some(stored) => {
                for (slot, value) in stored.iter_mut().skip(1).zip(target_values) {
                    *slot = value.clone();
                }
                true
            }
            None => false,
        }
    }

    async fn run_query(&self, _sql: &str) -> ExplorerResult<QueryOutput> {
        Ok(QueryOutput {
            columns: self.column_names.clone(),
            rows: Vec::new(),
        })
    }

    async fn execute_action(&self, _sql: &str) -> ExplorerResult<bool> {
        Ok(true)
    }
}

#[async_trait]
impl DatabaseBackend for MemoryBackend {
    fn backend_id(&self) -> &'static str {
        "memory"
    }

    fn backend_name(&self) -> &'static str {
        "Memory"
    }

    fn qualify_table(&self, table: &str) -> String {
        table.to_string()
    }

    fn type_profile(&self) -> &'static TypeProfile {
        &MYSQL_TYPES
    }
}

struct MemoryFactory {
    backend: Arc<MemoryBackend>,
}

impl BackendFactory for MemoryFactory {
    fn backend_id(&self) -> &'static str {
        "memory"
    }

    fn display_name(&self) -> &'static str {
        "Memory"
    }

    fn open(
        &self,
        _params: &ConnectionParams,
        _database: Option<&str>,
    ) -> ExplorerResult<Arc<dyn DatabaseBackend>> {
        Ok(Arc::clone(&self.backend) as Arc<dyn DatabaseBackend>)
    }
}

fn people_columns() -> Vec<ColumnInfo> {
    vec![
        ColumnInfo::new("id", "int", false, None, None, true),
        ColumnInfo::new("name", "varchar", true, None, Some(255), false),
        ColumnInfo::new("photo", "blob", true, None, None, false),
    ]
}

fn seeded_backend() -> Arc<MemoryBackend> {
    let backend = MemoryBackend {
        databases: vec!["shop".into(), "Archive".into(), "analytics".into()],
        tables: vec!["Orders".into(), "customers".into()],
        column_names: vec!["id".into(), "name".into(), "photo".into()],
        columns: people_columns(),
        ..Default::default()
    };
    Arc::new(backend)
}

fn connection_for(backend: Arc<MemoryBackend>) -> Arc<ConnectionNode> {
    let factory = Arc::new(MemoryFactory { backend });
    ConnectionNode::new(factory, ConnectionParams::new("db.test", "ana").with_port(3306))
}

#[tokio::test]
async fn bulk_delete_reports_first_failure_and_keeps_going() {
    let backend = Arc::new(MemoryBackend {
        columns: people_columns(),
        column_names: vec!["id".into(), "name".into(), "photo".into()],
        failing_key: Some("2".into()),
        ..Default::default()
    });
    let names = vec!["id".to_string(), "name".to_string(), "photo".to_string()];
    let rows = vec![
        vec!["1".to_string(), "ana".to_string(), String::new()],
        vec!["2".to_string(), "bob".to_string(), String::new()],
        vec!["3".to_string(), "eve".to_string(), String::new()],
    ];
    let message = backend
        .delete_rows("people", &names, &rows, &[true, false, false])
        .await
        .expect("batch should run to completion");

    assert_eq!(message, "Failed to delete keys:id, values:2");
    // every row was attempted, including the ones after the failure
    assert_eq!(
        backend.delete_attempts(),
        vec![vec!["1".to_string()], vec!["2".to_string()], vec!["3".to_string()]]
    );
}

#[tokio::test]
async fn bulk_delete_requires_a_key_column() {
    let backend = seeded_backend();
    let names = vec!["id".to_string(), "name".to_string()];
    let rows = vec![vec!["1".to_string(), "ana".to_string()]];
    let err = backend
        .delete_rows("people", &names, &rows, &[false, false])
        .await
        .unwrap_err();
    assert!(matches!(err, ExplorerError::NoKeyColumns(_)));
    assert!(backend.delete_attempts().is_empty());
}

#[tokio::test]
async fn row_identity_prefers_primary_keys() {
    let backend = seeded_backend();
    let row = vec!["7".to_string(), "ana".to_string(), "binary".to_string()];
    let (condition, values) = backend
        .resolve_row_identity("people", &row)
        .await
        .expect("identity should resolve");
    assert_eq!(condition, "id = ?");
    assert_eq!(values, vec![Value::Text("7".into())]);
}

#[tokio::test]
async fn row_identity_falls_back_to_non_blob_columns() {
    let mut backend = MemoryBackend::default();
    backend.columns = vec![
        ColumnInfo::new("name", "varchar", true, None, Some(255), false),
        ColumnInfo::new("photo", "blob", true, None, None, false),
    ];
    let backend = Arc::new(backend);
    let row = vec!["ana".to_string(), "binary".to_string()];
    let (condition, values) = backend
        .resolve_row_identity("people", &row)
        .await
        .expect("identity should resolve");
    assert_eq!(condition, "name = ?");
    assert_eq!(values, vec![Value::Text("ana".into())]);
}

#[tokio::test]
async fn inserted_row_can_be_fetched_back() {
    let backend = seeded_backend();
    let names: Vec<String> = vec!["id".into(), "name".into(), "photo".into()];
    let values = vec![
        Value::Int(7),
        Value::Text("ana".into()),
        Value::Bytes(b"jpeg".to_vec()),
    ];
    let inserted = backend
        .insert_row("people", &names, &values)
        .await
        .expect("insert should succeed");
    assert!(inserted);

    let (width, row) = backend
        .fetch_row("people", &names[..1], &[Value::Int(7)], false)
        .await
        .expect("row should exist");
    assert_eq!(width, 3);
    assert_eq!(row, vec!["7".to_string(), "ana".to_string(), "jpeg".to_string()]);
}

#[tokio::test]
async fn tree_children_are_sorted_case_insensitively() {
    let connection = connection_for(seeded_backend());
    let databases = connection.children().await;
    let labels: Vec<&str> = databases.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, vec!["analytics", "Archive", "shop"]);
    assert!(databases.iter().all(|e| e.kind == ChildKind::Database));

    let first = match &databases[0].node {
        Some(ExplorerChild::Database(node)) => Arc::clone(node),
        other => panic!("expected a database node, got {:?}", other.is_some()),
    };
    let tables = first.children().await;
    let labels: Vec<&str> = tables.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, vec!["customers", "Orders"]);
}

#[tokio::test]
async fn node_uris_extend_the_connection_uri() {
    let connection = connection_for(seeded_backend());
    assert_eq!(connection.uri(), "dbexplorer://db.test:3306/ana");

    let databases = connection.children().await;
    let shop = databases
        .iter()
        .find(|e| e.label == "shop")
        .and_then(|e| match &e.node {
            Some(ExplorerChild::Database(node)) => Some(Arc::clone(node)),
            _ => None,
        })
        .expect("shop database node");
    assert_eq!(shop.uri(), "dbexplorer://db.test:3306/ana/shop");

    let tables = shop.children().await;
    let orders = tables
        .iter()
        .find(|e| e.label == "Orders")
        .and_then(|e| match &e.node {
            Some(ExplorerChild::Table(node)) => Some(Arc::clone(node)),
            _ => None,
        })
        .expect("Orders table node");
    assert_eq!(orders.uri(), "dbexplorer://db.test:3306/ana/shop/Orders");
    assert_eq!(orders.view_title(), "Memory://shop/Orders - Database Explorer");

    let columns = orders.children().await;
    assert_eq!(columns.len(), 3);
    assert!(columns.iter().all(|e| e.kind == ChildKind::Column));
}

#[tokio::test]
async fn listing_failure_becomes_a_single_error_child() {
    let backend = Arc::new(MemoryBackend {
        fail_listing: true,
        ..Default::default()
    });
    let connection = connection_for(backend);
    let children = connection.children().await;
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].kind, ChildKind::Error);
    assert!(children[0].label.starts_with("Error: "));
    assert!(children[0].label.contains("unreachable"));
    assert!(children[0].node.is_none());
}

#[tokio::test]
async fn table_handle_is_built_once_and_reused() {
    let connection = connection_for(seeded_backend());
    let databases = connection.children().await;
    let db = match &databases[0].node {
        Some(ExplorerChild::Database(node)) => Arc::clone(node),
        _ => panic!("expected a database node"),
    };
    let tables = db.children().await;
    let table = match &tables[0].node {
        Some(ExplorerChild::Table(node)) => Arc::clone(node),
        _ => panic!("expected a table node"),
    };

    let first = table.handle().expect("handle should open") as *const _;
    let second = table.handle().expect("handle should open") as *const _;
    assert_eq!(first, second);

    let handle = table.handle().expect("handle should open");
    assert_eq!(handle.qualified_name(), "customers");
    let mask = handle.key_mask().await.expect("columns should describe");
    assert_eq!(mask, vec![true, false, false]);
}

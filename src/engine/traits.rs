//! Capability traits every relational backend must satisfy.
//!
//! `SchemaCatalog` covers metadata introspection, `RowAccess` covers
//! row-level CRUD, and `DatabaseBackend` ties the two together with the
//! backend-specific pieces (identifier qualification, type profile). Shared
//! behavior lives in default-implemented methods rather than a base type.

use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::dml;
use crate::engine::error::{ExplorerError, ExplorerResult};
use crate::engine::format::TypeProfile;
use crate::engine::types::{
    BackendAvailability, ColumnInfo, ConnectionParams, QueryOutput, Value,
};

/// Metadata introspection over one connection target.
///
/// Listing operations return names exactly as the backend reports them,
/// unsorted — presentation order is the node layer's job. Any connectivity or
/// query failure propagates to the caller.
#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    /// Schemas containing at least one base table.
    async fn list_databases(&self) -> ExplorerResult<Vec<String>>;

    /// Base tables of the named database.
    async fn list_tables(&self, database: &str) -> ExplorerResult<Vec<String>>;

    /// Column names in backend order, not guaranteed sorted.
    async fn list_columns(&self, database: &str, table: &str) -> ExplorerResult<Vec<String>>;

    async fn list_index_names(&self, database: &str) -> ExplorerResult<Vec<String>>;

    async fn list_trigger_names(&self, database: &str) -> ExplorerResult<Vec<String>>;

    /// Merged column descriptions for a table of the bound database, cached
    /// by table name. Rejects table names containing a statement separator
    /// with [`ExplorerError::UnsafeIdentifier`] before issuing any query.
    async fn describe_table(&self, table: &str) -> ExplorerResult<Arc<[ColumnInfo]>>;

    /// Invalidates cached descriptions after a schema change.
    async fn clear_schema_cache(&self);
}

/// Row-level CRUD against one connection target.
///
/// The failure policy is per-operation: `delete_by_key` and `update_row`
/// swallow backend errors and report a boolean, `insert_row`, `run_query` and
/// `execute_action` propagate them. Callers of the boolean operations must
/// check the result.
#[async_trait]
pub trait RowAccess: Send + Sync {
    /// `SELECT * FROM <qualified table> WHERE k1 = ? AND ...` bound to
    /// `key_values` in `key_names` order. Nulls render as empty strings; blob
    /// columns render as `"<BLOB: N chars>"` when `convert_blobs` is set.
    /// Returns the column count alongside the stringified row.
    async fn fetch_row(
        &self,
        table: &str,
        key_names: &[String],
        key_values: &[Value],
        convert_blobs: bool,
    ) -> ExplorerResult<(usize, Vec<String>)>;

    /// Deletes the row matching all keys; commits. Failures are logged and
    /// reported as `false`, never raised.
    async fn delete_by_key(&self, table: &str, key_names: &[String], key_values: &[Value])
        -> bool;

    /// Inserts one row; commits. Backend failures propagate.
    async fn insert_row(
        &self,
        table: &str,
        names: &[String],
        values: &[Value],
    ) -> ExplorerResult<bool>;

    /// `UPDATE ... SET targets WHERE keys`, binding target values then key
    /// values. Failures are logged and reported as `false`.
    async fn update_row(
        &self,
        table: &str,
        target_names: &[String],
        target_values: &[Value],
        key_names: &[String],
        key_values: &[Value],
    ) -> bool;

    /// Runs a free-form query and returns display-formatted rows. Failures
    /// propagate.
    async fn run_query(&self, sql: &str) -> ExplorerResult<QueryOutput>;

    /// Runs one statement with commit-on-write. Failures propagate.
    async fn execute_action(&self, sql: &str) -> ExplorerResult<bool>;

    /// Deletes a batch of UI-selected rows keyed by the columns flagged in
    /// `key_mask`. Returns the message of the first failure only (an empty
    /// string means total success); later rows are still attempted after a
    /// failure. The batch is not atomic.
    async fn delete_rows(
        &self,
        table: &str,
        column_names: &[String],
        rows: &[Vec<String>],
        key_mask: &[bool],
    ) -> ExplorerResult<String> {
        let keyed: Vec<(usize, &String)> = column_names
            .iter()
            .enumerate()
            .filter(|(idx, _)| key_mask.get(*idx).copied().unwrap_or(false))
            .collect();
        if keyed.is_empty() {
            return Err(ExplorerError::no_key_columns(
                "no columns are keys, cannot delete",
            ));
        }

        let key_names: Vec<String> = keyed.iter().map(|(_, name)| (*name).clone()).collect();
        let mut first_failure = String::new();
        for row in rows {
            let key_values: Vec<Value> = keyed
                .iter()
                .map(|(idx, _)| Value::Text(row.get(*idx).cloned().unwrap_or_default()))
                .collect();
            let deleted = self.delete_by_key(table, &key_names, &key_values).await;
            if !deleted && first_failure.is_empty() {
                let shown: Vec<String> =
                    key_values.iter().map(|v| v.display_string()).collect();
                first_failure = format!(
                    "Failed to delete keys:{}, values:{}",
                    key_names.join(", "),
                    shown.join(", ")
                );
            }
        }
        Ok(first_failure)
    }
}

/// One concrete backend: catalog plus row access plus the pieces that differ
/// per engine.
#[async_trait]
pub trait DatabaseBackend: SchemaCatalog + RowAccess + std::fmt::Debug {
    /// Stable identifier, e.g. "mysql", "sqlite".
    fn backend_id(&self) -> &'static str;

    /// Human-readable engine name for titles and labels.
    fn backend_name(&self) -> &'static str;

    /// Applies the backend's qualification rule to a table name. This is the
    /// single place a database prefix is attached.
    fn qualify_table(&self, table: &str) -> String;

    /// The classification table driving value formatting for this backend.
    fn type_profile(&self) -> &'static TypeProfile;

    /// Derives the identifying condition for a row whose key set is unknown,
    /// from the cached column descriptions. See [`dml::row_identity`] for the
    /// fallback semantics and their limits.
    async fn resolve_row_identity(
        &self,
        table: &str,
        row: &[String],
    ) -> ExplorerResult<(String, Vec<Value>)> {
        let columns = self.describe_table(table).await?;
        dml::row_identity(&columns, self.type_profile(), row)
    }
}

/// Constructs backend instances for connection targets.
///
/// Opening is cheap and performs no I/O: every catalog or row operation
/// acquires its own scoped connection internally.
pub trait BackendFactory: Send + Sync {
    fn backend_id(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    /// Whether the backend can be offered to the user, per host
    /// configuration.
    fn availability(&self) -> BackendAvailability {
        BackendAvailability::available()
    }

    /// Binds a backend to the target, optionally scoped to one database.
    fn open(
        &self,
        params: &ConnectionParams,
        database: Option<&str>,
    ) -> ExplorerResult<Arc<dyn DatabaseBackend>>;
}

//! SQLite backend.
//!
//! The database file path travels in `ConnectionParams::database`; attached
//! schemas ("main", "temp", anything ATTACHed) play the role other engines
//! give to databases. Object kinds are filtered through `sqlite_master.type`,
//! and `pragma_table_info` supplies the key mask directly, so no separate
//! index query is needed.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo};
use tracing::{debug, error};

use crate::engine::cache::ColumnCache;
use crate::engine::dml;
use crate::engine::error::{ExplorerError, ExplorerResult};
use crate::engine::format::{self, TypeProfile, SQLITE_TYPES};
use crate::engine::traits::{BackendFactory, DatabaseBackend, RowAccess, SchemaCatalog};
use crate::engine::types::{ColumnInfo, ConnectionParams, QueryOutput, Value};

/// Registry entry for SQLite.
pub struct SqliteFactory;

impl BackendFactory for SqliteFactory {
    fn backend_id(&self) -> &'static str {
        "sqlite"
    }

    fn display_name(&self) -> &'static str {
        "SQLite"
    }

    fn open(
        &self,
        params: &ConnectionParams,
        database: Option<&str>,
    ) -> ExplorerResult<Arc<dyn DatabaseBackend>> {
        if params.database.is_none() {
            return Err(ExplorerError::connection(
                "sqlite requires a database file path",
            ));
        }
        Ok(Arc::new(SqliteBackend::new(
            params.clone(),
            database.map(str::to_string),
        )))
    }
}

/// SQLite backend bound to one database file, optionally scoped to an
/// attached schema.
#[derive(Debug)]
pub struct SqliteBackend {
    params: ConnectionParams,
    database: Option<String>,
    cache: ColumnCache,
}

impl SqliteBackend {
    pub fn new(params: ConnectionParams, database: Option<String>) -> Self {
        Self {
            params,
            database,
            cache: ColumnCache::new(),
        }
    }

    fn connect_options(&self) -> ExplorerResult<SqliteConnectOptions> {
        let path = self.params.database.as_deref().ok_or_else(|| {
            ExplorerError::connection("sqlite requires a database file path")
        })?;
        Ok(SqliteConnectOptions::new().filename(path))
    }

    async fn connect_scoped(&self) -> ExplorerResult<SqliteConnection> {
        self.connect_options()?
            .connect()
            .await
            .map_err(|e| ExplorerError::connection(e.to_string()))
    }

    fn bound_database(&self) -> &str {
        self.database.as_deref().unwrap_or("main")
    }

    /// `<schema>.sqlite_master` filtered by object kind. The schema name is
    /// interpolated (it comes from `pragma_database_list`), the kind is
    /// bound.
    async fn list_objects_of_kind(
        &self,
        database: &str,
        kind: &str,
    ) -> ExplorerResult<Vec<String>> {
        dml::ensure_safe_identifier(database)?;
        let sql = format!(
            "SELECT name FROM {}.sqlite_master WHERE type = ? AND name NOT LIKE 'sqlite_%'",
            database
        );
        let mut conn = self.connect_scoped().await?;
        let names = sqlx::query_scalar::<_, String>(&sql)
            .bind(kind)
            .fetch_all(&mut conn)
            .await?;
        let _ = conn.close().await;
        Ok(names)
    }

    fn bind_value<'q>(
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        value: &'q Value,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        match value {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(b),
            Value::Int(i) => query.bind(i),
            Value::Float(f) => query.bind(f),
            Value::Text(s) => query.bind(s),
            Value::Bytes(b) => query.bind(b),
            Value::Json(j) => query.bind(j),
        }
    }

    /// SQLite stores only integers, reals, text, and blobs; the chain is
    /// short.
    fn extract_value(row: &SqliteRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(Value::Int).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v.map(Value::Float).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Value::Text).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return v.map(Value::Bytes).unwrap_or(Value::Null);
        }
        Value::Null
    }

    fn row_values(row: &SqliteRow) -> Vec<Value> {
        (0..row.columns().len())
            .map(|idx| Self::extract_value(row, idx))
            .collect()
    }

    async fn try_delete(
        &self,
        table: &str,
        key_names: &[String],
        key_values: &[Value],
    ) -> ExplorerResult<()> {
        let qualified = self.qualify_table(table);
        let sql = dml::build_delete(&qualified, key_names)?;
        let mut conn = self.connect_scoped().await?;
        let mut query = sqlx::query(&sql);
        for value in key_values {
            query = Self::bind_value(query, value);
        }
        query.execute(&mut conn).await?;
        let _ = conn.close().await;
        Ok(())
    }

    async fn try_update(
        &self,
        table: &str,
        target_names: &[String],
        target_values: &[Value],
        key_names: &[String],
        key_values: &[Value],
    ) -> ExplorerResult<()> {
        let qualified = self.qualify_table(table);
        let sql = dml::build_update(&qualified, target_names, key_names)?;
        let mut conn = self.connect_scoped().await?;
        let mut query = sqlx::query(&sql);
        for value in target_values.iter().chain(key_values) {
            query = Self::bind_value(query, value);
        }
        query.execute(&mut conn).await?;
        let _ = conn.close().await;
        Ok(())
    }
}

/// Builds column descriptions from `pragma_table_info` rows:
/// (name, declared type, notnull, default, pk ordinal).
fn columns_from_table_info(rows: Vec<(String, String, i64, Option<String>, i64)>) -> Vec<ColumnInfo> {
    rows.into_iter()
        .map(|(name, type_name, notnull, default_value, pk)| {
            ColumnInfo::new(name, type_name, notnull == 0, default_value, None, pk > 0)
        })
        .collect()
}

#[async_trait]
impl SchemaCatalog for SqliteBackend {
    async fn list_databases(&self) -> ExplorerResult<Vec<String>> {
        let mut conn = self.connect_scoped().await?;
        let names = sqlx::query_scalar::<_, String>("SELECT name FROM pragma_database_list")
            .fetch_all(&mut conn)
            .await?;
        let _ = conn.close().await;
        Ok(names)
    }

    async fn list_tables(&self, database: &str) -> ExplorerResult<Vec<String>> {
        self.list_objects_of_kind(database, "table").await
    }

    async fn list_columns(&self, database: &str, table: &str) -> ExplorerResult<Vec<String>> {
        let mut conn = self.connect_scoped().await?;
        let names = sqlx::query_scalar::<_, String>("SELECT name FROM pragma_table_info(?, ?)")
            .bind(table)
            .bind(database)
            .fetch_all(&mut conn)
            .await?;
        let _ = conn.close().await;
        Ok(names)
    }

    async fn list_index_names(&self, database: &str) -> ExplorerResult<Vec<String>> {
        self.list_objects_of_kind(database, "index").await
    }

    async fn list_trigger_names(&self, database: &str) -> ExplorerResult<Vec<String>> {
        self.list_objects_of_kind(database, "trigger").await
    }

    async fn describe_table(&self, table: &str) -> ExplorerResult<Arc<[ColumnInfo]>> {
        dml::ensure_safe_identifier(table)?;
        let database = self.bound_database().to_string();
        let table_name = table.to_string();
        self.cache
            .get_or_load(table, move || async move {
                debug!("describing {}.{}", database, table_name);
                let mut conn = self.connect_scoped().await?;
                let rows: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
                    "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?, ?)",
                )
                .bind(&table_name)
                .bind(&database)
                .fetch_all(&mut conn)
                .await?;
                let _ = conn.close().await;
                Ok(columns_from_table_info(rows))
            })
            .await
    }

    async fn clear_schema_cache(&self) {
        self.cache.clear().await;
    }
}

#[async_trait]
impl RowAccess for SqliteBackend {
    async fn fetch_row(
        &self,
        table: &str,
        key_names: &[String],
        key_values: &[Value],
        convert_blobs: bool,
    ) -> ExplorerResult<(usize, Vec<String>)> {
        let qualified = self.qualify_table(table);
        let sql = dml::build_select(&qualified, key_names)?;

        let mut conn = self.connect_scoped().await?;
        let mut query = sqlx::query(&sql);
        for value in key_values {
            query = Self::bind_value(query, value);
        }
        let row = query.fetch_optional(&mut conn).await?;
        let _ = conn.close().await;

        let row = row.ok_or_else(|| {
            ExplorerError::query(format!("no row matches the given key in {}", qualified))
        })?;
        let values = Self::row_values(&row);

        let columns = if convert_blobs {
            Some(self.describe_table(table).await?)
        } else {
            None
        };
        let cells: Vec<String> = values
            .iter()
            .enumerate()
            .map(|(idx, value)| {
                if value.is_null() {
                    return String::new();
                }
                let is_blob = columns
                    .as_deref()
                    .and_then(|cols| cols.get(idx))
                    .map(|col| SQLITE_TYPES.is_blob(&col.type_name))
                    .unwrap_or(false);
                if is_blob {
                    format::blob_placeholder(value)
                } else {
                    value.display_string()
                }
            })
            .collect();
        Ok((cells.len(), cells))
    }

    async fn delete_by_key(
        &self,
        table: &str,
        key_names: &[String],
        key_values: &[Value],
    ) -> bool {
        match self.try_delete(table, key_names, key_values).await {
            Ok(()) => true,
            Err(err) => {
                error!("delete_by_key failed on {}: {}", table, err);
                false
            }
        }
    }

    async fn insert_row(
        &self,
        table: &str,
        names: &[String],
        values: &[Value],
    ) -> ExplorerResult<bool> {
        let qualified = self.qualify_table(table);
        let sql = dml::build_insert(&qualified, names)?;
        let mut conn = self.connect_scoped().await?;
        let mut query = sqlx::query(&sql);
        for value in values {
            query = Self::bind_value(query, value);
        }
        query.execute(&mut conn).await?;
        let _ = conn.close().await;
        Ok(true)
    }

    async fn update_row(
        &self,
        table: &str,
        target_names: &[String],
        target_values: &[Value],
        key_names: &[String],
        key_values: &[Value],
    ) -> bool {
        match self
            .try_update(table, target_names, target_values, key_names, key_values)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                error!("update_row failed on {}: {}", table, err);
                false
            }
        }
    }

    async fn run_query(&self, sql: &str) -> ExplorerResult<QueryOutput> {
        let mut conn = self.connect_scoped().await?;
        let rows: Vec<SqliteRow> = sqlx::query(sql).fetch_all(&mut conn).await?;
        let _ = conn.close().await;

        if rows.is_empty() {
            return Ok(QueryOutput {
                columns: Vec::new(),
                rows: Vec::new(),
            });
        }

        let columns: Vec<String> = rows[0]
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect();
        let type_names: Vec<String> = rows[0]
            .columns()
            .iter()
            .map(|col| col.type_info().name().to_lowercase())
            .collect();
        let formatted = rows
            .iter()
            .map(|row| format::format_row(&SQLITE_TYPES, &type_names, &Self::row_values(row)))
            .collect();

        Ok(QueryOutput {
            columns,
            rows: formatted,
        })
    }

    async fn execute_action(&self, sql: &str) -> ExplorerResult<bool> {
        let mut conn = self.connect_scoped().await?;
        sqlx::query(sql).execute(&mut conn).await?;
        let _ = conn.close().await;
        Ok(true)
    }
}

#[async_trait]
impl DatabaseBackend for SqliteBackend {
    fn backend_id(&self) -> &'static str {
        "sqlite"
    }

    fn backend_name(&self) -> &'static str {
        "SQLite"
    }

    /// Only attached non-main schemas need a prefix.
    fn qualify_table(&self, table: &str) -> String {
        match self.database.as_deref() {
            Some(database) if database != "main" => format!("{}.{}", database, table),
            _ => table.to_string(),
        }
    }

    fn type_profile(&self) -> &'static TypeProfile {
        &SQLITE_TYPES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_info_rows_carry_the_key_mask_directly() {
        let rows = vec![
            ("id".to_string(), "INTEGER".to_string(), 1, None, 1),
            (
                "label".to_string(),
                "TEXT".to_string(),
                0,
                Some("'x'".to_string()),
                0,
            ),
        ];
        let columns = columns_from_table_info(rows);
        assert!(columns[0].is_primary_key);
        assert!(!columns[0].nullable);
        assert_eq!(columns[0].type_name, "integer");
        assert!(!columns[1].is_primary_key);
        assert!(columns[1].nullable);
        assert!(columns[1].has_default);
    }

    #[test]
    fn only_attached_schemas_are_prefixed() {
        let params = ConnectionParams::new("localhost", "ide").with_database("/tmp/app.db");
        let main = SqliteBackend::new(params.clone(), Some("main".to_string()));
        assert_eq!(main.qualify_table("notes"), "notes");

        let attached = SqliteBackend::new(params, Some("archive".to_string()));
        assert_eq!(attached.qualify_table("notes"), "archive.notes");
    }

    #[test]
    fn factory_requires_a_file_path() {
        let err = SqliteFactory
            .open(&ConnectionParams::new("localhost", "ide"), None)
            .expect_err("must reject");
        assert!(matches!(err, ExplorerError::Connection(_)));
    }
}

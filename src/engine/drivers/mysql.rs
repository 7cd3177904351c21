//! MySQL backend.
//!
//! Implements the catalog and row-access contracts over `information_schema`
//! using SQLx. Every operation opens one scoped connection, performs its
//! round-trips, and releases it before returning; a connection that exits
//! early through an error is released on drop. Writes autocommit per
//! statement.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo};
use tracing::{debug, error};

use crate::engine::cache::ColumnCache;
use crate::engine::dml;
use crate::engine::error::{ExplorerError, ExplorerResult};
use crate::engine::format::{self, TypeProfile, MYSQL_TYPES};
use crate::engine::traits::{BackendFactory, DatabaseBackend, RowAccess, SchemaCatalog};
use crate::engine::types::{ColumnInfo, ConnectionParams, QueryOutput, Value};

/// Registry entry for MySQL / MariaDB.
pub struct MySqlFactory;

impl BackendFactory for MySqlFactory {
    fn backend_id(&self) -> &'static str {
        "mysql"
    }

    fn display_name(&self) -> &'static str {
        "MySQL"
    }

    fn open(
        &self,
        params: &ConnectionParams,
        database: Option<&str>,
    ) -> ExplorerResult<Arc<dyn DatabaseBackend>> {
        Ok(Arc::new(MySqlBackend::new(
            params.clone(),
            database.map(str::to_string),
        )))
    }
}

/// MySQL backend bound to one connection target, optionally scoped to a
/// database.
#[derive(Debug)]
pub struct MySqlBackend {
    params: ConnectionParams,
    database: Option<String>,
    cache: ColumnCache,
}

// All metadata comes from information_schema. The CASTs avoid the BINARY
// column type that MySQL 8 reports for schema columns, which does not decode
// as a Rust String.
const DATABASES_QUERY: &str = "\
    SELECT DISTINCT CAST(TABLE_SCHEMA AS CHAR) \
    FROM information_schema.TABLES \
    WHERE TABLE_TYPE = 'BASE TABLE'";

const TABLES_QUERY: &str = "\
    SELECT CAST(TABLE_NAME AS CHAR) \
    FROM information_schema.TABLES \
    WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_SCHEMA = ?";

const COLUMN_NAMES_QUERY: &str = "\
    SELECT CAST(COLUMN_NAME AS CHAR) \
    FROM information_schema.COLUMNS \
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?";

const INDEXES_QUERY: &str = "\
    SELECT DISTINCT CAST(INDEX_NAME AS CHAR) \
    FROM information_schema.STATISTICS \
    WHERE TABLE_SCHEMA = ?";

const TRIGGERS_QUERY: &str = "\
    SELECT CAST(TRIGGER_NAME AS CHAR) \
    FROM information_schema.TRIGGERS \
    WHERE TRIGGER_SCHEMA = ?";

const KEY_COLUMNS_QUERY: &str = "\
    SELECT CAST(COLUMN_NAME AS CHAR) \
    FROM information_schema.COLUMNS \
    WHERE TABLE_NAME = ? AND TABLE_SCHEMA = ? AND COLUMN_KEY = 'PRI'";

const DESCRIBE_QUERY: &str = "\
    SELECT CAST(COLUMN_NAME AS CHAR), CAST(DATA_TYPE AS CHAR), \
           CAST(IS_NULLABLE AS CHAR), CAST(COLUMN_DEFAULT AS CHAR), \
           CAST(CHARACTER_MAXIMUM_LENGTH AS SIGNED) \
    FROM information_schema.COLUMNS \
    WHERE TABLE_NAME = ? AND TABLE_SCHEMA = ? \
    ORDER BY ORDINAL_POSITION";

impl MySqlBackend {
    pub fn new(params: ConnectionParams, database: Option<String>) -> Self {
        Self {
            params,
            database,
            cache: ColumnCache::new(),
        }
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        let mut opts = MySqlConnectOptions::new()
            .host(&self.params.host)
            .username(&self.params.user);
        if let Some(port) = self.params.port {
            opts = opts.port(port);
        }
        if let Some(ref password) = self.params.password {
            opts = opts.password(password);
        }
        if let Some(ref socket) = self.params.socket {
            opts = opts.socket(socket);
        }
        if let Some(ref database) = self.database {
            opts = opts.database(database);
        }
        opts
    }

    async fn connect_scoped(&self) -> ExplorerResult<MySqlConnection> {
        self.connect_options()
            .connect()
            .await
            .map_err(|e| ExplorerError::connection(e.to_string()))
    }

    fn bound_database(&self) -> ExplorerResult<&str> {
        self.database
            .as_deref()
            .ok_or_else(|| ExplorerError::query("no database bound to this handle"))
    }

    /// Runs one single-column metadata query with the given binds.
    async fn fetch_names(&self, sql: &str, binds: &[&str]) -> ExplorerResult<Vec<String>> {
        let mut conn = self.connect_scoped().await?;
        let mut query = sqlx::query_scalar::<_, String>(sql);
        for bind in binds {
            query = query.bind(*bind);
        }
        let names = query.fetch_all(&mut conn).await?;
        let _ = conn.close().await;
        Ok(names)
    }

    /// Binds a universal value to a MySQL query.
    fn bind_value<'q>(
        query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
        value: &'q Value,
    ) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
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

    /// Extracts a value from a row at the given index, trying concrete types
    /// from narrowest decode to widest.
    fn extract_value(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
            return v.map(|u| Value::Int(u as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(Value::Int).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<u32>, _>(idx) {
            return v.map(|u| Value::Int(u as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i8>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
            return v.map(Value::Bool).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v.map(Value::Float).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
            return v.map(|f| Value::Float(f as f64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Decimal>, _>(idx) {
            return v
                .map(|d| {
                    use rust_decimal::prelude::ToPrimitive;
                    Value::Float(d.to_f64().unwrap_or(0.0))
                })
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Value::Text).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
            return v.map(|dt| Value::Text(dt.to_rfc3339())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            return v
                .map(|dt| Value::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
            return v
                .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
            return v
                .map(|t| Value::Text(t.format("%H:%M:%S").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return v.map(Value::Bytes).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
            return v.map(Value::Json).unwrap_or(Value::Null);
        }

        Value::Null
    }

    fn row_values(row: &MySqlRow) -> Vec<Value> {
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
        // Target values bind first, key values after.
        for value in target_values.iter().chain(key_values) {
            query = Self::bind_value(query, value);
        }
        query.execute(&mut conn).await?;
        let _ = conn.close().await;
        Ok(())
    }
}

/// Merges the ordinal-ordered column rows with the primary-key column set
/// from the index query.
fn merge_column_metadata(
    rows: Vec<(String, String, String, Option<String>, Option<i64>)>,
    key_columns: &HashSet<String>,
) -> Vec<ColumnInfo> {
    rows.into_iter()
        .map(|(name, data_type, is_nullable, default_value, max_length)| {
            let is_primary_key = key_columns.contains(&name);
            ColumnInfo::new(
                name,
                data_type,
                is_nullable == "YES",
                default_value,
                max_length,
                is_primary_key,
            )
        })
        .collect()
}

#[async_trait]
impl SchemaCatalog for MySqlBackend {
    async fn list_databases(&self) -> ExplorerResult<Vec<String>> {
        self.fetch_names(DATABASES_QUERY, &[]).await
    }

    async fn list_tables(&self, database: &str) -> ExplorerResult<Vec<String>> {
        self.fetch_names(TABLES_QUERY, &[database]).await
    }

    async fn list_columns(&self, database: &str, table: &str) -> ExplorerResult<Vec<String>> {
        self.fetch_names(COLUMN_NAMES_QUERY, &[database, table]).await
    }

    async fn list_index_names(&self, database: &str) -> ExplorerResult<Vec<String>> {
        self.fetch_names(INDEXES_QUERY, &[database]).await
    }

    async fn list_trigger_names(&self, database: &str) -> ExplorerResult<Vec<String>> {
        self.fetch_names(TRIGGERS_QUERY, &[database]).await
    }

    async fn describe_table(&self, table: &str) -> ExplorerResult<Arc<[ColumnInfo]>> {
        dml::ensure_safe_identifier(table)?;
        let database = self.bound_database()?.to_string();
        let table_name = table.to_string();
        self.cache
            .get_or_load(table, move || async move {
                debug!("describing {}.{}", database, table_name);
                let mut conn = self.connect_scoped().await?;
                let key_rows: Vec<String> = sqlx::query_scalar(KEY_COLUMNS_QUERY)
                    .bind(&table_name)
                    .bind(&database)
                    .fetch_all(&mut conn)
                    .await?;
                let column_rows: Vec<(String, String, String, Option<String>, Option<i64>)> =
                    sqlx::query_as(DESCRIBE_QUERY)
                        .bind(&table_name)
                        .bind(&database)
                        .fetch_all(&mut conn)
                        .await?;
                let _ = conn.close().await;

                let key_columns: HashSet<String> = key_rows.into_iter().collect();
                Ok(merge_column_metadata(column_rows, &key_columns))
            })
            .await
    }

    async fn clear_schema_cache(&self) {
        self.cache.clear().await;
    }
}

#[async_trait]
impl RowAccess for MySqlBackend {
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
                    .map(|col| MYSQL_TYPES.is_blob(&col.type_name))
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
        let rows: Vec<MySqlRow> = sqlx::query(sql).fetch_all(&mut conn).await?;
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
            .map(|row| format::format_row(&MYSQL_TYPES, &type_names, &Self::row_values(row)))
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
impl DatabaseBackend for MySqlBackend {
    fn backend_id(&self) -> &'static str {
        "mysql"
    }

    fn backend_name(&self) -> &'static str {
        "MySQL"
    }

    /// MySQL qualifies as `database.table`, unquoted; both identifiers come
    /// from prior metadata queries.
    fn qualify_table(&self, table: &str) -> String {
        match self.database {
            Some(ref database) => format!("{}.{}", database, table),
            None => table.to_string(),
        }
    }

    fn type_profile(&self) -> &'static TypeProfile {
        &MYSQL_TYPES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_flags_exactly_the_indexed_columns() {
        let rows = vec![
            ("id".to_string(), "int".to_string(), "NO".to_string(), None, None),
            (
                "name".to_string(),
                "VARCHAR".to_string(),
                "YES".to_string(),
                Some("''".to_string()),
                Some(255),
            ),
            ("payload".to_string(), "blob".to_string(), "YES".to_string(), None, None),
        ];
        let keys: HashSet<String> = ["id".to_string()].into_iter().collect();

        let merged = merge_column_metadata(rows, &keys);
        assert_eq!(merged.len(), 3);
        assert!(merged[0].is_primary_key);
        assert!(!merged[1].is_primary_key);
        assert!(!merged[2].is_primary_key);
        assert_eq!(merged[1].type_name, "varchar");
        assert!(merged[1].nullable);
        assert!(merged[1].has_default);
        assert_eq!(merged[1].max_length, Some(255));
        assert!(!merged[0].nullable);
    }

    #[test]
    fn qualification_prefixes_the_bound_database() {
        let params = ConnectionParams::new("localhost", "root");
        let bound = MySqlBackend::new(params.clone(), Some("shop".to_string()));
        assert_eq!(bound.qualify_table("orders"), "shop.orders");

        let unbound = MySqlBackend::new(params, None);
        assert_eq!(unbound.qualify_table("orders"), "orders");
    }

    #[tokio::test]
    async fn describe_rejects_statement_separators_before_connecting() {
        // No server is listening here; an UnsafeIdentifier error proves the
        // check fires before any query is attempted.
        let backend = MySqlBackend::new(
            ConnectionParams::new("localhost", "root"),
            Some("shop".to_string()),
        );
        let err = backend
            .describe_table("orders; DROP TABLE users")
            .await
            .expect_err("must reject");
        assert!(matches!(err, ExplorerError::UnsafeIdentifier(_)));
    }
}

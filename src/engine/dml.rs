//! Parameterized DML construction from discovered schema metadata.
//!
//! Every value flows through parameter binding. The one documented exception
//! to "always bind" is identifiers: table and column names sourced from prior
//! metadata queries may be concatenated into SQL text, and each one is passed
//! through [`ensure_safe_identifier`] first.

use crate::engine::error::{ExplorerError, ExplorerResult};
use crate::engine::format::TypeProfile;
use crate::engine::types::{ColumnInfo, Value};

/// Rejects identifiers that could smuggle a second statement into SQL text.
pub fn ensure_safe_identifier(name: &str) -> ExplorerResult<()> {
    if name.contains(';') {
        return Err(ExplorerError::unsafe_identifier(name));
    }
    Ok(())
}

fn ensure_safe_identifiers(names: &[String]) -> ExplorerResult<()> {
    for name in names {
        ensure_safe_identifier(name)?;
    }
    Ok(())
}

/// Joins names into `"n1 = ? <sep> n2 = ? ..."`.
pub fn equality_clause(names: &[String], sep: &str) -> String {
    names
        .iter()
        .map(|name| format!("{} = ?", name))
        .collect::<Vec<_>>()
        .join(sep)
}

pub fn build_select(qualified_table: &str, key_names: &[String]) -> ExplorerResult<String> {
    ensure_safe_identifier(qualified_table)?;
    ensure_safe_identifiers(key_names)?;
    Ok(format!(
        "SELECT * FROM {} WHERE {}",
        qualified_table,
        equality_clause(key_names, " AND ")
    ))
}

pub fn build_delete(qualified_table: &str, key_names: &[String]) -> ExplorerResult<String> {
    ensure_safe_identifier(qualified_table)?;
    ensure_safe_identifiers(key_names)?;
    Ok(format!(
        "DELETE FROM {} WHERE {}",
        qualified_table,
        equality_clause(key_names, " AND ")
    ))
}

pub fn build_insert(qualified_table: &str, names: &[String]) -> ExplorerResult<String> {
    ensure_safe_identifier(qualified_table)?;
    ensure_safe_identifiers(names)?;
    let placeholders = vec!["?"; names.len()].join(", ");
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified_table,
        names.join(", "),
        placeholders
    ))
}

/// Target values bind first, key values after, in that concatenated order.
pub fn build_update(
    qualified_table: &str,
    target_names: &[String],
    key_names: &[String],
) -> ExplorerResult<String> {
    ensure_safe_identifier(qualified_table)?;
    ensure_safe_identifiers(target_names)?;
    ensure_safe_identifiers(key_names)?;
    Ok(format!(
        "UPDATE {} SET {} WHERE {}",
        qualified_table,
        equality_clause(target_names, ", "),
        equality_clause(key_names, " AND ")
    ))
}

/// Derives a condition identifying one row when no explicit key is supplied.
///
/// Primary-key columns win when any are flagged. Otherwise every non-blob
/// column is matched (blobs cannot be reliably compared). The fallback is
/// optimistic: with duplicate rows or a concurrent edit it can identify more
/// than one physical row. Preserved as-is for legacy tables without declared
/// keys; do not extend it.
pub fn row_identity(
    columns: &[ColumnInfo],
    profile: &TypeProfile,
    row: &[String],
) -> ExplorerResult<(String, Vec<Value>)> {
    if row.len() != columns.len() {
        return Err(ExplorerError::query(format!(
            "row has {} cells but the table has {} columns",
            row.len(),
            columns.len()
        )));
    }

    let mut key_names = Vec::new();
    let mut key_values = Vec::new();
    for (idx, col) in columns.iter().enumerate() {
        if col.is_primary_key {
            key_names.push(col.name.clone());
            key_values.push(Value::Text(row[idx].clone()));
        }
    }
    if key_names.is_empty() {
        for (idx, col) in columns.iter().enumerate() {
            if !profile.is_blob(&col.type_name) {
                key_names.push(col.name.clone());
                key_values.push(Value::Text(row[idx].clone()));
            }
        }
    }
    if key_names.is_empty() {
        return Err(ExplorerError::no_key_columns(
            "every column is a blob, cannot identify the row",
        ));
    }

    Ok((equality_clause(&key_names, " AND "), key_values))
}

//! Type-driven stringification of cell values for display.
//!
//! Every backend type name falls into one of six buckets; the bucket shape is
//! fixed, the member sets differ per backend and live in a [`TypeProfile`]
//! constant owned by each driver.

use std::collections::HashSet;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use tracing::{info, warn};

use crate::engine::types::Value;

/// Classification buckets for backend column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    Integer,
    Real,
    Text,
    DateLike,
    Blob,
    Unrecognized,
}

/// Per-backend type-name sets feeding the six-bucket classification.
pub struct TypeProfile {
    pub integer_types: &'static [&'static str],
    pub float_types: &'static [&'static str],
    pub text_types: &'static [&'static str],
    pub date_like_types: &'static [&'static str],
}

pub static MYSQL_TYPES: TypeProfile = TypeProfile {
    integer_types: &["int", "integer", "tinyint", "smallint", "mediumint", "bigint"],
    float_types: &["float", "double", "double precision", "decimal", "numeric", "real"],
    text_types: &["string", "text", "enum", "tinytext", "mediumtext", "longtext"],
    date_like_types: &["date", "datetime", "timestamp", "time", "year", "point"],
};

pub static SQLITE_TYPES: TypeProfile = TypeProfile {
    integer_types: &["int", "integer", "tinyint", "smallint", "mediumint", "bigint"],
    float_types: &["real", "double", "double precision", "float", "numeric", "decimal"],
    text_types: &["string", "text", "clob"],
    date_like_types: &["date", "datetime"],
};

impl TypeProfile {
    /// Maps a backend type name (any case) to its bucket.
    pub fn classify(&self, type_name: &str) -> TypeClass {
        let lowered = type_name.to_lowercase();
        let name = lowered.as_str();
        if name == "blob" {
            TypeClass::Blob
        } else if self.integer_types.contains(&name) {
            TypeClass::Integer
        } else if self.float_types.contains(&name) {
            TypeClass::Real
        } else if self.text_types.contains(&name)
            || name.contains("varchar")
            || name.starts_with("char")
            || name.starts_with("character")
        {
            TypeClass::Text
        } else if self.date_like_types.contains(&name) {
            TypeClass::DateLike
        } else {
            TypeClass::Unrecognized
        }
    }

    pub fn is_blob(&self, type_name: &str) -> bool {
        self.classify(type_name) == TypeClass::Blob
    }
}

/// Byte length reported for blob cells.
fn blob_len(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::Bytes(b) => b.len(),
        other => other.display_string().len(),
    }
}

pub fn blob_placeholder(value: &Value) -> String {
    format!("<BLOB: {} chars>", blob_len(value))
}

// Unrecognized type names are logged once per process so a wide result set
// does not flood the log.
static UNRECOGNIZED_TYPES: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

fn note_unrecognized(type_name: &str) {
    let mut seen = UNRECOGNIZED_TYPES
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if seen.insert(type_name.to_string()) {
        info!("unrecognized column type {:?}, using generic rendering", type_name);
    }
}

/// Converts one typed value into its display string.
pub fn format_value(profile: &TypeProfile, type_name: &str, value: &Value) -> String {
    match profile.classify(type_name) {
        TypeClass::Integer => match value {
            Value::Null => String::new(),
            Value::Int(i) => i.to_string(),
            other => {
                warn!("non-numeric value {:?} in integer column", other);
                other.display_string()
            }
        },
        TypeClass::Real => match value {
            Value::Null => String::new(),
            Value::Float(f) => f.to_string(),
            Value::Int(i) => i.to_string(),
            other => other.display_string(),
        },
        TypeClass::Text | TypeClass::DateLike => value.display_string(),
        TypeClass::Blob => blob_placeholder(value),
        TypeClass::Unrecognized => {
            note_unrecognized(type_name);
            value.display_string()
        }
    }
}

/// Stringifies a whole row given the per-column type names.
pub fn format_row(profile: &TypeProfile, type_names: &[String], values: &[Value]) -> Vec<String> {
    values
        .iter()
        .enumerate()
        .map(|(idx, value)| {
            let type_name = type_names.get(idx).map(String::as_str).unwrap_or("");
            format_value(profile, type_name, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mysql_classification_covers_all_buckets() {
        assert_eq!(MYSQL_TYPES.classify("INT"), TypeClass::Integer);
        assert_eq!(MYSQL_TYPES.classify("decimal"), TypeClass::Real);
        assert_eq!(MYSQL_TYPES.classify("varchar(255)"), TypeClass::Text);
        assert_eq!(MYSQL_TYPES.classify("char"), TypeClass::Text);
        assert_eq!(MYSQL_TYPES.classify("enum"), TypeClass::Text);
        assert_eq!(MYSQL_TYPES.classify("datetime"), TypeClass::DateLike);
        assert_eq!(MYSQL_TYPES.classify("point"), TypeClass::DateLike);
        assert_eq!(MYSQL_TYPES.classify("blob"), TypeClass::Blob);
        assert_eq!(MYSQL_TYPES.classify("geometry"), TypeClass::Unrecognized);
    }

    #[test]
    fn sqlite_profile_differs_from_mysql() {
        assert_eq!(SQLITE_TYPES.classify("clob"), TypeClass::Text);
        assert_eq!(SQLITE_TYPES.classify("year"), TypeClass::Unrecognized);
    }

    #[test]
    fn blob_rendering_counts_bytes_and_treats_null_as_empty() {
        assert_eq!(
            format_value(&MYSQL_TYPES, "blob", &Value::Null),
            "<BLOB: 0 chars>"
        );
        assert_eq!(
            format_value(&MYSQL_TYPES, "blob", &Value::Bytes(b"abcd".to_vec())),
            "<BLOB: 4 chars>"
        );
    }

    #[test]
    fn integer_rendering() {
        assert_eq!(format_value(&MYSQL_TYPES, "integer", &Value::Null), "");
        assert_eq!(format_value(&MYSQL_TYPES, "integer", &Value::Int(42)), "42");
        // Non-numeric falls back to the generic rendering.
        assert_eq!(
            format_value(&MYSQL_TYPES, "int", &Value::Text("x".into())),
            "x"
        );
    }

    #[test]
    fn text_passes_through_unchanged() {
        assert_eq!(
            format_value(&MYSQL_TYPES, "varchar(40)", &Value::Text("MiXeD".into())),
            "MiXeD"
        );
    }

    #[test]
    fn format_row_uses_per_column_types() {
        let types = vec!["int".to_string(), "blob".to_string()];
        let values = vec![Value::Int(7), Value::Bytes(vec![0, 1, 2])];
        assert_eq!(
            format_row(&MYSQL_TYPES, &types, &values),
            vec!["7".to_string(), "<BLOB: 3 chars>".to_string()]
        );
    }
}

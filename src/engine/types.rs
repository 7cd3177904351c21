//! Universal data types for the explorer engine.
//!
//! These types give the node hierarchy and the host IDE a normalized view of
//! connection targets, column metadata, and cell values across backends.

use serde::{Deserialize, Serialize};

use crate::engine::error::{ExplorerError, ExplorerResult};

/// Normalized connection target.
///
/// Host and user are always present; everything else is optional. Constructed
/// once per logical target and immutable afterwards — each driver translates
/// it into its native connect options on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub has_password: bool,
    pub socket: Option<String>,
    pub database: Option<String>,
}

impl ConnectionParams {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            user: user.into(),
            password: None,
            has_password: false,
            socket: None,
            database: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Parses a port stored as text by the host's preference layer.
    pub fn with_port_text(mut self, port: &str) -> ExplorerResult<Self> {
        let parsed = port
            .trim()
            .parse::<u16>()
            .map_err(|e| ExplorerError::connection(format!("bad port {:?}: {}", port, e)))?;
        self.port = Some(parsed);
        Ok(self)
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self.has_password = true;
        self
    }

    pub fn with_socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Short human-readable form shown next to the connection in the panel.
    pub fn display_values(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Root URI for the node hierarchy; child nodes append `/<name>`.
    pub fn uri(&self) -> String {
        match self.port {
            Some(port) => format!("dbexplorer://{}:{}/{}", self.host, port, self.user),
            None => format!("dbexplorer://{}/{}", self.host, self.user),
        }
    }
}

/// Backend-agnostic description of one table column.
///
/// Built by the catalog from backend metadata on first describe, cached for
/// the lifetime of the table handle, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Lower-cased backend type name.
    pub type_name: String,
    pub nullable: bool,
    pub has_default: bool,
    pub default_value: Option<String>,
    pub max_length: Option<i64>,
    /// Derived from backend index/key metadata, never from user input.
    pub is_primary_key: bool,
}

impl ColumnInfo {
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        nullable: bool,
        default_value: Option<String>,
        max_length: Option<i64>,
        is_primary_key: bool,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into().to_lowercase(),
            nullable,
            has_default: default_value.is_some(),
            default_value,
            max_length,
            is_primary_key,
        }
    }
}

/// Universal cell value representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    Json(serde_json::Value),
}

impl Value {
    /// Generic string conversion, used wherever no type-specific rule applies.
    pub fn display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Value::Json(j) => j.to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Result of a free-form query, already stringified for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Preference surface for a backend: whether it can be offered to the user,
/// and why not if it can't.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendAvailability {
    pub available: bool,
    pub disabled_reason: Option<String>,
}

impl BackendAvailability {
    pub fn available() -> Self {
        Self {
            available: true,
            disabled_reason: None,
        }
    }

    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            disabled_reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_includes_port_only_when_present() {
        let plain = ConnectionParams::new("db.internal", "alice");
        assert_eq!(plain.uri(), "dbexplorer://db.internal/alice");

        let with_port = ConnectionParams::new("db.internal", "alice").with_port(3306);
        assert_eq!(with_port.uri(), "dbexplorer://db.internal:3306/alice");
    }

    #[test]
    fn port_text_is_coerced_to_integer() {
        let params = ConnectionParams::new("localhost", "root")
            .with_port_text(" 3307 ")
            .expect("should parse");
        assert_eq!(params.port, Some(3307));

        assert!(ConnectionParams::new("localhost", "root")
            .with_port_text("not-a-port")
            .is_err());
    }

    #[test]
    fn password_is_not_serialized() {
        let params = ConnectionParams::new("h", "u").with_password("secret");
        let json = serde_json::to_string(&params).expect("should serialize");
        assert!(!json.contains("secret"));
        assert!(json.contains("\"has_password\":true"));
    }

    #[test]
    fn column_info_lowercases_type_and_derives_default_flag() {
        let col = ColumnInfo::new("id", "INT", false, None, None, true);
        assert_eq!(col.type_name, "int");
        assert!(!col.has_default);

        let with_default =
            ColumnInfo::new("n", "varchar", true, Some("''".into()), Some(255), false);
        assert!(with_default.has_default);
    }

    #[test]
    fn display_values_is_user_at_host() {
        let params = ConnectionParams::new("db.internal", "alice");
        assert_eq!(params.display_values(), "alice@db.internal");
    }
}

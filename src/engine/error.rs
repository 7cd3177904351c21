//! Error taxonomy for catalog and row operations.

use thiserror::Error;

pub type ExplorerResult<T> = Result<T, ExplorerError>;

/// Failure kinds surfaced by backends and by the explorer core itself.
///
/// Catalog and row operations return these directly; the node layer is the
/// only place that downgrades an error into a display-only tree entry.
#[derive(Debug, Clone, Error)]
pub enum ExplorerError {
    /// Could not establish or authenticate a backend connection.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The backend rejected a query (malformed SQL, type mismatch,
    /// constraint violation).
    #[error("query failed: {0}")]
    Query(String),

    /// An identifier destined for SQL text contains a disallowed character.
    #[error("unsafe identifier: {0:?}")]
    UnsafeIdentifier(String),

    /// A bulk delete was requested but no column is flagged as a key.
    #[error("no key columns: {0}")]
    NoKeyColumns(String),

    /// No backend is registered under the requested id.
    #[error("unknown backend: {0}")]
    BackendNotFound(String),

    /// The backend does not implement the requested capability.
    #[error("not supported: {0}")]
    NotSupported(String),
}

impl ExplorerError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn unsafe_identifier(name: impl Into<String>) -> Self {
        Self::UnsafeIdentifier(name.into())
    }

    pub fn no_key_columns(msg: impl Into<String>) -> Self {
        Self::NoKeyColumns(msg.into())
    }

    pub fn backend_not_found(id: impl Into<String>) -> Self {
        Self::BackendNotFound(id.into())
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }
}

impl From<sqlx::Error> for ExplorerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(e) => Self::Connection(e.to_string()),
            sqlx::Error::Io(e) => Self::Connection(e.to_string()),
            sqlx::Error::Tls(e) => Self::Connection(e.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::Connection(err.to_string())
            }
            sqlx::Error::Database(e) => Self::Query(e.to_string()),
            other => Self::Query(other.to_string()),
        }
    }
}

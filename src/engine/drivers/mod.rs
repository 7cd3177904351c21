// Concrete backend drivers.

pub mod mysql;
pub mod sqlite;

pub use mysql::{MySqlBackend, MySqlFactory};
pub use sqlite::{SqliteBackend, SqliteFactory};

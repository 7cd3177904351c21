// Explorer engine module
// Backend-agnostic introspection and row-mutation layer

pub mod cache;
pub mod dml;
pub mod drivers;
pub mod error;
pub mod format;
pub mod registry;
pub mod traits;
pub mod types;

pub use cache::ColumnCache;
pub use error::{ExplorerError, ExplorerResult};
pub use format::{TypeClass, TypeProfile};
pub use registry::BackendRegistry;
pub use traits::{BackendFactory, DatabaseBackend, RowAccess, SchemaCatalog};
pub use types::*;


//! Per-table column-description cache.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::engine::error::ExplorerResult;
use crate::engine::types::ColumnInfo;

/// Caches the merged [`ColumnInfo`] list per table name.
///
/// The lock is held across the loader, so concurrent describes of the same
/// backend serialize and the metadata round-trip runs at most once per table
/// until [`clear`](ColumnCache::clear) is called.
#[derive(Debug)]
pub struct ColumnCache {
    inner: Mutex<HashMap<String, Arc<[ColumnInfo]>>>,
}

impl ColumnCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_load<F, Fut>(
        &self,
        table: &str,
        loader: F,
    ) -> ExplorerResult<Arc<[ColumnInfo]>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ExplorerResult<Vec<ColumnInfo>>>,
    {
        let mut inner = self.inner.lock().await;
        if let Some(cached) = inner.get(table) {
            return Ok(Arc::clone(cached));
        }
        let loaded: Arc<[ColumnInfo]> = loader().await?.into();
        inner.insert(table.to_string(), Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Drops every cached description. Schema changes require this before the
    /// next describe sees them.
    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }
}

impl Default for ColumnCache {
    fn default() -> Self {
        Self::new()
    }
}

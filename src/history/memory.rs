//! In-memory history backend.

use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{Exchange, HistoryStore, StoreError, newest_first};

/// Process-local history store.
///
/// Used by ephemeral servers and tests. [`InMemoryHistoryStore::without_index`]
/// mimics a hosted store that rejects ordered queries.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    records: Mutex<Vec<Exchange>>,
    unindexed: bool,
}

impl InMemoryHistoryStore {
    /// Create an empty store that supports ordered queries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store whose ordered query reports a missing index.
    pub fn without_index() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            unindexed: true,
        }
    }

    /// Number of stored exchanges.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Exchange>>, StoreError> {
        self.records
            .lock()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, mut exchange: Exchange) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        exchange.id = Some(id.clone());
        self.lock()?.push(exchange);
        Ok(id)
    }

    async fn query_recent(&self, limit: usize) -> Result<Vec<Exchange>, StoreError> {
        if self.unindexed {
            return Err(StoreError::MissingIndex(
                "ordered query on createdAt requires an index".to_owned(),
            ));
        }
        let records = self.lock()?.clone();
        Ok(newest_first(records, limit))
    }

    async fn fetch_all(&self) -> Result<Vec<Exchange>, StoreError> {
        Ok(self.lock()?.clone())
    }
}

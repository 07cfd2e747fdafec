//! In-memory backend for task records

use super::{RecordStore, TaskRecord};
use crate::error::Result;
use async_trait::async_trait;
use futures::lock::Mutex;
use std::collections::BTreeMap;

/// In-memory record store
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, TaskRecord>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn put(&self, record: &TaskRecord) -> Result<()> {
        self.records
            .lock()
            .await
            .insert(record.key(), record.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<TaskRecord>> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<Option<TaskRecord>> {
        Ok(self.records.lock().await.remove(key))
    }

    async fn list(&self) -> Result<Vec<TaskRecord>> {
        Ok(self.records.lock().await.values().cloned().collect())
    }
}

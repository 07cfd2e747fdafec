//! Sled database backend for task records

use super::{RecordStore, TaskRecord};
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

const TASKS_TREE: &str = "tasks";

/// Sled-based record store
pub struct SledStore {
    /// Database instance
    db: sled::Db,
    /// Task records, JSON encoded
    tasks: sled::Tree,
}

impl SledStore {
    /// Open (or create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening task store at {}", path.display());
        let db = sled::open(path)?;
        let tasks = db.open_tree(TASKS_TREE)?;
        Ok(Self { db, tasks })
    }

    /// Temporary store removed on drop (for testing)
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        let tasks = db.open_tree(TASKS_TREE)?;
        Ok(Self { db, tasks })
    }
}

#[async_trait]
impl RecordStore for SledStore {
    async fn put(&self, record: &TaskRecord) -> Result<()> {
        let key = record.key();
        debug!("Storing task record {}", key);

        let value = serde_json::to_vec(record)?;
        self.tasks.insert(key.as_bytes(), value)?;
        self.tasks.flush_async().await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<TaskRecord>> {
        match self.tasks.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, key: &str) -> Result<Option<TaskRecord>> {
        debug!("Removing task record {}", key);

        let Some(bytes) = self.tasks.remove(key.as_bytes())? else {
            return Ok(None);
        };
        self.tasks.flush_async().await?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn list(&self) -> Result<Vec<TaskRecord>> {
        let mut records = Vec::new();
        for result in self.tasks.iter() {
            let (_, value) = result?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }
}

impl Drop for SledStore {
    fn drop(&mut self) {
        if let Err(e) = self.db.flush() {
            tracing::error!("Failed to flush task store on drop: {}", e);
        }
    }
}

//! Durable bookkeeping of installed tasks

pub mod memory;
pub mod sled;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use program_executor::Program;
use serde::{Deserialize, Serialize};

pub use self::memory::MemoryStore;
pub use self::sled::SledStore;

/// One task's record, keyed by [`Program::key`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Program with its last known run state
    pub program: Program,
    /// When the record was last written
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Record a program as of now
    pub fn new(program: Program) -> Self {
        Self {
            program,
            updated_at: Utc::now(),
        }
    }

    /// Record key
    pub fn key(&self) -> String {
        self.program.key()
    }
}

/// Trait for task record storage backends
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace a record
    async fn put(&self, record: &TaskRecord) -> Result<()>;

    /// Get a record by key
    async fn get(&self, key: &str) -> Result<Option<TaskRecord>>;

    /// Remove a record, returning it if present
    async fn remove(&self, key: &str) -> Result<Option<TaskRecord>>;

    /// All records, ordered by key
    async fn list(&self) -> Result<Vec<TaskRecord>>;
}

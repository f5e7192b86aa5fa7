//! Persistence subsystem.
//!
//! # Data Flow
//! ```text
//! Recorder consumer
//!     → RecordStore::store(&Record)   (bounded by the recorder's timeout)
//!     → mongo.rs  (one document per record)
//!     | log.rs    (one JSON log line per record)
//!     | memory.rs (in-process, for tests)
//! ```
//!
//! # Design Decisions
//! - Stores only report success or failure; callers log and move on
//! - Reachability is checked once at startup so a bad backend fails fast
//! - No retries here; recording is best-effort

use async_trait::async_trait;
use thiserror::Error;

use crate::recording::Record;

pub mod log;
pub mod memory;
pub mod mongo;

pub use log::LogStore;
pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("BSON encoding error: {0}")]
    Bson(#[from] mongodb::bson::ser::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record rejected: {0}")]
    Rejected(String),
}

/// Durable destination for records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist one record.
    async fn store(&self, record: &Record) -> Result<(), StoreError>;

    /// Verify the backend answers.
    async fn check_reachable(&self) -> Result<(), StoreError>;

    /// Release the backend connection. Called once, after the last `store`.
    async fn close(&self) {}
}

//! Records as structured log lines.

use async_trait::async_trait;

use crate::recording::Record;
use crate::store::{RecordStore, StoreError};

/// Writes each record as JSON to the `recording_proxy::records` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStore;

impl LogStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RecordStore for LogStore {
    async fn store(&self, record: &Record) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        tracing::info!(
            target: "recording_proxy::records",
            record_id = %record.id,
            record = %json,
            "Exchange recorded"
        );
        Ok(())
    }

    async fn check_reachable(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

//! In-memory store for tests.
//!
//! Besides keeping records it can fail every call on demand, or hold every
//! call until resumed to stand in for a stalled backend.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Notify};

use crate::recording::Record;
use crate::store::{RecordStore, StoreError};

#[derive(Debug)]
pub struct MemoryStore {
    records: Mutex<Vec<Record>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
    closed: AtomicBool,
    paused: watch::Sender<bool>,
    changed: Notify,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            records: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            paused,
            changed: Notify::new(),
        }
    }

    /// Make every subsequent `store` fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Hold `store` calls until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Records stored so far, in store order.
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of `store` calls that started, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait until `check` holds or `limit` passed; returns whether it held.
    pub async fn wait_until<F>(&self, limit: Duration, check: F) -> bool
    where
        F: Fn(&Self) -> bool,
    {
        tokio::time::timeout(limit, async {
            loop {
                let changed = self.changed.notified();
                if check(self) {
                    return;
                }
                changed.await;
            }
        })
        .await
        .is_ok()
    }

    /// Wait for at least `count` stored records.
    pub async fn wait_for_records(&self, count: usize, limit: Duration) -> Vec<Record> {
        self.wait_until(limit, |store| store.records().len() >= count)
            .await;
        self.records()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn store(&self, record: &Record) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.changed.notify_waiters();

        let mut paused = self.paused.subscribe();
        // The sender lives in `self`, so this only returns once resumed.
        let _ = paused.wait_for(|paused| !*paused).await;

        let result = if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Rejected("memory store is failing".to_string()))
        } else {
            self.records
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(record.clone());
            Ok(())
        };
        self.changed.notify_waiters();
        result
    }

    async fn check_reachable(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("memory store is failing".to_string()));
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.changed.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BodyEncoding;
    use crate::recording::{Exchange, RecordBuilder};
    use std::sync::Arc;

    fn record() -> Record {
        RecordBuilder::new("p", "s", BodyEncoding::Raw).build(&Exchange::fixture("/"))
    }

    #[tokio::test]
    async fn stores_and_fails_on_demand() {
        let store = MemoryStore::new();
        store.store(&record()).await.unwrap();

        store.set_failing(true);
        assert!(store.store(&record()).await.is_err());
        assert!(store.check_reachable().await.is_err());

        assert_eq!(store.attempts(), 2);
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn pause_holds_store_until_resumed() {
        let store = Arc::new(MemoryStore::new());
        store.pause();

        let writer = store.clone();
        let pending = tokio::spawn(async move { writer.store(&record()).await });

        assert!(store.wait_until(Duration::from_secs(1), |s| s.attempts() == 1).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());
        assert!(store.records().is_empty());

        store.resume();
        pending.await.unwrap().unwrap();
        assert_eq!(store.records().len(), 1);
    }
}

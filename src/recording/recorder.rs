//! Queue-backed recording sink.
//!
//! # Responsibilities
//! - Hand out queue slots to request tasks and take exchanges into a
//!   bounded FIFO queue
//! - Run exactly one consumer that builds records and stores them
//! - Keep persistence latency and failures off the client path
//!
//! # Design Decisions
//! - The queue (a tokio mpsc channel) is the only state shared between
//!   request tasks and the consumer; ownership of each exchange moves
//!   through it
//! - A slot is an mpsc `OwnedPermit`. `reserve` waits for one by default
//!   (`overflow = drop` hands out a discarding reservation instead), and
//!   filling it is a plain send that never waits
//! - Queue depth is counted on both sides and published as a gauge
//! - Each store call has its own timeout; failures are logged and the
//!   exchange is dropped, never retried
//! - Stopping closes the queue, wakes blocked producers and lets the
//!   consumer drain; an in-flight store call is never cancelled

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::{OverflowPolicy, RecorderConfig};
use crate::observability::metrics;
use crate::recording::exchange::Exchange;
use crate::recording::record::RecordBuilder;
use crate::recording::sink::{ExchangeSink, Reservation};
use crate::store::RecordStore;

/// Bounded-queue producer/consumer pair in front of a [`RecordStore`].
pub struct Recorder {
    sender: RwLock<Option<mpsc::Sender<Exchange>>>,
    queue: Mutex<Option<mpsc::Receiver<Exchange>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    closed: watch::Sender<bool>,
    depth: Arc<AtomicUsize>,
    store: Arc<dyn RecordStore>,
    builder: RecordBuilder,
    overflow: OverflowPolicy,
    store_timeout: Duration,
    shutdown_timeout: Duration,
}

impl Recorder {
    /// Create a recorder with an empty queue. Nothing is persisted until
    /// [`start`](Self::start) runs the consumer.
    pub fn new(store: Arc<dyn RecordStore>, config: &RecorderConfig) -> Self {
        let (sender, queue) = mpsc::channel(config.queue_capacity.max(1));
        let (closed, _) = watch::channel(false);

        Self {
            sender: RwLock::new(Some(sender)),
            queue: Mutex::new(Some(queue)),
            consumer: Mutex::new(None),
            closed,
            depth: Arc::new(AtomicUsize::new(0)),
            store,
            builder: RecordBuilder::from_config(config),
            overflow: config.overflow,
            store_timeout: Duration::from_secs(config.store_timeout_secs),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        }
    }

    /// Spawn the consumer. Calling it again is a no-op.
    pub fn start(&self) {
        let Some(queue) = self.queue.lock().unwrap_or_else(|p| p.into_inner()).take() else {
            tracing::warn!("Recorder already started");
            return;
        };

        let handle = tokio::spawn(consume(
            queue,
            self.depth.clone(),
            self.store.clone(),
            self.builder.clone(),
            self.store_timeout,
        ));
        *self.consumer.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
    }

    /// Close the queue and give the consumer `shutdown_timeout` to drain.
    ///
    /// Producers blocked on a full queue are released and their exchanges
    /// dropped. If the consumer is still busy when the timeout passes it
    /// keeps draining in the background.
    pub async fn stop(&self) {
        self.sender.write().unwrap_or_else(|p| p.into_inner()).take();
        self.closed.send_replace(true);

        let consumer = self.consumer.lock().unwrap_or_else(|p| p.into_inner()).take();
        match consumer {
            Some(handle) => match time::timeout(self.shutdown_timeout, handle).await {
                Ok(Ok(())) => tracing::info!("Recorder drained"),
                Ok(Err(e)) => tracing::error!(error = %e, "Recorder consumer failed"),
                Err(_) => tracing::warn!(
                    timeout = ?self.shutdown_timeout,
                    "Recorder still draining, continuing in background"
                ),
            },
            None => {
                // Never started: whatever is queued is discarded with us.
                self.store.close().await;
            }
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<Exchange>> {
        self.sender.read().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl ExchangeSink for Recorder {
    async fn reserve(&self) -> Reservation {
        let Some(sender) = self.sender() else {
            return discard_closed();
        };

        match self.overflow {
            OverflowPolicy::Block => {
                let mut closed = self.closed.subscribe();
                tokio::select! {
                    biased;
                    permit = sender.reserve_owned() => match permit {
                        Ok(permit) => self.enqueue(permit),
                        Err(_) => discard_closed(),
                    },
                    _ = closed.wait_for(|closed| *closed) => {
                        tracing::warn!("Recorder stopped while waiting for queue space");
                        discard_closed()
                    }
                }
            }
            OverflowPolicy::Drop => match sender.try_reserve_owned() {
                Ok(permit) => self.enqueue(permit),
                Err(mpsc::error::TrySendError::Full(_)) => Reservation::new(|exchange| {
                    tracing::warn!(
                        exchange_id = %exchange.id,
                        "Recording queue full, exchange dropped"
                    );
                    metrics::record_exchange("dropped");
                }),
                Err(mpsc::error::TrySendError::Closed(_)) => discard_closed(),
            },
        }
    }
}

impl Recorder {
    fn enqueue(&self, permit: mpsc::OwnedPermit<Exchange>) -> Reservation {
        let depth = self.depth.clone();
        Reservation::new(move |exchange| {
            // Counted before the send so the consumer never sees it negative.
            metrics::set_queue_depth(depth.fetch_add(1, Ordering::SeqCst) + 1);
            permit.send(exchange);
            metrics::record_exchange("enqueued");
        })
    }
}

fn discard_closed() -> Reservation {
    Reservation::new(|exchange| {
        tracing::debug!(exchange_id = %exchange.id, "Recorder closed, exchange discarded");
        metrics::record_exchange("closed");
    })
}

async fn consume(
    mut queue: mpsc::Receiver<Exchange>,
    depth: Arc<AtomicUsize>,
    store: Arc<dyn RecordStore>,
    builder: RecordBuilder,
    store_timeout: Duration,
) {
    tracing::info!("Recorder consumer started");

    while let Some(exchange) = queue.recv().await {
        metrics::set_queue_depth(depth.fetch_sub(1, Ordering::SeqCst).saturating_sub(1));
        let record = builder.build(&exchange);
        drop(exchange);

        match time::timeout(store_timeout, store.store(&record)).await {
            Ok(Ok(())) => {
                tracing::debug!(record_id = %record.id, url = %record.url, "Record stored");
                metrics::record_store("stored");
            }
            Ok(Err(e)) => {
                tracing::error!(record_id = %record.id, url = %record.url, error = %e, "Failed to store record");
                metrics::record_store("failed");
            }
            Err(_) => {
                tracing::error!(record_id = %record.id, url = %record.url, timeout = ?store_timeout, "Timed out storing record");
                metrics::record_store("timeout");
            }
        }
    }

    store.close().await;
    tracing::info!("Recorder consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn config(capacity: usize) -> RecorderConfig {
        RecorderConfig {
            queue_capacity: capacity,
            pod: "pod-a".into(),
            service: "orders".into(),
            ..RecorderConfig::default()
        }
    }

    fn recorder(store: &Arc<MemoryStore>, config: RecorderConfig) -> Arc<Recorder> {
        Arc::new(Recorder::new(store.clone(), &config))
    }

    const WAIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn persists_in_enqueue_order() {
        let store = Arc::new(MemoryStore::new());
        let recorder = recorder(&store, config(10));

        for i in 0..5 {
            recorder.accept(Exchange::fixture(&format!("/{i}"))).await;
        }
        recorder.start();

        let records = store.wait_for_records(5, WAIT).await;
        let urls: Vec<_> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, ["/0", "/1", "/2", "/3", "/4"]);
        assert!(records.iter().all(|r| r.pod == "pod-a" && r.service == "orders"));

        recorder.stop().await;
    }

    #[tokio::test]
    async fn accept_blocks_while_queue_is_full() {
        let store = Arc::new(MemoryStore::new());
        let recorder = recorder(&store, config(1));

        time::timeout(Duration::from_millis(200), recorder.accept(Exchange::fixture("/first")))
            .await
            .expect("first accept fits in the queue");

        let producer = recorder.clone();
        let second = tokio::spawn(async move { producer.accept(Exchange::fixture("/second")).await });

        time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished(), "second accept should wait for queue space");

        recorder.start();
        time::timeout(WAIT, second).await.unwrap().unwrap();

        let records = store.wait_for_records(2, WAIT).await;
        assert_eq!(records.len(), 2);
        recorder.stop().await;
    }

    #[tokio::test]
    async fn capacity_n_blocks_the_next_accept_while_persistence_stalls() {
        let store = Arc::new(MemoryStore::new());
        store.pause();
        let recorder = recorder(&store, config(2));
        recorder.start();

        // One exchange is held by the stalled store, two fill the queue.
        recorder.accept(Exchange::fixture("/0")).await;
        assert!(store.wait_until(WAIT, |s| s.attempts() == 1).await);
        recorder.accept(Exchange::fixture("/1")).await;
        recorder.accept(Exchange::fixture("/2")).await;

        let producer = recorder.clone();
        let blocked = tokio::spawn(async move { producer.accept(Exchange::fixture("/3")).await });
        time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        store.resume();
        time::timeout(WAIT, blocked).await.unwrap().unwrap();
        assert_eq!(store.wait_for_records(4, WAIT).await.len(), 4);

        recorder.stop().await;
    }

    #[tokio::test]
    async fn stop_releases_blocked_producers() {
        let store = Arc::new(MemoryStore::new());
        let recorder = recorder(&store, config(1));
        recorder.accept(Exchange::fixture("/first")).await;

        let producer = recorder.clone();
        let blocked = tokio::spawn(async move { producer.accept(Exchange::fixture("/second")).await });
        time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        recorder.stop().await;
        time::timeout(WAIT, blocked).await.unwrap().unwrap();
        assert!(store.is_closed());
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn accept_after_stop_returns_immediately() {
        let store = Arc::new(MemoryStore::new());
        let recorder = recorder(&store, config(1));
        recorder.start();
        recorder.stop().await;

        time::timeout(Duration::from_millis(200), recorder.accept(Exchange::fixture("/late")))
            .await
            .unwrap();
        assert_eq!(store.attempts(), 0);
    }

    #[tokio::test]
    async fn drop_policy_discards_when_full() {
        let store = Arc::new(MemoryStore::new());
        let recorder = recorder(
            &store,
            RecorderConfig {
                overflow: OverflowPolicy::Drop,
                ..config(1)
            },
        );

        time::timeout(Duration::from_millis(200), async {
            recorder.accept(Exchange::fixture("/kept")).await;
            recorder.accept(Exchange::fixture("/dropped")).await;
        })
        .await
        .expect("drop policy never waits");

        recorder.start();
        let records = store.wait_for_records(1, WAIT).await;
        recorder.stop().await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "/kept");
        assert_eq!(store.attempts(), 1);
    }

    #[tokio::test]
    async fn store_failures_are_isolated() {
        let store = Arc::new(MemoryStore::new());
        store.set_failing(true);
        let recorder = recorder(&store, config(10));
        recorder.start();

        recorder.accept(Exchange::fixture("/a")).await;
        recorder.accept(Exchange::fixture("/b")).await;
        assert!(store.wait_until(WAIT, |s| s.attempts() == 2).await);

        store.set_failing(false);
        recorder.accept(Exchange::fixture("/c")).await;
        let records = store.wait_for_records(1, WAIT).await;
        assert_eq!(records[0].url, "/c");

        recorder.stop().await;
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn slow_store_is_timed_out_and_skipped() {
        let store = Arc::new(MemoryStore::new());
        store.pause();
        let recorder = Arc::new(Recorder {
            store_timeout: Duration::from_millis(50),
            ..Recorder::new(store.clone(), &config(10))
        });
        recorder.start();

        recorder.accept(Exchange::fixture("/slow")).await;
        recorder.accept(Exchange::fixture("/next")).await;
        assert!(store.wait_until(WAIT, |s| s.attempts() == 2).await);
        assert!(store.records().is_empty());

        store.resume();
        recorder.stop().await;
    }

    #[tokio::test]
    async fn unfilled_reservation_frees_its_slot() {
        let store = Arc::new(MemoryStore::new());
        let recorder = recorder(&store, config(1));

        let reservation = recorder.reserve().await;
        let producer = recorder.clone();
        let waiting = tokio::spawn(async move { producer.accept(Exchange::fixture("/after")).await });
        time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished(), "the only slot is taken");

        drop(reservation);
        time::timeout(WAIT, waiting).await.unwrap().unwrap();

        recorder.start();
        let records = store.wait_for_records(1, WAIT).await;
        assert_eq!(records[0].url, "/after");
        recorder.stop().await;
    }

    #[tokio::test]
    async fn reserved_slot_is_filled_after_stop_begins() {
        let store = Arc::new(MemoryStore::new());
        let recorder = recorder(&store, config(2));
        recorder.start();

        let reservation = recorder.reserve().await;
        let stopper = recorder.clone();
        let stopping = tokio::spawn(async move { stopper.stop().await });
        time::sleep(Duration::from_millis(50)).await;

        reservation.fill(Exchange::fixture("/in-flight"));
        time::timeout(WAIT, stopping).await.unwrap().unwrap();
        assert_eq!(store.records()[0].url, "/in-flight");
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn queue_depth_follows_enqueue_and_dequeue() {
        let store = Arc::new(MemoryStore::new());
        store.pause();
        let recorder = recorder(&store, config(4));

        recorder.accept(Exchange::fixture("/0")).await;
        recorder.accept(Exchange::fixture("/1")).await;
        assert_eq!(recorder.depth.load(Ordering::SeqCst), 2);

        recorder.start();
        assert!(store.wait_until(WAIT, |s| s.attempts() == 1).await);
        assert_eq!(recorder.depth.load(Ordering::SeqCst), 1);

        store.resume();
        assert_eq!(store.wait_for_records(2, WAIT).await.len(), 2);
        assert_eq!(recorder.depth.load(Ordering::SeqCst), 0);
        recorder.stop().await;
    }

    #[tokio::test]
    async fn start_twice_is_harmless() {
        let store = Arc::new(MemoryStore::new());
        let recorder = recorder(&store, config(4));
        recorder.start();
        recorder.start();

        recorder.accept(Exchange::fixture("/once")).await;
        assert_eq!(store.wait_for_records(1, WAIT).await.len(), 1);
        recorder.stop().await;
        assert_eq!(store.records().len(), 1);
    }
}

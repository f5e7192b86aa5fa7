//! The capability the forwarding path hands completed exchanges to.
//!
//! Handoff is split in two. [`ExchangeSink::reserve`] claims room for one
//! exchange and may wait; it runs before the request is forwarded. The
//! returned [`Reservation`] is filled once the response has been relayed,
//! which never waits, so a finished response is never held open by a full
//! sink.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::recording::exchange::Exchange;

/// Room for exactly one exchange in a sink, claimed ahead of time.
///
/// Dropping it unfilled gives the room back.
pub struct Reservation {
    deliver: Box<dyn FnOnce(Exchange) + Send>,
}

impl Reservation {
    pub fn new<F>(deliver: F) -> Self
    where
        F: FnOnce(Exchange) + Send + 'static,
    {
        Self {
            deliver: Box::new(deliver),
        }
    }

    /// Hand over the exchange. Never blocks.
    pub fn fill(self, exchange: Exchange) {
        (self.deliver)(exchange)
    }
}

impl fmt::Debug for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation").finish_non_exhaustive()
    }
}

/// Receives finalized exchanges.
///
/// Implementations must not do persistence I/O inside a [`Reservation`].
#[async_trait]
pub trait ExchangeSink: Send + Sync {
    /// Claim room for one exchange, waiting while the sink is full.
    async fn reserve(&self) -> Reservation;

    /// Hand over one exchange, waiting for room first.
    async fn accept(&self, exchange: Exchange) {
        self.reserve().await.fill(exchange);
    }
}

/// Sinks registered with a server, fixed at construction.
pub type Sinks = Arc<[Arc<dyn ExchangeSink>]>;

/// Keeps every accepted exchange in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    exchanges: Arc<Mutex<Vec<Exchange>>>,
    accepted: Arc<Notify>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything accepted so far, in acceptance order.
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.exchanges
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.exchanges
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `count` exchanges arrived or `limit` passed,
    /// then return what is there.
    pub async fn wait_for(&self, count: usize, limit: Duration) -> Vec<Exchange> {
        let _ = tokio::time::timeout(limit, async {
            loop {
                let accepted = self.accepted.notified();
                if self.len() >= count {
                    return;
                }
                accepted.await;
            }
        })
        .await;
        self.exchanges()
    }
}

#[async_trait]
impl ExchangeSink for MemorySink {
    async fn reserve(&self) -> Reservation {
        let sink = self.clone();
        Reservation::new(move |exchange| {
            sink.exchanges
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(exchange);
            sink.accepted.notify_waiters();
        })
    }
}

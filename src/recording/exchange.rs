//! One proxied HTTP transaction.

use std::time::{Duration, SystemTime};

use axum::http::{HeaderMap, Method, StatusCode, Uri};
use bytes::Bytes;
use uuid::Uuid;

/// Headers and captured body of one side of an exchange.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub headers: HeaderMap,
    /// Captured bytes; empty (never absent) when there was no body.
    pub body: Bytes,
}

/// A finalized exchange, handed to sinks once the response has been relayed.
///
/// Values are frozen: sinks receive their own copy and nothing writes to it
/// afterwards.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// Correlation id used in logs.
    pub id: Uuid,
    pub method: Method,
    /// URI as received from the client.
    pub uri: Uri,
    pub request: Message,
    pub response: Message,
    pub status: StatusCode,
    /// Wall-clock time the request was accepted.
    pub started_at: SystemTime,
    /// Wall-clock time the response body finished relaying.
    pub finished_at: SystemTime,
}

impl Exchange {
    /// Client-visible latency, including body transfer.
    pub fn elapsed(&self) -> Duration {
        self.finished_at
            .duration_since(self.started_at)
            .unwrap_or_default()
    }

    /// Path and query as the client sent them.
    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }
}

#[cfg(test)]
impl Exchange {
    /// Small GET exchange for tests.
    pub(crate) fn fixture(path: &str) -> Self {
        let started_at = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            method: Method::GET,
            uri: path.parse().unwrap(),
            request: Message::default(),
            response: Message {
                headers: HeaderMap::new(),
                body: Bytes::from_static(b"ok"),
            },
            status: StatusCode::OK,
            started_at,
            finished_at: started_at + Duration::from_millis(5),
        }
    }
}

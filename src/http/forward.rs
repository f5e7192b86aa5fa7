//! Forwarding engine.
//!
//! # Responsibilities
//! - Claim room in every registered sink before the request is forwarded
//! - Clone each inbound request onto the origin, capturing the request body
//!   as it is sent
//! - Relay the origin's status, headers and body to the caller unchanged,
//!   capturing the response body as it streams
//! - Freeze the exchange once the response body has been relayed and fill
//!   the claimed room with it
//!
//! # Design Decisions
//! - Backpressure applies to new requests: while a sink is full the
//!   handler waits in `reserve`, so in-flight exchanges per sink are capped
//!   by its capacity. A response that has started never waits on a sink
//! - The response body outlives the handler, so completion is detected by
//!   the body itself ([`RelayBody`]): end of stream, a stream error, or the
//!   body being dropped (client gone, HEAD, 204) all finish the exchange.
//!   Finishing is synchronous and spawns nothing
//! - Exchanges that never got origin headers are not recorded; their
//!   reservations are dropped unfilled

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::{Instant, SystemTime};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use axum::response::IntoResponse;
use bytes::Bytes;
use hyper::body::{Body as HttpBody, Frame, Incoming, SizeHint};
use tokio::time;
use uuid::Uuid;

use crate::http::capture::{Capture, CaptureBody};
use crate::http::request::build_outbound;
use crate::http::response::ForwardError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::recording::{Exchange, Message, Reservation, Sinks};

/// Proxy handler: every method, every path.
pub(crate) async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    let (parts, body) = request.into_parts();
    let method = parts.method.to_string();
    let reservations = reserve(&state.sinks).await;

    let started_at = SystemTime::now();
    let start = Instant::now();
    let id = Uuid::new_v4();

    tracing::debug!(
        exchange_id = %id,
        peer = %peer,
        method = %parts.method,
        uri = %parts.uri,
        "Proxying request"
    );

    let (body, request_body) = CaptureBody::new(body);
    let upstream = match forward(&state, &parts, body).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(
                exchange_id = %id,
                method = %parts.method,
                uri = %parts.uri,
                error = %e,
                "Exchange aborted before reaching origin"
            );
            metrics::record_request(&method, e.status().as_u16(), start);
            return e.into_response();
        }
    };

    let (upstream_parts, upstream_body) = upstream.into_parts();
    metrics::record_request(&method, upstream_parts.status.as_u16(), start);

    let pending = PendingExchange {
        id,
        method: parts.method,
        uri: parts.uri,
        request_headers: parts.headers,
        request_body,
        status: upstream_parts.status,
        response_headers: upstream_parts.headers.clone(),
        started_at,
        start,
        reservations,
    };

    let mut response = Response::new(Body::new(RelayBody::new(upstream_body, pending)));
    *response.headers_mut() = upstream_parts.headers;
    *response.status_mut() = upstream_parts.status;
    response
}

/// One reservation per sink, in registration order.
async fn reserve(sinks: &Sinks) -> Vec<Reservation> {
    let mut reservations = Vec::with_capacity(sinks.len());
    for sink in sinks.iter() {
        reservations.push(sink.reserve().await);
    }
    reservations
}

async fn forward(
    state: &AppState,
    parts: &Parts,
    body: CaptureBody<Body>,
) -> Result<Response<Incoming>, ForwardError> {
    let outbound = build_outbound(&state.target, parts, body)?;
    let dispatch = state.client.request(outbound);

    let response = match state.upstream_timeout {
        Some(limit) => time::timeout(limit, dispatch)
            .await
            .map_err(|_| ForwardError::Timeout(limit))??,
        None => dispatch.await?,
    };
    Ok(response)
}

/// Everything known about an exchange except the response body.
pub(crate) struct PendingExchange {
    pub(crate) id: Uuid,
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) request_headers: HeaderMap,
    pub(crate) request_body: Capture,
    pub(crate) status: StatusCode,
    pub(crate) response_headers: HeaderMap,
    pub(crate) started_at: SystemTime,
    pub(crate) start: Instant,
    pub(crate) reservations: Vec<Reservation>,
}

impl PendingExchange {
    /// Freeze the exchange and fill every reservation with it.
    fn finish(self, response_body: Bytes) {
        let elapsed = self.start.elapsed();
        let exchange = Exchange {
            id: self.id,
            method: self.method,
            uri: self.uri,
            request: Message {
                headers: self.request_headers,
                body: self.request_body.take(),
            },
            response: Message {
                headers: self.response_headers,
                body: response_body,
            },
            status: self.status,
            started_at: self.started_at,
            finished_at: self.started_at + elapsed,
        };

        tracing::debug!(
            exchange_id = %exchange.id,
            status = exchange.status.as_u16(),
            request_bytes = exchange.request.body.len(),
            response_bytes = exchange.response.body.len(),
            elapsed_us = elapsed.as_micros() as u64,
            "Exchange complete"
        );

        for reservation in self.reservations {
            reservation.fill(exchange.clone());
        }
    }
}

/// Response body relayed to the client; finishes the exchange when it ends.
pub(crate) struct RelayBody<B> {
    inner: CaptureBody<B>,
    pending: Option<PendingExchange>,
}

impl<B> RelayBody<B> {
    pub(crate) fn new(body: B, pending: PendingExchange) -> Self {
        let (inner, _) = CaptureBody::new(body);
        Self {
            inner,
            pending: Some(pending),
        }
    }

    /// Finish with what was relayed so far. Only the first call does anything.
    fn finish(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.finish(self.inner.capture().take());
                true
            }
            None => false,
        }
    }
}

impl<B> HttpBody for RelayBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
            Some(Ok(frame)) => Poll::Ready(Some(Ok(frame))),
            Some(Err(e)) => {
                // Headers are committed; the client sees a cut body.
                tracing::warn!(error = %e, "Error relaying response body");
                this.finish();
                Poll::Ready(Some(Err(e)))
            }
            None => {
                this.finish();
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for RelayBody<B> {
    fn drop(&mut self) {
        if self.finish() {
            tracing::debug!("Response body released before end of stream");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecorderConfig;
    use crate::recording::{ExchangeSink, MemorySink, Recorder};
    use crate::store::MemoryStore;
    use axum::body::to_bytes;
    use futures_util::{future, stream};
    use std::sync::Arc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    async fn pending(sinks: Vec<Arc<dyn ExchangeSink>>) -> PendingExchange {
        let request_body = Capture::new();
        request_body.append(b"request");
        PendingExchange {
            id: Uuid::new_v4(),
            method: Method::POST,
            uri: "/orders?id=7".parse().unwrap(),
            request_headers: HeaderMap::new(),
            request_body,
            status: StatusCode::CREATED,
            response_headers: HeaderMap::new(),
            started_at: SystemTime::now(),
            start: Instant::now(),
            reservations: reserve(&Arc::from(sinks)).await,
        }
    }

    fn chunks(parts: Vec<Result<&'static str, std::io::Error>>) -> Body {
        Body::from_stream(stream::iter(
            parts.into_iter().map(|part| part.map(Bytes::from)),
        ))
    }

    #[tokio::test]
    async fn relays_body_then_hands_off() {
        let sink = MemorySink::new();
        let relay = RelayBody::new(
            chunks(vec![Ok("{\"ok\":"), Ok("true}")]),
            pending(vec![Arc::new(sink.clone())]).await,
        );

        let relayed = to_bytes(Body::new(relay), usize::MAX).await.unwrap();
        assert_eq!(&relayed[..], b"{\"ok\":true}");

        let exchanges = sink.exchanges();
        assert_eq!(exchanges.len(), 1);
        let exchange = &exchanges[0];
        assert_eq!(exchange.method, Method::POST);
        assert_eq!(exchange.path_and_query(), "/orders?id=7");
        assert_eq!(exchange.status, StatusCode::CREATED);
        assert_eq!(&exchange.request.body[..], b"request");
        assert_eq!(&exchange.response.body[..], b"{\"ok\":true}");
        assert!(exchange.finished_at >= exchange.started_at);
    }

    #[tokio::test]
    async fn every_sink_gets_the_exchange() {
        let first = MemorySink::new();
        let second = MemorySink::new();
        let relay = RelayBody::new(
            Body::from("body"),
            pending(vec![Arc::new(first.clone()), Arc::new(second.clone())]).await,
        );

        to_bytes(Body::new(relay), usize::MAX).await.unwrap();

        assert_eq!(first.exchanges().len(), 1);
        assert_eq!(second.exchanges().len(), 1);
    }

    #[tokio::test]
    async fn end_of_stream_does_not_wait_for_a_full_queue() {
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(Recorder::new(
            store.clone(),
            &RecorderConfig {
                queue_capacity: 1,
                ..RecorderConfig::default()
            },
        ));

        // The slot is claimed up front; nothing else can get into the queue.
        let relay = RelayBody::new(
            chunks(vec![Ok("late "), Ok("body")]),
            pending(vec![recorder.clone()]).await,
        );
        let producer = recorder.clone();
        let blocked =
            tokio::spawn(async move { producer.accept(Exchange::fixture("/next")).await });

        let relayed = time::timeout(WAIT, to_bytes(Body::new(relay), usize::MAX))
            .await
            .expect("relay completes while the queue is full")
            .unwrap();
        assert_eq!(&relayed[..], b"late body");
        assert!(!blocked.is_finished());

        recorder.start();
        time::timeout(WAIT, blocked).await.unwrap().unwrap();
        let records = store.wait_for_records(2, WAIT).await;
        assert_eq!(records[0].url, "/orders?id=7");
        assert_eq!(records[1].url, "/next");
        recorder.stop().await;
    }

    #[tokio::test]
    async fn stream_error_hands_off_partial_body() {
        let sink = MemorySink::new();
        let relay = RelayBody::new(
            chunks(vec![
                Ok("partial"),
                Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "cut")),
            ]),
            pending(vec![Arc::new(sink.clone())]).await,
        );

        assert!(to_bytes(Body::new(relay), usize::MAX).await.is_err());

        let exchanges = sink.exchanges();
        assert_eq!(exchanges.len(), 1);
        assert_eq!(&exchanges[0].response.body[..], b"partial");
    }

    #[tokio::test]
    async fn dropped_body_hands_off_what_was_relayed() {
        let sink = MemorySink::new();
        let mut relay = RelayBody::new(
            chunks(vec![Ok("first"), Ok("second")]),
            pending(vec![Arc::new(sink.clone())]).await,
        );

        let frame = future::poll_fn(|cx| Pin::new(&mut relay).poll_frame(cx))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.data_ref().map(|d| &d[..]), Some(&b"first"[..]));
        drop(relay);

        let exchanges = sink.exchanges();
        assert_eq!(exchanges.len(), 1);
        assert_eq!(&exchanges[0].response.body[..], b"first");
    }

    #[tokio::test]
    async fn unpolled_body_still_records_empty_response() {
        let sink = MemorySink::new();
        drop(RelayBody::new(
            Body::empty(),
            pending(vec![Arc::new(sink.clone())]).await,
        ));

        let exchanges = sink.exchanges();
        assert_eq!(exchanges.len(), 1);
        assert!(exchanges[0].response.body.is_empty());
    }

    #[tokio::test]
    async fn finishing_twice_delivers_once() {
        let sink = MemorySink::new();
        let mut relay = RelayBody::new(
            Body::from("once"),
            pending(vec![Arc::new(sink.clone())]).await,
        );

        let end = future::poll_fn(|cx| loop {
            match ready!(Pin::new(&mut relay).poll_frame(cx)) {
                Some(_) => continue,
                None => return Poll::Ready(()),
            }
        });
        end.await;
        drop(relay);

        assert_eq!(sink.exchanges().len(), 1);
    }
}

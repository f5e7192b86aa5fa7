//! Body capture.
//!
//! # Responsibilities
//! - Forward every frame of a body unchanged
//! - Append each data frame to a shared, growable copy while it passes
//!
//! # Design Decisions
//! - The copy lives in memory with no ceiling: an exchange costs roughly
//!   twice its body size until it is persisted. Very large bodies are a
//!   known scalability limit, there is no spill-to-disk.
//! - The copy is shared (`Capture`) because the request body is consumed by
//!   the client connection task, not by the handler that owns the exchange.
//! - Errors are passed through untouched; whatever was captured before the
//!   error stays in the copy.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use hyper::body::{Body, Frame, SizeHint};

/// Cumulative copy of the bytes that went through a [`CaptureBody`].
#[derive(Debug, Clone, Default)]
pub struct Capture {
    buf: Arc<Mutex<BytesMut>>,
}

impl Capture {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BytesMut> {
        // A panic mid-append leaves a valid prefix behind; keep using it.
        self.buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a chunk to the copy.
    pub fn append(&self, chunk: &[u8]) {
        self.lock().extend_from_slice(chunk);
    }

    /// Number of bytes captured so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand over everything captured so far, leaving the copy empty.
    ///
    /// The buffer is frozen in place, not copied.
    pub fn take(&self) -> Bytes {
        std::mem::take(&mut *self.lock()).freeze()
    }
}

/// A body adapter that duplicates data frames into a [`Capture`].
#[derive(Debug)]
pub struct CaptureBody<B> {
    inner: B,
    capture: Capture,
}

impl<B> CaptureBody<B> {
    /// Wrap `inner`, returning the adapter and a handle to its copy.
    pub fn new(inner: B) -> (Self, Capture) {
        let capture = Capture::new();
        (
            Self {
                inner,
                capture: capture.clone(),
            },
            capture,
        )
    }

    pub fn capture(&self) -> &Capture {
        &self.capture
    }
}

impl<B> Body for CaptureBody<B>
where
    B: Body<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.capture.append(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

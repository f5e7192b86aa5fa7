//! Durable representation of an exchange.
//!
//! # Responsibilities
//! - Turn a finalized [`Exchange`] into an append-only [`Record`]
//! - Assign identity, origin tag and elapsed time
//! - Encode bodies without ever losing bytes
//!
//! # Design Decisions
//! - Building is pure; the only inputs are the exchange and the builder's
//!   fixed settings (plus a fresh UUID and nothing else)
//! - Each body carries its own format tag: `str`, `base64` or `json`
//! - `json` is only used when the content type says JSON *and* the body
//!   parses; anything else falls back to the raw encoding

use std::collections::BTreeMap;

use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::{BodyEncoding, RecorderConfig};
use crate::recording::exchange::{Exchange, Message};

/// Header multimap: name → values in arrival order.
pub type Headers = BTreeMap<String, Vec<String>>;

/// Encoding tag of a recorded body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    Str,
    Base64,
    Json,
}

impl BodyFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyFormat::Str => "str",
            BodyFormat::Base64 => "base64",
            BodyFormat::Json => "json",
        }
    }
}

/// Recorded body content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    /// `str` text or `base64` text.
    Text(String),
    /// Parsed `json` document.
    Json(serde_json::Value),
}

/// One side of a recorded exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedMessage {
    pub headers: Headers,
    pub format: BodyFormat,
    pub body: Payload,
}

/// A persisted exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: Uuid,
    pub pod: String,
    pub service: String,
    pub method: String,
    pub url: String,
    pub request: RecordedMessage,
    pub response: RecordedMessage,
    /// When the request was accepted.
    pub time: DateTime<Utc>,
    /// Client-visible latency in microseconds.
    pub elapsed_us: i64,
    pub status_code: u16,
}

/// Builds records stamped with this process's origin tag.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    pod: String,
    service: String,
    encoding: BodyEncoding,
}

impl RecordBuilder {
    pub fn new(pod: impl Into<String>, service: impl Into<String>, encoding: BodyEncoding) -> Self {
        Self {
            pod: pod.into(),
            service: service.into(),
            encoding,
        }
    }

    pub fn from_config(config: &RecorderConfig) -> Self {
        Self::new(&config.pod, &config.service, config.body_encoding)
    }

    pub fn build(&self, exchange: &Exchange) -> Record {
        Record {
            id: Uuid::new_v4(),
            pod: self.pod.clone(),
            service: self.service.clone(),
            method: exchange.method.to_string(),
            url: exchange.path_and_query().to_string(),
            request: self.message(&exchange.request),
            response: self.message(&exchange.response),
            time: DateTime::<Utc>::from(exchange.started_at),
            elapsed_us: i64::try_from(exchange.elapsed().as_micros()).unwrap_or(i64::MAX),
            status_code: exchange.status.as_u16(),
        }
    }

    fn message(&self, message: &Message) -> RecordedMessage {
        let (format, body) = match self.encoding {
            BodyEncoding::Raw => encode_raw(&message.body),
            BodyEncoding::Detect => encode_detect(&message.body, &message.headers),
        };
        RecordedMessage {
            headers: to_multimap(&message.headers),
            format,
            body,
        }
    }
}

fn encode_raw(body: &[u8]) -> (BodyFormat, Payload) {
    match std::str::from_utf8(body) {
        Ok(text) => (BodyFormat::Str, Payload::Text(text.to_string())),
        Err(_) => (BodyFormat::Base64, Payload::Text(STANDARD.encode(body))),
    }
}

fn encode_detect(body: &[u8], headers: &HeaderMap) -> (BodyFormat, Payload) {
    if !body.is_empty() && is_json(headers) {
        if let Ok(value) = serde_json::from_slice(body) {
            return (BodyFormat::Json, Payload::Json(value));
        }
    }
    encode_raw(body)
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

/// Values that are not valid UTF-8 are kept with replacement characters.
pub fn to_multimap(headers: &HeaderMap) -> Headers {
    let mut map = Headers::new();
    for (name, value) in headers.iter() {
        map.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    map
}

//! Outbound request construction.
//!
//! # Responsibilities
//! - Hold the fixed origin (scheme + authority) of this proxy instance
//! - Rewrite the inbound URI onto the origin, path and query untouched
//! - Copy method and every header value verbatim, in order
//!
//! # Design Decisions
//! - `Host` is replaced by the origin authority so name-based virtual hosts
//!   on the origin see themselves, not the proxy
//! - The outbound version is left to the client; an HTTP/2 inbound request
//!   is forwarded over the pooled HTTP/1.1 connection

use std::str::FromStr;

use axum::http::header::{HeaderValue, InvalidHeaderValue, HOST};
use axum::http::request::Parts;
use axum::http::uri::{Authority, InvalidUri, PathAndQuery, Scheme};
use axum::http::{Request, Uri};
use thiserror::Error;

/// Error type for an unusable origin.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("scheme `{0}` is not supported, only `http` origins can be reached")]
    UnsupportedScheme(String),

    #[error("host is not a valid authority: {0}")]
    InvalidHost(#[from] InvalidUri),

    #[error("host is not a valid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
}

/// The origin every request is forwarded to.
#[derive(Debug, Clone)]
pub struct Target {
    scheme: Scheme,
    authority: Authority,
    host: HeaderValue,
}

impl Target {
    /// Parse an origin from its configured scheme and host.
    pub fn new(scheme: &str, host: &str) -> Result<Self, TargetError> {
        if !scheme.eq_ignore_ascii_case("http") {
            return Err(TargetError::UnsupportedScheme(scheme.to_string()));
        }
        let authority = Authority::from_str(host)?;
        let host = HeaderValue::from_str(authority.as_str())?;

        Ok(Self {
            scheme: Scheme::HTTP,
            authority,
            host,
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Address `uri`'s path and query to the origin.
    pub fn rewrite(&self, uri: &Uri) -> Result<Uri, axum::http::Error> {
        let path_and_query = uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
    }
}

/// Build the origin-bound copy of an inbound request around `body`.
pub fn build_outbound<B>(
    target: &Target,
    parts: &Parts,
    body: B,
) -> Result<Request<B>, axum::http::Error> {
    let uri = target.rewrite(&parts.uri)?;
    let mut builder = Request::builder().method(parts.method.clone()).uri(uri);

    if let Some(headers) = builder.headers_mut() {
        headers.reserve(parts.headers.len());
        for (name, value) in parts.headers.iter() {
            if name == HOST {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        headers.insert(HOST, target.host.clone());
    }

    builder.body(body)
}

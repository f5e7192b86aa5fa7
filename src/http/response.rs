//! Error responses for exchanges that never reached the origin.
//!
//! # Design Decisions
//! - Only failures before the origin's response headers arrive surface as
//!   HTTP errors; once headers are relayed, errors can only be logged
//! - Every variant maps to a 5xx status; no record is produced for them

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failure to get a response out of the origin.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to build upstream request: {0}")]
    Build(#[from] axum::http::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::Build(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ForwardError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ForwardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let message = match self {
            ForwardError::Build(_) => "Error creating proxy request",
            ForwardError::Upstream(_) => "Error sending proxy request",
            ForwardError::Timeout(_) => "Upstream request timed out",
        };
        (self.status(), message).into_response()
    }
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities and timeouts > 0, addresses parse)
//! - Check that the selected store backend has what it needs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{ProxyConfig, StoreBackend};
use crate::http::request::Target;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),

    #[error("target.host is required")]
    MissingTargetHost,

    #[error("target is invalid: {0}")]
    Target(String),

    #[error("recorder.queue_capacity must be greater than 0")]
    QueueCapacity,

    #[error("recorder.store_timeout_secs must be greater than 0")]
    StoreTimeout,

    #[error("store.mongodb.{0} is required for the mongodb backend")]
    MissingMongoField(&'static str),

    #[error("observability.metrics_address `{0}` is not a socket address")]
    MetricsAddress(String),
}

/// Check a parsed configuration, collecting every violation.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if config.target.host.is_empty() {
        errors.push(ValidationError::MissingTargetHost);
    } else if let Err(e) = Target::new(&config.target.scheme, &config.target.host) {
        errors.push(ValidationError::Target(e.to_string()));
    }

    if config.recorder.queue_capacity == 0 {
        errors.push(ValidationError::QueueCapacity);
    }
    if config.recorder.store_timeout_secs == 0 {
        errors.push(ValidationError::StoreTimeout);
    }

    if config.store.backend == StoreBackend::Mongodb {
        let mongo = &config.store.mongodb;
        for (field, value) in [
            ("uri", &mongo.uri),
            ("database", &mongo.database),
            ("collection", &mongo.collection),
        ] {
            if value.is_empty() {
                errors.push(ValidationError::MissingMongoField(field));
            }
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {reason}")]
    Env { key: &'static str, reason: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: defaults, then the optional TOML file, then
/// environment overrides, then validation.
pub fn load_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ProxyConfig::default(),
    };

    apply_env(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment variables onto `config`.
///
/// `lookup` abstracts `std::env::var` so overrides can be tested without
/// touching the process environment.
pub fn apply_env<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup("PORT") {
        let port: u16 = port.trim().parse().map_err(|e| ConfigError::Env {
            key: "PORT",
            reason: format!("{e}"),
        })?;
        config.listener.bind_address = format!("0.0.0.0:{port}");
    }

    let strings: [(&str, &mut String); 8] = [
        ("TARGET_SCHEMA", &mut config.target.scheme),
        ("TARGET_HOST", &mut config.target.host),
        ("MONGODB_URI", &mut config.store.mongodb.uri),
        ("MONGODB_DATABASE_NAME", &mut config.store.mongodb.database),
        ("MONGODB_COLLECTION_NAME", &mut config.store.mongodb.collection),
        ("MONGODB_USERNAME", &mut config.store.mongodb.username),
        ("MONGODB_PASSWORD", &mut config.store.mongodb.password),
        ("SERVICE_NAME", &mut config.recorder.service),
    ];
    for (key, field) in strings {
        if let Some(value) = lookup(key) {
            *field = value;
        }
    }

    if let Some(pod) = lookup("POD_NAME").or_else(|| lookup("HOSTNAME")) {
        config.recorder.pod = pod;
    }

    if let Some(capacity) = lookup("RECORDER_QUEUE_CAPACITY") {
        config.recorder.queue_capacity =
            capacity.trim().parse().map_err(|e| ConfigError::Env {
                key: "RECORDER_QUEUE_CAPACITY",
                reason: format!("{e}"),
            })?;
    }

    if let Some(level) = lookup("LOG_LEVEL") {
        config.observability.log_level = level;
    }

    Ok(())
}

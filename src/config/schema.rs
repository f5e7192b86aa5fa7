//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the recording proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Origin every request is forwarded to.
    pub target: TargetConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Recording queue and record shaping.
    pub recorder: RecorderConfig,

    /// Persistence backend.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// The fixed origin of this proxy instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetConfig {
    /// URI scheme used towards the origin.
    pub scheme: String,

    /// Origin authority (e.g., "orders.internal:8080").
    pub host: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: String::new(),
        }
    }
}

/// Timeout configuration for the client-facing path.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for the origin to answer with response headers.
    /// `None` leaves the call bounded only by the client connection.
    pub upstream_secs: Option<u64>,
}

/// What `accept` does when the recording queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Wait for queue space (backpressure onto the proxy).
    #[default]
    Block,
    /// Log and discard the exchange.
    Drop,
}

/// How captured bodies are encoded into records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    /// UTF-8 text as-is, anything else base64.
    #[default]
    Raw,
    /// Parse JSON bodies into structured documents, falling back to raw.
    Detect,
}

/// Recording pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Maximum number of exchanges waiting for persistence.
    pub queue_capacity: usize,

    /// Behaviour when the queue is full.
    pub overflow: OverflowPolicy,

    /// Deadline for a single store call.
    pub store_timeout_secs: u64,

    /// How long `stop` waits for the queue to drain.
    pub shutdown_timeout_secs: u64,

    /// Body encoding applied when building records.
    pub body_encoding: BodyEncoding,

    /// Pod name stamped on every record.
    pub pod: String,

    /// Service name stamped on every record.
    pub service: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            overflow: OverflowPolicy::Block,
            store_timeout_secs: 10,
            shutdown_timeout_secs: 10,
            body_encoding: BodyEncoding::Raw,
            pod: String::new(),
            service: String::new(),
        }
    }
}

/// Persistence backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Mongodb,
    /// Emit records as JSON log lines.
    Log,
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub mongodb: MongoConfig,
}

/// MongoDB connection parameters.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MongoConfig {
    /// Connection string (e.g., "mongodb://localhost:27017").
    pub uri: String,

    /// Database name.
    pub database: String,

    /// Collection records are inserted into.
    pub collection: String,

    /// Username; empty means credentials come from the URI (or none).
    pub username: String,

    /// Password for `username`.
    pub password: String,

    /// Server selection / connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            database: String::new(),
            collection: "logs".to_string(),
            username: String::new(),
            password: String::new(),
            connect_timeout_secs: 10,
        }
    }
}

// Hand-written so the password never reaches the logs.
impl std::fmt::Debug for MongoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoConfig")
            .field("uri", &self.uri)
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overrides: PORT, TARGET_HOST, MONGODB_*, ...)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the origin is fixed per process
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BodyEncoding, ListenerConfig, LogFormat, MongoConfig, ObservabilityConfig, OverflowPolicy,
    ProxyConfig, RecorderConfig, StoreBackend, StoreConfig, TargetConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};

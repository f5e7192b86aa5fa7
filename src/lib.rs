//! Recording proxy library.
//!
//! Forwards every request to a single origin, relays the answer unchanged,
//! and records each completed exchange through a bounded queue into a
//! [`store::RecordStore`].

// Core subsystems
pub mod config;
pub mod http;
pub mod recording;
pub mod store;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use recording::{Exchange, ExchangeSink, Record, Recorder};
pub use store::RecordStore;

//! Recording subsystem.
//!
//! # Data Flow
//! ```text
//! forwarding engine (Reservation claimed before dispatch)
//!     → exchange.rs (frozen Exchange, once the response is relayed)
//!     → sink.rs (Reservation::fill, one per registered sink)
//!     → recorder.rs (bounded FIFO queue → single consumer)
//!     → record.rs (Exchange → Record)
//!     → store (RecordStore::store with timeout)
//! ```
//!
//! # Design Decisions
//! - Sinks are fixed when the server is built; nothing registers later
//! - Everything after the handoff is best-effort and only logged

pub mod exchange;
pub mod record;
pub mod recorder;
pub mod sink;

pub use exchange::{Exchange, Message};
pub use record::{BodyFormat, Headers, Payload, Record, RecordBuilder, RecordedMessage};
pub use recorder::Recorder;
pub use sink::{ExchangeSink, MemorySink, Reservation, Sinks};

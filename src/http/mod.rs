//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Client request
//!     → server.rs (Axum setup, every method and path)
//!     → forward.rs (capture request body, forward to origin)
//!     → request.rs (rewrite URI and Host onto the target)
//!     → origin
//!     → forward.rs (relay status/headers, capture response body)
//!     → sinks, once the response body ends
//! ```
//!
//! Failures before the origin answers become 5xx responses (response.rs)
//! and are not recorded.

pub mod capture;
pub mod forward;
pub mod request;
pub mod response;
pub mod server;

pub use capture::{Capture, CaptureBody};
pub use request::{Target, TargetError};
pub use response::ForwardError;
pub use server::{AppState, HttpServer};

//! SubTrack Observability Library
//!
//! Logging and request correlation shared by SubTrack services:
//! - `tracing-subscriber` initialization (JSON or pretty output)
//! - Per-request trace context, taken from headers or freshly generated
//! - HTTP middleware for request/response logging

pub mod trace_context;
pub mod middleware;
pub mod init;

pub use trace_context::*;
pub use middleware::*;
pub use init::*;

// Re-export tracing for convenience
pub use tracing::{debug, error, info, warn, trace, span, Level, Instrument};
pub use tracing::instrument;

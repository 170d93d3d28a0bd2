//! Tracing and logging setup shared by the service binary and tools.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use tracing::{LogFormat, UnknownLogFormat, init};

//! Logging for retext: `tracing` subscriber setup plus the in-memory log ring
//! served by the admin API.

mod buffer;
mod subscriber;

pub use buffer::{BufferLayer, LogBuffer, LogEntry, DEFAULT_BUFFER_SIZE};
pub use subscriber::{init_subscriber, TelemetryConfig, TelemetryError};

//! Boundary primitives shared by every Tether crate.
//!
//! - `Buffer` : move-only byte range with an explicit ownership flag
//! - `optional` : conventions for optional fields in callback payloads
//! - `RequestToken` : caller token carried back with per-operation completions
//! - `codes` : MQTT QoS, connect return codes and native error codes
//! - `logging` : injected structured diagnostics interface
//! - `BoundaryError` : construction and conversion failures

pub mod buffer;
pub mod codes;
pub mod error;
pub mod logging;
pub mod optional;
pub mod token;

pub use buffer::Buffer;
pub use codes::{ConnectReturnCode, MqttErrorCode, Qos};
pub use error::{BoundaryError, BoundaryResult};
pub use logging::{LogLevel, LogRecord, LogSink, Logger, MaxLevel, MemorySink, TracingSink};
pub use optional::Presence;
pub use token::{RequestToken, TokenSource};

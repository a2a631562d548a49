//! Native library error types.

use thiserror::Error;

/// Errors reported synchronously by the native library.
#[derive(Debug, Error)]
pub enum NativeError {
    #[error("invalid config: {0}")]
    Config(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),

    #[error("{0}")]
    Other(String),
}

/// Convenience alias for native results.
pub type NativeResult<T> = Result<T, NativeError>;

//! Boundary error types.

use thiserror::Error;

/// Failures raised while building handles or converting boundary values.
///
/// None of these cross the boundary as a panic: construction entry points
/// log them and return `None`.
#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("config is missing password auth or certificate/private key auth")]
    MissingAuth,

    #[error("native config error: {0}")]
    NativeConfig(String),

    #[error("native connection error: {0}")]
    NativeConnection(String),

    #[error("error during connect: client_id [{client_id}], endpoint [{endpoint}], last error [{last_error}]")]
    Connect {
        client_id: String,
        endpoint: String,
        last_error: String,
    },

    #[error("subscription to {0} failed")]
    Subscription(&'static str),

    #[error("tunnel error: {0}")]
    Tunnel(String),

    #[error("can't parse \"{0}\" to enum \"{1}\"")]
    UnrecognizedEnumValue(i64, &'static str),
}

/// Convenience alias for boundary results.
pub type BoundaryResult<T> = Result<T, BoundaryError>;

use tether_core::BoundaryError;
use tether_native::NativeError;

/// Errors raised while bringing the agent up.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("credential error: {0}")]
    Credentials(String),

    #[error(transparent)]
    Boundary(#[from] BoundaryError),

    #[error(transparent)]
    Native(#[from] NativeError),
}

pub type AgentResult<T> = Result<T, AgentError>;

//! Tether device agent.
//!
//! - `config` : TOML configuration with serde defaults
//! - `credentials` : PEM files read into owned bytes for the client config
//! - `session` : `MqttCallbacks` implementation forwarding owned events

pub mod config;
pub mod credentials;
pub mod error;
pub mod session;

pub use config::{AgentConfig, MqttSettings};
pub use credentials::Credentials;
pub use error::{AgentError, AgentResult};
pub use session::{ConnectionStatus, Session, SessionEvent};

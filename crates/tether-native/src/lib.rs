//! Interface to the native networking library driven through the bridge.
//!
//! The bridge never talks to a transport directly. It consumes:
//! - `NativeLibrary`: factory for connections, Jobs clients and tunnels
//! - `MqttConnection`: connection lifecycle and pub/sub with per-call completions
//! - `JobsClient`: AWS IoT Jobs request/response subscriptions and publishes
//! - `TunnelingClient` / `SecureTunnel`: tunnel notifications and tunnel sessions
//! - `MockLibrary`: simulated library with fault injection for tests
//! - `RumqttcLibrary`: MQTT over `rumqttc` on a tokio runtime

pub mod error;
pub mod jobs;
pub mod library;
pub mod mock;
pub mod mqtt;
pub mod rumqtt;
pub mod topic;
pub mod tunnel;

// Re-exports for convenience.
pub use error::{NativeError, NativeResult};
pub use jobs::JobsClient;
pub use library::NativeLibrary;
pub use mock::{Fault, MockLibrary};
pub use mqtt::{Auth, ConfigBuilder, ConnectOptions, ConnectionConfig, ConnectionHandlers, MqttConnection};
pub use rumqtt::RumqttcLibrary;
pub use tunnel::{SecureTunnel, SecureTunnelBuilder, TunnelingClient};

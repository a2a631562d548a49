use std::sync::Arc;

use crate::error::NativeResult;
use crate::jobs::JobsClient;
use crate::mqtt::{ConnectionConfig, MqttConnection};
use crate::tunnel::{SecureTunnel, SecureTunnelBuilder, TunnelingClient};

/// Factory for every native object the bridge wraps.
///
/// Objects are shared (`Arc`) so the handle and each registered adapter can
/// hold a reference; the object lives until the last one is dropped.
pub trait NativeLibrary: Send + Sync {
    /// Create an MQTT connection from a validated config. The connection is
    /// not connected yet.
    fn new_connection(&self, config: ConnectionConfig) -> NativeResult<Arc<dyn MqttConnection>>;

    /// Create a Jobs client that issues its requests over `connection`.
    fn jobs_client(&self, connection: &Arc<dyn MqttConnection>) -> NativeResult<Arc<dyn JobsClient>>;

    /// Create a Secure Tunneling client over `connection`. `None` when the
    /// library could not produce a usable client.
    fn tunneling_client(&self, connection: &Arc<dyn MqttConnection>) -> Option<Arc<dyn TunnelingClient>>;

    /// Build a tunnel session. `None` when the builder was rejected.
    fn secure_tunnel(&self, builder: SecureTunnelBuilder) -> Option<Arc<dyn SecureTunnel>>;
}

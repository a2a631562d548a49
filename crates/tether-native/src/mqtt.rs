//! MQTT connection interface of the native library.

use std::sync::Arc;

use tether_core::{ConnectReturnCode, Qos};

use crate::error::{NativeError, NativeResult};

/// Port used when the config does not override it.
pub const DEFAULT_PORT: u16 = 8883;

// ── Config ────────────────────────────────────────────────────

/// How the connection authenticates with the broker.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// X.509 client certificate and private key, PEM encoded.
    Mtls {
        certificate: Vec<u8>,
        private_key: Vec<u8>,
    },
    Password {
        username: String,
        password: String,
    },
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mtls { .. } => f.write_str("Mtls"),
            Self::Password { username, .. } => {
                f.debug_struct("Password").field("username", username).finish()
            }
        }
    }
}

/// Validated connection config produced by [`ConfigBuilder::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub endpoint: String,
    pub port: Option<u16>,
    pub auth: Auth,
    /// CA bundle (PEM). `None` uses the platform trust store.
    pub certificate_authority: Option<Vec<u8>>,
    pub use_tls: bool,
}

impl ConnectionConfig {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }
}

/// Builder mirroring the native config builder: pick an auth mode, then
/// set endpoint and overrides.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    endpoint: Option<String>,
    port: Option<u16>,
    certificate: Option<Vec<u8>>,
    private_key: Option<Vec<u8>>,
    username: Option<String>,
    password: Option<String>,
    certificate_authority: Option<Vec<u8>>,
    use_tls: bool,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            endpoint: None,
            port: None,
            certificate: None,
            private_key: None,
            username: None,
            password: None,
            certificate_authority: None,
            use_tls: true,
        }
    }

    /// Start a builder for mutual TLS with a PEM certificate and key.
    pub fn with_mtls(certificate: &[u8], private_key: &[u8]) -> Self {
        Self {
            certificate: Some(certificate.to_vec()),
            private_key: Some(private_key.to_vec()),
            ..Self::new()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_port_override(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_certificate_authority(mut self, ca: &[u8]) -> Self {
        self.certificate_authority = Some(ca.to_vec());
        self
    }

    /// Plain TCP, for local brokers only. Not valid with mutual TLS.
    pub fn without_tls(mut self) -> Self {
        self.use_tls = false;
        self
    }

    pub fn build(self) -> NativeResult<ConnectionConfig> {
        let endpoint = self
            .endpoint
            .filter(|e| !e.is_empty())
            .ok_or_else(|| NativeError::Config("endpoint is required".into()))?;

        let auth = match (self.certificate, self.private_key, self.username, self.password) {
            (Some(certificate), Some(private_key), _, _)
                if !certificate.is_empty() && !private_key.is_empty() =>
            {
                if !self.use_tls {
                    return Err(NativeError::Config(
                        "certificate auth requires TLS".into(),
                    ));
                }
                Auth::Mtls {
                    certificate,
                    private_key,
                }
            }
            (_, _, Some(username), Some(password)) if !username.is_empty() => {
                Auth::Password { username, password }
            }
            _ => {
                return Err(NativeError::Config(
                    "no usable authentication configured".into(),
                ));
            }
        };

        Ok(ConnectionConfig {
            endpoint,
            port: self.port.filter(|p| *p != 0),
            auth,
            certificate_authority: self.certificate_authority.filter(|ca| !ca.is_empty()),
            use_tls: self.use_tls,
        })
    }
}

/// Session parameters passed to [`MqttConnection::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub client_id: String,
    pub clean_session: bool,
    pub keep_alive_secs: u16,
    pub ping_timeout_ms: u32,
}

// ── Handlers ──────────────────────────────────────────────────

/// `(error_code, return_code, session_present)`
pub type OnConnectionCompleted = Arc<dyn Fn(i32, ConnectReturnCode, bool) + Send + Sync>;
pub type OnConnectionClosed = Arc<dyn Fn() + Send + Sync>;
/// `(error_code)`
pub type OnConnectionInterrupted = Arc<dyn Fn(i32) + Send + Sync>;
/// `(return_code, session_present)`
pub type OnConnectionResumed = Arc<dyn Fn(ConnectReturnCode, bool) + Send + Sync>;

/// `(topic, payload, dup, qos, retain)`, once per matching publish.
pub type OnMessageReceived = Arc<dyn Fn(&str, &[u8], bool, Qos, bool) + Send + Sync>;
/// `(packet_id, topic, granted_qos, error_code)`
pub type OnSubAck = Box<dyn FnOnce(u16, &str, Qos, i32) + Send>;
/// `(packet_id, topics, granted_qos, error_code)`
pub type OnMultiSubAck = Box<dyn FnOnce(u16, &[String], Qos, i32) + Send>;
/// `(packet_id, error_code)`
pub type OnOperationComplete = Box<dyn FnOnce(u16, i32) + Send>;

/// Lifecycle slots registered once, before connecting.
#[derive(Clone, Default)]
pub struct ConnectionHandlers {
    pub on_connection_completed: Option<OnConnectionCompleted>,
    pub on_connection_closed: Option<OnConnectionClosed>,
    pub on_connection_interrupted: Option<OnConnectionInterrupted>,
    pub on_connection_resumed: Option<OnConnectionResumed>,
}

// ── Connection ────────────────────────────────────────────────

/// A native MQTT connection.
///
/// Operation calls return immediately. A nonzero packet id means the request
/// was accepted and its completion will fire later on the library's event
/// thread; `0` means it failed synchronously and nothing will fire.
pub trait MqttConnection: Send + Sync {
    fn set_handlers(&self, handlers: ConnectionHandlers);

    /// Start connecting. `false` when the attempt failed synchronously;
    /// [`MqttConnection::last_error`] then holds the native error code.
    fn connect(&self, options: &ConnectOptions) -> bool;

    fn subscribe(
        &self,
        topic: &str,
        qos: Qos,
        on_message: OnMessageReceived,
        on_sub_ack: OnSubAck,
    ) -> u16;

    fn subscribe_multiple(
        &self,
        topics: Vec<(String, OnMessageReceived)>,
        qos: Qos,
        on_sub_ack: OnMultiSubAck,
    ) -> u16;

    fn unsubscribe(&self, topic: &str, on_unsub_ack: OnOperationComplete) -> u16;

    fn publish(
        &self,
        topic: &str,
        qos: Qos,
        retain: bool,
        payload: Vec<u8>,
        on_complete: OnOperationComplete,
    ) -> u16;

    fn disconnect(&self) -> bool;

    fn last_error(&self) -> i32;
}

//! Secure Tunneling interface of the native library.

use std::sync::Arc;

use tether_core::Qos;

// ── Notify subscription ───────────────────────────────────────

/// Notification that a tunnel was opened for this thing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecureTunnelingNotifyResponse {
    pub region: Option<String>,
    pub client_mode: Option<String>,
    pub services: Option<Vec<String>>,
    pub client_access_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeToTunnelsNotifyRequest {
    pub thing_name: String,
}

/// `(response, io_error)`
pub type OnTunnelsNotify = Arc<dyn Fn(Option<&SecureTunnelingNotifyResponse>, i32) + Send + Sync>;
/// `(error_code)`, once the subscription is acknowledged.
pub type OnSubscribeComplete = Box<dyn FnOnce(i32) + Send>;

pub trait TunnelingClient: Send + Sync {
    /// `false` when the subscription failed synchronously.
    fn subscribe_to_tunnels_notify(
        &self,
        request: &SubscribeToTunnelsNotifyRequest,
        qos: Qos,
        handler: OnTunnelsNotify,
        on_complete: OnSubscribeComplete,
    ) -> bool;
}

// ── Tunnel events ─────────────────────────────────────────────

/// Service ids announced by the tunnel service on connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionData {
    pub service_id1: Option<Vec<u8>>,
    pub service_id2: Option<Vec<u8>>,
    pub service_id3: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionResetData {
    pub connection_id: u32,
    pub service_id: Option<Vec<u8>>,
}

/// Inbound data message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub connection_id: u32,
    pub payload: Option<Vec<u8>>,
    pub service_id: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendMessageCompleteData {
    pub message_type: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStartedData {
    pub connection_id: u32,
    pub service_id: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStoppedData {
    pub service_id: Option<Vec<u8>>,
}

/// Outbound data message. The payload is owned by the library once sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub connection_id: u32,
    pub payload: Vec<u8>,
}

pub type OnConnectionSuccess = Arc<dyn Fn(&ConnectionData) + Send + Sync>;
pub type OnConnectionFailure = Arc<dyn Fn(i32) + Send + Sync>;
pub type OnConnectionShutdown = Arc<dyn Fn() + Send + Sync>;
pub type OnConnectionReset = Arc<dyn Fn(i32, &ConnectionResetData) + Send + Sync>;
pub type OnSessionReset = Arc<dyn Fn() + Send + Sync>;
pub type OnSendMessageComplete = Arc<dyn Fn(i32, &SendMessageCompleteData) + Send + Sync>;
pub type OnMessageReceived = Arc<dyn Fn(&Message) + Send + Sync>;
pub type OnStreamStarted = Arc<dyn Fn(i32, &StreamStartedData) + Send + Sync>;
pub type OnStreamStopped = Arc<dyn Fn(&StreamStoppedData) + Send + Sync>;

/// The nine event slots of a tunnel session.
#[derive(Clone, Default)]
pub struct TunnelHandlers {
    pub on_connection_success: Option<OnConnectionSuccess>,
    pub on_connection_failure: Option<OnConnectionFailure>,
    pub on_connection_shutdown: Option<OnConnectionShutdown>,
    pub on_connection_reset: Option<OnConnectionReset>,
    pub on_session_reset: Option<OnSessionReset>,
    pub on_send_message_complete: Option<OnSendMessageComplete>,
    pub on_message_received: Option<OnMessageReceived>,
    pub on_stream_started: Option<OnStreamStarted>,
    pub on_stream_stopped: Option<OnStreamStopped>,
}

impl TunnelHandlers {
    /// Number of registered slots.
    pub fn registered(&self) -> usize {
        [
            self.on_connection_success.is_some(),
            self.on_connection_failure.is_some(),
            self.on_connection_shutdown.is_some(),
            self.on_connection_reset.is_some(),
            self.on_session_reset.is_some(),
            self.on_send_message_complete.is_some(),
            self.on_message_received.is_some(),
            self.on_stream_started.is_some(),
            self.on_stream_stopped.is_some(),
        ]
        .into_iter()
        .filter(|registered| *registered)
        .count()
    }
}

/// Which end of the tunnel the local proxy serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LocalProxyMode {
    #[default]
    Destination,
    Source,
}

/// Parameters and handlers for a tunnel session.
#[derive(Clone)]
pub struct SecureTunnelBuilder {
    pub endpoint: String,
    pub access_token: String,
    pub mode: LocalProxyMode,
    pub client_token: Option<String>,
    pub handlers: TunnelHandlers,
}

impl SecureTunnelBuilder {
    pub fn new(
        access_token: impl Into<String>,
        mode: LocalProxyMode,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_token: access_token.into(),
            mode,
            client_token: None,
            handlers: TunnelHandlers::default(),
        }
    }

    pub fn with_client_token(mut self, token: impl Into<String>) -> Self {
        self.client_token = Some(token.into());
        self
    }

    pub fn with_on_connection_success(mut self, handler: OnConnectionSuccess) -> Self {
        self.handlers.on_connection_success = Some(handler);
        self
    }

    pub fn with_on_connection_failure(mut self, handler: OnConnectionFailure) -> Self {
        self.handlers.on_connection_failure = Some(handler);
        self
    }

    pub fn with_on_connection_shutdown(mut self, handler: OnConnectionShutdown) -> Self {
        self.handlers.on_connection_shutdown = Some(handler);
        self
    }

    pub fn with_on_connection_reset(mut self, handler: OnConnectionReset) -> Self {
        self.handlers.on_connection_reset = Some(handler);
        self
    }

    pub fn with_on_session_reset(mut self, handler: OnSessionReset) -> Self {
        self.handlers.on_session_reset = Some(handler);
        self
    }

    pub fn with_on_send_message_complete(mut self, handler: OnSendMessageComplete) -> Self {
        self.handlers.on_send_message_complete = Some(handler);
        self
    }

    pub fn with_on_message_received(mut self, handler: OnMessageReceived) -> Self {
        self.handlers.on_message_received = Some(handler);
        self
    }

    pub fn with_on_stream_started(mut self, handler: OnStreamStarted) -> Self {
        self.handlers.on_stream_started = Some(handler);
        self
    }

    pub fn with_on_stream_stopped(mut self, handler: OnStreamStopped) -> Self {
        self.handlers.on_stream_stopped = Some(handler);
        self
    }
}

impl std::fmt::Debug for SecureTunnelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureTunnelBuilder")
            .field("endpoint", &self.endpoint)
            .field("mode", &self.mode)
            .field("client_token", &self.client_token)
            .field("handlers", &self.handlers.registered())
            .finish_non_exhaustive()
    }
}

/// An established (or establishing) tunnel session. Calls return the
/// native status: `0` on success, nonzero on failure.
pub trait SecureTunnel: Send + Sync {
    fn start(&self) -> i32;
    fn stop(&self) -> i32;
    fn send_message(&self, message: OutboundMessage) -> i32;
}

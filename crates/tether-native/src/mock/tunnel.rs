use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tether_core::Qos;

use super::{Fault, Faults, LiveToken};
use crate::tunnel::{
    ConnectionData, ConnectionResetData, LocalProxyMode, Message, OnSubscribeComplete,
    OnTunnelsNotify, OutboundMessage, SecureTunnel, SecureTunnelBuilder,
    SecureTunnelingNotifyResponse, SendMessageCompleteData, StreamStartedData, StreamStoppedData,
    SubscribeToTunnelsNotifyRequest, TunnelHandlers, TunnelingClient,
};

/// Native status returned by a failed tunnel call.
const OP_ERR: i32 = -1;

// ── Tunneling client ──────────────────────────────────────────

#[derive(Default)]
struct NotifyState {
    requests: Vec<(SubscribeToTunnelsNotifyRequest, Qos)>,
    handlers: Vec<OnTunnelsNotify>,
    pending: Vec<OnSubscribeComplete>,
}

/// Mock Secure Tunneling client.
pub struct MockTunnelingClient {
    faults: Arc<Faults>,
    state: Mutex<NotifyState>,
    _live: LiveToken,
}

impl MockTunnelingClient {
    pub(crate) fn new(faults: Arc<Faults>, live: LiveToken) -> Self {
        Self {
            faults,
            state: Mutex::new(NotifyState::default()),
            _live: live,
        }
    }

    pub fn requests(&self) -> Vec<(SubscribeToTunnelsNotifyRequest, Qos)> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Acknowledge pending subscriptions with `error_code`.
    pub fn complete_subscription(&self, error_code: i32) -> usize {
        let pending = std::mem::take(&mut self.state.lock().unwrap().pending);
        let count = pending.len();
        for on_complete in pending {
            on_complete(error_code);
        }
        count
    }

    /// Deliver a tunnel notification to every registered handler.
    pub fn fire_tunnels_notify(&self, response: Option<&SecureTunnelingNotifyResponse>, io_error: i32) -> usize {
        let handlers = self.state.lock().unwrap().handlers.clone();
        for handler in &handlers {
            handler(response, io_error);
        }
        handlers.len()
    }
}

impl TunnelingClient for MockTunnelingClient {
    fn subscribe_to_tunnels_notify(
        &self,
        request: &SubscribeToTunnelsNotifyRequest,
        qos: Qos,
        handler: OnTunnelsNotify,
        on_complete: OnSubscribeComplete,
    ) -> bool {
        if self.faults.is_set(Fault::NotifySubscribe) || self.faults.is_set(Fault::OperationsRejected) {
            return false;
        }

        let mut state = self.state.lock().unwrap();
        state.requests.push((request.clone(), qos));
        state.handlers.push(handler);
        state.pending.push(on_complete);
        true
    }
}

// ── Tunnel session ────────────────────────────────────────────

/// Mock tunnel session built from a [`SecureTunnelBuilder`].
///
/// `send_message` fails with a nonzero status unless the tunnel was started.
pub struct MockSecureTunnel {
    endpoint: String,
    access_token: String,
    mode: LocalProxyMode,
    client_token: Option<String>,
    handlers: TunnelHandlers,
    faults: Arc<Faults>,
    started: AtomicBool,
    sent: Mutex<Vec<OutboundMessage>>,
    _live: LiveToken,
}

impl MockSecureTunnel {
    pub(crate) fn new(builder: SecureTunnelBuilder, faults: Arc<Faults>, live: LiveToken) -> Self {
        Self {
            endpoint: builder.endpoint,
            access_token: builder.access_token,
            mode: builder.mode,
            client_token: builder.client_token,
            handlers: builder.handlers,
            faults,
            started: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            _live: live,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn mode(&self) -> LocalProxyMode {
        self.mode
    }

    pub fn client_token(&self) -> Option<&str> {
        self.client_token.as_deref()
    }

    pub fn registered_handlers(&self) -> usize {
        self.handlers.registered()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fire_connection_success(&self, data: &ConnectionData) -> bool {
        self.handlers
            .on_connection_success
            .as_ref()
            .map(|h| h(data))
            .is_some()
    }

    pub fn fire_connection_failure(&self, error_code: i32) -> bool {
        self.handlers
            .on_connection_failure
            .as_ref()
            .map(|h| h(error_code))
            .is_some()
    }

    pub fn fire_connection_shutdown(&self) -> bool {
        self.handlers
            .on_connection_shutdown
            .as_ref()
            .map(|h| h())
            .is_some()
    }

    pub fn fire_connection_reset(&self, error_code: i32, data: &ConnectionResetData) -> bool {
        self.handlers
            .on_connection_reset
            .as_ref()
            .map(|h| h(error_code, data))
            .is_some()
    }

    pub fn fire_session_reset(&self) -> bool {
        self.handlers.on_session_reset.as_ref().map(|h| h()).is_some()
    }

    pub fn fire_send_message_complete(&self, error_code: i32, data: &SendMessageCompleteData) -> bool {
        self.handlers
            .on_send_message_complete
            .as_ref()
            .map(|h| h(error_code, data))
            .is_some()
    }

    pub fn fire_message_received(&self, message: &Message) -> bool {
        self.handlers
            .on_message_received
            .as_ref()
            .map(|h| h(message))
            .is_some()
    }

    pub fn fire_stream_started(&self, error_code: i32, data: &StreamStartedData) -> bool {
        self.handlers
            .on_stream_started
            .as_ref()
            .map(|h| h(error_code, data))
            .is_some()
    }

    pub fn fire_stream_stopped(&self, data: &StreamStoppedData) -> bool {
        self.handlers
            .on_stream_stopped
            .as_ref()
            .map(|h| h(data))
            .is_some()
    }
}

impl SecureTunnel for MockSecureTunnel {
    fn start(&self) -> i32 {
        if self.faults.is_set(Fault::OperationsRejected) {
            return OP_ERR;
        }
        self.started.store(true, Ordering::SeqCst);
        0
    }

    fn stop(&self) -> i32 {
        if !self.started.swap(false, Ordering::SeqCst) {
            return OP_ERR;
        }
        0
    }

    fn send_message(&self, message: OutboundMessage) -> i32 {
        if !self.is_started() || self.faults.is_set(Fault::OperationsRejected) {
            return OP_ERR;
        }
        self.sent.lock().unwrap().push(message);
        0
    }
}

//! MQTT backend on `rumqttc`.
//!
//! `RumqttcConnection` keeps the native calling contract on top of rumqttc's
//! async client: every operation returns a local, nonzero request id at once
//! and its completion fires from the event loop task when the broker
//! acknowledges it. rumqttc assigns its own packet ids when a request leaves
//! the client; outgoing events arrive in request order, so each kind of
//! request is matched FIFO to the broker packet id it was given.
//!
//! Jobs and Secure Tunneling are not provided by this backend.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rumqttc::{
    AsyncClient, ClientError, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet,
    QoS, SubscribeFilter, SubscribeReasonCode, TlsConfiguration, Transport,
};
use tether_core::{ConnectReturnCode, MqttErrorCode, Qos};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::{NativeError, NativeResult};
use crate::jobs::JobsClient;
use crate::library::NativeLibrary;
use crate::mqtt::{
    Auth, ConnectOptions, ConnectionConfig, ConnectionHandlers, MqttConnection, OnMessageReceived,
    OnMultiSubAck, OnOperationComplete, OnSubAck,
};
use crate::topic;
use crate::tunnel::{SecureTunnel, SecureTunnelBuilder, TunnelingClient};

/// Capacity of the request channel between client and event loop.
const REQUEST_CAPACITY: usize = 64;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

// ── Library ───────────────────────────────────────────────────

/// Native library whose connections run on a tokio runtime.
#[derive(Debug, Clone)]
pub struct RumqttcLibrary {
    runtime: Handle,
}

impl RumqttcLibrary {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Use the runtime the caller is running on.
    pub fn current() -> NativeResult<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| NativeError::Other(format!("no tokio runtime: {e}")))
    }
}

impl NativeLibrary for RumqttcLibrary {
    fn new_connection(&self, config: ConnectionConfig) -> NativeResult<Arc<dyn MqttConnection>> {
        if config.use_tls && config.certificate_authority.is_none() {
            return Err(NativeError::Tls(
                "a certificate authority is required for TLS connections".into(),
            ));
        }
        Ok(Arc::new(RumqttcConnection::new(config, self.runtime.clone())))
    }

    fn jobs_client(&self, _connection: &Arc<dyn MqttConnection>) -> NativeResult<Arc<dyn JobsClient>> {
        Err(NativeError::Unsupported("jobs"))
    }

    fn tunneling_client(&self, _connection: &Arc<dyn MqttConnection>) -> Option<Arc<dyn TunnelingClient>> {
        tracing::error!("secure tunneling is not supported by the rumqttc backend");
        None
    }

    fn secure_tunnel(&self, _builder: SecureTunnelBuilder) -> Option<Arc<dyn SecureTunnel>> {
        tracing::error!("secure tunneling is not supported by the rumqttc backend");
        None
    }
}

// ── Wire conversions ──────────────────────────────────────────

fn to_wire(qos: Qos) -> Option<QoS> {
    match qos {
        Qos::AtMostOnce => Some(QoS::AtMostOnce),
        Qos::AtLeastOnce => Some(QoS::AtLeastOnce),
        Qos::ExactlyOnce => Some(QoS::ExactlyOnce),
        Qos::Failure => None,
    }
}

fn from_wire(qos: QoS) -> Qos {
    match qos {
        QoS::AtMostOnce => Qos::AtMostOnce,
        QoS::AtLeastOnce => Qos::AtLeastOnce,
        QoS::ExactlyOnce => Qos::ExactlyOnce,
    }
}

fn return_code(code: rumqttc::ConnectReturnCode) -> ConnectReturnCode {
    use rumqttc::ConnectReturnCode as Wire;

    match code {
        Wire::Success => ConnectReturnCode::Accepted,
        Wire::RefusedProtocolVersion => ConnectReturnCode::UnacceptableProtocolVersion,
        Wire::BadClientId => ConnectReturnCode::IdentifierRejected,
        Wire::ServiceUnavailable => ConnectReturnCode::ServerUnavailable,
        Wire::BadUserNamePassword => ConnectReturnCode::BadUsernameOrPassword,
        Wire::NotAuthorized => ConnectReturnCode::NotAuthorized,
    }
}

fn error_code(error: &ConnectionError) -> MqttErrorCode {
    match error {
        ConnectionError::ConnectionRefused(_) => MqttErrorCode::ConnackConnectionRefused,
        ConnectionError::Io(_) => MqttErrorCode::UnexpectedHangup,
        ConnectionError::RequestsDone => MqttErrorCode::ConnectionShutdown,
        _ => MqttErrorCode::ProtocolError,
    }
}

// ── Request tracking ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Subscribe,
    Unsubscribe,
    Publish,
}

enum Completion {
    Subscribe { topic: String, on_ack: OnSubAck },
    SubscribeMultiple { topics: Vec<String>, on_ack: OnMultiSubAck },
    Unsubscribe(OnOperationComplete),
    Publish(OnOperationComplete),
}

struct Request {
    id: u16,
    qos: Qos,
    completion: Completion,
}

impl Request {
    fn finish(self, granted: Qos, error_code: i32) {
        match self.completion {
            Completion::Subscribe { topic, on_ack } => on_ack(self.id, &topic, granted, error_code),
            Completion::SubscribeMultiple { topics, on_ack } => {
                on_ack(self.id, &topics, granted, error_code)
            }
            Completion::Unsubscribe(on_ack) | Completion::Publish(on_ack) => {
                on_ack(self.id, error_code)
            }
        }
    }
}

#[derive(Default)]
struct Inflight {
    /// Requests handed to rumqttc, waiting for their broker packet id.
    queued: HashMap<Kind, VecDeque<Request>>,
    /// Requests sent on the wire, waiting for the broker's ack.
    sent: HashMap<(Kind, u16), Request>,
    next_id: u16,
}

impl Inflight {
    fn next_id(&mut self) -> u16 {
        self.next_id = self.next_id.wrapping_add(1);
        if self.next_id == 0 {
            self.next_id = 1;
        }
        self.next_id
    }
}

/// State shared by the connection and its event loop task.
#[derive(Default)]
struct Shared {
    handlers: Mutex<ConnectionHandlers>,
    routes: Mutex<Vec<(String, OnMessageReceived)>>,
    inflight: Mutex<Inflight>,
    client: Mutex<Option<AsyncClient>>,
    connected_once: AtomicBool,
    online: AtomicBool,
    closing: AtomicBool,
    last_error: AtomicI32,
}

impl Shared {
    fn fail(&self, code: MqttErrorCode) {
        self.last_error.store(code as i32, Ordering::SeqCst);
    }

    fn handlers(&self) -> ConnectionHandlers {
        lock(&self.handlers).clone()
    }

    /// Queue a request and hand it to rumqttc. The queue lock is held while
    /// sending so the event loop cannot observe the outgoing packet first.
    fn submit<F>(&self, kind: Kind, qos: Qos, completion: Completion, send: F) -> u16
    where
        F: FnOnce(&AsyncClient) -> Result<(), ClientError>,
    {
        let client = lock(&self.client).clone();
        let Some(client) = client else {
            self.fail(MqttErrorCode::NotConnected);
            return 0;
        };
        if self.closing.load(Ordering::SeqCst) {
            self.fail(MqttErrorCode::ConnectionDisconnecting);
            return 0;
        }

        let mut inflight = lock(&self.inflight);
        let id = self.enqueue(&mut inflight, kind, qos, completion);
        if let Err(e) = send(&client) {
            tracing::warn!(error = %e, "rumqttc rejected request");
            inflight.queued.get_mut(&kind).and_then(VecDeque::pop_back);
            self.fail(MqttErrorCode::QueueFull);
            return 0;
        }
        id
    }

    fn enqueue(&self, inflight: &mut Inflight, kind: Kind, qos: Qos, completion: Completion) -> u16 {
        let id = inflight.next_id();
        inflight
            .queued
            .entry(kind)
            .or_default()
            .push_back(Request { id, qos, completion });
        id
    }

    fn outgoing(&self, outgoing: Outgoing) {
        let (kind, pkid) = match outgoing {
            Outgoing::Publish(pkid) => (Kind::Publish, pkid),
            Outgoing::Subscribe(pkid) => (Kind::Subscribe, pkid),
            Outgoing::Unsubscribe(pkid) => (Kind::Unsubscribe, pkid),
            _ => return,
        };

        let mut inflight = lock(&self.inflight);
        // A pkid already awaiting its ack is rumqttc resending it after a reconnect.
        if inflight.sent.contains_key(&(kind, pkid)) {
            return;
        }
        // Nothing queued means a retransmission after reconnect.
        let Some(request) = inflight.queued.get_mut(&kind).and_then(VecDeque::pop_front) else {
            return;
        };

        if kind == Kind::Publish && request.qos == Qos::AtMostOnce {
            drop(inflight);
            request.finish(Qos::AtMostOnce, 0);
        } else {
            inflight.sent.insert((kind, pkid), request);
        }
    }

    fn incoming(&self, packet: Packet) {
        match packet {
            Packet::ConnAck(ack) => {
                let code = return_code(ack.code);
                self.online.store(true, Ordering::SeqCst);
                let handlers = self.handlers();
                if self.connected_once.swap(true, Ordering::SeqCst) {
                    tracing::info!(return_code = %code, "mqtt connection resumed");
                    if let Some(on_resumed) = handlers.on_connection_resumed {
                        on_resumed(code, ack.session_present);
                    }
                } else {
                    tracing::info!(return_code = %code, "mqtt connection completed");
                    if let Some(on_completed) = handlers.on_connection_completed {
                        on_completed(0, code, ack.session_present);
                    }
                }
            }
            Packet::Publish(publish) => {
                self.route(
                    &publish.topic,
                    &publish.payload,
                    publish.dup,
                    from_wire(publish.qos),
                    publish.retain,
                );
            }
            Packet::SubAck(ack) => {
                let granted = ack
                    .return_codes
                    .iter()
                    .map(|code| match code {
                        SubscribeReasonCode::Success(qos) => Some(from_wire(*qos)),
                        SubscribeReasonCode::Failure => None,
                    })
                    .collect::<Option<Vec<_>>>()
                    .and_then(|granted| granted.into_iter().min_by_key(|qos| *qos as i32))
                    .unwrap_or(Qos::Failure);
                self.complete(Kind::Subscribe, ack.pkid, granted);
            }
            Packet::UnsubAck(ack) => self.complete(Kind::Unsubscribe, ack.pkid, Qos::AtMostOnce),
            Packet::PubAck(ack) => self.complete(Kind::Publish, ack.pkid, Qos::AtLeastOnce),
            Packet::PubComp(ack) => self.complete(Kind::Publish, ack.pkid, Qos::ExactlyOnce),
            _ => {}
        }
    }

    fn complete(&self, kind: Kind, pkid: u16, granted: Qos) {
        let request = lock(&self.inflight).sent.remove(&(kind, pkid));
        if let Some(request) = request {
            request.finish(granted, 0);
        }
    }

    /// Fail every outstanding request with `code`.
    fn abandon(&self, code: MqttErrorCode) {
        let requests: Vec<Request> = {
            let mut inflight = lock(&self.inflight);
            let mut requests: Vec<Request> = inflight.queued.drain().flat_map(|(_, q)| q).collect();
            requests.extend(inflight.sent.drain().map(|(_, r)| r));
            requests
        };
        for request in requests {
            request.finish(Qos::Failure, code as i32);
        }
    }

    /// Resubscribing to a filter replaces its handler.
    fn add_routes(&self, routes: impl IntoIterator<Item = (String, OnMessageReceived)>) {
        let mut table = lock(&self.routes);
        for (filter, handler) in routes {
            match table.iter_mut().find(|(existing, _)| *existing == filter) {
                Some(entry) => entry.1 = handler,
                None => table.push((filter, handler)),
            }
        }
    }

    fn route(&self, topic: &str, payload: &[u8], dup: bool, qos: Qos, retain: bool) {
        let handlers: Vec<OnMessageReceived> = lock(&self.routes)
            .iter()
            .filter(|(filter, _)| topic::matches(filter, topic))
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        if handlers.is_empty() {
            tracing::debug!(topic, "publish without a matching subscription");
        }
        for handler in handlers {
            handler(topic, payload, dup, qos, retain);
        }
    }

    fn interrupted(&self, code: MqttErrorCode) {
        if !self.online.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(on_interrupted) = self.handlers().on_connection_interrupted {
            on_interrupted(code as i32);
        }
    }

    fn closed(&self) {
        self.online.store(false, Ordering::SeqCst);
        *lock(&self.client) = None;
        self.abandon(MqttErrorCode::ConnectionShutdown);
        if let Some(on_closed) = self.handlers().on_connection_closed {
            on_closed();
        }
    }
}

/// Drive the rumqttc event loop until the connection is closed or the first
/// connection attempt fails.
async fn run(mut eventloop: EventLoop, shared: Arc<Shared>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(packet)) => shared.incoming(packet),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::info!("mqtt connection closed");
                shared.closed();
                break;
            }
            Ok(Event::Outgoing(outgoing)) => shared.outgoing(outgoing),
            Err(e) => {
                if shared.closing.load(Ordering::SeqCst) {
                    shared.closed();
                    break;
                }

                let code = error_code(&e);
                shared.fail(code);

                if shared.connected_once.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "mqtt connection interrupted");
                    shared.interrupted(code);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }

                tracing::error!(error = %e, "mqtt connection failed");
                let return_code = match &e {
                    ConnectionError::ConnectionRefused(code) => self::return_code(*code),
                    _ => ConnectReturnCode::Accepted,
                };
                *lock(&shared.client) = None;
                shared.abandon(code);
                if let Some(on_completed) = shared.handlers().on_connection_completed {
                    on_completed(code as i32, return_code, false);
                }
                break;
            }
        }
    }
}

// ── Connection ────────────────────────────────────────────────

/// MQTT connection backed by `rumqttc`.
pub struct RumqttcConnection {
    config: ConnectionConfig,
    runtime: Handle,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RumqttcConnection {
    fn new(config: ConnectionConfig, runtime: Handle) -> Self {
        Self {
            config,
            runtime,
            shared: Arc::new(Shared::default()),
            task: Mutex::new(None),
        }
    }

    fn mqtt_options(&self, options: &ConnectOptions) -> NativeResult<MqttOptions> {
        if options.client_id.is_empty() {
            return Err(NativeError::Config("client id is required".into()));
        }

        let mut mqtt = MqttOptions::new(&options.client_id, &self.config.endpoint, self.config.port());
        mqtt.set_keep_alive(Duration::from_secs(options.keep_alive_secs.into()));
        mqtt.set_clean_session(options.clean_session);

        if let Auth::Password { username, password } = &self.config.auth {
            mqtt.set_credentials(username.clone(), password.clone());
        }

        if self.config.use_tls {
            mqtt.set_transport(self.transport()?);
        }

        tracing::debug!(
            ping_timeout_ms = options.ping_timeout_ms,
            "rumqttc derives its ping timeout from the keep-alive interval"
        );
        Ok(mqtt)
    }

    fn transport(&self) -> NativeResult<Transport> {
        let ca = self
            .config
            .certificate_authority
            .clone()
            .ok_or_else(|| NativeError::Tls("missing certificate authority".into()))?;

        let client_auth = match &self.config.auth {
            Auth::Mtls {
                certificate,
                private_key,
            } => Some((certificate.clone(), private_key.clone())),
            Auth::Password { .. } => None,
        };

        Ok(Transport::tls_with_config(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth,
        }))
    }
}

impl Drop for RumqttcConnection {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().ok().and_then(Option::take) {
            task.abort();
        }
    }
}

impl MqttConnection for RumqttcConnection {
    fn set_handlers(&self, handlers: ConnectionHandlers) {
        *lock(&self.shared.handlers) = handlers;
    }

    fn connect(&self, options: &ConnectOptions) -> bool {
        let mqtt = match self.mqtt_options(options) {
            Ok(mqtt) => mqtt,
            Err(e) => {
                tracing::error!(error = %e, "invalid connect options");
                self.shared.fail(MqttErrorCode::ConnectOptionsValidation);
                return false;
            }
        };

        let mut task = lock(&self.task);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            self.shared.fail(MqttErrorCode::AlreadyConnected);
            return false;
        }

        let (client, eventloop) = AsyncClient::new(mqtt, REQUEST_CAPACITY);
        *lock(&self.shared.client) = Some(client);
        self.shared.closing.store(false, Ordering::SeqCst);
        self.shared.connected_once.store(false, Ordering::SeqCst);

        tracing::info!(
            client_id = %options.client_id,
            endpoint = %self.config.endpoint,
            port = self.config.port(),
            "mqtt connecting"
        );
        *task = Some(self.runtime.spawn(run(eventloop, Arc::clone(&self.shared))));
        true
    }

    fn subscribe(&self, topic: &str, qos: Qos, on_message: OnMessageReceived, on_sub_ack: OnSubAck) -> u16 {
        let Some(wire) = to_wire(qos) else {
            self.shared.fail(MqttErrorCode::InvalidQos);
            return 0;
        };

        let completion = Completion::Subscribe {
            topic: topic.to_string(),
            on_ack: on_sub_ack,
        };
        let id = self
            .shared
            .submit(Kind::Subscribe, qos, completion, |client| client.try_subscribe(topic, wire));
        if id != 0 {
            self.shared.add_routes([(topic.to_string(), on_message)]);
        }
        id
    }

    fn subscribe_multiple(
        &self,
        topics: Vec<(String, OnMessageReceived)>,
        qos: Qos,
        on_sub_ack: OnMultiSubAck,
    ) -> u16 {
        let Some(wire) = to_wire(qos) else {
            self.shared.fail(MqttErrorCode::InvalidQos);
            return 0;
        };
        if topics.is_empty() {
            self.shared.fail(MqttErrorCode::ConnectionResubscribeNoTopics);
            return 0;
        }

        let filters: Vec<String> = topics.iter().map(|(filter, _)| filter.clone()).collect();
        let completion = Completion::SubscribeMultiple {
            topics: filters.clone(),
            on_ack: on_sub_ack,
        };
        let id = self.shared.submit(Kind::Subscribe, qos, completion, |client| {
            client.try_subscribe_many(
                filters
                    .iter()
                    .map(|filter| SubscribeFilter::new(filter.clone(), wire)),
            )
        });
        if id != 0 {
            self.shared.add_routes(topics);
        }
        id
    }

    fn unsubscribe(&self, topic: &str, on_unsub_ack: OnOperationComplete) -> u16 {
        let completion = Completion::Unsubscribe(on_unsub_ack);
        let id = self.shared.submit(Kind::Unsubscribe, Qos::AtLeastOnce, completion, |client| {
            client.try_unsubscribe(topic)
        });
        if id != 0 {
            lock(&self.shared.routes).retain(|(filter, _)| filter != topic);
        }
        id
    }

    fn publish(
        &self,
        topic: &str,
        qos: Qos,
        retain: bool,
        payload: Vec<u8>,
        on_complete: OnOperationComplete,
    ) -> u16 {
        let Some(wire) = to_wire(qos) else {
            self.shared.fail(MqttErrorCode::InvalidQos);
            return 0;
        };

        let completion = Completion::Publish(on_complete);
        self.shared.submit(Kind::Publish, qos, completion, |client| {
            client.try_publish(topic, wire, retain, payload)
        })
    }

    fn disconnect(&self) -> bool {
        let client = lock(&self.shared.client).clone();
        let Some(client) = client else {
            return false;
        };
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return false;
        }

        match client.try_disconnect() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "mqtt disconnect failed");
                self.shared.closing.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    fn last_error(&self) -> i32 {
        self.shared.last_error.load(Ordering::SeqCst)
    }
}

/// Locks `mutex`, recovering the data if a handler panicked while holding it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

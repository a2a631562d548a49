//! Secure Tunneling façades: the notify subscription and tunnel sessions.

use std::sync::Arc;

use tether_core::{BoundaryError, BoundaryResult, Buffer, Logger, Qos, diag};
use tether_native::tunnel::{
    ConnectionData, ConnectionResetData, LocalProxyMode, Message, OnTunnelsNotify, OutboundMessage,
    SecureTunnel, SecureTunnelBuilder, SecureTunnelingNotifyResponse, SendMessageCompleteData,
    StreamStartedData, StreamStoppedData, SubscribeToTunnelsNotifyRequest, TunnelingClient,
};
use tether_native::{MqttConnection, NativeLibrary};

use crate::handle::{Adapter, Event, Handle};
use crate::mqtt::MqttClient;
use crate::payload::TunnelNotification;

// ── Notify subscription ───────────────────────────────────────

/// Caller callbacks for a [`TunnelClient`].
pub trait TunnelClientCallbacks: Send + Sync {
    fn on_subscribe_complete(&self, error_code: i32);

    /// A tunnel was opened for this thing.
    fn on_tunnel_notify(&self, notification: TunnelNotification<'_>);
}

enum NotifyEvent<'a> {
    SubscribeComplete { error_code: i32 },
    Notify(TunnelNotification<'a>),
}

impl Event<dyn TunnelClientCallbacks> for NotifyEvent<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::SubscribeComplete { .. } => "on_subscribe_complete",
            Self::Notify(_) => "on_tunnel_notify",
        }
    }

    fn deliver(self, callbacks: &dyn TunnelClientCallbacks) {
        match self {
            Self::SubscribeComplete { error_code } => callbacks.on_subscribe_complete(error_code),
            Self::Notify(notification) => callbacks.on_tunnel_notify(notification),
        }
    }
}

/// Subscription to the tunnel notifications of one thing.
pub struct TunnelClient {
    handle: Handle<dyn TunnelingClient, dyn TunnelClientCallbacks>,
    _connection: Arc<dyn MqttConnection>,
    thing_name: String,
}

impl TunnelClient {
    pub fn new(
        library: &dyn NativeLibrary,
        mqtt: &MqttClient,
        context: Arc<dyn TunnelClientCallbacks>,
        qos: Qos,
        thing_name: &str,
    ) -> BoundaryResult<Self> {
        let logger = mqtt.logger().clone();
        diag!(logger, Debug, "start building internal tunnel client for [{thing_name}]");

        let Some(client) = library.tunneling_client(mqtt.connection()) else {
            return Err(BoundaryError::Tunnel(
                "couldn't create a tunneling client".into(),
            ));
        };

        let adapter = Adapter::new(Arc::clone(&context), logger);
        let request = SubscribeToTunnelsNotifyRequest {
            thing_name: thing_name.to_string(),
        };
        let subscribed = client.subscribe_to_tunnels_notify(
            &request,
            qos,
            notify_handler(&adapter),
            adapter.completion(|error_code: i32| NotifyEvent::SubscribeComplete { error_code }),
        );
        if !subscribed {
            return Err(BoundaryError::Subscription("TunnelsNotify"));
        }

        Ok(Self {
            handle: Handle::new(client, context),
            _connection: Arc::clone(mqtt.connection()),
            thing_name: thing_name.to_string(),
        })
    }

    pub fn handle(&self) -> &Handle<dyn TunnelingClient, dyn TunnelClientCallbacks> {
        &self.handle
    }

    pub fn thing_name(&self) -> &str {
        &self.thing_name
    }
}

fn notify_handler(adapter: &Adapter<dyn TunnelClientCallbacks>) -> OnTunnelsNotify {
    let adapter = adapter.clone();
    Arc::new(
        move |response: Option<&SecureTunnelingNotifyResponse>, io_error: i32| {
            if io_error != 0 {
                diag!(adapter.logger(), Error, "subscribing failed, error_code [{io_error}]");
                return;
            }
            match notification(response) {
                Ok(notification) => adapter.dispatch(NotifyEvent::Notify(notification)),
                Err(reason) => diag!(adapter.logger(), Error, "{reason}"),
            }
        },
    )
}

fn notification(
    response: Option<&SecureTunnelingNotifyResponse>,
) -> Result<TunnelNotification<'_>, &'static str> {
    let response = response.ok_or("tunnel notification without a response")?;
    let access_token = response
        .client_access_token
        .as_deref()
        .ok_or("missing the access token")?;
    let region = response.region.as_deref().ok_or("missing the region")?;
    let client_mode = response
        .client_mode
        .as_deref()
        .ok_or("missing the client mode")?;

    Ok(TunnelNotification {
        access_token,
        region,
        client_mode,
        services: response.services.as_deref().unwrap_or_default(),
    })
}

pub fn internal_tunnel_client(
    library: &dyn NativeLibrary,
    mqtt: &MqttClient,
    context: Arc<dyn TunnelClientCallbacks>,
    qos: Qos,
    thing_name: &str,
) -> Option<Box<TunnelClient>> {
    match TunnelClient::new(library, mqtt, context, qos, thing_name) {
        Ok(client) => Some(Box::new(client)),
        Err(e) => {
            diag!(mqtt.logger(), Error, "{e}");
            None
        }
    }
}

pub fn drop_tunnel_client(client: Box<TunnelClient>) {
    drop(client);
}

// ── Tunnel session ────────────────────────────────────────────

/// Caller callbacks for a [`Tunnel`]. An absent service id or payload is an
/// empty [`Buffer`].
pub trait TunnelCallbacks: Send + Sync {
    fn on_connection_success(
        &self,
        service_id1: Buffer<'_>,
        service_id2: Buffer<'_>,
        service_id3: Buffer<'_>,
    );

    fn on_connection_failure(&self, error_code: i32);

    fn on_connection_shutdown(&self);

    fn on_connection_reset(&self, error_code: i32, connection_id: u32, service_id: Buffer<'_>);

    fn on_session_reset(&self);

    fn on_send_message_complete(&self, error_code: i32, message_type: Buffer<'_>);

    fn on_message_received(&self, connection_id: u32, payload: Buffer<'_>, service_id: Buffer<'_>);

    fn on_stream_started(&self, error_code: i32, connection_id: u32, service_id: Buffer<'_>);

    fn on_stream_stopped(&self, service_id: Buffer<'_>);
}

enum TunnelEvent<'a> {
    ConnectionSuccess([Buffer<'a>; 3]),
    ConnectionFailure(i32),
    ConnectionShutdown,
    ConnectionReset {
        error_code: i32,
        connection_id: u32,
        service_id: Buffer<'a>,
    },
    SessionReset,
    SendMessageComplete {
        error_code: i32,
        message_type: Buffer<'a>,
    },
    MessageReceived {
        connection_id: u32,
        payload: Buffer<'a>,
        service_id: Buffer<'a>,
    },
    StreamStarted {
        error_code: i32,
        connection_id: u32,
        service_id: Buffer<'a>,
    },
    StreamStopped(Buffer<'a>),
}

impl Event<dyn TunnelCallbacks> for TunnelEvent<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::ConnectionSuccess(_) => "on_connection_success",
            Self::ConnectionFailure(_) => "on_connection_failure",
            Self::ConnectionShutdown => "on_connection_shutdown",
            Self::ConnectionReset { .. } => "on_connection_reset",
            Self::SessionReset => "on_session_reset",
            Self::SendMessageComplete { .. } => "on_send_message_complete",
            Self::MessageReceived { .. } => "on_message_received",
            Self::StreamStarted { .. } => "on_stream_started",
            Self::StreamStopped(_) => "on_stream_stopped",
        }
    }

    fn deliver(self, callbacks: &dyn TunnelCallbacks) {
        match self {
            Self::ConnectionSuccess([id1, id2, id3]) => callbacks.on_connection_success(id1, id2, id3),
            Self::ConnectionFailure(error_code) => callbacks.on_connection_failure(error_code),
            Self::ConnectionShutdown => callbacks.on_connection_shutdown(),
            Self::ConnectionReset {
                error_code,
                connection_id,
                service_id,
            } => callbacks.on_connection_reset(error_code, connection_id, service_id),
            Self::SessionReset => callbacks.on_session_reset(),
            Self::SendMessageComplete {
                error_code,
                message_type,
            } => callbacks.on_send_message_complete(error_code, message_type),
            Self::MessageReceived {
                connection_id,
                payload,
                service_id,
            } => callbacks.on_message_received(connection_id, payload, service_id),
            Self::StreamStarted {
                error_code,
                connection_id,
                service_id,
            } => callbacks.on_stream_started(error_code, connection_id, service_id),
            Self::StreamStopped(service_id) => callbacks.on_stream_stopped(service_id),
        }
    }
}

fn lend(bytes: &Option<Vec<u8>>) -> Buffer<'_> {
    bytes.as_deref().map(Buffer::from_borrowed).unwrap_or_default()
}

/// A tunnel session with all nine event slots bound to the caller.
pub struct Tunnel {
    handle: Handle<dyn SecureTunnel, dyn TunnelCallbacks>,
    logger: Logger,
}

impl Tunnel {
    pub fn new(
        library: &dyn NativeLibrary,
        context: Arc<dyn TunnelCallbacks>,
        endpoint: &str,
        access_token: &str,
        mode: LocalProxyMode,
        logger: Logger,
    ) -> BoundaryResult<Self> {
        diag!(logger, Debug, "start building internal tunnel to [{endpoint}] in {mode:?} mode");

        let adapter = Adapter::new(Arc::clone(&context), logger.clone());
        let builder = bind(SecureTunnelBuilder::new(access_token, mode, endpoint), &adapter);
        let Some(tunnel) = library.secure_tunnel(builder) else {
            return Err(BoundaryError::Tunnel("tunnel equals to null".into()));
        };

        Ok(Self {
            handle: Handle::new(tunnel, context),
            logger,
        })
    }

    pub fn handle(&self) -> &Handle<dyn SecureTunnel, dyn TunnelCallbacks> {
        &self.handle
    }

    /// Returns the native status, `0` on success.
    pub fn start(&self) -> i32 {
        let status = self.handle.native().start();
        if status != 0 {
            diag!(self.logger, Warn, "tunnel start failed with [{status}]");
        }
        status
    }

    pub fn stop(&self) -> i32 {
        let status = self.handle.native().stop();
        if status != 0 {
            diag!(self.logger, Warn, "tunnel stop failed with [{status}]");
        }
        status
    }

    /// Send `payload` on `connection_id`. The bytes are copied into the native
    /// message, so the caller's buffer is released independently.
    pub fn send_message(&self, connection_id: u32, payload: Buffer<'_>) -> i32 {
        self.handle.native().send_message(OutboundMessage {
            connection_id,
            payload: payload.to_vec(),
        })
    }
}

fn bind(builder: SecureTunnelBuilder, adapter: &Adapter<dyn TunnelCallbacks>) -> SecureTunnelBuilder {
    let on_success = adapter.clone();
    let on_failure = adapter.clone();
    let on_shutdown = adapter.clone();
    let on_reset = adapter.clone();
    let on_session_reset = adapter.clone();
    let on_sent = adapter.clone();
    let on_message = adapter.clone();
    let on_started = adapter.clone();
    let on_stopped = adapter.clone();

    builder
        .with_on_connection_success(Arc::new(move |data: &ConnectionData| {
            on_success.dispatch(TunnelEvent::ConnectionSuccess([
                lend(&data.service_id1),
                lend(&data.service_id2),
                lend(&data.service_id3),
            ]));
        }))
        .with_on_connection_failure(Arc::new(move |error_code: i32| {
            on_failure.dispatch(TunnelEvent::ConnectionFailure(error_code));
        }))
        .with_on_connection_shutdown(Arc::new(move || {
            on_shutdown.dispatch(TunnelEvent::ConnectionShutdown);
        }))
        .with_on_connection_reset(Arc::new(move |error_code: i32, data: &ConnectionResetData| {
            on_reset.dispatch(TunnelEvent::ConnectionReset {
                error_code,
                connection_id: data.connection_id,
                service_id: lend(&data.service_id),
            });
        }))
        .with_on_session_reset(Arc::new(move || {
            on_session_reset.dispatch(TunnelEvent::SessionReset);
        }))
        .with_on_send_message_complete(Arc::new(
            move |error_code: i32, data: &SendMessageCompleteData| {
                on_sent.dispatch(TunnelEvent::SendMessageComplete {
                    error_code,
                    message_type: Buffer::from_borrowed(&data.message_type),
                });
            },
        ))
        .with_on_message_received(Arc::new(move |message: &Message| {
            on_message.dispatch(TunnelEvent::MessageReceived {
                connection_id: message.connection_id,
                payload: lend(&message.payload),
                service_id: lend(&message.service_id),
            });
        }))
        .with_on_stream_started(Arc::new(move |error_code: i32, data: &StreamStartedData| {
            on_started.dispatch(TunnelEvent::StreamStarted {
                error_code,
                connection_id: data.connection_id,
                service_id: lend(&data.service_id),
            });
        }))
        .with_on_stream_stopped(Arc::new(move |data: &StreamStoppedData| {
            on_stopped.dispatch(TunnelEvent::StreamStopped(lend(&data.service_id)));
        }))
}

/// Build a destination-mode tunnel, logging the reason and returning `None`
/// on failure.
pub fn internal_tunnel(
    library: &dyn NativeLibrary,
    context: Arc<dyn TunnelCallbacks>,
    endpoint: &str,
    access_token: &str,
    logger: Logger,
) -> Option<Box<Tunnel>> {
    let built = Tunnel::new(
        library,
        context,
        endpoint,
        access_token,
        LocalProxyMode::Destination,
        logger.clone(),
    );
    match built {
        Ok(tunnel) => Some(Box::new(tunnel)),
        Err(e) => {
            diag!(logger, Error, "{e}");
            None
        }
    }
}

pub fn drop_tunnel(tunnel: Box<Tunnel>) {
    drop(tunnel);
}

#[cfg(test)]
mod tests {
    use tether_core::{LogLevel, MemorySink};
    use tether_native::mock::{Fault, MockLibrary};

    use super::*;
    use crate::mock::{Call, Recorder, client_config};

    fn mqtt(library: &MockLibrary, logger: Logger) -> MqttClient {
        MqttClient::new(library, &client_config(), Arc::new(Recorder::new()), logger).unwrap()
    }

    #[test]
    fn notify_with_all_fields_is_forwarded() {
        let library = MockLibrary::new();
        let recorder = Arc::new(Recorder::new());
        let mqtt = mqtt(&library, Logger::tracing());
        let client = TunnelClient::new(&library, &mqtt, recorder.clone(), Qos::AtLeastOnce, "pump-7").unwrap();

        let native = library.tunneling().unwrap();
        assert_eq!(native.requests()[0].0.thing_name, "pump-7");
        assert_eq!(native.complete_subscription(0), 1);

        let response = SecureTunnelingNotifyResponse {
            region: Some("eu-west-1".into()),
            client_mode: Some("destination".into()),
            services: Some(vec!["SSH".into()]),
            client_access_token: Some("dest-token".into()),
        };
        assert_eq!(native.fire_tunnels_notify(Some(&response), 0), 1);

        assert_eq!(
            recorder.calls(),
            vec![
                Call::NotifySubscribed { error_code: 0 },
                Call::TunnelNotify {
                    access_token: "dest-token".into(),
                    region: "eu-west-1".into(),
                    client_mode: "destination".into(),
                    services: vec!["SSH".into()],
                },
            ]
        );
        assert_eq!(client.thing_name(), "pump-7");
    }

    #[test]
    fn incomplete_notify_is_logged_not_forwarded() {
        let library = MockLibrary::new();
        let recorder = Arc::new(Recorder::new());
        let sink = Arc::new(MemorySink::new());
        let mqtt = mqtt(&library, Logger::new(sink.clone()));
        let _client = TunnelClient::new(&library, &mqtt, recorder.clone(), Qos::AtLeastOnce, "pump-7").unwrap();
        let native = library.tunneling().unwrap();

        let response = SecureTunnelingNotifyResponse {
            client_access_token: Some("dest-token".into()),
            client_mode: Some("destination".into()),
            ..Default::default()
        };
        native.fire_tunnels_notify(Some(&response), 0);
        native.fire_tunnels_notify(None, 0);
        native.fire_tunnels_notify(Some(&response), 3);

        assert!(recorder.calls().is_empty());
        assert_eq!(
            sink.messages(LogLevel::Error),
            vec![
                "missing the region",
                "tunnel notification without a response",
                "subscribing failed, error_code [3]",
            ]
        );
    }

    #[test]
    fn unusable_client_or_refused_subscription_fails() {
        let library = MockLibrary::new();
        let mqtt = mqtt(&library, Logger::tracing());

        library.inject(Fault::TunnelingClient);
        assert!(internal_tunnel_client(&library, &mqtt, Arc::new(Recorder::new()), Qos::AtLeastOnce, "t").is_none());

        library.clear(Fault::TunnelingClient);
        library.inject(Fault::NotifySubscribe);
        assert!(internal_tunnel_client(&library, &mqtt, Arc::new(Recorder::new()), Qos::AtLeastOnce, "t").is_none());

        assert_eq!(library.live_objects(), 1);
    }

    #[test]
    fn tunnel_binds_every_slot_in_destination_mode() {
        let library = MockLibrary::new();
        let tunnel = internal_tunnel(
            &library,
            Arc::new(Recorder::new()),
            "data.tunneling.iot.eu-west-1.amazonaws.com",
            "dest-token",
            Logger::tracing(),
        )
        .unwrap();

        let native = library.tunnel().unwrap();
        assert_eq!(native.registered_handlers(), 9);
        assert_eq!(native.mode(), LocalProxyMode::Destination);
        assert_eq!(native.access_token(), "dest-token");
        drop(native);

        drop_tunnel(tunnel);
        assert_eq!(library.live_objects(), 0);
    }

    #[test]
    fn rejected_builder_fails_construction() {
        let library = MockLibrary::new();
        let sink = Arc::new(MemorySink::new());
        library.inject(Fault::TunnelBuild);

        let tunnel = internal_tunnel(&library, Arc::new(Recorder::new()), "endpoint", "token", Logger::new(sink.clone()));

        assert!(tunnel.is_none());
        assert!(sink.contains(LogLevel::Error, "tunnel equals to null"));
    }

    #[test]
    fn events_arrive_in_order_with_absent_ids_empty() {
        let library = MockLibrary::new();
        let recorder = Arc::new(Recorder::new());
        let _tunnel = Tunnel::new(
            &library,
            recorder.clone(),
            "endpoint",
            "token",
            LocalProxyMode::Source,
            Logger::tracing(),
        )
        .unwrap();
        let native = library.tunnel().unwrap();

        native.fire_connection_success(&ConnectionData {
            service_id1: Some(b"SSH".to_vec()),
            ..Default::default()
        });
        native.fire_stream_started(0, &StreamStartedData {
            connection_id: 1,
            service_id: Some(b"SSH".to_vec()),
        });
        native.fire_message_received(&Message {
            connection_id: 1,
            payload: Some(b"ls\n".to_vec()),
            service_id: None,
        });
        native.fire_send_message_complete(0, &SendMessageCompleteData {
            message_type: b"DATA".to_vec(),
        });
        native.fire_connection_reset(7, &ConnectionResetData {
            connection_id: 1,
            service_id: None,
        });
        native.fire_stream_stopped(&StreamStoppedData { service_id: None });
        native.fire_session_reset();
        native.fire_connection_failure(2);
        native.fire_connection_shutdown();

        assert_eq!(
            recorder.calls(),
            vec![
                Call::ConnectionSuccess {
                    service_ids: [b"SSH".to_vec(), Vec::new(), Vec::new()],
                },
                Call::StreamStarted {
                    error_code: 0,
                    connection_id: 1,
                    service_id: b"SSH".to_vec(),
                },
                Call::MessageReceived {
                    connection_id: 1,
                    payload: b"ls\n".to_vec(),
                    service_id: Vec::new(),
                },
                Call::SendMessageComplete {
                    error_code: 0,
                    message_type: b"DATA".to_vec(),
                },
                Call::ConnectionReset {
                    error_code: 7,
                    connection_id: 1,
                    service_id: Vec::new(),
                },
                Call::StreamStopped {
                    service_id: Vec::new(),
                },
                Call::SessionReset,
                Call::ConnectionFailure { error_code: 2 },
                Call::ConnectionShutdown,
            ]
        );
    }

    #[test]
    fn send_copies_payload() {
        let library = MockLibrary::new();
        let tunnel = internal_tunnel(&library, Arc::new(Recorder::new()), "endpoint", "token", Logger::tracing()).unwrap();

        let payload = Buffer::copy_from(b"ssh-data");
        assert_ne!(tunnel.send_message(3, Buffer::from_borrowed(payload.as_slice())), 0);
        assert_eq!(tunnel.start(), 0);
        assert_eq!(tunnel.send_message(3, payload), 0);

        let sent = library.tunnel().unwrap().sent();
        assert_eq!(
            sent,
            vec![OutboundMessage {
                connection_id: 3,
                payload: b"ssh-data".to_vec(),
            }]
        );
        assert_eq!(tunnel.stop(), 0);
    }
}

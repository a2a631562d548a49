//! MQTT façade: one handle per native connection.

use std::num::NonZeroU16;
use std::sync::Arc;

use tether_core::{
    BoundaryError, BoundaryResult, Buffer, ConnectReturnCode, Logger, MqttErrorCode, Qos, diag,
};
use tether_native::{
    ConfigBuilder, ConnectOptions, ConnectionHandlers, MqttConnection, NativeLibrary,
};

use crate::handle::{Adapter, Event, Handle};
use crate::payload::ClientConfig;

/// Caller callbacks for an MQTT client, invoked on the native event thread.
///
/// Borrowed arguments are valid only for the duration of the call.
pub trait MqttCallbacks: Send + Sync {
    fn on_completed(&self, error_code: i32, return_code: ConnectReturnCode, session_present: bool);

    fn on_closed(&self);

    fn on_interrupted(&self, error_code: i32);

    fn on_resumed(&self, return_code: ConnectReturnCode, session_present: bool);

    fn on_message(&self, topic: &str, payload: Buffer<'_>, dup: bool, qos: Qos, retain: bool);

    /// Fired once per topic, also for multi-topic subscribes.
    fn on_sub_ack(&self, packet_id: u16, topic: &str, qos: Qos, error_code: i32);

    fn on_publish(&self, packet_id: u16, error_code: i32);

    fn on_unsubscribe(&self, packet_id: u16, error_code: i32);
}

enum MqttEvent<'a> {
    Completed {
        error_code: i32,
        return_code: ConnectReturnCode,
        session_present: bool,
    },
    Closed,
    Interrupted {
        error_code: i32,
    },
    Resumed {
        return_code: ConnectReturnCode,
        session_present: bool,
    },
    Message {
        topic: &'a str,
        payload: Buffer<'a>,
        dup: bool,
        qos: Qos,
        retain: bool,
    },
    SubAck {
        packet_id: u16,
        topic: &'a str,
        qos: Qos,
        error_code: i32,
    },
    Published {
        packet_id: u16,
        error_code: i32,
    },
    Unsubscribed {
        packet_id: u16,
        error_code: i32,
    },
}

impl Event<dyn MqttCallbacks> for MqttEvent<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "on_completed",
            Self::Closed => "on_closed",
            Self::Interrupted { .. } => "on_interrupted",
            Self::Resumed { .. } => "on_resumed",
            Self::Message { .. } => "on_message",
            Self::SubAck { .. } => "on_sub_ack",
            Self::Published { .. } => "on_publish",
            Self::Unsubscribed { .. } => "on_unsubscribe",
        }
    }

    fn deliver(self, callbacks: &dyn MqttCallbacks) {
        match self {
            Self::Completed {
                error_code,
                return_code,
                session_present,
            } => callbacks.on_completed(error_code, return_code, session_present),
            Self::Closed => callbacks.on_closed(),
            Self::Interrupted { error_code } => callbacks.on_interrupted(error_code),
            Self::Resumed {
                return_code,
                session_present,
            } => callbacks.on_resumed(return_code, session_present),
            Self::Message {
                topic,
                payload,
                dup,
                qos,
                retain,
            } => callbacks.on_message(topic, payload, dup, qos, retain),
            Self::SubAck {
                packet_id,
                topic,
                qos,
                error_code,
            } => callbacks.on_sub_ack(packet_id, topic, qos, error_code),
            Self::Published {
                packet_id,
                error_code,
            } => callbacks.on_publish(packet_id, error_code),
            Self::Unsubscribed {
                packet_id,
                error_code,
            } => callbacks.on_unsubscribe(packet_id, error_code),
        }
    }
}

type MqttAdapter = Adapter<dyn MqttCallbacks>;

// ── Handle ────────────────────────────────────────────────────

/// An MQTT connection and the callbacks it reports to.
pub struct MqttClient {
    handle: Handle<dyn MqttConnection, dyn MqttCallbacks>,
    logger: Logger,
}

impl MqttClient {
    /// Build the native connection, register the lifecycle adapters and start
    /// connecting. Nothing is retried on failure.
    pub fn new(
        library: &dyn NativeLibrary,
        config: &ClientConfig<'_>,
        context: Arc<dyn MqttCallbacks>,
        logger: Logger,
    ) -> BoundaryResult<Self> {
        diag!(logger, Debug, "start building internal mqtt client");

        let mut builder = if !config.certificate.is_empty() && !config.private_key.is_empty() {
            ConfigBuilder::with_mtls(config.certificate.as_slice(), config.private_key.as_slice())
        } else if !config.username.is_empty() && !config.password.is_empty() {
            ConfigBuilder::new()
                .with_username(config.username)
                .with_password(config.password)
        } else {
            return Err(BoundaryError::MissingAuth);
        };

        builder = builder.with_endpoint(config.endpoint);
        if config.port != 0 {
            builder = builder.with_port_override(config.port);
        }
        if !config.certificate_authority.is_empty() {
            builder = builder.with_certificate_authority(config.certificate_authority.as_slice());
        }
        if config.insecure_tcp {
            builder = builder.without_tls();
        }

        let native_config = builder.build().map_err(|e| {
            BoundaryError::NativeConfig(format!("couldn't build a config for internal mqtt client: {e}"))
        })?;

        let connection = library.new_connection(native_config).map_err(|e| {
            BoundaryError::NativeConnection(format!("couldn't create an internal mqtt client: {e}"))
        })?;

        let adapter = Adapter::new(Arc::clone(&context), logger.clone());
        connection.set_handlers(lifecycle_handlers(&adapter));

        let options = ConnectOptions {
            client_id: config.client_id.to_string(),
            clean_session: config.clean_session,
            keep_alive_secs: config.keep_alive_s,
            ping_timeout_ms: config.ping_timeout_ms,
        };
        if !connection.connect(&options) {
            return Err(BoundaryError::Connect {
                client_id: config.client_id.to_string(),
                endpoint: config.endpoint.to_string(),
                last_error: MqttErrorCode::describe(connection.last_error()),
            });
        }

        Ok(Self {
            handle: Handle::new(connection, context),
            logger,
        })
    }

    pub fn handle(&self) -> &Handle<dyn MqttConnection, dyn MqttCallbacks> {
        &self.handle
    }

    pub fn connection(&self) -> &Arc<dyn MqttConnection> {
        self.handle.native()
    }

    pub fn context(&self) -> &Arc<dyn MqttCallbacks> {
        self.handle.context()
    }

    /// Logger inherited by handles built on this connection.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    fn adapter(&self) -> MqttAdapter {
        Adapter::new(Arc::clone(self.context()), self.logger.clone())
    }

    /// Subscribe to `topic`. `None` when the request failed synchronously.
    pub fn subscribe(&self, topic: &str, qos: Qos) -> Option<NonZeroU16> {
        let adapter = self.adapter();
        let packet_id = self.connection().subscribe(
            topic,
            qos,
            message_handler(&adapter),
            Box::new(move |packet_id: u16, topic: &str, qos: Qos, error_code: i32| {
                adapter.dispatch(MqttEvent::SubAck {
                    packet_id,
                    topic,
                    qos,
                    error_code,
                });
            }),
        );
        self.accepted("subscribe", packet_id)
    }

    /// Subscribe to several topics in one request. `on_sub_ack` fires once
    /// per topic when the broker acknowledges it.
    pub fn subscribe_multiple(&self, topics: &[&str], qos: Qos) -> Option<NonZeroU16> {
        let adapter = self.adapter();
        let topics = topics
            .iter()
            .map(|topic| (topic.to_string(), message_handler(&adapter)))
            .collect();

        let packet_id = self.connection().subscribe_multiple(
            topics,
            qos,
            Box::new(move |packet_id: u16, topics: &[String], qos: Qos, error_code: i32| {
                for topic in topics {
                    adapter.dispatch(MqttEvent::SubAck {
                        packet_id,
                        topic: topic.as_str(),
                        qos,
                        error_code,
                    });
                }
            }),
        );
        self.accepted("subscribe_multiple", packet_id)
    }

    pub fn unsubscribe(&self, topic: &str) -> Option<NonZeroU16> {
        let adapter = self.adapter();
        let packet_id = self.connection().unsubscribe(
            topic,
            Box::new(move |packet_id: u16, error_code: i32| {
                adapter.dispatch(MqttEvent::Unsubscribed {
                    packet_id,
                    error_code,
                });
            }),
        );
        self.accepted("unsubscribe", packet_id)
    }

    /// Publish `payload`. The bytes are copied into the native request, so
    /// the buffer is released when this call returns.
    pub fn publish(&self, topic: &str, qos: Qos, retain: bool, payload: Buffer<'_>) -> Option<NonZeroU16> {
        let adapter = self.adapter();
        let packet_id = self.connection().publish(
            topic,
            qos,
            retain,
            payload.to_vec(),
            Box::new(move |packet_id: u16, error_code: i32| {
                adapter.dispatch(MqttEvent::Published {
                    packet_id,
                    error_code,
                });
            }),
        );
        self.accepted("publish", packet_id)
    }

    /// Start closing the connection; `on_closed` fires once it is closed.
    pub fn disconnect(&self) -> bool {
        let started = self.connection().disconnect();
        if !started {
            diag!(self.logger, Warn, "disconnect was not started");
        }
        started
    }

    fn accepted(&self, operation: &str, packet_id: u16) -> Option<NonZeroU16> {
        let packet_id = NonZeroU16::new(packet_id);
        if packet_id.is_none() {
            diag!(
                self.logger,
                Warn,
                "{operation} failed synchronously: {}",
                MqttErrorCode::describe(self.connection().last_error())
            );
        }
        packet_id
    }
}

fn lifecycle_handlers(adapter: &MqttAdapter) -> ConnectionHandlers {
    let on_completed = adapter.clone();
    let on_closed = adapter.clone();
    let on_interrupted = adapter.clone();
    let on_resumed = adapter.clone();

    ConnectionHandlers {
        on_connection_completed: Some(Arc::new(
            move |error_code: i32, return_code: ConnectReturnCode, session_present: bool| {
                diag!(on_completed.logger(), Debug, "internal mqtt client: on completed");
                on_completed.dispatch(MqttEvent::Completed {
                    error_code,
                    return_code,
                    session_present,
                });
            },
        )),
        on_connection_closed: Some(Arc::new(move || {
            diag!(on_closed.logger(), Debug, "internal mqtt client: on closed");
            on_closed.dispatch(MqttEvent::Closed);
        })),
        on_connection_interrupted: Some(Arc::new(move |error_code: i32| {
            diag!(on_interrupted.logger(), Debug, "internal mqtt client: on interrupted");
            on_interrupted.dispatch(MqttEvent::Interrupted { error_code });
        })),
        on_connection_resumed: Some(Arc::new(
            move |return_code: ConnectReturnCode, session_present: bool| {
                diag!(on_resumed.logger(), Debug, "internal mqtt client: on resumed");
                on_resumed.dispatch(MqttEvent::Resumed {
                    return_code,
                    session_present,
                });
            },
        )),
    }
}

fn message_handler(adapter: &MqttAdapter) -> tether_native::mqtt::OnMessageReceived {
    let adapter = adapter.clone();
    Arc::new(
        move |topic: &str, payload: &[u8], dup: bool, qos: Qos, retain: bool| {
            adapter.dispatch(MqttEvent::Message {
                topic,
                payload: Buffer::from_borrowed(payload),
                dup,
                qos,
                retain,
            });
        },
    )
}

/// Build an MQTT client, logging the reason and returning `None` on failure.
pub fn internal_mqtt_client(
    library: &dyn NativeLibrary,
    config: &ClientConfig<'_>,
    context: Arc<dyn MqttCallbacks>,
    logger: Logger,
) -> Option<Box<MqttClient>> {
    match MqttClient::new(library, config, context, logger.clone()) {
        Ok(client) => Some(Box::new(client)),
        Err(e) => {
            diag!(logger, Error, "{e}");
            None
        }
    }
}

/// Release the client. Child handles keep the connection alive until they
/// are dropped too.
pub fn drop_mqtt_client(client: Box<MqttClient>) {
    drop(client);
}

//! Caller side of an MQTT client.
//!
//! Callbacks run on the library's event thread and their arguments are only
//! valid during the call, so `Session` copies each one into an owned
//! [`SessionEvent`] and hands it to the agent over an unbounded channel.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tether_bridge::MqttCallbacks;
use tether_core::{Buffer, ConnectReturnCode, Qos};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Interrupted,
    Closed,
}

/// Owned copy of one MQTT callback.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected {
        session_present: bool,
    },
    ConnectFailed {
        error_code: i32,
        return_code: ConnectReturnCode,
    },
    Interrupted {
        error_code: i32,
    },
    Resumed {
        return_code: ConnectReturnCode,
        session_present: bool,
    },
    Closed,
    Message {
        topic: String,
        payload: Vec<u8>,
        qos: Qos,
        retain: bool,
        received_at: DateTime<Utc>,
    },
    SubAck {
        packet_id: u16,
        topic: String,
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

impl SessionEvent {
    /// True when the connection is gone and no reconnect will follow.
    pub fn ends_session(&self) -> bool {
        matches!(self, Self::ConnectFailed { .. } | Self::Closed)
    }
}

pub struct Session {
    status: Mutex<ConnectionStatus>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Session {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            status: Mutex::new(ConnectionStatus::Connecting),
            events,
        });
        (session, receiver)
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("session receiver dropped, event discarded");
        }
    }
}

impl MqttCallbacks for Session {
    fn on_completed(&self, error_code: i32, return_code: ConnectReturnCode, session_present: bool) {
        if error_code == 0 && return_code == ConnectReturnCode::Accepted {
            self.set_status(ConnectionStatus::Connected);
            self.emit(SessionEvent::Connected { session_present });
        } else {
            self.emit(SessionEvent::ConnectFailed {
                error_code,
                return_code,
            });
        }
    }

    fn on_closed(&self) {
        self.set_status(ConnectionStatus::Closed);
        self.emit(SessionEvent::Closed);
    }

    fn on_interrupted(&self, error_code: i32) {
        self.set_status(ConnectionStatus::Interrupted);
        self.emit(SessionEvent::Interrupted { error_code });
    }

    fn on_resumed(&self, return_code: ConnectReturnCode, session_present: bool) {
        self.set_status(ConnectionStatus::Connected);
        self.emit(SessionEvent::Resumed {
            return_code,
            session_present,
        });
    }

    fn on_message(&self, topic: &str, payload: Buffer<'_>, _dup: bool, qos: Qos, retain: bool) {
        self.emit(SessionEvent::Message {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain,
            received_at: Utc::now(),
        });
    }

    fn on_sub_ack(&self, packet_id: u16, topic: &str, qos: Qos, error_code: i32) {
        self.emit(SessionEvent::SubAck {
            packet_id,
            topic: topic.to_string(),
            qos,
            error_code,
        });
    }

    fn on_publish(&self, packet_id: u16, error_code: i32) {
        self.emit(SessionEvent::Published {
            packet_id,
            error_code,
        });
    }

    fn on_unsubscribe(&self, packet_id: u16, error_code: i32) {
        self.emit(SessionEvent::Unsubscribed {
            packet_id,
            error_code,
        });
    }
}

#[cfg(test)]
mod tests {
    use tether_bridge::mock::client_config;
    use tether_bridge::MqttClient;
    use tether_core::{Logger, MqttErrorCode};
    use tether_native::MockLibrary;

    use super::*;

    fn client(library: &MockLibrary, session: &Arc<Session>) -> MqttClient {
        MqttClient::new(library, &client_config(), session.clone(), Logger::tracing()).unwrap()
    }

    #[tokio::test]
    async fn lifecycle_updates_status() {
        let library = MockLibrary::new();
        let (session, mut events) = Session::new();
        let _client = client(&library, &session);
        assert_eq!(session.status(), ConnectionStatus::Connecting);

        let connection = library.connection().unwrap();
        connection.fire_connection_completed(0, ConnectReturnCode::Accepted, false);
        assert_eq!(session.status(), ConnectionStatus::Connected);
        assert_eq!(
            events.recv().await,
            Some(SessionEvent::Connected {
                session_present: false
            })
        );

        connection.fire_connection_interrupted(MqttErrorCode::UnexpectedHangup as i32);
        assert_eq!(session.status(), ConnectionStatus::Interrupted);

        connection.fire_connection_resumed(ConnectReturnCode::Accepted, true);
        assert_eq!(session.status(), ConnectionStatus::Connected);

        connection.fire_connection_closed();
        assert_eq!(session.status(), ConnectionStatus::Closed);

        let rest: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        assert_eq!(
            rest,
            vec![
                SessionEvent::Interrupted {
                    error_code: MqttErrorCode::UnexpectedHangup as i32
                },
                SessionEvent::Resumed {
                    return_code: ConnectReturnCode::Accepted,
                    session_present: true
                },
                SessionEvent::Closed,
            ]
        );
    }

    #[tokio::test]
    async fn rejected_connect_is_reported() {
        let library = MockLibrary::new();
        let (session, mut events) = Session::new();
        let _client = client(&library, &session);

        library
            .connection()
            .unwrap()
            .fire_connection_completed(0, ConnectReturnCode::NotAuthorized, false);

        assert_eq!(session.status(), ConnectionStatus::Connecting);
        assert_eq!(
            events.recv().await,
            Some(SessionEvent::ConnectFailed {
                error_code: 0,
                return_code: ConnectReturnCode::NotAuthorized
            })
        );
    }

    #[tokio::test]
    async fn message_payload_outlives_callback() {
        let library = MockLibrary::new();
        let (session, mut events) = Session::new();
        let client = client(&library, &session);

        client.subscribe("devices/rpi-001/cmd", Qos::AtLeastOnce).unwrap();
        library
            .connection()
            .unwrap()
            .deliver("devices/rpi-001/cmd", b"{\"op\":\"reboot\"}", false, Qos::AtLeastOnce, false);

        match events.recv().await {
            Some(SessionEvent::Message {
                topic,
                payload,
                qos,
                retain,
                ..
            }) => {
                assert_eq!(topic, "devices/rpi-001/cmd");
                assert_eq!(payload, b"{\"op\":\"reboot\"}");
                assert_eq!(qos, Qos::AtLeastOnce);
                assert!(!retain);
            }
            other => panic!("expected a message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_receiver_is_tolerated() {
        let library = MockLibrary::new();
        let (session, events) = Session::new();
        let _client = client(&library, &session);
        drop(events);

        library.connection().unwrap().fire_connection_closed();
        assert_eq!(session.status(), ConnectionStatus::Closed);
    }

    #[test]
    fn only_failed_connect_and_close_end_the_session() {
        let failed = SessionEvent::ConnectFailed {
            error_code: 0,
            return_code: ConnectReturnCode::NotAuthorized,
        };
        assert!(failed.ends_session());
        assert!(SessionEvent::Closed.ends_session());

        assert!(!SessionEvent::Interrupted { error_code: 5 }.ends_session());
        assert!(
            !SessionEvent::Resumed {
                return_code: ConnectReturnCode::Accepted,
                session_present: false,
            }
            .ends_session()
        );
    }
}

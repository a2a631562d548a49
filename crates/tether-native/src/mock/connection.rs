use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use tether_core::{ConnectReturnCode, MqttErrorCode, Qos};

use super::{Fault, Faults, LiveToken};
use crate::mqtt::{
    ConnectOptions, ConnectionConfig, ConnectionHandlers, MqttConnection, OnMessageReceived,
    OnMultiSubAck, OnOperationComplete, OnSubAck,
};
use crate::topic;

/// A recorded publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub packet_id: u16,
    pub topic: String,
    pub qos: Qos,
    pub retain: bool,
    pub payload: Vec<u8>,
}

enum PendingAck {
    Subscribe {
        topic: String,
        qos: Qos,
        on_ack: OnSubAck,
    },
    SubscribeMultiple {
        topics: Vec<String>,
        qos: Qos,
        on_ack: OnMultiSubAck,
    },
    Unsubscribe(OnOperationComplete),
    Publish(OnOperationComplete),
}

#[derive(Default)]
struct State {
    handlers: ConnectionHandlers,
    options: Option<ConnectOptions>,
    subscriptions: Vec<(String, OnMessageReceived)>,
    pending: HashMap<u16, PendingAck>,
    published: Vec<PublishedMessage>,
    next_packet_id: u16,
}

impl State {
    fn next_packet_id(&mut self) -> u16 {
        self.next_packet_id = self.next_packet_id.wrapping_add(1);
        if self.next_packet_id == 0 {
            self.next_packet_id = 1;
        }
        self.next_packet_id
    }
}

/// Mock MQTT connection.
///
/// Packet ids start at 1. Completions stay pending until [`MockConnection::ack`]
/// is called. After `disconnect`, every operation fails synchronously.
pub struct MockConnection {
    config: ConnectionConfig,
    faults: Arc<Faults>,
    state: Mutex<State>,
    shut_down: AtomicBool,
    last_error: AtomicI32,
    _live: LiveToken,
}

impl MockConnection {
    pub(crate) fn new(config: ConnectionConfig, faults: Arc<Faults>, live: LiveToken) -> Self {
        Self {
            config,
            faults,
            state: Mutex::new(State::default()),
            shut_down: AtomicBool::new(false),
            last_error: AtomicI32::new(0),
            _live: live,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Options passed to the last `connect` call.
    pub fn connect_options(&self) -> Option<ConnectOptions> {
        self.state.lock().unwrap().options.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    // ── Lifecycle events ──────────────────────────────────────

    pub fn fire_connection_completed(&self, error_code: i32, return_code: ConnectReturnCode, session_present: bool) -> bool {
        let Some(h) = self.state.lock().unwrap().handlers.on_connection_completed.clone() else {
            return false;
        };
        h(error_code, return_code, session_present);
        true
    }

    pub fn fire_connection_closed(&self) -> bool {
        let Some(h) = self.state.lock().unwrap().handlers.on_connection_closed.clone() else {
            return false;
        };
        h();
        true
    }

    pub fn fire_connection_interrupted(&self, error_code: i32) -> bool {
        let Some(h) = self.state.lock().unwrap().handlers.on_connection_interrupted.clone() else {
            return false;
        };
        h(error_code);
        true
    }

    pub fn fire_connection_resumed(&self, return_code: ConnectReturnCode, session_present: bool) -> bool {
        let Some(h) = self.state.lock().unwrap().handlers.on_connection_resumed.clone() else {
            return false;
        };
        h(return_code, session_present);
        true
    }

    // ── Traffic ───────────────────────────────────────────────

    /// Deliver an inbound publish to every subscription whose filter matches.
    /// Returns the number of handlers invoked.
    pub fn deliver(&self, topic: &str, payload: &[u8], dup: bool, qos: Qos, retain: bool) -> usize {
        let handlers: Vec<OnMessageReceived> = self
            .state
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .filter(|(filter, _)| topic::matches(filter, topic))
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in &handlers {
            handler(topic, payload, dup, qos, retain);
        }
        handlers.len()
    }

    /// Complete the pending operation `packet_id`. Returns `false` when no
    /// operation with that id is pending.
    pub fn ack(&self, packet_id: u16, error_code: i32) -> bool {
        let Some(pending) = self.state.lock().unwrap().pending.remove(&packet_id) else {
            return false;
        };

        match pending {
            PendingAck::Subscribe { topic, qos, on_ack } => {
                let granted = if error_code == 0 { qos } else { Qos::Failure };
                on_ack(packet_id, &topic, granted, error_code);
            }
            PendingAck::SubscribeMultiple { topics, qos, on_ack } => {
                let granted = if error_code == 0 { qos } else { Qos::Failure };
                on_ack(packet_id, &topics, granted, error_code);
            }
            PendingAck::Unsubscribe(on_ack) | PendingAck::Publish(on_ack) => {
                on_ack(packet_id, error_code);
            }
        }
        true
    }

    /// Complete every pending operation, lowest packet id first.
    pub fn ack_all(&self, error_code: i32) -> usize {
        let mut ids: Vec<u16> = self.state.lock().unwrap().pending.keys().copied().collect();
        ids.sort_unstable();
        let mut completed = 0;
        for id in ids {
            if self.ack(id, error_code) {
                completed += 1;
            }
        }
        completed
    }

    pub fn pending_packet_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.state.lock().unwrap().pending.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().unwrap().published.clone()
    }

    /// Active subscription filters, in subscription order.
    pub fn subscriptions(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .map(|(filter, _)| filter.clone())
            .collect()
    }

    pub fn is_subscribed_to(&self, filter: &str) -> bool {
        self.subscriptions().iter().any(|f| f == filter)
    }

    fn rejects_operations(&self) -> bool {
        if self.is_shut_down() || self.faults.is_set(Fault::OperationsRejected) {
            self.last_error
                .store(MqttErrorCode::NotConnected as i32, Ordering::SeqCst);
            return true;
        }
        false
    }
}

impl MqttConnection for MockConnection {
    fn set_handlers(&self, handlers: ConnectionHandlers) {
        self.state.lock().unwrap().handlers = handlers;
    }

    fn connect(&self, options: &ConnectOptions) -> bool {
        if self.faults.is_set(Fault::Connect) {
            self.last_error
                .store(MqttErrorCode::ConnectOptionsValidation as i32, Ordering::SeqCst);
            return false;
        }
        self.state.lock().unwrap().options = Some(options.clone());
        true
    }

    fn subscribe(&self, topic: &str, qos: Qos, on_message: OnMessageReceived, on_sub_ack: OnSubAck) -> u16 {
        if self.rejects_operations() {
            return 0;
        }

        let mut state = self.state.lock().unwrap();
        let packet_id = state.next_packet_id();
        state.subscriptions.push((topic.to_string(), on_message));
        state.pending.insert(
            packet_id,
            PendingAck::Subscribe {
                topic: topic.to_string(),
                qos,
                on_ack: on_sub_ack,
            },
        );
        packet_id
    }

    fn subscribe_multiple(
        &self,
        topics: Vec<(String, OnMessageReceived)>,
        qos: Qos,
        on_sub_ack: OnMultiSubAck,
    ) -> u16 {
        if topics.is_empty() || self.rejects_operations() {
            return 0;
        }

        let mut state = self.state.lock().unwrap();
        let packet_id = state.next_packet_id();
        let filters = topics.iter().map(|(filter, _)| filter.clone()).collect();
        state.subscriptions.extend(topics);
        state.pending.insert(
            packet_id,
            PendingAck::SubscribeMultiple {
                topics: filters,
                qos,
                on_ack: on_sub_ack,
            },
        );
        packet_id
    }

    fn unsubscribe(&self, topic: &str, on_unsub_ack: OnOperationComplete) -> u16 {
        if self.rejects_operations() {
            return 0;
        }

        let mut state = self.state.lock().unwrap();
        let packet_id = state.next_packet_id();
        state.subscriptions.retain(|(filter, _)| filter != topic);
        state
            .pending
            .insert(packet_id, PendingAck::Unsubscribe(on_unsub_ack));
        packet_id
    }

    fn publish(
        &self,
        topic: &str,
        qos: Qos,
        retain: bool,
        payload: Vec<u8>,
        on_complete: OnOperationComplete,
    ) -> u16 {
        if self.rejects_operations() {
            return 0;
        }

        let mut state = self.state.lock().unwrap();
        let packet_id = state.next_packet_id();
        state.published.push(PublishedMessage {
            packet_id,
            topic: topic.to_string(),
            qos,
            retain,
            payload,
        });
        state.pending.insert(packet_id, PendingAck::Publish(on_complete));
        packet_id
    }

    fn disconnect(&self) -> bool {
        !self.shut_down.swap(true, Ordering::SeqCst)
    }

    fn last_error(&self) -> i32 {
        self.last_error.load(Ordering::SeqCst)
    }
}

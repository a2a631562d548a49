//! E2E tests for the MQTT client: connection lifecycle, pub/sub and ordering.

mod helpers;

use tether_bridge::mock::Call;
use tether_bridge::{drop_mqtt_client, internal_mqtt_client};
use tether_core::{Buffer, ConnectReturnCode, MqttErrorCode, Qos};

use helpers::TestHarness;

/// A completed connection fires `on_completed` exactly once with code 0.
#[test]
fn e2e_connection_completed_fires_once() {
    let h = TestHarness::new();
    let _mqtt = h.mqtt();

    let connection = h.connection();
    assert_eq!(connection.connect_options().unwrap().client_id, "tether-test");
    assert!(connection.fire_connection_completed(0, ConnectReturnCode::Accepted, false));

    assert_eq!(
        h.recorder.calls(),
        vec![Call::Completed {
            error_code: 0,
            return_code: ConnectReturnCode::Accepted,
            session_present: false,
        }]
    );
}

/// N native events on one connection arrive in the same order, none lost or
/// repeated.
#[test]
fn e2e_events_keep_native_order() {
    let h = TestHarness::new();
    let mqtt = h.mqtt();
    let connection = h.connection();

    let hangup = MqttErrorCode::UnexpectedHangup as i32;
    connection.fire_connection_completed(0, ConnectReturnCode::Accepted, false);
    connection.fire_connection_interrupted(hangup);
    connection.fire_connection_resumed(ConnectReturnCode::Accepted, true);

    mqtt.subscribe("fleet/+/status", Qos::AtLeastOnce).unwrap();
    for n in 0..5u8 {
        connection.deliver("fleet/pump-7/status", &[n], false, Qos::AtLeastOnce, false);
    }
    connection.fire_connection_closed();

    let mut expected = vec![
        Call::Completed {
            error_code: 0,
            return_code: ConnectReturnCode::Accepted,
            session_present: false,
        },
        Call::Interrupted { error_code: hangup },
        Call::Resumed {
            return_code: ConnectReturnCode::Accepted,
            session_present: true,
        },
    ];
    expected.extend((0..5u8).map(|n| Call::Message {
        topic: "fleet/pump-7/status".into(),
        payload: vec![n],
        dup: false,
        qos: Qos::AtLeastOnce,
        retain: false,
    }));
    expected.push(Call::Closed);

    assert_eq!(h.recorder.calls(), expected);
}

/// Subscribe, publish and unsubscribe each complete through their own
/// callback with the packet id the operation returned.
#[test]
fn e2e_operations_complete_with_their_packet_ids() {
    let h = TestHarness::new();
    let mqtt = h.mqtt();
    let connection = h.connection();

    let sub = mqtt.subscribe("devices/pump-7/cmd", Qos::AtLeastOnce).unwrap().get();
    let payload = Buffer::copy_from(br#"{"state":"ok"}"#);
    let publ = mqtt
        .publish("devices/pump-7/state", Qos::AtLeastOnce, true, payload)
        .unwrap()
        .get();
    let unsub = mqtt.unsubscribe("devices/pump-7/cmd").unwrap().get();

    assert_eq!(connection.published()[0].payload, br#"{"state":"ok"}"#);
    assert!(connection.published()[0].retain);
    assert_eq!(connection.ack_all(0), 3);

    assert_eq!(
        h.recorder.calls(),
        vec![
            Call::SubAck {
                packet_id: sub,
                topic: "devices/pump-7/cmd".into(),
                qos: Qos::AtLeastOnce,
                error_code: 0,
            },
            Call::Published {
                packet_id: publ,
                error_code: 0,
            },
            Call::Unsubscribed {
                packet_id: unsub,
                error_code: 0,
            },
        ]
    );
}

/// A multi-topic subscribe acknowledges each topic separately.
#[test]
fn e2e_multi_subscribe_failure_reaches_every_topic() {
    let h = TestHarness::new();
    let mqtt = h.mqtt();

    let id = mqtt
        .subscribe_multiple(&["a/b", "c/#"], Qos::ExactlyOnce)
        .unwrap()
        .get();
    let error = MqttErrorCode::Timeout as i32;
    assert!(h.connection().ack(id, error));

    let acks: Vec<_> = h
        .recorder
        .calls()
        .into_iter()
        .map(|call| match call {
            Call::SubAck {
                topic,
                qos,
                error_code,
                ..
            } => (topic, qos, error_code),
            other => panic!("unexpected call {other:?}"),
        })
        .collect();
    assert_eq!(
        acks,
        vec![
            ("a/b".to_string(), Qos::Failure, error),
            ("c/#".to_string(), Qos::Failure, error),
        ]
    );
}

/// Operations after disconnect fail synchronously and never complete.
#[test]
fn e2e_operations_after_disconnect_fail_synchronously() {
    let h = TestHarness::new();
    let mqtt = h.mqtt();

    assert!(mqtt.disconnect());
    assert!(!mqtt.disconnect());
    assert!(mqtt.subscribe("a/b", Qos::AtMostOnce).is_none());
    assert!(mqtt.publish("a/b", Qos::AtMostOnce, false, Buffer::from("x")).is_none());

    assert!(h.connection().pending_packet_ids().is_empty());
    assert!(h.recorder.calls().is_empty());
    assert!(h.sink.contains(tether_core::LogLevel::Warn, "NotConnected"));
}

/// The boundary entry points build and release the client.
#[test]
fn e2e_internal_entry_points_round_trip() {
    let h = TestHarness::new();

    let client = internal_mqtt_client(
        &h.library,
        &tether_bridge::mock::client_config(),
        h.recorder.clone(),
        h.logger.clone(),
    )
    .unwrap();
    assert_eq!(h.library.live_objects(), 1);

    drop_mqtt_client(client);
    assert_eq!(h.library.live_objects(), 0);
}

//! E2E tests for the agent's session driving the bridge against the
//! simulated native library.

mod helpers;

use tether_agent::{AgentConfig, ConnectionStatus, Credentials, Session, SessionEvent};
use tether_bridge::MqttClient;
use tether_core::{ConnectReturnCode, Qos};

use helpers::TestHarness;

fn config() -> AgentConfig {
    let toml = r#"
thing_name = "pump-7"
topics = ["devices/pump-7/cmd"]

[mqtt]
endpoint = "localhost"
port = 1883
client_id = "pump-7"
username = "device"
password = "secret"
use_tls = false
"#;
    toml::from_str(toml).unwrap()
}

#[tokio::test]
async fn e2e_agent_session_receives_owned_messages() {
    let h = TestHarness::new();
    let config = config();
    let credentials = Credentials::default();
    let client_id = config.mqtt.resolved_client_id();
    let (session, mut events) = Session::new();

    let client = MqttClient::new(
        &h.library,
        &credentials.client_config(&config.mqtt, &client_id),
        session.clone(),
        h.logger.clone(),
    )
    .unwrap();

    let connection = h.connection();
    let native_config = connection.config();
    assert_eq!(native_config.port, Some(1883));
    assert!(!native_config.use_tls);
    assert_eq!(connection.connect_options().unwrap().client_id, "pump-7");

    connection.fire_connection_completed(0, ConnectReturnCode::Accepted, false);
    assert_eq!(
        events.recv().await,
        Some(SessionEvent::Connected {
            session_present: false
        })
    );
    assert_eq!(session.status(), ConnectionStatus::Connected);

    let qos = config.qos;
    let filters: Vec<&str> = config.topics.iter().map(String::as_str).collect();
    let id = client.subscribe_multiple(&filters, qos).unwrap().get();
    connection.ack(id, 0);
    connection.deliver("devices/pump-7/cmd", b"reboot", false, Qos::AtLeastOnce, false);

    assert_eq!(
        events.recv().await,
        Some(SessionEvent::SubAck {
            packet_id: id,
            topic: "devices/pump-7/cmd".into(),
            qos: Qos::AtLeastOnce,
            error_code: 0,
        })
    );
    match events.recv().await {
        Some(SessionEvent::Message { topic, payload, .. }) => {
            assert_eq!(topic, "devices/pump-7/cmd");
            assert_eq!(payload, b"reboot");
        }
        other => panic!("expected a message, got {other:?}"),
    }

    assert!(client.disconnect());
    connection.fire_connection_closed();
    assert_eq!(events.recv().await, Some(SessionEvent::Closed));
    assert_eq!(session.status(), ConnectionStatus::Closed);
}

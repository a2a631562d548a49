//! Tether agent.
//!
//! Connects to the configured broker through the bridge's MQTT client,
//! subscribes to the configured topics and logs what arrives until ctrl-c.
//! Exits with an error when the connection ends on its own, so a supervisor
//! can restart it.

use std::time::Duration;

use tether_agent::config::AgentConfig;
use tether_agent::credentials;
use tether_agent::session::{Session, SessionEvent};
use tether_bridge::MqttClient;
use tether_core::{Logger, MaxLevel, Qos, TracingSink, logging};
use tether_native::RumqttcLibrary;
use tracing_subscriber::EnvFilter;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tether-agent starting");

    // Load config from file (path from first CLI arg or default)
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/tether/agent.toml".to_string());
    let config = AgentConfig::from_file(&config_path)?;
    tracing::info!(
        thing_name = %config.thing_name,
        endpoint = %config.mqtt.endpoint,
        "configuration loaded"
    );

    let logger = Logger::new(MaxLevel::new(TracingSink, config.bridge_log_level));
    logging::install_default(logger.clone());

    let qos = config.qos;
    let credentials = credentials::load(&config.mqtt)?;
    let client_id = config.mqtt.resolved_client_id();

    let library = RumqttcLibrary::current()?;
    let (session, mut events) = Session::new();
    let client = MqttClient::new(
        &library,
        &credentials.client_config(&config.mqtt, &client_id),
        session.clone(),
        logger,
    )?;
    tracing::info!(client_id = %client_id, "mqtt client created");

    // ── Event loop ───────────────────────────────────────────
    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    let ended = event.ends_session();
                    handle_event(&client, &config.topics, qos, event);
                    if ended {
                        break Err(anyhow::anyhow!("mqtt session ended with no reconnect pending"));
                    }
                }
                None => break Err(anyhow::anyhow!("session event channel closed")),
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break Ok(());
            }
        }
    };

    if outcome.is_ok() && client.disconnect() {
        let closed = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while let Some(event) = events.recv().await {
                if event == SessionEvent::Closed {
                    break;
                }
            }
        })
        .await;
        if closed.is_err() {
            tracing::warn!("connection did not close within the grace period");
        }
    }

    tracing::info!(status = ?session.status(), "tether-agent stopped");
    outcome
}

fn handle_event(client: &MqttClient, topics: &[String], qos: Qos, event: SessionEvent) {
    match event {
        SessionEvent::Connected { session_present } => {
            tracing::info!(session_present, "connected");
            if !session_present {
                subscribe_all(client, topics, qos);
            }
        }
        SessionEvent::Resumed {
            return_code,
            session_present,
        } => {
            tracing::info!(%return_code, session_present, "connection resumed");
            if !session_present {
                subscribe_all(client, topics, qos);
            }
        }
        SessionEvent::ConnectFailed {
            error_code,
            return_code,
        } => {
            tracing::error!(error_code, %return_code, "connection attempt failed");
        }
        SessionEvent::Interrupted { error_code } => {
            tracing::warn!(error_code, "connection interrupted");
        }
        SessionEvent::Closed => tracing::info!("connection closed"),
        SessionEvent::Message {
            topic,
            payload,
            retain,
            received_at,
            ..
        } => match serde_json::from_slice::<serde_json::Value>(&payload) {
            Ok(json) => tracing::info!(%topic, retain, %received_at, payload = %json, "message"),
            Err(_) => tracing::info!(%topic, retain, %received_at, bytes = payload.len(), "message"),
        },
        SessionEvent::SubAck {
            topic, error_code, ..
        } if error_code != 0 => {
            tracing::error!(%topic, error_code, "subscribe failed");
        }
        SessionEvent::SubAck { topic, qos, .. } => {
            tracing::info!(%topic, %qos, "subscribed");
        }
        SessionEvent::Published {
            packet_id,
            error_code,
        }
        | SessionEvent::Unsubscribed {
            packet_id,
            error_code,
        } => {
            tracing::debug!(packet_id, error_code, "operation completed");
        }
    }
}

fn subscribe_all(client: &MqttClient, topics: &[String], qos: Qos) {
    if topics.is_empty() {
        return;
    }
    let filters: Vec<&str> = topics.iter().map(String::as_str).collect();
    if client.subscribe_multiple(&filters, qos).is_none() {
        tracing::error!(topics = ?filters, "subscribe request was not sent");
    }
}

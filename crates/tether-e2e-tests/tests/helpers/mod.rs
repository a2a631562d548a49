//! Shared test harness for E2E integration tests.
//!
//! Wires the bridge façades to a `MockLibrary` with one `Recorder` as the
//! caller context and a `MemorySink` capturing every diagnostic.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tether_bridge::mock::{Recorder, client_config};
use tether_bridge::{Job, JobsClient, MqttClient, Tunnel, TunnelClient};
use tether_core::{LogLevel, Logger, MemorySink, Qos};
use tether_native::mock::{MockConnection, MockJobsClient, MockSecureTunnel};
use tether_native::tunnel::LocalProxyMode;
use tether_native::MockLibrary;

pub const THING: &str = "pump-7";

/// Simulated native library plus the caller-side observers.
pub struct TestHarness {
    pub library: MockLibrary,
    /// Caller context shared by every handle the harness builds.
    pub recorder: Arc<Recorder>,
    pub sink: Arc<MemorySink>,
    pub logger: Logger,
}

impl TestHarness {
    pub fn new() -> Self {
        let sink = Arc::new(MemorySink::new());
        Self {
            library: MockLibrary::new(),
            recorder: Arc::new(Recorder::new()),
            logger: Logger::new(sink.clone()),
            sink,
        }
    }

    /// Certificate-auth MQTT client reporting to the harness recorder.
    pub fn mqtt(&self) -> MqttClient {
        MqttClient::new(
            &self.library,
            &client_config(),
            self.recorder.clone(),
            self.logger.clone(),
        )
        .unwrap()
    }

    /// MQTT client whose callbacks go to a recorder of its own, so only the
    /// child handle's calls land in `self.recorder`.
    pub fn quiet_mqtt(&self) -> MqttClient {
        MqttClient::new(
            &self.library,
            &client_config(),
            Arc::new(Recorder::new()),
            self.logger.clone(),
        )
        .unwrap()
    }

    pub fn jobs_client(&self, mqtt: &MqttClient) -> JobsClient {
        JobsClient::new(&self.library, mqtt, self.recorder.clone(), Qos::AtLeastOnce, THING).unwrap()
    }

    pub fn job(&self, mqtt: &MqttClient, job_id: &str) -> Job {
        Job::new(
            &self.library,
            mqtt,
            self.recorder.clone(),
            Qos::AtLeastOnce,
            THING,
            job_id,
        )
        .unwrap()
    }

    pub fn tunnel_client(&self, mqtt: &MqttClient) -> TunnelClient {
        TunnelClient::new(&self.library, mqtt, self.recorder.clone(), Qos::AtLeastOnce, THING).unwrap()
    }

    pub fn tunnel(&self) -> Tunnel {
        Tunnel::new(
            &self.library,
            self.recorder.clone(),
            "data.tunneling.iot.eu-west-1.amazonaws.com",
            "dest-token",
            LocalProxyMode::Destination,
            self.logger.clone(),
        )
        .unwrap()
    }

    pub fn connection(&self) -> Arc<MockConnection> {
        self.library.connection().expect("no live connection")
    }

    pub fn native_jobs(&self) -> Arc<MockJobsClient> {
        self.library.jobs().expect("no live jobs client")
    }

    pub fn native_tunnel(&self) -> Arc<MockSecureTunnel> {
        self.library.tunnel().expect("no live tunnel")
    }

    pub fn errors(&self) -> Vec<String> {
        self.sink.messages(LogLevel::Error)
    }
}

/// Fixed UTC timestamp `secs` after the epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

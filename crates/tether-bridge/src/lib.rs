//! Boundary between a caller and the native networking library.
//!
//! Each façade builds a native object, registers adapters against its
//! callback slots and hands the caller an owning handle:
//!
//! - `mqtt` : `MqttClient`, connection lifecycle and pub/sub
//! - `jobs` : `JobsClient`, the device-wide pending jobs queue
//! - `job` : `Job`, one specific job execution
//! - `tunnel` : `TunnelClient` (tunnel notifications) and `Tunnel` (a session)
//!
//! Adapters run on the native event thread and call straight into the
//! caller's callback trait. Everything they pass borrows adapter-local
//! storage and is valid only for that call; see [`payload`] for the owned
//! counterparts.

pub mod ffi;
pub mod handle;
pub mod job;
pub mod jobs;
pub mod mock;
pub mod mqtt;
pub mod payload;
pub mod tunnel;

pub use handle::Handle;
pub use job::{Job, JobCallbacks, drop_job, internal_job};
pub use jobs::{JobsClient, JobsClientCallbacks, drop_jobs_client, internal_jobs_client};
pub use mqtt::{MqttCallbacks, MqttClient, drop_mqtt_client, internal_mqtt_client};
pub use payload::{
    ClientConfig, DescribeExecutionRequest, JobExecutionSummary, JobInfo, JobsSummary,
    NextPendingRequest, OwnedJobExecutionSummary, OwnedJobInfo, OwnedJobsSummary, OwnedRejected,
    Rejected, TunnelNotification, UpdateExecutionRequest,
};
pub use tunnel::{
    Tunnel, TunnelCallbacks, TunnelClient, TunnelClientCallbacks, drop_tunnel, drop_tunnel_client,
    internal_tunnel, internal_tunnel_client,
};

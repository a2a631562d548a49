//! AWS IoT Jobs interface of the native library.
//!
//! Response and event types model every field as optional, exactly as the
//! service may omit them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_core::{Qos, int_enum};

int_enum!(
    /// Status of a job execution.
    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum JobStatus {
        Queued = 0,
        InProgress,
        TimedOut,
        Failed,
        Succeeded,
        Canceled,
        Rejected,
        Removed,
    }
);

int_enum!(
    /// Reason the Jobs service rejected a request.
    #[derive(Serialize, Deserialize)]
    pub enum RejectedErrorCode {
        InvalidTopic = 0,
        InvalidJson,
        InvalidRequest,
        InvalidStateTransition,
        ResourceNotFound,
        VersionMismatch,
        InternalError,
        RequestThrottled,
        TerminalStateReached,
    }
);

impl JobStatus {
    /// Whether the execution can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::TimedOut | Self::Rejected | Self::Removed | Self::Canceled
        )
    }
}

// ── Responses and events ──────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RejectedError {
    pub timestamp: Option<DateTime<Utc>>,
    pub code: Option<RejectedErrorCode>,
    pub message: Option<String>,
    pub client_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobExecutionData {
    pub job_id: Option<String>,
    pub thing_name: Option<String>,
    pub job_document: Option<serde_json::Value>,
    pub status: Option<JobStatus>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub version_number: Option<i32>,
    pub execution_number: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobExecutionState {
    pub status: Option<JobStatus>,
    pub status_details: Option<HashMap<String, String>>,
    pub version_number: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobExecutionSummary {
    pub job_id: Option<String>,
    pub version_number: Option<i32>,
    pub execution_number: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub queued_at: Option<DateTime<Utc>>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetPendingJobExecutionsResponse {
    pub in_progress_jobs: Option<Vec<JobExecutionSummary>>,
    pub queued_jobs: Option<Vec<JobExecutionSummary>>,
    pub timestamp: Option<DateTime<Utc>>,
    pub client_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartNextJobExecutionResponse {
    pub execution: Option<JobExecutionData>,
    pub timestamp: Option<DateTime<Utc>>,
    pub client_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescribeJobExecutionResponse {
    pub execution: Option<JobExecutionData>,
    pub timestamp: Option<DateTime<Utc>>,
    pub client_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateJobExecutionResponse {
    pub execution_state: Option<JobExecutionState>,
    pub job_document: Option<serde_json::Value>,
    pub timestamp: Option<DateTime<Utc>>,
    pub client_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobExecutionsChangedEvent {
    pub jobs: Option<HashMap<JobStatus, Vec<JobExecutionSummary>>>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NextJobExecutionChangedEvent {
    pub execution: Option<JobExecutionData>,
    pub timestamp: Option<DateTime<Utc>>,
}

// ── Requests ──────────────────────────────────────────────────

/// Topic parameters of a subscription. `job_id` only applies to the
/// per-execution describe/update topics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub thing_name: Option<String>,
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetPendingJobExecutionsRequest {
    pub thing_name: Option<String>,
    pub client_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartNextPendingJobExecutionRequest {
    pub thing_name: Option<String>,
    pub step_timeout_in_minutes: Option<i64>,
    pub client_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescribeJobExecutionRequest {
    pub thing_name: Option<String>,
    pub job_id: Option<String>,
    pub execution_number: Option<i64>,
    pub include_job_document: Option<bool>,
    pub client_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateJobExecutionRequest {
    pub thing_name: Option<String>,
    pub job_id: Option<String>,
    pub status: Option<JobStatus>,
    pub expected_version: Option<i32>,
    pub execution_number: Option<i64>,
    pub include_job_execution_state: Option<bool>,
    pub include_job_document: Option<bool>,
    pub step_timeout_in_minutes: Option<i64>,
    pub client_token: Option<String>,
}

/// A request published by a [`JobsClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobsRequest {
    GetPending(GetPendingJobExecutionsRequest),
    StartNextPending(StartNextPendingJobExecutionRequest),
    Describe(DescribeJobExecutionRequest),
    Update(UpdateJobExecutionRequest),
}

// ── Handlers ──────────────────────────────────────────────────

/// `(response, io_error)`. The response is `None` when the library could
/// not produce one.
pub type OnResponse<T> = Arc<dyn Fn(Option<&T>, i32) + Send + Sync>;
pub type OnRejected = OnResponse<RejectedError>;
/// `(io_error)`, once the subscription is acknowledged.
pub type OnSubscribeComplete = Box<dyn FnOnce(i32) + Send>;
/// `(io_error)`, once the request has been sent.
pub type OnPublishComplete = Box<dyn FnOnce(i32) + Send>;

/// The ten response/event topics a Jobs client can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subscription {
    GetPendingAccepted,
    GetPendingRejected,
    JobExecutionsChanged,
    NextJobExecutionChanged,
    StartNextAccepted,
    StartNextRejected,
    DescribeAccepted,
    DescribeRejected,
    UpdateAccepted,
    UpdateRejected,
}

impl Subscription {
    pub fn name(self) -> &'static str {
        match self {
            Self::GetPendingAccepted => "GetPendingJobExecutionsAccepted",
            Self::GetPendingRejected => "GetPendingJobExecutionsRejected",
            Self::JobExecutionsChanged => "JobExecutionsChangedEvents",
            Self::NextJobExecutionChanged => "NextJobExecutionChangedEvents",
            Self::StartNextAccepted => "StartNextPendingJobExecutionAccepted",
            Self::StartNextRejected => "StartNextPendingJobExecutionRejected",
            Self::DescribeAccepted => "DescribeJobExecutionAccepted",
            Self::DescribeRejected => "DescribeJobExecutionRejected",
            Self::UpdateAccepted => "UpdateJobExecutionAccepted",
            Self::UpdateRejected => "UpdateJobExecutionRejected",
        }
    }
}

/// A typed response handler, tagged with the topic it listens on.
#[derive(Clone)]
pub enum JobsHandler {
    GetPendingAccepted(OnResponse<GetPendingJobExecutionsResponse>),
    GetPendingRejected(OnRejected),
    JobExecutionsChanged(OnResponse<JobExecutionsChangedEvent>),
    NextJobExecutionChanged(OnResponse<NextJobExecutionChangedEvent>),
    StartNextAccepted(OnResponse<StartNextJobExecutionResponse>),
    StartNextRejected(OnRejected),
    DescribeAccepted(OnResponse<DescribeJobExecutionResponse>),
    DescribeRejected(OnRejected),
    UpdateAccepted(OnResponse<UpdateJobExecutionResponse>),
    UpdateRejected(OnRejected),
}

impl JobsHandler {
    pub fn kind(&self) -> Subscription {
        match self {
            Self::GetPendingAccepted(_) => Subscription::GetPendingAccepted,
            Self::GetPendingRejected(_) => Subscription::GetPendingRejected,
            Self::JobExecutionsChanged(_) => Subscription::JobExecutionsChanged,
            Self::NextJobExecutionChanged(_) => Subscription::NextJobExecutionChanged,
            Self::StartNextAccepted(_) => Subscription::StartNextAccepted,
            Self::StartNextRejected(_) => Subscription::StartNextRejected,
            Self::DescribeAccepted(_) => Subscription::DescribeAccepted,
            Self::DescribeRejected(_) => Subscription::DescribeRejected,
            Self::UpdateAccepted(_) => Subscription::UpdateAccepted,
            Self::UpdateRejected(_) => Subscription::UpdateRejected,
        }
    }
}

// ── Client ────────────────────────────────────────────────────

/// A native Jobs client bound to one MQTT connection.
///
/// Every call returns `false` when it failed synchronously, in which case
/// its completion never fires. Implementors provide [`JobsClient::subscribe`]
/// and [`JobsClient::publish`]; the named methods route through them.
pub trait JobsClient: Send + Sync {
    fn subscribe(
        &self,
        request: &SubscriptionRequest,
        qos: Qos,
        handler: JobsHandler,
        on_complete: OnSubscribeComplete,
    ) -> bool;

    fn publish(&self, request: JobsRequest, qos: Qos, on_complete: OnPublishComplete) -> bool;

    fn subscribe_to_get_pending_job_executions_accepted(
        &self,
        request: &SubscriptionRequest,
        qos: Qos,
        handler: OnResponse<GetPendingJobExecutionsResponse>,
        on_complete: OnSubscribeComplete,
    ) -> bool {
        self.subscribe(request, qos, JobsHandler::GetPendingAccepted(handler), on_complete)
    }

    fn subscribe_to_get_pending_job_executions_rejected(
        &self,
        request: &SubscriptionRequest,
        qos: Qos,
        handler: OnRejected,
        on_complete: OnSubscribeComplete,
    ) -> bool {
        self.subscribe(request, qos, JobsHandler::GetPendingRejected(handler), on_complete)
    }

    fn subscribe_to_job_executions_changed_events(
        &self,
        request: &SubscriptionRequest,
        qos: Qos,
        handler: OnResponse<JobExecutionsChangedEvent>,
        on_complete: OnSubscribeComplete,
    ) -> bool {
        self.subscribe(request, qos, JobsHandler::JobExecutionsChanged(handler), on_complete)
    }

    fn subscribe_to_next_job_execution_changed_events(
        &self,
        request: &SubscriptionRequest,
        qos: Qos,
        handler: OnResponse<NextJobExecutionChangedEvent>,
        on_complete: OnSubscribeComplete,
    ) -> bool {
        self.subscribe(request, qos, JobsHandler::NextJobExecutionChanged(handler), on_complete)
    }

    fn subscribe_to_start_next_pending_job_execution_accepted(
        &self,
        request: &SubscriptionRequest,
        qos: Qos,
        handler: OnResponse<StartNextJobExecutionResponse>,
        on_complete: OnSubscribeComplete,
    ) -> bool {
        self.subscribe(request, qos, JobsHandler::StartNextAccepted(handler), on_complete)
    }

    fn subscribe_to_start_next_pending_job_execution_rejected(
        &self,
        request: &SubscriptionRequest,
        qos: Qos,
        handler: OnRejected,
        on_complete: OnSubscribeComplete,
    ) -> bool {
        self.subscribe(request, qos, JobsHandler::StartNextRejected(handler), on_complete)
    }

    fn subscribe_to_describe_job_execution_accepted(
        &self,
        request: &SubscriptionRequest,
        qos: Qos,
        handler: OnResponse<DescribeJobExecutionResponse>,
        on_complete: OnSubscribeComplete,
    ) -> bool {
        self.subscribe(request, qos, JobsHandler::DescribeAccepted(handler), on_complete)
    }

    fn subscribe_to_describe_job_execution_rejected(
        &self,
        request: &SubscriptionRequest,
        qos: Qos,
        handler: OnRejected,
        on_complete: OnSubscribeComplete,
    ) -> bool {
        self.subscribe(request, qos, JobsHandler::DescribeRejected(handler), on_complete)
    }

    fn subscribe_to_update_job_execution_accepted(
        &self,
        request: &SubscriptionRequest,
        qos: Qos,
        handler: OnResponse<UpdateJobExecutionResponse>,
        on_complete: OnSubscribeComplete,
    ) -> bool {
        self.subscribe(request, qos, JobsHandler::UpdateAccepted(handler), on_complete)
    }

    fn subscribe_to_update_job_execution_rejected(
        &self,
        request: &SubscriptionRequest,
        qos: Qos,
        handler: OnRejected,
        on_complete: OnSubscribeComplete,
    ) -> bool {
        self.subscribe(request, qos, JobsHandler::UpdateRejected(handler), on_complete)
    }

    fn publish_get_pending_job_executions(
        &self,
        request: GetPendingJobExecutionsRequest,
        qos: Qos,
        on_complete: OnPublishComplete,
    ) -> bool {
        self.publish(JobsRequest::GetPending(request), qos, on_complete)
    }

    fn publish_start_next_pending_job_execution(
        &self,
        request: StartNextPendingJobExecutionRequest,
        qos: Qos,
        on_complete: OnPublishComplete,
    ) -> bool {
        self.publish(JobsRequest::StartNextPending(request), qos, on_complete)
    }

    fn publish_describe_job_execution(
        &self,
        request: DescribeJobExecutionRequest,
        qos: Qos,
        on_complete: OnPublishComplete,
    ) -> bool {
        self.publish(JobsRequest::Describe(request), qos, on_complete)
    }

    fn publish_update_job_execution(
        &self,
        request: UpdateJobExecutionRequest,
        qos: Qos,
        on_complete: OnPublishComplete,
    ) -> bool {
        self.publish(JobsRequest::Update(request), qos, on_complete)
    }
}

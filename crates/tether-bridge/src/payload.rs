//! Plain-data payloads exchanged with the caller.
//!
//! Callback payloads (`JobInfo`, `JobExecutionSummary`, `JobsSummary`,
//! `Rejected`, `TunnelNotification`) borrow storage owned by the adapter that
//! built them and are valid only for the callback they are passed to. The
//! `Owned*` types are copies a caller can keep.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tether_core::optional::{Presence, lend_str};
use tether_core::{Buffer, impl_presence};
use tether_native::jobs::{self as native, JobStatus, RejectedErrorCode};

// ── Construction config ───────────────────────────────────────

/// Parameters for building an MQTT client.
///
/// Certificate auth is used when both `certificate` and `private_key` are
/// non-empty; otherwise `username` and `password` must both be set.
#[derive(Default)]
pub struct ClientConfig<'a> {
    pub endpoint: &'a str,
    /// `0` keeps the library default port.
    pub port: u16,
    pub client_id: &'a str,
    pub clean_session: bool,
    pub keep_alive_s: u16,
    pub ping_timeout_ms: u32,
    pub username: &'a str,
    pub password: &'a str,
    pub certificate: Buffer<'a>,
    pub private_key: Buffer<'a>,
    /// PEM trust anchor; empty to leave it to the library.
    pub certificate_authority: Buffer<'a>,
    /// Plain TCP for local brokers. Only valid with password auth.
    pub insecure_tcp: bool,
}

// ── Requests ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NextPendingRequest<'a> {
    /// Minutes the device has to finish the execution.
    pub step_timeout: Option<i64>,
    pub client_token: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescribeExecutionRequest<'a> {
    pub execution_number: Option<i64>,
    pub include_document: Option<bool>,
    /// Overrides the job id the handle was built for.
    pub job_id: Option<&'a str>,
    pub client_token: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateExecutionRequest<'a> {
    pub execution_number: Option<i64>,
    pub include_execution_state: Option<bool>,
    /// Overrides the job id the handle was built for.
    pub job_id: Option<&'a str>,
    pub expected_version: Option<i32>,
    pub include_document: Option<bool>,
    pub status: Option<JobStatus>,
    pub step_timeout: Option<i64>,
    pub client_token: Option<&'a str>,
}

impl_presence!(NextPendingRequest<'_> { step_timeout, client_token });
impl_presence!(DescribeExecutionRequest<'_> {
    execution_number,
    include_document,
    job_id,
    client_token,
});
impl_presence!(UpdateExecutionRequest<'_> {
    execution_number,
    include_execution_state,
    job_id,
    expected_version,
    include_document,
    status,
    step_timeout,
    client_token,
});

// ── Callback payloads ─────────────────────────────────────────

/// A job execution. `job_document` is the JSON document, empty when absent.
#[derive(Debug, Default, PartialEq)]
pub struct JobInfo<'a> {
    pub job_id: Option<&'a str>,
    pub job_document: Buffer<'a>,
    pub status: Option<JobStatus>,
    pub version_number: Option<i32>,
    pub queued_at: Option<DateTime<Utc>>,
    pub thing_name: Option<&'a str>,
    pub execution_number: Option<i64>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
}

impl<'a> JobInfo<'a> {
    pub(crate) fn from_execution(data: &'a native::JobExecutionData, document: &'a [u8]) -> Self {
        Self {
            job_id: lend_str(&data.job_id),
            job_document: Buffer::from_borrowed(document),
            status: data.status,
            version_number: data.version_number,
            queued_at: data.queued_at,
            thing_name: lend_str(&data.thing_name),
            execution_number: data.execution_number,
            last_updated_at: data.last_updated_at,
            started_at: data.started_at,
        }
    }

    /// An update response only carries the execution state and document.
    pub(crate) fn from_update(state: Option<&native::JobExecutionState>, document: &'a [u8]) -> Self {
        Self {
            job_document: Buffer::from_borrowed(document),
            status: state.and_then(|s| s.status),
            version_number: state.and_then(|s| s.version_number),
            ..Self::default()
        }
    }
}

impl Presence for JobInfo<'_> {
    fn present_fields(&self) -> Vec<&'static str> {
        let fields = [
            ("job_id", self.job_id.is_some()),
            ("job_document", !self.job_document.is_empty()),
            ("status", self.status.is_some()),
            ("version_number", self.version_number.is_some()),
            ("queued_at", self.queued_at.is_some()),
            ("thing_name", self.thing_name.is_some()),
            ("execution_number", self.execution_number.is_some()),
            ("last_updated_at", self.last_updated_at.is_some()),
            ("started_at", self.started_at.is_some()),
        ];
        fields
            .into_iter()
            .filter_map(|(name, present)| present.then_some(name))
            .collect()
    }
}

/// Serialize a native job document into adapter-local storage.
pub(crate) fn encode_document(document: Option<&serde_json::Value>) -> Vec<u8> {
    document
        .and_then(|d| serde_json::to_vec(d).ok())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobExecutionSummary<'a> {
    pub job_id: Option<&'a str>,
    pub version_number: Option<i32>,
    pub execution_number: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub queued_at: Option<DateTime<Utc>>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl<'a> From<&'a native::JobExecutionSummary> for JobExecutionSummary<'a> {
    fn from(summary: &'a native::JobExecutionSummary) -> Self {
        Self {
            job_id: lend_str(&summary.job_id),
            version_number: summary.version_number,
            execution_number: summary.execution_number,
            started_at: summary.started_at,
            queued_at: summary.queued_at,
            last_updated_at: summary.last_updated_at,
        }
    }
}

impl_presence!(JobExecutionSummary<'_> {
    job_id,
    version_number,
    execution_number,
    started_at,
    queued_at,
    last_updated_at,
});

/// Pending executions. Both sequences are always valid, possibly empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobsSummary<'a> {
    pub queued_jobs: &'a [JobExecutionSummary<'a>],
    pub progress_jobs: &'a [JobExecutionSummary<'a>],
    pub timestamp: Option<DateTime<Utc>>,
    pub client_token: Option<&'a str>,
}

impl JobsSummary<'_> {
    pub fn queued_size(&self) -> usize {
        self.queued_jobs.len()
    }

    pub fn progress_size(&self) -> usize {
        self.progress_jobs.len()
    }
}

impl_presence!(JobsSummary<'_> { timestamp, client_token });

/// The uniform shape of every Jobs rejection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rejected<'a> {
    pub timestamp: Option<DateTime<Utc>>,
    pub code: Option<RejectedErrorCode>,
    pub message: Option<&'a str>,
    pub client_token: Option<&'a str>,
}

impl<'a> From<Option<&'a native::RejectedError>> for Rejected<'a> {
    fn from(error: Option<&'a native::RejectedError>) -> Self {
        let Some(error) = error else {
            return Self::default();
        };
        Self {
            timestamp: error.timestamp,
            code: error.code,
            message: lend_str(&error.message),
            client_token: lend_str(&error.client_token),
        }
    }
}

impl_presence!(Rejected<'_> { timestamp, code, message, client_token });

/// A tunnel opened for this thing. Only delivered when the access token,
/// region and client mode are all present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelNotification<'a> {
    pub access_token: &'a str,
    pub region: &'a str,
    pub client_mode: &'a str,
    pub services: &'a [String],
}

// ── Owned copies ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OwnedJobInfo {
    pub job_id: Option<String>,
    pub job_document: Option<serde_json::Value>,
    pub status: Option<JobStatus>,
    pub version_number: Option<i32>,
    pub queued_at: Option<DateTime<Utc>>,
    pub thing_name: Option<String>,
    pub execution_number: Option<i64>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
}

impl From<&JobInfo<'_>> for OwnedJobInfo {
    fn from(info: &JobInfo<'_>) -> Self {
        let job_document = if info.job_document.is_empty() {
            None
        } else {
            serde_json::from_slice(info.job_document.as_slice()).ok()
        };

        Self {
            job_id: info.job_id.map(str::to_owned),
            job_document,
            status: info.status,
            version_number: info.version_number,
            queued_at: info.queued_at,
            thing_name: info.thing_name.map(str::to_owned),
            execution_number: info.execution_number,
            last_updated_at: info.last_updated_at,
            started_at: info.started_at,
        }
    }
}

impl_presence!(OwnedJobInfo {
    job_id,
    job_document,
    status,
    version_number,
    queued_at,
    thing_name,
    execution_number,
    last_updated_at,
    started_at,
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OwnedJobExecutionSummary {
    pub job_id: Option<String>,
    pub version_number: Option<i32>,
    pub execution_number: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub queued_at: Option<DateTime<Utc>>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl From<&JobExecutionSummary<'_>> for OwnedJobExecutionSummary {
    fn from(summary: &JobExecutionSummary<'_>) -> Self {
        Self {
            job_id: summary.job_id.map(str::to_owned),
            version_number: summary.version_number,
            execution_number: summary.execution_number,
            started_at: summary.started_at,
            queued_at: summary.queued_at,
            last_updated_at: summary.last_updated_at,
        }
    }
}

impl_presence!(OwnedJobExecutionSummary {
    job_id,
    version_number,
    execution_number,
    started_at,
    queued_at,
    last_updated_at,
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OwnedJobsSummary {
    pub queued_jobs: Vec<OwnedJobExecutionSummary>,
    pub progress_jobs: Vec<OwnedJobExecutionSummary>,
    pub timestamp: Option<DateTime<Utc>>,
    pub client_token: Option<String>,
}

impl From<&JobsSummary<'_>> for OwnedJobsSummary {
    fn from(summary: &JobsSummary<'_>) -> Self {
        Self {
            queued_jobs: summary.queued_jobs.iter().map(Into::into).collect(),
            progress_jobs: summary.progress_jobs.iter().map(Into::into).collect(),
            timestamp: summary.timestamp,
            client_token: summary.client_token.map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OwnedRejected {
    pub timestamp: Option<DateTime<Utc>>,
    pub code: Option<RejectedErrorCode>,
    pub message: Option<String>,
    pub client_token: Option<String>,
}

impl From<&Rejected<'_>> for OwnedRejected {
    fn from(rejected: &Rejected<'_>) -> Self {
        Self {
            timestamp: rejected.timestamp,
            code: rejected.code,
            message: rejected.message.map(str::to_owned),
            client_token: rejected.client_token.map(str::to_owned),
        }
    }
}

impl_presence!(OwnedRejected { timestamp, code, message, client_token });

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn job_info_borrows_native_strings() {
        let data = native::JobExecutionData {
            job_id: Some("job-42".into()),
            status: Some(JobStatus::InProgress),
            version_number: Some(3),
            ..Default::default()
        };
        let document = encode_document(Some(&json!({"operation": "reboot"})));
        let info = JobInfo::from_execution(&data, &document);

        assert!(std::ptr::eq(
            info.job_id.unwrap().as_ptr(),
            data.job_id.as_ref().unwrap().as_ptr()
        ));
        assert!(!info.job_document.is_owned());
        assert_eq!(
            info.present_fields(),
            vec!["job_id", "job_document", "status", "version_number"]
        );

        let owned = OwnedJobInfo::from(&info);
        assert_eq!(owned.job_document, Some(json!({"operation": "reboot"})));
        assert_eq!(owned.status, Some(JobStatus::InProgress));
    }

    #[test]
    fn absent_document_is_empty_buffer() {
        let data = native::JobExecutionData::default();
        let document = encode_document(data.job_document.as_ref());
        let info = JobInfo::from_execution(&data, &document);

        assert!(info.job_document.is_empty());
        assert!(info.present_fields().is_empty());
        assert_eq!(OwnedJobInfo::from(&info).job_document, None);
    }

    #[test]
    fn update_info_carries_execution_state() {
        let state = native::JobExecutionState {
            status: Some(JobStatus::Succeeded),
            status_details: None,
            version_number: Some(7),
        };
        let info = JobInfo::from_update(Some(&state), &[]);
        assert_eq!(info.present_fields(), vec!["status", "version_number"]);
    }

    #[test]
    fn rejected_from_missing_response_is_all_absent() {
        let rejected = Rejected::from(None::<&native::RejectedError>);
        assert!(rejected.present_fields().is_empty());

        let error = native::RejectedError {
            timestamp: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            code: Some(RejectedErrorCode::InvalidJson),
            message: None,
            client_token: Some("ct".into()),
        };
        let rejected = Rejected::from(Some(&error));
        assert_eq!(rejected.present_fields(), vec!["timestamp", "code", "client_token"]);
        assert_eq!(
            OwnedRejected::from(&rejected).present_fields(),
            rejected.present_fields()
        );
    }

    #[test]
    fn jobs_summary_sizes() {
        let native_jobs = [
            native::JobExecutionSummary {
                job_id: Some("a".into()),
                ..Default::default()
            },
            native::JobExecutionSummary::default(),
        ];
        let queued: Vec<JobExecutionSummary<'_>> = native_jobs.iter().map(Into::into).collect();
        let summary = JobsSummary {
            queued_jobs: &queued,
            ..Default::default()
        };

        assert_eq!(summary.queued_size(), 2);
        assert_eq!(summary.progress_size(), 0);

        let owned = OwnedJobsSummary::from(&summary);
        assert_eq!(owned.queued_jobs[0].job_id.as_deref(), Some("a"));
        assert!(owned.progress_jobs.is_empty());
    }

    #[test]
    fn request_presence() {
        let request = DescribeExecutionRequest {
            job_id: Some("job-42"),
            ..Default::default()
        };
        assert_eq!(request.present_fields(), vec!["job_id"]);

        let request = UpdateExecutionRequest {
            status: Some(JobStatus::Failed),
            expected_version: Some(2),
            ..Default::default()
        };
        assert_eq!(request.present_fields(), vec!["expected_version", "status"]);
    }
}

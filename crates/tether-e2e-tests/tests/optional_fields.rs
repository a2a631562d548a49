//! Table-driven checks that an optional field reaches the caller present if
//! and only if the native event carried it.

mod helpers;

use serde_json::json;
use tether_bridge::mock::Observed;
use tether_native::jobs::{
    DescribeJobExecutionResponse, GetPendingJobExecutionsResponse, JobExecutionData,
    JobExecutionState, JobExecutionSummary, JobStatus, RejectedError, RejectedErrorCode,
    UpdateJobExecutionResponse,
};

use helpers::{TestHarness, at};

fn observed(callback: &'static str, present: &[&'static str]) -> Observed {
    Observed {
        callback,
        present: present.to_vec(),
    }
}

#[test]
fn e2e_job_info_fields_follow_the_native_execution() {
    let cases: Vec<(&str, JobExecutionData, Vec<&'static str>)> = vec![
        ("empty execution", JobExecutionData::default(), vec![]),
        (
            "id and status",
            JobExecutionData {
                job_id: Some("job-1".into()),
                status: Some(JobStatus::Queued),
                ..Default::default()
            },
            vec!["job_id", "status"],
        ),
        (
            "document only",
            JobExecutionData {
                job_document: Some(json!({"reboot": true})),
                ..Default::default()
            },
            vec!["job_document"],
        ),
        (
            "timestamps and counters",
            JobExecutionData {
                version_number: Some(2),
                execution_number: Some(9),
                queued_at: Some(at(10)),
                started_at: Some(at(20)),
                last_updated_at: Some(at(30)),
                ..Default::default()
            },
            vec![
                "version_number",
                "queued_at",
                "execution_number",
                "last_updated_at",
                "started_at",
            ],
        ),
        (
            "everything",
            JobExecutionData {
                job_id: Some("job-2".into()),
                thing_name: Some("pump-7".into()),
                job_document: Some(json!({})),
                status: Some(JobStatus::InProgress),
                queued_at: Some(at(1)),
                started_at: Some(at(2)),
                last_updated_at: Some(at(3)),
                version_number: Some(1),
                execution_number: Some(1),
            },
            vec![
                "job_id",
                "job_document",
                "status",
                "version_number",
                "queued_at",
                "thing_name",
                "execution_number",
                "last_updated_at",
                "started_at",
            ],
        ),
    ];

    for (name, execution, present) in cases {
        let h = TestHarness::new();
        let mqtt = h.quiet_mqtt();
        let _job = h.job(&mqtt, "job-1");

        let response = DescribeJobExecutionResponse {
            execution: Some(execution),
            ..Default::default()
        };
        h.native_jobs().fire_describe_accepted(Some(&response), 0);

        assert_eq!(
            h.recorder.observed(),
            vec![observed("on_describe_accepted", &present)],
            "case: {name}"
        );
    }
}

#[test]
fn e2e_rejected_fields_follow_the_native_error() {
    let cases: Vec<(&str, Option<RejectedError>, Vec<&'static str>)> = vec![
        ("no response", None, vec![]),
        ("empty response", Some(RejectedError::default()), vec![]),
        (
            "code and message",
            Some(RejectedError {
                code: Some(RejectedErrorCode::InvalidStateTransition),
                message: Some("bad state".into()),
                ..Default::default()
            }),
            vec!["code", "message"],
        ),
        (
            "timestamp and token",
            Some(RejectedError {
                timestamp: Some(at(5)),
                client_token: Some("ct".into()),
                ..Default::default()
            }),
            vec!["timestamp", "client_token"],
        ),
        (
            "everything",
            Some(RejectedError {
                timestamp: Some(at(5)),
                code: Some(RejectedErrorCode::VersionMismatch),
                message: Some("stale".into()),
                client_token: Some("ct".into()),
            }),
            vec!["timestamp", "code", "message", "client_token"],
        ),
    ];

    for (name, error, present) in cases {
        let h = TestHarness::new();
        let mqtt = h.quiet_mqtt();
        let _jobs = h.jobs_client(&mqtt);
        let _job = h.job(&mqtt, "job-1");
        let jobs_native = h.library.jobs_clients()[0].clone();
        let job_native = h.native_jobs();

        jobs_native.fire_get_pending_rejected(error.as_ref(), 0);
        jobs_native.fire_start_next_rejected(error.as_ref(), 0);
        job_native.fire_describe_rejected(error.as_ref(), 0);
        job_native.fire_update_rejected(error.as_ref(), 0);

        assert_eq!(
            h.recorder.observed(),
            vec![
                observed("on_get_pending_rejected", &present),
                observed("on_start_next_rejected", &present),
                observed("on_describe_rejected", &present),
                observed("on_update_rejected", &present),
            ],
            "case: {name}"
        );
    }
}

#[test]
fn e2e_pending_summary_fields_follow_the_native_response() {
    let partial = JobExecutionSummary {
        job_id: Some("job-1".into()),
        queued_at: Some(at(1)),
        ..Default::default()
    };
    let full = JobExecutionSummary {
        job_id: Some("job-2".into()),
        version_number: Some(1),
        execution_number: Some(1),
        started_at: Some(at(2)),
        queued_at: Some(at(1)),
        last_updated_at: Some(at(3)),
    };

    let cases: Vec<(&str, Option<GetPendingJobExecutionsResponse>, Vec<Observed>)> = vec![
        (
            "no response",
            None,
            vec![observed("on_get_pending_accepted", &[])],
        ),
        (
            "token only",
            Some(GetPendingJobExecutionsResponse {
                client_token: Some("ct".into()),
                ..Default::default()
            }),
            vec![observed("on_get_pending_accepted", &["client_token"])],
        ),
        (
            "queued and in progress",
            Some(GetPendingJobExecutionsResponse {
                queued_jobs: Some(vec![partial.clone()]),
                in_progress_jobs: Some(vec![full.clone()]),
                timestamp: Some(at(4)),
                client_token: None,
            }),
            vec![
                observed("on_get_pending_accepted", &["timestamp"]),
                observed("on_get_pending_accepted.job", &["job_id", "queued_at"]),
                observed(
                    "on_get_pending_accepted.job",
                    &[
                        "job_id",
                        "version_number",
                        "execution_number",
                        "started_at",
                        "queued_at",
                        "last_updated_at",
                    ],
                ),
            ],
        ),
    ];

    for (name, response, expected) in cases {
        let h = TestHarness::new();
        let mqtt = h.quiet_mqtt();
        let _jobs = h.jobs_client(&mqtt);

        h.native_jobs().fire_get_pending_accepted(response.as_ref(), 0);

        assert_eq!(h.recorder.observed(), expected, "case: {name}");
    }
}

#[test]
fn e2e_update_fields_follow_the_execution_state() {
    let cases: Vec<(&str, UpdateJobExecutionResponse, Vec<&'static str>)> = vec![
        ("no state", UpdateJobExecutionResponse::default(), vec![]),
        (
            "status only",
            UpdateJobExecutionResponse {
                execution_state: Some(JobExecutionState {
                    status: Some(JobStatus::Failed),
                    ..Default::default()
                }),
                ..Default::default()
            },
            vec!["status"],
        ),
        (
            "state and document",
            UpdateJobExecutionResponse {
                execution_state: Some(JobExecutionState {
                    status: Some(JobStatus::InProgress),
                    version_number: Some(4),
                    ..Default::default()
                }),
                job_document: Some(json!({"step": 1})),
                ..Default::default()
            },
            vec!["job_document", "status", "version_number"],
        ),
    ];

    for (name, response, present) in cases {
        let h = TestHarness::new();
        let mqtt = h.quiet_mqtt();
        let _job = h.job(&mqtt, "job-1");

        h.native_jobs().fire_update_accepted(Some(&response), 0);

        assert_eq!(
            h.recorder.observed(),
            vec![observed("on_update_accepted", &present)],
            "case: {name}"
        );
    }
}

//! Jobs façade for the device-wide pending-jobs queue.
//!
//! A [`JobsClient`] subscribes to the get-pending, start-next and
//! execution-changed topics of one thing at construction and then publishes
//! get-pending and start-next requests. Every request carries the caller's
//! [`RequestToken`], handed back with its publish completion.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tether_core::optional::{lend_str, overlay, overlay_str};
use tether_core::{BoundaryError, BoundaryResult, Logger, Qos, RequestToken, diag};
use tether_native::jobs::{
    self as native, GetPendingJobExecutionsRequest, JobsClient as NativeJobsClient, JobsHandler,
    OnRejected, OnResponse, StartNextPendingJobExecutionRequest, Subscription, SubscriptionRequest,
};
use tether_native::{MqttConnection, NativeLibrary};

use crate::handle::{Adapter, Event, Handle};
use crate::mqtt::MqttClient;
use crate::payload::{
    JobExecutionSummary, JobInfo, JobsSummary, NextPendingRequest, Rejected, encode_document,
};

/// Caller callbacks for a [`JobsClient`].
pub trait JobsClientCallbacks: Send + Sync {
    fn on_subscribe_completed(&self, io_error: i32);

    fn on_publish_completed(&self, token: RequestToken, io_error: i32);

    fn on_get_pending_accepted(&self, summary: JobsSummary<'_>, io_error: i32);

    fn on_get_pending_rejected(&self, rejected: Rejected<'_>, io_error: i32);

    fn on_start_next_accepted(
        &self,
        client_token: Option<&str>,
        info: Option<&JobInfo<'_>>,
        io_error: i32,
    );

    fn on_start_next_rejected(&self, rejected: Rejected<'_>, io_error: i32);

    /// The event body is not forwarded, only its timestamp.
    fn on_job_executions_changed(&self, timestamp: Option<DateTime<Utc>>, io_error: i32);

    fn on_next_job_execution_changed(
        &self,
        info: Option<&JobInfo<'_>>,
        timestamp: Option<DateTime<Utc>>,
        io_error: i32,
    );
}

#[derive(Debug, Clone, Copy)]
enum Request {
    GetPending,
    StartNext,
}

enum JobsEvent<'a> {
    Subscribed {
        io_error: i32,
    },
    Published {
        token: RequestToken,
        io_error: i32,
    },
    GetPendingAccepted {
        summary: JobsSummary<'a>,
        io_error: i32,
    },
    StartNextAccepted {
        client_token: Option<&'a str>,
        info: Option<&'a JobInfo<'a>>,
        io_error: i32,
    },
    Rejected {
        request: Request,
        rejected: Rejected<'a>,
        io_error: i32,
    },
    ExecutionsChanged {
        timestamp: Option<DateTime<Utc>>,
        io_error: i32,
    },
    NextExecutionChanged {
        info: Option<&'a JobInfo<'a>>,
        timestamp: Option<DateTime<Utc>>,
        io_error: i32,
    },
}

impl Event<dyn JobsClientCallbacks> for JobsEvent<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::Subscribed { .. } => "on_subscribe_completed",
            Self::Published { .. } => "on_publish_completed",
            Self::GetPendingAccepted { .. } => "on_get_pending_accepted",
            Self::StartNextAccepted { .. } => "on_start_next_accepted",
            Self::Rejected {
                request: Request::GetPending,
                ..
            } => "on_get_pending_rejected",
            Self::Rejected {
                request: Request::StartNext,
                ..
            } => "on_start_next_rejected",
            Self::ExecutionsChanged { .. } => "on_job_executions_changed",
            Self::NextExecutionChanged { .. } => "on_next_job_execution_changed",
        }
    }

    fn deliver(self, callbacks: &dyn JobsClientCallbacks) {
        match self {
            Self::Subscribed { io_error } => callbacks.on_subscribe_completed(io_error),
            Self::Published { token, io_error } => callbacks.on_publish_completed(token, io_error),
            Self::GetPendingAccepted { summary, io_error } => {
                callbacks.on_get_pending_accepted(summary, io_error)
            }
            Self::StartNextAccepted {
                client_token,
                info,
                io_error,
            } => callbacks.on_start_next_accepted(client_token, info, io_error),
            Self::Rejected {
                request: Request::GetPending,
                rejected,
                io_error,
            } => callbacks.on_get_pending_rejected(rejected, io_error),
            Self::Rejected {
                request: Request::StartNext,
                rejected,
                io_error,
            } => callbacks.on_start_next_rejected(rejected, io_error),
            Self::ExecutionsChanged {
                timestamp,
                io_error,
            } => callbacks.on_job_executions_changed(timestamp, io_error),
            Self::NextExecutionChanged {
                info,
                timestamp,
                io_error,
            } => callbacks.on_next_job_execution_changed(info, timestamp, io_error),
        }
    }
}

type JobsAdapter = Adapter<dyn JobsClientCallbacks>;

// ── Shared with the per-job façade ────────────────────────────

/// Fail construction when the subscription to `kind` was refused.
pub(crate) fn require(subscribed: bool, kind: Subscription) -> BoundaryResult<()> {
    if subscribed {
        Ok(())
    } else {
        Err(BoundaryError::Subscription(kind.name()))
    }
}

/// Lend `execution` to `f` as a [`JobInfo`]. The job document is serialized
/// into storage that lives until `f` returns.
pub(crate) fn with_job_info<R>(
    execution: Option<&native::JobExecutionData>,
    f: impl FnOnce(Option<&JobInfo<'_>>) -> R,
) -> R {
    let Some(data) = execution else {
        return f(None);
    };
    let document = encode_document(data.job_document.as_ref());
    let info = JobInfo::from_execution(data, &document);
    f(Some(&info))
}

// ── Handle ────────────────────────────────────────────────────

/// Jobs client for one thing, bound to an MQTT connection.
pub struct JobsClient {
    handle: Handle<dyn NativeJobsClient, dyn JobsClientCallbacks>,
    _connection: Arc<dyn MqttConnection>,
    thing_name: String,
    logger: Logger,
}

impl JobsClient {
    /// Create the native client and subscribe to its six response and event
    /// topics. Any refused subscription fails the whole construction.
    pub fn new(
        library: &dyn NativeLibrary,
        mqtt: &MqttClient,
        context: Arc<dyn JobsClientCallbacks>,
        qos: Qos,
        thing_name: &str,
    ) -> BoundaryResult<Self> {
        let logger = mqtt.logger().clone();
        diag!(logger, Debug, "start building internal jobs client for [{thing_name}]");

        let client = library.jobs_client(mqtt.connection()).map_err(|e| {
            BoundaryError::NativeConnection(format!("couldn't create a jobs client: {e}"))
        })?;

        let adapter = Adapter::new(Arc::clone(&context), logger.clone());
        let request = SubscriptionRequest {
            thing_name: Some(thing_name.to_string()),
            job_id: None,
        };
        for handler in handlers(&adapter) {
            let kind = handler.kind();
            let subscribed = client.subscribe(
                &request,
                qos,
                handler,
                adapter.completion(|io_error: i32| JobsEvent::Subscribed { io_error }),
            );
            require(subscribed, kind)?;
        }

        Ok(Self {
            handle: Handle::new(client, context),
            _connection: Arc::clone(mqtt.connection()),
            thing_name: thing_name.to_string(),
            logger,
        })
    }

    pub fn handle(&self) -> &Handle<dyn NativeJobsClient, dyn JobsClientCallbacks> {
        &self.handle
    }

    pub fn thing_name(&self) -> &str {
        &self.thing_name
    }

    pub fn publish_get_pending_executions(&self, qos: Qos, token: RequestToken) -> bool {
        let request = GetPendingJobExecutionsRequest {
            thing_name: Some(self.thing_name.clone()),
            client_token: None,
        };
        let sent = self.handle.native().publish_get_pending_job_executions(
            request,
            qos,
            self.publish_completion(token),
        );
        self.report("get pending executions", token, sent)
    }

    /// Ask the service to start the next queued execution. Only the present
    /// fields of `request` are sent.
    pub fn publish_start_next_pending_execution(
        &self,
        qos: Qos,
        token: RequestToken,
        request: NextPendingRequest<'_>,
    ) -> bool {
        let mut native_request = StartNextPendingJobExecutionRequest {
            thing_name: Some(self.thing_name.clone()),
            ..Default::default()
        };
        overlay(&mut native_request.step_timeout_in_minutes, request.step_timeout);
        overlay_str(&mut native_request.client_token, request.client_token);

        let sent = self.handle.native().publish_start_next_pending_job_execution(
            native_request,
            qos,
            self.publish_completion(token),
        );
        self.report("start next pending execution", token, sent)
    }

    fn publish_completion(&self, token: RequestToken) -> native::OnPublishComplete {
        Adapter::new(Arc::clone(self.handle.context()), self.logger.clone())
            .completion(move |io_error: i32| JobsEvent::Published { token, io_error })
    }

    fn report(&self, operation: &str, token: RequestToken, sent: bool) -> bool {
        if !sent {
            diag!(self.logger, Warn, "{operation} request {token} was not sent");
        }
        sent
    }
}

fn handlers(adapter: &JobsAdapter) -> [JobsHandler; 6] {
    [
        JobsHandler::GetPendingAccepted(get_pending_accepted(adapter)),
        JobsHandler::GetPendingRejected(rejected(adapter, Request::GetPending)),
        JobsHandler::JobExecutionsChanged(executions_changed(adapter)),
        JobsHandler::NextJobExecutionChanged(next_execution_changed(adapter)),
        JobsHandler::StartNextAccepted(start_next_accepted(adapter)),
        JobsHandler::StartNextRejected(rejected(adapter, Request::StartNext)),
    ]
}

fn summaries(jobs: Option<&[native::JobExecutionSummary]>) -> Vec<JobExecutionSummary<'_>> {
    jobs.unwrap_or_default()
        .iter()
        .map(JobExecutionSummary::from)
        .collect()
}

fn get_pending_accepted(adapter: &JobsAdapter) -> OnResponse<native::GetPendingJobExecutionsResponse> {
    let adapter = adapter.clone();
    Arc::new(
        move |response: Option<&native::GetPendingJobExecutionsResponse>, io_error: i32| {
            let queued = summaries(response.and_then(|r| r.queued_jobs.as_deref()));
            let progress = summaries(response.and_then(|r| r.in_progress_jobs.as_deref()));
            adapter.dispatch(JobsEvent::GetPendingAccepted {
                summary: JobsSummary {
                    queued_jobs: &queued,
                    progress_jobs: &progress,
                    timestamp: response.and_then(|r| r.timestamp),
                    client_token: response.and_then(|r| lend_str(&r.client_token)),
                },
                io_error,
            });
        },
    )
}

fn start_next_accepted(adapter: &JobsAdapter) -> OnResponse<native::StartNextJobExecutionResponse> {
    let adapter = adapter.clone();
    Arc::new(
        move |response: Option<&native::StartNextJobExecutionResponse>, io_error: i32| {
            let client_token = response.and_then(|r| lend_str(&r.client_token));
            with_job_info(
                response.and_then(|r| r.execution.as_ref()),
                |info: Option<&JobInfo<'_>>| {
                    adapter.dispatch(JobsEvent::StartNextAccepted {
                        client_token,
                        info,
                        io_error,
                    });
                },
            );
        },
    )
}

fn executions_changed(adapter: &JobsAdapter) -> OnResponse<native::JobExecutionsChangedEvent> {
    let adapter = adapter.clone();
    Arc::new(
        move |event: Option<&native::JobExecutionsChangedEvent>, io_error: i32| {
            adapter.dispatch(JobsEvent::ExecutionsChanged {
                timestamp: event.and_then(|e| e.timestamp),
                io_error,
            });
        },
    )
}

fn next_execution_changed(adapter: &JobsAdapter) -> OnResponse<native::NextJobExecutionChangedEvent> {
    let adapter = adapter.clone();
    Arc::new(
        move |event: Option<&native::NextJobExecutionChangedEvent>, io_error: i32| {
            let timestamp = event.and_then(|e| e.timestamp);
            with_job_info(
                event.and_then(|e| e.execution.as_ref()),
                |info: Option<&JobInfo<'_>>| {
                    adapter.dispatch(JobsEvent::NextExecutionChanged {
                        info,
                        timestamp,
                        io_error,
                    });
                },
            );
        },
    )
}

fn rejected(adapter: &JobsAdapter, request: Request) -> OnRejected {
    let adapter = adapter.clone();
    Arc::new(move |error: Option<&native::RejectedError>, io_error: i32| {
        adapter.dispatch(JobsEvent::Rejected {
            request,
            rejected: Rejected::from(error),
            io_error,
        });
    })
}

/// Build a Jobs client, logging the reason and returning `None` on failure.
pub fn internal_jobs_client(
    library: &dyn NativeLibrary,
    mqtt: &MqttClient,
    context: Arc<dyn JobsClientCallbacks>,
    qos: Qos,
    thing_name: &str,
) -> Option<Box<JobsClient>> {
    match JobsClient::new(library, mqtt, context, qos, thing_name) {
        Ok(client) => Some(Box::new(client)),
        Err(e) => {
            diag!(mqtt.logger(), Error, "{e}");
            None
        }
    }
}

pub fn drop_jobs_client(client: Box<JobsClient>) {
    drop(client);
}

//! Jobs façade for one job execution.

use std::sync::Arc;

use tether_core::optional::{overlay, overlay_str};
use tether_core::{BoundaryError, BoundaryResult, Logger, Qos, RequestToken, diag};
use tether_native::jobs::{
    self as native, DescribeJobExecutionRequest, JobsClient as NativeJobsClient, JobsHandler,
    OnRejected, OnResponse, SubscriptionRequest, UpdateJobExecutionRequest,
};
use tether_native::{MqttConnection, NativeLibrary};

use crate::handle::{Adapter, Event, Handle};
use crate::jobs::{require, with_job_info};
use crate::mqtt::MqttClient;
use crate::payload::{
    DescribeExecutionRequest, JobInfo, Rejected, UpdateExecutionRequest, encode_document,
};

/// Caller callbacks for a [`Job`].
pub trait JobCallbacks: Send + Sync {
    fn on_subscribe_completed(&self, io_error: i32);

    fn on_publish_completed(&self, token: RequestToken, io_error: i32);

    fn on_describe_accepted(
        &self,
        client_token: Option<&str>,
        info: Option<&JobInfo<'_>>,
        io_error: i32,
    );

    fn on_describe_rejected(&self, rejected: Rejected<'_>, io_error: i32);

    /// `info` carries the execution state and job document when the request
    /// asked for them.
    fn on_update_accepted(
        &self,
        client_token: Option<&str>,
        info: Option<&JobInfo<'_>>,
        io_error: i32,
    );

    fn on_update_rejected(&self, rejected: Rejected<'_>, io_error: i32);
}

#[derive(Debug, Clone, Copy)]
enum Request {
    Describe,
    Update,
}

enum JobEvent<'a> {
    Subscribed {
        io_error: i32,
    },
    Published {
        token: RequestToken,
        io_error: i32,
    },
    Accepted {
        request: Request,
        client_token: Option<&'a str>,
        info: Option<&'a JobInfo<'a>>,
        io_error: i32,
    },
    Rejected {
        request: Request,
        rejected: Rejected<'a>,
        io_error: i32,
    },
}

impl Event<dyn JobCallbacks> for JobEvent<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::Subscribed { .. } => "on_subscribe_completed",
            Self::Published { .. } => "on_publish_completed",
            Self::Accepted {
                request: Request::Describe,
                ..
            } => "on_describe_accepted",
            Self::Accepted {
                request: Request::Update,
                ..
            } => "on_update_accepted",
            Self::Rejected {
                request: Request::Describe,
                ..
            } => "on_describe_rejected",
            Self::Rejected {
                request: Request::Update,
                ..
            } => "on_update_rejected",
        }
    }

    fn deliver(self, callbacks: &dyn JobCallbacks) {
        match self {
            Self::Subscribed { io_error } => callbacks.on_subscribe_completed(io_error),
            Self::Published { token, io_error } => callbacks.on_publish_completed(token, io_error),
            Self::Accepted {
                request,
                client_token,
                info,
                io_error,
            } => match request {
                Request::Describe => callbacks.on_describe_accepted(client_token, info, io_error),
                Request::Update => callbacks.on_update_accepted(client_token, info, io_error),
            },
            Self::Rejected {
                request,
                rejected,
                io_error,
            } => match request {
                Request::Describe => callbacks.on_describe_rejected(rejected, io_error),
                Request::Update => callbacks.on_update_rejected(rejected, io_error),
            },
        }
    }
}

type JobAdapter = Adapter<dyn JobCallbacks>;

/// Handle on one job execution of a thing.
pub struct Job {
    handle: Handle<dyn NativeJobsClient, dyn JobCallbacks>,
    _connection: Arc<dyn MqttConnection>,
    thing_name: String,
    job_id: String,
    logger: Logger,
}

impl Job {
    /// Subscribe to the describe and update topics of `job_id`. Any refused
    /// subscription fails the whole construction.
    pub fn new(
        library: &dyn NativeLibrary,
        mqtt: &MqttClient,
        context: Arc<dyn JobCallbacks>,
        qos: Qos,
        thing_name: &str,
        job_id: &str,
    ) -> BoundaryResult<Self> {
        let logger = mqtt.logger().clone();
        diag!(logger, Debug, "start building internal job [{job_id}] for [{thing_name}]");

        let client = library.jobs_client(mqtt.connection()).map_err(|e| {
            BoundaryError::NativeConnection(format!("couldn't create a jobs client: {e}"))
        })?;

        let adapter = Adapter::new(Arc::clone(&context), logger.clone());
        let request = SubscriptionRequest {
            thing_name: Some(thing_name.to_string()),
            job_id: Some(job_id.to_string()),
        };
        let handlers = [
            JobsHandler::DescribeAccepted(describe_accepted(&adapter)),
            JobsHandler::DescribeRejected(rejected(&adapter, Request::Describe)),
            JobsHandler::UpdateAccepted(update_accepted(&adapter)),
            JobsHandler::UpdateRejected(rejected(&adapter, Request::Update)),
        ];
        for handler in handlers {
            let kind = handler.kind();
            let subscribed = client.subscribe(
                &request,
                qos,
                handler,
                adapter.completion(|io_error: i32| JobEvent::Subscribed { io_error }),
            );
            require(subscribed, kind)?;
        }

        Ok(Self {
            handle: Handle::new(client, context),
            _connection: Arc::clone(mqtt.connection()),
            thing_name: thing_name.to_string(),
            job_id: job_id.to_string(),
            logger,
        })
    }

    pub fn handle(&self) -> &Handle<dyn NativeJobsClient, dyn JobCallbacks> {
        &self.handle
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Request the execution's current state. Absent request fields are left
    /// out of the native request; `job_id` defaults to this handle's job.
    pub fn publish_describe_execution(
        &self,
        qos: Qos,
        token: RequestToken,
        request: DescribeExecutionRequest<'_>,
    ) -> bool {
        let mut native_request = DescribeJobExecutionRequest {
            thing_name: Some(self.thing_name.clone()),
            job_id: Some(self.job_id.clone()),
            ..Default::default()
        };
        overlay(&mut native_request.execution_number, request.execution_number);
        overlay(&mut native_request.include_job_document, request.include_document);
        overlay_str(&mut native_request.job_id, request.job_id);
        overlay_str(&mut native_request.client_token, request.client_token);

        let sent = self.handle.native().publish_describe_job_execution(
            native_request,
            qos,
            self.publish_completion(token),
        );
        self.report("describe execution", token, sent)
    }

    pub fn publish_update_execution(
        &self,
        qos: Qos,
        token: RequestToken,
        request: UpdateExecutionRequest<'_>,
    ) -> bool {
        let mut native_request = UpdateJobExecutionRequest {
            thing_name: Some(self.thing_name.clone()),
            job_id: Some(self.job_id.clone()),
            ..Default::default()
        };
        overlay(&mut native_request.execution_number, request.execution_number);
        overlay(&mut native_request.expected_version, request.expected_version);
        overlay(&mut native_request.include_job_document, request.include_document);
        overlay(
            &mut native_request.include_job_execution_state,
            request.include_execution_state,
        );
        overlay_str(&mut native_request.job_id, request.job_id);
        overlay(&mut native_request.status, request.status);
        overlay(&mut native_request.step_timeout_in_minutes, request.step_timeout);
        overlay_str(&mut native_request.client_token, request.client_token);

        let sent = self.handle.native().publish_update_job_execution(
            native_request,
            qos,
            self.publish_completion(token),
        );
        self.report("update execution", token, sent)
    }

    fn publish_completion(&self, token: RequestToken) -> native::OnPublishComplete {
        Adapter::new(Arc::clone(self.handle.context()), self.logger.clone())
            .completion(move |io_error: i32| JobEvent::Published { token, io_error })
    }

    fn report(&self, operation: &str, token: RequestToken, sent: bool) -> bool {
        if !sent {
            diag!(
                self.logger,
                Warn,
                "{operation} request {token} for job [{}] was not sent",
                self.job_id
            );
        }
        sent
    }
}

fn describe_accepted(adapter: &JobAdapter) -> OnResponse<native::DescribeJobExecutionResponse> {
    let adapter = adapter.clone();
    Arc::new(
        move |response: Option<&native::DescribeJobExecutionResponse>, io_error: i32| {
            let client_token = response.and_then(|r| r.client_token.as_deref());
            with_job_info(
                response.and_then(|r| r.execution.as_ref()),
                |info: Option<&JobInfo<'_>>| {
                    adapter.dispatch(JobEvent::Accepted {
                        request: Request::Describe,
                        client_token,
                        info,
                        io_error,
                    });
                },
            );
        },
    )
}

fn update_accepted(adapter: &JobAdapter) -> OnResponse<native::UpdateJobExecutionResponse> {
    let adapter = adapter.clone();
    Arc::new(
        move |response: Option<&native::UpdateJobExecutionResponse>, io_error: i32| {
            let Some(response) = response else {
                adapter.dispatch(JobEvent::Accepted {
                    request: Request::Update,
                    client_token: None,
                    info: None,
                    io_error,
                });
                return;
            };

            let document = encode_document(response.job_document.as_ref());
            let info = JobInfo::from_update(response.execution_state.as_ref(), &document);
            adapter.dispatch(JobEvent::Accepted {
                request: Request::Update,
                client_token: response.client_token.as_deref(),
                info: Some(&info),
                io_error,
            });
        },
    )
}

fn rejected(adapter: &JobAdapter, request: Request) -> OnRejected {
    let adapter = adapter.clone();
    Arc::new(move |error: Option<&native::RejectedError>, io_error: i32| {
        adapter.dispatch(JobEvent::Rejected {
            request,
            rejected: Rejected::from(error),
            io_error,
        });
    })
}

/// Build a job handle, logging the reason and returning `None` on failure.
pub fn internal_job(
    library: &dyn NativeLibrary,
    mqtt: &MqttClient,
    context: Arc<dyn JobCallbacks>,
    qos: Qos,
    thing_name: &str,
    job_id: &str,
) -> Option<Box<Job>> {
    match Job::new(library, mqtt, context, qos, thing_name, job_id) {
        Ok(job) => Some(Box::new(job)),
        Err(e) => {
            diag!(mqtt.logger(), Error, "{e}");
            None
        }
    }
}

pub fn drop_job(job: Box<Job>) {
    drop(job);
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tether_native::jobs::{JobExecutionState, JobStatus, JobsRequest, Subscription};
    use tether_native::mock::{Fault, MockLibrary};

    use super::*;
    use crate::mock::{Call, Recorder, client_config};
    use crate::payload::OwnedJobInfo;

    fn job(library: &MockLibrary, recorder: &Arc<Recorder>) -> (MqttClient, Job) {
        let mqtt = MqttClient::new(library, &client_config(), Arc::new(Recorder::new()), Logger::tracing()).unwrap();
        let job = Job::new(library, &mqtt, recorder.clone(), Qos::AtLeastOnce, "pump-7", "job-42").unwrap();
        (mqtt, job)
    }

    #[test]
    fn subscribes_to_the_job_topics() {
        let library = MockLibrary::new();
        let recorder = Arc::new(Recorder::new());
        let (_mqtt, job) = job(&library, &recorder);

        let native = library.jobs().unwrap();
        assert_eq!(
            native.subscriptions(),
            vec![
                Subscription::DescribeAccepted,
                Subscription::DescribeRejected,
                Subscription::UpdateAccepted,
                Subscription::UpdateRejected,
            ]
        );
        let request = native.subscription_request(Subscription::UpdateRejected).unwrap();
        assert_eq!(request.job_id.as_deref(), Some("job-42"));
        assert_eq!(job.job_id(), "job-42");
    }

    #[test]
    fn any_refused_subscription_fails() {
        let library = MockLibrary::new();
        let mqtt = MqttClient::new(&library, &client_config(), Arc::new(Recorder::new()), Logger::tracing()).unwrap();
        library.inject(Fault::Subscribe(Subscription::UpdateRejected));

        let job = internal_job(&library, &mqtt, Arc::new(Recorder::new()), Qos::AtLeastOnce, "pump-7", "job-42");

        assert!(job.is_none());
        assert_eq!(library.live_objects(), 1);
    }

    #[test]
    fn update_overlays_only_present_fields() {
        let library = MockLibrary::new();
        let recorder = Arc::new(Recorder::new());
        let (_mqtt, job) = job(&library, &recorder);

        let request = UpdateExecutionRequest {
            status: Some(JobStatus::Succeeded),
            expected_version: Some(3),
            ..Default::default()
        };
        assert!(job.publish_update_execution(Qos::AtLeastOnce, RequestToken(4), request));

        let (sent, _) = library.jobs().unwrap().last_request().unwrap();
        assert_eq!(
            sent,
            JobsRequest::Update(UpdateJobExecutionRequest {
                thing_name: Some("pump-7".into()),
                job_id: Some("job-42".into()),
                status: Some(JobStatus::Succeeded),
                expected_version: Some(3),
                ..Default::default()
            })
        );
    }

    #[test]
    fn describe_request_job_id_overrides_handle() {
        let library = MockLibrary::new();
        let recorder = Arc::new(Recorder::new());
        let (_mqtt, job) = job(&library, &recorder);

        let request = DescribeExecutionRequest {
            job_id: Some("job-43"),
            include_document: Some(true),
            ..Default::default()
        };
        assert!(job.publish_describe_execution(Qos::AtLeastOnce, RequestToken(1), request));

        let Some((JobsRequest::Describe(sent), _)) = library.jobs().unwrap().last_request() else {
            panic!("expected a describe request");
        };
        assert_eq!(sent.job_id.as_deref(), Some("job-43"));
        assert_eq!(sent.include_job_document, Some(true));
        assert_eq!(sent.execution_number, None);
    }

    #[test]
    fn update_accepted_carries_state_document_and_token() {
        let library = MockLibrary::new();
        let recorder = Arc::new(Recorder::new());
        let (_mqtt, _job) = job(&library, &recorder);

        let response = native::UpdateJobExecutionResponse {
            execution_state: Some(JobExecutionState {
                status: Some(JobStatus::InProgress),
                version_number: Some(4),
                ..Default::default()
            }),
            job_document: Some(json!({"step": 2})),
            client_token: Some("ct-1".into()),
            ..Default::default()
        };
        library.jobs().unwrap().fire_update_accepted(Some(&response), 0);

        assert_eq!(
            recorder.calls(),
            vec![Call::UpdateAccepted {
                client_token: Some("ct-1".into()),
                info: Some(OwnedJobInfo {
                    job_document: Some(json!({"step": 2})),
                    status: Some(JobStatus::InProgress),
                    version_number: Some(4),
                    ..Default::default()
                }),
                io_error: 0,
            }]
        );
    }

    #[test]
    fn describe_without_execution_has_no_info() {
        let library = MockLibrary::new();
        let recorder = Arc::new(Recorder::new());
        let (_mqtt, _job) = job(&library, &recorder);

        let response = native::DescribeJobExecutionResponse {
            client_token: Some("ct-2".into()),
            ..Default::default()
        };
        library.jobs().unwrap().fire_describe_accepted(Some(&response), 0);

        assert_eq!(
            recorder.calls(),
            vec![Call::DescribeAccepted {
                client_token: Some("ct-2".into()),
                info: None,
                io_error: 0,
            }]
        );
    }
}

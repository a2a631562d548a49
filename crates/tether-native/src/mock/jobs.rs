use std::sync::{Arc, Mutex};

use tether_core::Qos;

use super::{Fault, Faults, LiveToken};
use crate::jobs::{
    DescribeJobExecutionResponse, GetPendingJobExecutionsResponse, JobExecutionsChangedEvent,
    JobsClient, JobsHandler, JobsRequest, NextJobExecutionChangedEvent, OnPublishComplete,
    OnSubscribeComplete, RejectedError, StartNextJobExecutionResponse, Subscription,
    SubscriptionRequest, UpdateJobExecutionResponse,
};

#[derive(Default)]
struct State {
    handlers: Vec<(SubscriptionRequest, JobsHandler)>,
    pending_subscribes: Vec<OnSubscribeComplete>,
    requests: Vec<(JobsRequest, Qos)>,
    pending_publishes: Vec<OnPublishComplete>,
}

/// Mock Jobs client.
///
/// Subscriptions and publishes are recorded; their completions stay pending
/// until [`MockJobsClient::complete_subscriptions`] or
/// [`MockJobsClient::complete_publishes`] is called.
pub struct MockJobsClient {
    faults: Arc<Faults>,
    state: Mutex<State>,
    _live: LiveToken,
}

// Generates one `fire_*` method per subscription topic.
macro_rules! fire {
    ($($(#[$meta:meta])* $method:ident => $variant:ident($payload:ty);)+) => {
        $(
            $(#[$meta])*
            pub fn $method(&self, response: Option<&$payload>, io_error: i32) -> usize {
                let handlers = self.handlers_for(Subscription::$variant);
                let mut fired = 0;
                for handler in handlers {
                    if let JobsHandler::$variant(handler) = handler {
                        handler(response, io_error);
                        fired += 1;
                    }
                }
                fired
            }
        )+
    };
}

impl MockJobsClient {
    pub(crate) fn new(faults: Arc<Faults>, live: LiveToken) -> Self {
        Self {
            faults,
            state: Mutex::new(State::default()),
            _live: live,
        }
    }

    /// Subscribed topics, in subscription order.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.state
            .lock()
            .unwrap()
            .handlers
            .iter()
            .map(|(_, handler)| handler.kind())
            .collect()
    }

    /// Topic parameters used for `kind`, if subscribed.
    pub fn subscription_request(&self, kind: Subscription) -> Option<SubscriptionRequest> {
        self.state
            .lock()
            .unwrap()
            .handlers
            .iter()
            .find(|(_, handler)| handler.kind() == kind)
            .map(|(request, _)| request.clone())
    }

    /// Published requests, in order.
    pub fn requests(&self) -> Vec<JobsRequest> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }

    pub fn last_request(&self) -> Option<(JobsRequest, Qos)> {
        self.state.lock().unwrap().requests.last().cloned()
    }

    /// Acknowledge every pending subscription with `io_error`.
    pub fn complete_subscriptions(&self, io_error: i32) -> usize {
        let pending = std::mem::take(&mut self.state.lock().unwrap().pending_subscribes);
        let count = pending.len();
        for on_complete in pending {
            on_complete(io_error);
        }
        count
    }

    /// Complete every pending publish with `io_error`, oldest first.
    pub fn complete_publishes(&self, io_error: i32) -> usize {
        let pending = std::mem::take(&mut self.state.lock().unwrap().pending_publishes);
        let count = pending.len();
        for on_complete in pending {
            on_complete(io_error);
        }
        count
    }

    fire! {
        fire_get_pending_accepted => GetPendingAccepted(GetPendingJobExecutionsResponse);
        fire_get_pending_rejected => GetPendingRejected(RejectedError);
        fire_job_executions_changed => JobExecutionsChanged(JobExecutionsChangedEvent);
        fire_next_job_execution_changed => NextJobExecutionChanged(NextJobExecutionChangedEvent);
        fire_start_next_accepted => StartNextAccepted(StartNextJobExecutionResponse);
        fire_start_next_rejected => StartNextRejected(RejectedError);
        fire_describe_accepted => DescribeAccepted(DescribeJobExecutionResponse);
        fire_describe_rejected => DescribeRejected(RejectedError);
        fire_update_accepted => UpdateAccepted(UpdateJobExecutionResponse);
        fire_update_rejected => UpdateRejected(RejectedError);
    }

    fn handlers_for(&self, kind: Subscription) -> Vec<JobsHandler> {
        self.state
            .lock()
            .unwrap()
            .handlers
            .iter()
            .filter(|(_, handler)| handler.kind() == kind)
            .map(|(_, handler)| handler.clone())
            .collect()
    }
}

impl JobsClient for MockJobsClient {
    fn subscribe(
        &self,
        request: &SubscriptionRequest,
        _qos: Qos,
        handler: JobsHandler,
        on_complete: OnSubscribeComplete,
    ) -> bool {
        if self.faults.is_set(Fault::Subscribe(handler.kind()))
            || self.faults.is_set(Fault::OperationsRejected)
        {
            return false;
        }

        let mut state = self.state.lock().unwrap();
        state.handlers.push((request.clone(), handler));
        state.pending_subscribes.push(on_complete);
        true
    }

    fn publish(&self, request: JobsRequest, qos: Qos, on_complete: OnPublishComplete) -> bool {
        if self.faults.is_set(Fault::OperationsRejected) {
            return false;
        }

        let mut state = self.state.lock().unwrap();
        state.requests.push((request, qos));
        state.pending_publishes.push(on_complete);
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI32, Ordering};

    use super::*;
    use crate::jobs::{GetPendingJobExecutionsRequest, RejectedErrorCode};
    use crate::mock::MockLibrary;
    use crate::mqtt::ConfigBuilder;
    use crate::NativeLibrary;

    fn client(library: &MockLibrary) -> Arc<MockJobsClient> {
        let config = ConfigBuilder::with_mtls(b"cert", b"key")
            .with_endpoint("localhost")
            .build()
            .unwrap();
        let connection = library.new_connection(config).unwrap();
        let native = library.jobs_client(&connection).unwrap();
        let mock = library.jobs().unwrap();
        drop(native);
        mock
    }

    #[test]
    fn fire_reaches_only_matching_handlers() {
        let library = MockLibrary::new();
        let jobs = client(&library);
        let codes = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&codes);
        jobs.subscribe_to_update_job_execution_rejected(
            &SubscriptionRequest::default(),
            Qos::AtLeastOnce,
            Arc::new(move |rejected: Option<&RejectedError>, _io: i32| {
                sink.lock().unwrap().push(rejected.and_then(|r| r.code));
            }),
            Box::new(|_| {}),
        );

        let rejected = RejectedError {
            code: Some(RejectedErrorCode::VersionMismatch),
            ..Default::default()
        };
        assert_eq!(jobs.fire_describe_rejected(Some(&rejected), 0), 0);
        assert_eq!(jobs.fire_update_rejected(Some(&rejected), 0), 1);
        assert_eq!(
            *codes.lock().unwrap(),
            vec![Some(RejectedErrorCode::VersionMismatch)]
        );
    }

    #[test]
    fn subscription_fault_is_per_topic() {
        let library = MockLibrary::new();
        let jobs = client(&library);
        library.inject(Fault::Subscribe(Subscription::GetPendingRejected));

        let accepted = jobs.subscribe_to_get_pending_job_executions_accepted(
            &SubscriptionRequest::default(),
            Qos::AtLeastOnce,
            Arc::new(|_: Option<&GetPendingJobExecutionsResponse>, _: i32| {}),
            Box::new(|_| {}),
        );
        let rejected = jobs.subscribe_to_get_pending_job_executions_rejected(
            &SubscriptionRequest::default(),
            Qos::AtLeastOnce,
            Arc::new(|_: Option<&RejectedError>, _: i32| {}),
            Box::new(|_| {}),
        );

        assert!(accepted);
        assert!(!rejected);
        assert_eq!(jobs.subscriptions(), vec![Subscription::GetPendingAccepted]);
    }

    #[test]
    fn publishes_complete_in_order() {
        let library = MockLibrary::new();
        let jobs = client(&library);
        let last = Arc::new(AtomicI32::new(-1));

        for _ in 0..2 {
            let sink = Arc::clone(&last);
            assert!(jobs.publish_get_pending_job_executions(
                GetPendingJobExecutionsRequest::default(),
                Qos::AtMostOnce,
                Box::new(move |io_error| sink.store(io_error, Ordering::SeqCst)),
            ));
        }

        assert_eq!(jobs.requests().len(), 2);
        assert_eq!(jobs.complete_publishes(7), 2);
        assert_eq!(last.load(Ordering::SeqCst), 7);
        assert_eq!(jobs.complete_publishes(0), 0);
    }
}

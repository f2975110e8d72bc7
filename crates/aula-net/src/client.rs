//! High-level submission API
//!
//! [`NetworkClient`] ties the pieces together: requests submitted while
//! online go straight through the retry executor; requests submitted while
//! offline wait in the queue for the processor to drain them. Either way the
//! caller gets a [`Submission`] to await.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::broadcast::Subscription;
use crate::config::NetConfig;
use crate::error::{NetError, Result};
use crate::monitor::NetworkMonitor;
use crate::processor::QueueProcessor;
use crate::queue::{CompletionReceiver, QueueStats, QueuedRequest, RequestQueue};
use crate::retry::{
    AttemptContext, RetryError, RetryExecutorBuilder, RetryObserver, RetryPredicate,
    TracingObserver, TransientOnly,
};
use crate::transport::{NetRequest, NetResponse, Transport};
use crate::types::{NetworkStatus, Priority, RetryPolicy};

/// Per-submission options
#[derive(Clone)]
pub struct SubmitOptions {
    /// Drain priority when the request is queued
    pub priority: Priority,

    /// Explicit retry policy; wins over `preset`
    pub policy: Option<RetryPolicy>,

    /// Named preset from the configuration
    pub preset: Option<String>,

    /// Whether to queue instead of failing when offline
    pub queue_offline: bool,

    /// Per-attempt timeout override, in milliseconds
    pub timeout_ms: Option<u64>,

    /// Custom retryability test; wins over the transient-error default
    pub predicate: Option<Arc<dyn RetryPredicate<NetError>>>,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SubmitOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmitOptions")
            .field("priority", &self.priority)
            .field("policy", &self.policy)
            .field("preset", &self.preset)
            .field("queue_offline", &self.queue_offline)
            .field("timeout_ms", &self.timeout_ms)
            .field("has_predicate", &self.predicate.is_some())
            .finish()
    }
}

impl SubmitOptions {
    /// Options that queue when offline, with the default policy
    pub fn new() -> Self {
        Self {
            priority: Priority::Normal,
            policy: None,
            preset: None,
            queue_offline: true,
            timeout_ms: None,
            predicate: None,
        }
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Use an explicit retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Use a named preset from the configuration
    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = Some(preset.into());
        self
    }

    /// Fail with `NetError::Offline` instead of queueing
    pub fn fail_when_offline(mut self) -> Self {
        self.queue_offline = false;
        self
    }

    /// Bound each attempt for this request, overriding the configured timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Decide retryability with a custom test instead of the transient default
    pub fn with_retry_condition<P>(mut self, predicate: P) -> Self
    where
        P: RetryPredicate<NetError> + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }
}

/// The result of a submission
///
/// A direct submission resolves inline; a queued one carries the id needed
/// for cancellation and resolves when the processor settles it. Either way
/// the submission is a future that always eventually settles.
#[derive(Debug)]
pub struct Submission {
    id: Option<Uuid>,
    state: SubmissionState,
}

#[derive(Debug)]
enum SubmissionState {
    Done(Option<Result<NetResponse>>),
    Queued(CompletionReceiver),
}

impl Submission {
    fn completed(outcome: Result<NetResponse>) -> Self {
        Self {
            id: None,
            state: SubmissionState::Done(Some(outcome)),
        }
    }

    fn queued(id: Uuid, receiver: CompletionReceiver) -> Self {
        Self {
            id: Some(id),
            state: SubmissionState::Queued(receiver),
        }
    }

    /// The queue entry id, when the request was deferred
    ///
    /// Usable with [`NetworkClient::cancel`].
    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    /// Whether the request went to the queue
    pub fn is_queued(&self) -> bool {
        matches!(self.state, SubmissionState::Queued(_))
    }

    /// Wait for the outcome
    pub async fn wait(self) -> Result<NetResponse> {
        self.await
    }
}

impl Future for Submission {
    type Output = Result<NetResponse>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            SubmissionState::Done(outcome) => match outcome.take() {
                Some(outcome) => Poll::Ready(outcome),
                // Polled again after completion
                None => Poll::Ready(Err(NetError::Cancelled)),
            },
            SubmissionState::Queued(receiver) => {
                // A dropped sender means the entry vanished without being
                // settled, which only happens on teardown
                Pin::new(receiver)
                    .poll(cx)
                    .map(|result| result.unwrap_or(Err(NetError::Cancelled)))
            }
        }
    }
}

/// Offline-aware request client
pub struct NetworkClient {
    config: NetConfig,
    monitor: NetworkMonitor,
    queue: RequestQueue,
    processor: Arc<QueueProcessor>,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn RetryObserver>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkClient {
    /// Start building a client around a transport
    pub fn builder(transport: Arc<dyn Transport>) -> NetworkClientBuilder {
        NetworkClientBuilder::new(transport)
    }

    /// Submit a request with default options
    pub async fn execute(&self, request: NetRequest) -> Result<NetResponse> {
        self.submit(request, SubmitOptions::new()).await?.wait().await
    }

    /// Submit a request
    ///
    /// Online submissions run the full retry loop before this returns.
    /// Offline submissions are queued (or rejected, per the options) and
    /// resolve later through the returned [`Submission`].
    pub async fn submit(
        &self,
        request: NetRequest,
        options: SubmitOptions,
    ) -> Result<Submission> {
        request.validate()?;
        let policy = self.resolve_policy(&options)?;

        if !self.monitor.is_online() {
            if !options.queue_offline {
                return Err(NetError::Offline);
            }
            let (mut entry, receiver) = QueuedRequest::new(request, options.priority, policy);
            entry.timeout = options.timeout_ms.map(Duration::from_millis);
            entry.predicate = options.predicate.clone();
            let id = entry.id;
            self.queue.enqueue(entry);
            self.processor.kick();
            return Ok(Submission::queued(id, receiver));
        }

        let outcome = self.execute_direct(&request, &policy, &options).await;
        Ok(Submission::completed(outcome))
    }

    async fn execute_direct(
        &self,
        request: &NetRequest,
        policy: &RetryPolicy,
        options: &SubmitOptions,
    ) -> Result<NetResponse> {
        let context = AttemptContext::new("client", request.method.as_str())
            .with_url(request.url.clone());
        let predicate: Arc<dyn RetryPredicate<NetError>> = options
            .predicate
            .clone()
            .unwrap_or_else(|| Arc::new(TransientOnly));
        let timeout_ms = options.timeout_ms.unwrap_or(self.config.request_timeout_ms);

        let result = RetryExecutorBuilder::new()
            .with_policy(policy.clone())
            .with_predicate(predicate)
            .with_observer(Arc::clone(&self.observer))
            .with_timeout(Duration::from_millis(timeout_ms))
            .with_context(context)
            .build()
            .execute(|| self.transport.send(request))
            .await;

        result.map_err(flatten_retry_error)
    }

    fn resolve_policy(&self, options: &SubmitOptions) -> Result<RetryPolicy> {
        if let Some(policy) = &options.policy {
            policy.validate()?;
            return Ok(policy.clone());
        }
        if let Some(name) = &options.preset {
            return self
                .config
                .retry
                .get(name)
                .cloned()
                .ok_or_else(|| NetError::config(format!("unknown retry preset: {}", name)));
        }
        Ok(self.config.retry.default.clone())
    }

    /// Cancel a queued submission
    pub fn cancel(&self, id: Uuid) -> bool {
        self.queue.remove(id)
    }

    /// Drop every pending queued submission
    pub fn clear_queue(&self) -> usize {
        self.queue.clear()
    }

    /// Composition of the pending queue
    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Ask the processor for a drain at the next opportunity
    pub fn kick(&self) {
        self.processor.kick();
    }

    /// Whether the network is currently reachable
    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    /// Current network status snapshot
    pub fn status(&self) -> NetworkStatus {
        self.monitor.status()
    }

    /// The monitor, for feeding in platform connectivity reports
    pub fn monitor(&self) -> &NetworkMonitor {
        &self.monitor
    }

    /// Register a network status listener
    pub fn subscribe_status<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&NetworkStatus) + Send + Sync + 'static,
    {
        self.monitor.subscribe(listener)
    }

    /// Register a queue composition listener
    pub fn subscribe_queue_changes<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&QueueStats) + Send + Sync + 'static,
    {
        self.queue.subscribe_changes(listener)
    }

    /// Stop the background drain task
    ///
    /// Pending queued submissions stay in the queue unsettled.
    pub async fn shutdown(&self) {
        self.processor.shutdown();
        let task = self.task.lock().expect("task slot poisoned").take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

fn flatten_retry_error(error: RetryError<NetError>) -> NetError {
    match error {
        RetryError::Exhausted { source, .. } => source,
        RetryError::NonRetryable(source) => source,
        RetryError::Cancelled { last_error, .. } => last_error.unwrap_or(NetError::Cancelled),
        RetryError::AttemptTimeout { timeout, .. } => {
            NetError::timeout(timeout.as_millis() as u64)
        }
    }
}

/// Builder for [`NetworkClient`]
pub struct NetworkClientBuilder {
    transport: Arc<dyn Transport>,
    config: NetConfig,
    monitor: Option<NetworkMonitor>,
    observer: Option<Arc<dyn RetryObserver>>,
}

impl NetworkClientBuilder {
    /// Start with a transport and defaults everywhere else
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: NetConfig::default(),
            monitor: None,
            observer: None,
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: NetConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing monitor
    pub fn with_monitor(mut self, monitor: NetworkMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Receive attempt telemetry on both the direct and queued paths
    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Validate the configuration and start the client
    ///
    /// Spawns the drain loop; call [`NetworkClient::shutdown`] to stop it.
    pub fn build(self) -> Result<NetworkClient> {
        self.config.validate()?;

        let monitor = self.monitor.unwrap_or_default();
        let observer: Arc<dyn RetryObserver> =
            self.observer.unwrap_or_else(|| Arc::new(TracingObserver));
        let queue = RequestQueue::new();

        let processor = QueueProcessor::with_observer(
            queue.clone(),
            monitor.clone(),
            Arc::clone(&self.transport),
            &self.config,
            Arc::clone(&observer),
        );
        let task = processor.spawn();

        Ok(NetworkClient {
            config: self.config,
            monitor,
            queue,
            processor,
            transport: self.transport,
            observer,
            task: Mutex::new(Some(task)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::StatsObserver;
    use crate::transport::{MockTransport, NetResponse};
    use crate::types::RetryStrategy;

    fn fast_config() -> NetConfig {
        let mut config = NetConfig::default();
        config.request_timeout_ms = 1_000;
        config.drain_pacing_ms = 0;
        config.retry.default = RetryPolicy {
            max_retries: 3,
            strategy: RetryStrategy::ExponentialBackoff,
            exponential_base: 2.0,
            initial_delay_ms: 1,
            max_delay_ms: 10,
            jitter: false,
        };
        config
    }

    fn client_with(transport: Arc<MockTransport>) -> NetworkClient {
        NetworkClient::builder(transport)
            .with_config(fast_config())
            .build()
            .unwrap()
    }

    #[test]
    fn default_options_queue_when_offline() {
        let defaulted = SubmitOptions::default();
        assert!(defaulted.queue_offline);
        assert_eq!(defaulted.priority, Priority::Normal);
        assert!(defaulted.policy.is_none());
        assert!(defaulted.preset.is_none());
        assert!(defaulted.timeout_ms.is_none());
        assert!(defaulted.predicate.is_none());
    }

    #[tokio::test]
    async fn online_submission_completes_inline() {
        let transport = Arc::new(MockTransport::new());
        transport.push(Ok(NetResponse::ok()));
        let client = client_with(transport);

        let submission = client
            .submit(NetRequest::get("http://x/"), SubmitOptions::new())
            .await
            .unwrap();
        assert!(!submission.is_queued());
        assert!(submission.id().is_none());
        assert!(submission.wait().await.is_ok());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn online_submission_retries_transient_errors() {
        let transport = Arc::new(MockTransport::new());
        transport.push(Err(NetError::http(500, "http://x/")));
        transport.push(Err(NetError::http(503, "http://x/")));
        transport.push(Ok(NetResponse::ok()));
        let client = client_with(transport.clone());

        let response = client.execute(NetRequest::get("http://x/")).await;
        assert!(response.is_ok());
        assert_eq!(transport.send_count(), 3);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn online_submission_surfaces_permanent_error() {
        let transport = Arc::new(MockTransport::new());
        transport.push(Err(NetError::http(404, "http://x/missing")));
        let client = client_with(transport.clone());

        let err = client
            .execute(NetRequest::get("http://x/missing"))
            .await
            .unwrap_err();
        assert_eq!(err, NetError::http(404, "http://x/missing"));
        assert_eq!(transport.send_count(), 1);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn offline_submission_queues_and_drains_on_reconnect() {
        let transport = Arc::new(MockTransport::new());
        transport.push(Ok(NetResponse::ok()));

        let monitor = NetworkMonitor::with_status(NetworkStatus::offline());
        let client = NetworkClient::builder(transport.clone())
            .with_config(fast_config())
            .with_monitor(monitor.clone())
            .build()
            .unwrap();

        let submission = client
            .submit(NetRequest::get("http://x/"), SubmitOptions::new())
            .await
            .unwrap();
        assert!(submission.is_queued());
        assert_eq!(client.queue_stats().pending, 1);
        assert_eq!(transport.send_count(), 0);

        monitor.report_online();
        assert!(submission.wait().await.is_ok());
        assert_eq!(client.queue_stats().pending, 0);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn offline_without_queueing_is_rejected() {
        let transport = Arc::new(MockTransport::new());
        let client = NetworkClient::builder(transport)
            .with_config(fast_config())
            .with_monitor(NetworkMonitor::with_status(NetworkStatus::offline()))
            .build()
            .unwrap();

        let err = client
            .submit(
                NetRequest::get("http://x/"),
                SubmitOptions::new().fail_when_offline(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, NetError::Offline);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn cancel_settles_a_queued_submission() {
        let transport = Arc::new(MockTransport::new());
        let client = NetworkClient::builder(transport)
            .with_config(fast_config())
            .with_monitor(NetworkMonitor::with_status(NetworkStatus::offline()))
            .build()
            .unwrap();

        let submission = client
            .submit(NetRequest::get("http://x/"), SubmitOptions::new())
            .await
            .unwrap();
        let id = submission.id().unwrap();

        assert!(client.cancel(id));
        assert_eq!(submission.wait().await, Err(NetError::Cancelled));
        assert!(!client.cancel(id), "second cancel finds nothing");

        client.shutdown().await;
    }

    #[tokio::test]
    async fn clear_rejects_every_pending_submission() {
        let transport = Arc::new(MockTransport::new());
        let client = NetworkClient::builder(transport)
            .with_config(fast_config())
            .with_monitor(NetworkMonitor::with_status(NetworkStatus::offline()))
            .build()
            .unwrap();

        let first = client
            .submit(NetRequest::get("http://x/a"), SubmitOptions::new())
            .await
            .unwrap();
        let second = client
            .submit(NetRequest::get("http://x/b"), SubmitOptions::new())
            .await
            .unwrap();

        assert_eq!(client.clear_queue(), 2);
        assert_eq!(first.wait().await, Err(NetError::QueueCleared));
        assert_eq!(second.wait().await, Err(NetError::QueueCleared));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_preset_is_a_config_error() {
        let transport = Arc::new(MockTransport::new());
        let client = client_with(transport);

        let err = client
            .submit(
                NetRequest::get("http://x/"),
                SubmitOptions::new().with_preset("no-such-preset"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::Config { .. }));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn observer_sees_direct_path_attempts() {
        let transport = Arc::new(MockTransport::new());
        transport.push(Err(NetError::http(502, "http://x/")));
        transport.push(Ok(NetResponse::ok()));

        let observer = Arc::new(StatsObserver::new());
        let client = NetworkClient::builder(transport)
            .with_config(fast_config())
            .with_observer(observer.clone())
            .build()
            .unwrap();

        client.execute(NetRequest::get("http://x/")).await.unwrap();
        assert_eq!(observer.attempt_starts(), 2);
        assert_eq!(observer.failures(), 1);
        assert_eq!(observer.successes(), 1);

        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn request_timeout_override_bounds_each_attempt() {
        use crate::transport::Transport;
        use async_trait::async_trait;

        struct StalledLink;

        #[async_trait]
        impl Transport for StalledLink {
            async fn send(&self, _request: &NetRequest) -> Result<NetResponse> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(NetResponse::ok())
            }
        }

        let mut config = fast_config();
        config.retry.default.max_retries = 0;
        let client = NetworkClient::builder(Arc::new(StalledLink))
            .with_config(config)
            .build()
            .unwrap();

        let started = tokio::time::Instant::now();
        let err = client
            .submit(
                NetRequest::get("http://x/slow"),
                SubmitOptions::new().with_timeout_ms(50),
            )
            .await
            .unwrap()
            .wait()
            .await
            .unwrap_err();

        assert_eq!(err, NetError::timeout(50));
        assert_eq!(
            started.elapsed(),
            Duration::from_millis(50),
            "the override applies instead of the configured 1000ms"
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn retry_condition_override_stops_transient_retries() {
        use crate::retry::NeverRetry;

        let transport = Arc::new(MockTransport::new());
        transport.push(Err(NetError::http(503, "http://x/")));
        let client = client_with(transport.clone());

        let err = client
            .submit(
                NetRequest::get("http://x/"),
                SubmitOptions::new().with_retry_condition(NeverRetry),
            )
            .await
            .unwrap()
            .wait()
            .await
            .unwrap_err();

        assert_eq!(err, NetError::http(503, "http://x/"));
        assert_eq!(transport.send_count(), 1, "the 503 would normally be retried");

        client.shutdown().await;
    }

    #[tokio::test]
    async fn queued_submission_carries_its_overrides() {
        let transport = Arc::new(MockTransport::new());
        let monitor = NetworkMonitor::with_status(NetworkStatus::offline());
        let client = NetworkClient::builder(transport)
            .with_config(fast_config())
            .with_monitor(monitor)
            .build()
            .unwrap();

        let submission = client
            .submit(
                NetRequest::get("http://x/"),
                SubmitOptions::new()
                    .with_timeout_ms(250)
                    .with_retry_condition(crate::retry::AlwaysRetry),
            )
            .await
            .unwrap();
        assert!(submission.is_queued());

        let entry = client.queue.dequeue().unwrap();
        assert_eq!(entry.timeout, Some(Duration::from_millis(250)));
        assert!(entry.predicate.is_some());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_request_rejected_before_any_io() {
        let transport = Arc::new(MockTransport::new());
        let client = client_with(transport.clone());

        let err = client
            .submit(NetRequest::get("::::"), SubmitOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::Invalid { .. }));
        assert_eq!(transport.send_count(), 0);

        client.shutdown().await;
    }
}

//! Consumes jobs from a queue, assembles a per-job pipeline, runs it, and
//! reports telemetry (§4.6).
//!
//! Grounded on `hook-worker::worker::WebhookWorker`/`WebhookJob`: a small
//! trait (`WorkerDomain` here, `WebhookJob` there) implemented once per
//! concrete job type and consumed generically by a worker struct that owns
//! the poll loop, the concurrency semaphore, and liveness reporting.
//! Generalized from "one fixed webhook-sending step" to "an arbitrary,
//! domain-assembled action pipeline".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::action::Action;
use crate::config::{BreakerConfig, RetryConfig, WorkerConfig};
use crate::data::{merge_job_data, ActionContext, CancelSignal, JobData};
use crate::error::{ActionError, FactoryError};
use crate::factory::ActionFactory;
use crate::metrics::{WorkerMetrics, WorkerMetricsSnapshot};
use crate::queue::{Queue, QueueJob};
use crate::status::{FailedStatusAction, HasStatusBroadcaster};
use crate::wrappers::{ErrorHandlingAction, RetryAction};

/// `STARTING → RUNNING → DRAINING → STOPPED` (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Running,
    Draining,
    Stopped,
}

/// Implemented once per concrete job type a worker processes. The base
/// worker is generic over this trait rather than over a class hierarchy,
/// matching the `WebhookJob` pattern consumed by
/// `process_webhook_job<W: WebhookJob>`.
pub trait WorkerDomain<D>: Send + Sync {
    /// Registers this domain's actions into `factory` at worker construction.
    fn register_actions(&self, factory: &mut ActionFactory<D>);

    /// The human-readable stage name used in logs, status events, and metric
    /// tags (§4.6).
    fn operation_name(&self) -> &str;

    /// Builds the ordered action pipeline for one job, given its raw payload
    /// and the context the worker has already constructed.
    fn create_action_pipeline(
        &self,
        data: &JobData,
        context: &ActionContext,
    ) -> Vec<Box<dyn Action<D>>>;
}

#[derive(Debug, Default)]
struct WorkerStats {
    jobs_processed: u64,
    jobs_failed: u64,
    total_processing_time_ms: f64,
    last_job_time: Option<DateTime<Utc>>,
}

/// Drains one queue, running every dequeued job through a domain-assembled
/// pipeline with bounded concurrency (§4.6).
pub struct BaseWorker<D, W: WorkerDomain<D>> {
    name: String,
    queue: Arc<dyn Queue>,
    domain: W,
    deps: Arc<D>,
    factory: ActionFactory<D>,
    retry_config: RetryConfig,
    breaker_config: BreakerConfig,
    worker_config: WorkerConfig,
    metrics: WorkerMetrics,
    semaphore: Arc<Semaphore>,
    state: Mutex<WorkerState>,
    stopping: AtomicBool,
    cancel: CancelSignal,
    stats: Mutex<WorkerStats>,
    started_at: Instant,
    poll_interval: std::time::Duration,
}

impl<D, W> BaseWorker<D, W>
where
    D: HasStatusBroadcaster + Send + Sync + 'static,
    W: WorkerDomain<D>,
{
    pub fn new(
        name: impl Into<String>,
        queue: Arc<dyn Queue>,
        domain: W,
        deps: Arc<D>,
        retry_config: RetryConfig,
        breaker_config: BreakerConfig,
        worker_config: WorkerConfig,
        metrics: WorkerMetrics,
        poll_interval: std::time::Duration,
    ) -> Self {
        let mut factory = ActionFactory::new();
        domain.register_actions(&mut factory);

        Self {
            name: name.into(),
            queue,
            domain,
            deps,
            factory,
            semaphore: Arc::new(Semaphore::new(worker_config.concurrency)),
            retry_config,
            breaker_config,
            worker_config,
            metrics,
            state: Mutex::new(WorkerState::Starting),
            stopping: AtomicBool::new(false),
            cancel: CancelSignal::new(),
            stats: Mutex::new(WorkerStats::default()),
            started_at: Instant::now(),
            poll_interval,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock().expect("worker state lock poisoned") = state;
        self.metrics
            .record_worker_status(&self.name, state == WorkerState::Running);
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().expect("worker state lock poisoned")
    }

    /// Looks `name` up in this worker's factory and wraps it `Retry(ErrorHandling(action))`,
    /// the base worker's default composition for actions that should be retried
    /// in-process before the queue ever sees a failure (§4.6).
    pub fn create_wrapped_action(&self, name: &str) -> Result<Option<Box<dyn Action<D>>>, FactoryError> {
        let inner = self.factory.create(name, Some(self.deps.clone()))?;
        Ok(inner.map(|action| {
            let error_handled: Box<dyn Action<D>> = Box::new(ErrorHandlingAction::new(action));
            Box::new(RetryAction::new(error_handled, self.retry_config.clone())) as Box<dyn Action<D>>
        }))
    }

    /// Looks `name` up and wraps it `ErrorHandling(action)` only, for actions
    /// whose failures should propagate on the first attempt (§4.6).
    pub fn create_error_handled_action(
        &self,
        name: &str,
    ) -> Result<Option<Box<dyn Action<D>>>, FactoryError> {
        let inner = self.factory.create(name, Some(self.deps.clone()))?;
        Ok(inner.map(|action| Box::new(ErrorHandlingAction::new(action)) as Box<dyn Action<D>>))
    }

    /// Breaker policy this worker was configured with, for domains that wrap
    /// an action with `CircuitBreakerAction` themselves.
    pub fn breaker_config(&self) -> &BreakerConfig {
        &self.breaker_config
    }

    /// Requests a graceful stop: the poll loop stops accepting new jobs.
    /// Callers should follow up with `wait_for_drain` and, if it times out,
    /// `cancel_in_flight`.
    pub fn request_stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.set_state(WorkerState::Draining);
    }

    /// Waits until every in-flight pipeline has released its semaphore
    /// permit, or `timeout` elapses first. Returns `true` if fully drained.
    pub async fn wait_for_drain(&self, timeout: std::time::Duration) -> bool {
        let total = self.worker_config.concurrency as u32;
        match tokio::time::timeout(timeout, self.semaphore.acquire_many(total)).await {
            Ok(Ok(permits)) => {
                drop(permits);
                true
            }
            _ => false,
        }
    }

    /// Fires the worker-level cancellation signal, asking every in-flight
    /// action (and the retry wrapper's backoff sleeps) to stop promptly.
    pub fn cancel_in_flight(&self) {
        self.cancel.cancel();
    }

    pub fn snapshot(&self) -> WorkerMetricsSnapshot {
        let stats = self.stats.lock().expect("worker stats lock poisoned");
        let average = if stats.jobs_processed > 0 {
            stats.total_processing_time_ms / stats.jobs_processed as f64
        } else {
            0.0
        };

        WorkerMetricsSnapshot {
            worker_id: self.name.clone(),
            queue_name: self.queue.name().to_owned(),
            jobs_processed: stats.jobs_processed,
            jobs_failed: stats.jobs_failed,
            average_processing_time_ms: average,
            last_job_time: stats.last_job_time,
            uptime_ms: self.started_at.elapsed().as_millis(),
        }
    }

    fn record_outcome(&self, success: bool, duration_ms: f64) {
        let mut stats = self.stats.lock().expect("worker stats lock poisoned");
        stats.jobs_processed += 1;
        if !success {
            stats.jobs_failed += 1;
        }
        stats.total_processing_time_ms += duration_ms;
        stats.last_job_time = Some(Utc::now());
    }

    /// Runs the per-job pipeline steps from §4.6 for one dequeued job,
    /// reporting the outcome to the queue and to metrics.
    async fn process_job(self: &Arc<Self>, job: QueueJob) {
        let t0 = Instant::now();
        let mut context = ActionContext::new(
            job.job_id.clone(),
            job.queue_name.clone(),
            self.name.clone(),
            self.domain.operation_name(),
            job.attempt_number,
        );
        context.cancel = self.cancel.clone();

        let pipeline = self.domain.create_action_pipeline(&job.raw_data, &context);
        let mut current_data = job.raw_data.clone();
        let mut failure: Option<ActionError> = None;

        for action in pipeline.iter() {
            let outcome = action
                .execute_with_timing(current_data.clone(), &self.deps, &context)
                .await;

            match outcome {
                Ok(success) => {
                    current_data = merge_job_data(&current_data, success.data);
                    self.metrics.record_action_execution_time(
                        action.name(),
                        success.duration_ms as f64,
                        true,
                    );
                }
                Err(action_failure) => {
                    self.metrics.record_action_execution_time(
                        action.name(),
                        action_failure.duration_ms as f64,
                        false,
                    );

                    if action.is_status_broadcast() {
                        continue;
                    }

                    failure = Some(action_failure.error);
                    break;
                }
            }
        }

        let total_ms = t0.elapsed().as_millis() as f64;
        let operation = self.domain.operation_name();

        match failure {
            None => {
                self.metrics.record_job_processing_time(operation, total_ms, true);
                self.record_outcome(true, total_ms);
                if let Err(e) = self.queue.complete(&job).await {
                    error!(job_id = %job.job_id, error = %e, "failed to mark job complete");
                }
            }
            Some(error) => {
                self.metrics.record_job_processing_time(operation, total_ms, false);
                self.record_outcome(false, total_ms);

                let failed_status =
                    FailedStatusAction::new(operation, Some(error.to_string()));
                let _ = failed_status
                    .execute_with_timing(current_data.clone(), &self.deps, &context)
                    .await;

                if let Err(e) = self.queue.fail(&job, &error).await {
                    error!(job_id = %job.job_id, error = %e, "failed to mark job failed");
                }
            }
        }
    }

    /// Drains `self.queue` until `request_stop` is called, running up to
    /// `worker_config.concurrency` pipelines in parallel via a counting
    /// semaphore, the same mechanism `hook-worker` uses to bound
    /// `max_concurrent_jobs` (§4.6, §5).
    pub async fn run(self: Arc<Self>) {
        self.set_state(WorkerState::Running);
        info!(worker = %self.name, queue = %self.queue.name(), "worker started");

        loop {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }

            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            match self.queue.dequeue(&self.name).await {
                Ok(Some(job)) => {
                    let worker = self.clone();
                    tokio::spawn(async move {
                        worker.process_job(job).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => {
                    drop(permit);
                    warn!(worker = %self.name, error = %e, "dequeue failed, retrying after poll interval");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        self.set_state(WorkerState::Stopped);
        info!(worker = %self.name, "worker stopped");
    }
}

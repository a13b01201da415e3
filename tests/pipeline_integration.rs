//! Crosses factory → wrapper → worker: a domain registers two actions, the
//! worker wraps one with retry+error-handling, runs a full pipeline against
//! an in-memory queue double, and the happy-path scenario from §8 is
//! checked end to end.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use pipeline_core::{
    inject_standard_status_actions, Action, ActionContext, ActionError, ActionFactory,
    BreakerConfig, HasStatusBroadcaster, JobData, JobStatus, MetricsCollector, Queue, QueueError,
    QueueJob, RetryConfig, StatusBroadcaster, StatusEvent, WorkerConfig, WorkerMetrics,
};
use pipeline_core::{BaseWorker, WorkerDomain};

struct RecordingBroadcaster {
    events: Mutex<Vec<StatusEvent>>,
}

#[async_trait]
impl StatusBroadcaster for RecordingBroadcaster {
    async fn add_status_event_and_broadcast(&self, event: StatusEvent) -> Result<(), ActionError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

struct Deps {
    broadcaster: RecordingBroadcaster,
    transform_calls: AtomicU32,
}

impl HasStatusBroadcaster for Deps {
    fn status_broadcaster(&self) -> Option<&(dyn StatusBroadcaster)> {
        Some(&self.broadcaster)
    }
}

struct Validate;

#[async_trait]
impl Action<Deps> for Validate {
    fn name(&self) -> &str {
        "validate"
    }

    async fn execute(
        &self,
        data: JobData,
        _deps: &Deps,
        _context: &ActionContext,
    ) -> Result<JobData, ActionError> {
        if data.get("content").is_none() {
            return Err(ActionError::ValidationFailed("missing `content`".into()));
        }
        Ok(data)
    }
}

/// Fails its first two calls, then succeeds; exercises the retry wrapper
/// end to end inside a full pipeline (§8 scenario 2).
struct Transform;

#[async_trait]
impl Action<Deps> for Transform {
    fn name(&self) -> &str {
        "transform"
    }

    async fn execute(
        &self,
        data: JobData,
        deps: &Deps,
        _context: &ActionContext,
    ) -> Result<JobData, ActionError> {
        let call = deps.transform_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call < 3 {
            return Err(ActionError::TransientExternalFailure("downstream hiccup".into()));
        }
        let mut out = data;
        out["transformed"] = json!(true);
        Ok(out)
    }
}

struct Save;

#[async_trait]
impl Action<Deps> for Save {
    fn name(&self) -> &str {
        "save"
    }

    async fn execute(
        &self,
        data: JobData,
        _deps: &Deps,
        _context: &ActionContext,
    ) -> Result<JobData, ActionError> {
        let mut out = data;
        out["saved"] = json!(true);
        Ok(out)
    }
}

struct IngestDomain;

impl WorkerDomain<Deps> for IngestDomain {
    fn register_actions(&self, factory: &mut ActionFactory<Deps>) {
        factory.register("validate", Arc::new(|_| Some(Box::new(Validate))));
        factory.register("transform", Arc::new(|_| Some(Box::new(Transform))));
        factory.register("save", Arc::new(|_| Some(Box::new(Save))));
    }

    fn operation_name(&self) -> &str {
        "ingest"
    }

    fn create_action_pipeline(
        &self,
        _data: &JobData,
        _context: &ActionContext,
    ) -> Vec<Box<dyn Action<Deps>>> {
        // `validate` aborts immediately on bad input, so it runs unwrapped;
        // `transform` gets the worker's default retry+error-handling wrap.
        let mut pipeline: Vec<Box<dyn Action<Deps>>> = vec![
            Box::new(Validate),
            Box::new(pipeline_core::RetryAction::new(
                Box::new(pipeline_core::ErrorHandlingAction::new(Box::new(Transform))),
                RetryConfig {
                    max_attempts: 3,
                    base_delay: pipeline_core::EnvMsDuration(Duration::from_millis(5)),
                    max_delay: pipeline_core::EnvMsDuration(Duration::from_millis(50)),
                    backoff_multiplier: 2.0,
                    jitter: false,
                },
            )),
            Box::new(Save),
        ];
        inject_standard_status_actions(&mut pipeline, "ingest");
        pipeline
    }
}

struct InMemoryQueue {
    jobs: Mutex<VecDeque<QueueJob>>,
    completed: Mutex<Vec<String>>,
    failed: Mutex<Vec<String>>,
}

impl InMemoryQueue {
    fn seeded(jobs: Vec<QueueJob>) -> Self {
        Self {
            jobs: Mutex::new(jobs.into_iter().collect()),
            completed: Mutex::new(Vec::new()),
            failed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    fn name(&self) -> &str {
        "ingest"
    }

    async fn dequeue(&self, _worker_name: &str) -> Result<Option<QueueJob>, QueueError> {
        Ok(self.jobs.lock().unwrap().pop_front())
    }

    async fn complete(&self, job: &QueueJob) -> Result<(), QueueError> {
        self.completed.lock().unwrap().push(job.job_id.clone());
        Ok(())
    }

    async fn fail(&self, job: &QueueJob, _error: &ActionError) -> Result<(), QueueError> {
        self.failed.lock().unwrap().push(job.job_id.clone());
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn happy_path_pipeline_retries_transform_and_completes() {
    let queue = Arc::new(InMemoryQueue::seeded(vec![QueueJob {
        job_id: "job-1".into(),
        queue_name: "ingest".into(),
        raw_data: json!({"importId": "i1", "noteId": "n1", "content": "x"}),
        attempt_number: 1,
    }]));

    let deps = Arc::new(Deps {
        broadcaster: RecordingBroadcaster {
            events: Mutex::new(Vec::new()),
        },
        transform_calls: AtomicU32::new(0),
    });

    let collector = Arc::new(MetricsCollector::new(100));
    let worker = Arc::new(BaseWorker::new(
        "ingest-worker",
        queue.clone() as Arc<dyn Queue>,
        IngestDomain,
        deps.clone(),
        RetryConfig::default(),
        BreakerConfig::default(),
        WorkerConfig {
            concurrency: 1,
            ..WorkerConfig::default()
        },
        WorkerMetrics::new(collector.clone()),
        Duration::from_millis(5),
    ));

    let run_worker = worker.clone();
    let handle = tokio::spawn(async move { run_worker.run().await });

    // Let the paused clock fast-forward through the queue's poll loop and
    // the retry wrapper's backoff sleeps until the job has fully drained.
    tokio::time::sleep(Duration::from_millis(500)).await;

    worker.request_stop();
    assert!(worker.wait_for_drain(Duration::from_millis(500)).await);
    handle.await.expect("worker task panicked");

    assert_eq!(queue.completed.lock().unwrap().len(), 1);
    assert!(queue.failed.lock().unwrap().is_empty());
    assert_eq!(deps.transform_calls.load(Ordering::SeqCst), 3);

    let events = deps.broadcaster.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].status, JobStatus::Processing);
    assert_eq!(events[1].status, JobStatus::Completed);

    assert_eq!(collector.get_metric_summary("worker.job.success").unwrap().sum, 1.0);
}

/// §8 scenario 3: a job that fails terminally emits exactly one `FAILED`
/// status event, with the triggering error's message, before the queue is
/// told to fail the job.
#[tokio::test(start_paused = true)]
async fn terminal_failure_broadcasts_a_failed_status_event() {
    let queue = Arc::new(InMemoryQueue::seeded(vec![QueueJob {
        job_id: "job-1".into(),
        queue_name: "ingest".into(),
        raw_data: json!({"importId": "i1", "noteId": "n1"}),
        attempt_number: 1,
    }]));

    let deps = Arc::new(Deps {
        broadcaster: RecordingBroadcaster {
            events: Mutex::new(Vec::new()),
        },
        transform_calls: AtomicU32::new(0),
    });

    let collector = Arc::new(MetricsCollector::new(100));
    let worker = Arc::new(BaseWorker::new(
        "ingest-worker",
        queue.clone() as Arc<dyn Queue>,
        IngestDomain,
        deps.clone(),
        RetryConfig::default(),
        BreakerConfig::default(),
        WorkerConfig {
            concurrency: 1,
            ..WorkerConfig::default()
        },
        WorkerMetrics::new(collector.clone()),
        Duration::from_millis(5),
    ));

    let run_worker = worker.clone();
    let handle = tokio::spawn(async move { run_worker.run().await });

    // `content` is missing, so `Validate` throws a non-retryable
    // `ValidationFailed` on the first attempt; no backoff to wait through.
    tokio::time::sleep(Duration::from_millis(100)).await;

    worker.request_stop();
    assert!(worker.wait_for_drain(Duration::from_millis(500)).await);
    handle.await.expect("worker task panicked");

    assert!(queue.completed.lock().unwrap().is_empty());
    assert_eq!(queue.failed.lock().unwrap().len(), 1);
    assert_eq!(deps.transform_calls.load(Ordering::SeqCst), 0);

    let events = deps.broadcaster.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].status, JobStatus::Processing);
    assert_eq!(events[1].status, JobStatus::Failed);
    assert_eq!(events[1].message, "validation failed: missing `content`");

    assert_eq!(collector.get_metric_summary("worker.job.success").unwrap().sum, 0.0);
}

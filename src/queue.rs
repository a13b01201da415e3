//! The queue broker interface the base worker drains (§6.1).
//!
//! Grounded on `hook_common::pgqueue::PgQueueJob`: a narrow trait the worker
//! depends on without knowing whether jobs come from Postgres, an in-memory
//! channel, or something else. Worker-level retry (the queue redelivering a
//! whole pipeline after a fatal failure) is orthogonal to the wrapper-level
//! retry (a single action retried in-process); this trait only carries the
//! former.

use async_trait::async_trait;
use thiserror::Error;

use crate::data::JobData;
use crate::error::ActionError;

/// One dequeued unit of work: the raw payload plus the metadata a worker
/// needs to build an `ActionContext` (§3, §4.6 step 1).
#[derive(Debug, Clone)]
pub struct QueueJob {
    pub job_id: String,
    pub queue_name: String,
    pub raw_data: JobData,
    /// 1-based; incremented by the queue on redelivery.
    pub attempt_number: u32,
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue operation failed: {0}")]
    Backend(String),
}

/// `consume(concurrency, handler) -> stop` semantics, realized here as a
/// dequeue/complete/fail trio the base worker drives its own poll loop with,
/// matching `PgQueueJob::complete`/`fail`/`retry`'s split rather
/// than a single callback-based `consume`.
#[async_trait]
pub trait Queue: Send + Sync {
    fn name(&self) -> &str;

    /// Waits for and returns the next job for `worker_name`, or `None` if the
    /// queue has none available right now (the worker should poll again).
    async fn dequeue(&self, worker_name: &str) -> Result<Option<QueueJob>, QueueError>;

    /// Marks `job` permanently complete.
    async fn complete(&self, job: &QueueJob) -> Result<(), QueueError>;

    /// Marks `job` failed with `error`, driving the queue's own
    /// retry/dead-letter policy. The queue, not this trait, decides whether
    /// that means redelivery or a terminal state.
    async fn fail(&self, job: &QueueJob, error: &ActionError) -> Result<(), QueueError>;
}

//! Starts one worker per declared queue and holds them for graceful
//! shutdown (§4.8).
//!
//! Grounded on `hook-janitor::main`'s `select(http_server, cleanup_loop)` —
//! spawn everything, then await it all and report the first hard failure —
//! and on `HealthRegistry`'s `Arc`-shared, concurrently-updated component map
//! for the liveness side of the same problem.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::metrics::WorkerMetricsSnapshot;
use crate::status::HasStatusBroadcaster;
use crate::worker::{BaseWorker, WorkerDomain};

/// A worker the registry can start, snapshot, and gracefully stop without
/// knowing its concrete `D`/`WorkerDomain` type parameters.
#[async_trait::async_trait]
pub trait ManagedWorker: Send + Sync {
    fn name(&self) -> &str;
    fn snapshot(&self) -> WorkerMetricsSnapshot;
    fn request_stop(&self);
    async fn wait_for_drain(&self, timeout: Duration) -> bool;
    fn cancel_in_flight(&self);
}

#[async_trait::async_trait]
impl<D, W> ManagedWorker for BaseWorker<D, W>
where
    D: HasStatusBroadcaster + Send + Sync + 'static,
    W: WorkerDomain<D> + 'static,
{
    fn name(&self) -> &str {
        BaseWorker::name(self)
    }

    fn snapshot(&self) -> WorkerMetricsSnapshot {
        BaseWorker::snapshot(self)
    }

    fn request_stop(&self) {
        BaseWorker::request_stop(self)
    }

    async fn wait_for_drain(&self, timeout: Duration) -> bool {
        BaseWorker::wait_for_drain(self, timeout).await
    }

    fn cancel_in_flight(&self) {
        BaseWorker::cancel_in_flight(self)
    }
}

struct RunningWorker {
    worker: Arc<dyn ManagedWorker>,
    handle: tokio::task::JoinHandle<()>,
    drain_timeout: Duration,
}

/// Owns every started worker for the declared queues and drives them through
/// `RUNNING → DRAINING → STOPPED` together on shutdown (§4.8, §5).
#[derive(Default)]
pub struct WorkerRegistry {
    workers: Vec<RunningWorker>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self { workers: Vec::new() }
    }

    /// Registers an already-`run`-spawned worker under this registry, along
    /// with the drain timeout to honor on shutdown.
    pub fn add(
        &mut self,
        worker: Arc<dyn ManagedWorker>,
        handle: tokio::task::JoinHandle<()>,
        drain_timeout: Duration,
    ) {
        self.workers.push(RunningWorker {
            worker,
            handle,
            drain_timeout,
        });
    }

    pub fn snapshots(&self) -> Vec<WorkerMetricsSnapshot> {
        self.workers.iter().map(|w| w.worker.snapshot()).collect()
    }

    /// Drives every worker through `RUNNING → DRAINING → STOPPED`: requests a
    /// stop on all of them, waits up to each worker's own drain timeout, then
    /// cancels any pipeline still in flight before awaiting every task handle.
    pub async fn shutdown(mut self) {
        for running in &self.workers {
            running.worker.request_stop();
        }

        for running in &self.workers {
            let drained = running.worker.wait_for_drain(running.drain_timeout).await;
            if !drained {
                warn!(
                    worker = running.worker.name(),
                    "drain timeout elapsed, cancelling in-flight pipelines"
                );
                running.worker.cancel_in_flight();
            }
        }

        self.join_all().await;
    }

    /// Awaits every worker's task handle, logging (but not propagating) any
    /// task that panicked, the same "wait for everything" shape as
    /// `hook-janitor`'s `select(http_server, cleanup_loop)`.
    pub async fn join_all(&mut self) {
        for running in self.workers.drain(..) {
            if let Err(join_error) = running.handle.await {
                warn!(error = %join_error, "worker task panicked");
            } else {
                info!(worker = %running.worker.name(), "worker task joined");
            }
        }
    }
}

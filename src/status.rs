//! The status-broadcast contract and the three status-emitting pipeline
//! decorators (§4.5, §6.2).
//!
//! The broadcaster is an opaque external sink, the same shape as the
//! teacher's `PgQueueJob` abstraction: a narrow trait the core depends on
//! without knowing (or caring) whether it is backed by a WebSocket relay, a
//! database table, or something else entirely.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::action::Action;
use crate::data::{import_id, note_id, ActionContext, JobData};
use crate::error::ActionError;

/// `status ∈ {PROCESSING, COMPLETED, FAILED, PENDING, AWAITING_PARSING, …}` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    AwaitingParsing,
    Processing,
    Completed,
    Failed,
}

/// `indentLevel ∈ {0,1,2}` drives UI nesting (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndentLevel(u8);

impl IndentLevel {
    pub const TOP: IndentLevel = IndentLevel(0);
    pub const STAGE: IndentLevel = IndentLevel(1);
    pub const DETAIL: IndentLevel = IndentLevel(2);
}

/// An outbound progress notification keyed by import/note id (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub import_id: String,
    pub note_id: Option<String>,
    pub status: JobStatus,
    pub message: String,
    /// A stable slug (`parse_html_start`, `categorization`, …).
    pub context: String,
    pub indent_level: IndentLevel,
    pub metadata: Option<HashMap<String, Value>>,
}

/// One method: `addStatusEventAndBroadcast`. Error-tolerant from the
/// caller's side — failures are logged by the status actions, never
/// escalated (§6.2, §7).
#[async_trait]
pub trait StatusBroadcaster: Send + Sync {
    async fn add_status_event_and_broadcast(&self, event: StatusEvent) -> Result<(), ActionError>;
}

/// Dependencies that expose a status broadcaster. The three status actions
/// below are generic over any `D: HasStatusBroadcaster`, so a worker's own
/// `Deps` struct just needs to implement this to opt in.
pub trait HasStatusBroadcaster {
    fn status_broadcaster(&self) -> Option<&(dyn StatusBroadcaster)>;
}

fn metadata_with_job(job_id: &str, operation: &str) -> HashMap<String, Value> {
    let mut metadata = HashMap::new();
    metadata.insert("jobId".to_owned(), Value::String(job_id.to_owned()));
    metadata.insert("operation".to_owned(), Value::String(operation.to_owned()));
    metadata
}

async fn broadcast_best_effort<D: HasStatusBroadcaster + Send + Sync>(
    deps: &D,
    event: StatusEvent,
) {
    if let Some(broadcaster) = deps.status_broadcaster() {
        if let Err(error) = broadcaster.add_status_event_and_broadcast(event).await {
            warn!("Failed to broadcast: {error}");
        }
    }
}

/// Emits a `PROCESSING` event at `indentLevel=1` iff the payload carries a
/// truthy `importId` and `deps` expose a broadcaster. Silent no-op
/// otherwise. Always logs `"[{operation}] Processing status for job {jobId}"` (§4.5).
pub struct ProcessingStatusAction<D> {
    operation: String,
    _deps: PhantomData<fn() -> D>,
}

impl<D> ProcessingStatusAction<D> {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            _deps: PhantomData,
        }
    }
}

#[async_trait]
impl<D: HasStatusBroadcaster + Send + Sync> Action<D> for ProcessingStatusAction<D> {
    fn name(&self) -> &str {
        "processing_status"
    }

    fn is_status_broadcast(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        data: JobData,
        deps: &D,
        context: &ActionContext,
    ) -> Result<JobData, ActionError> {
        tracing::info!(
            "[{}] Processing status for job {}",
            self.operation,
            context.job_id
        );

        if let Some(import_id) = import_id(&data) {
            broadcast_best_effort(
                deps,
                StatusEvent {
                    import_id,
                    note_id: note_id(&data),
                    status: JobStatus::Processing,
                    message: format!("Processing {}", self.operation),
                    context: self.operation.clone(),
                    indent_level: IndentLevel::STAGE,
                    metadata: Some(metadata_with_job(&context.job_id, &self.operation)),
                },
            )
            .await;
        }

        Ok(data)
    }
}

/// Symmetric to `ProcessingStatusAction` with status `COMPLETED` (§4.5).
pub struct CompletedStatusAction<D> {
    operation: String,
    _deps: PhantomData<fn() -> D>,
}

impl<D> CompletedStatusAction<D> {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            _deps: PhantomData,
        }
    }
}

#[async_trait]
impl<D: HasStatusBroadcaster + Send + Sync> Action<D> for CompletedStatusAction<D> {
    fn name(&self) -> &str {
        "completed_status"
    }

    fn is_status_broadcast(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        data: JobData,
        deps: &D,
        context: &ActionContext,
    ) -> Result<JobData, ActionError> {
        tracing::info!(
            "[{}] Completed status for job {}",
            self.operation,
            context.job_id
        );

        if let Some(import_id) = import_id(&data) {
            broadcast_best_effort(
                deps,
                StatusEvent {
                    import_id,
                    note_id: note_id(&data),
                    status: JobStatus::Completed,
                    message: format!("Completed {}", self.operation),
                    context: self.operation.clone(),
                    indent_level: IndentLevel::STAGE,
                    metadata: Some(metadata_with_job(&context.job_id, &self.operation)),
                },
            )
            .await;
        }

        Ok(data)
    }
}

/// Status `FAILED`; always attempts to broadcast, even without `importId`,
/// because surfacing failure is a terminal requirement (§4.5, §7). Takes the
/// triggering error's text as the message when available.
pub struct FailedStatusAction<D> {
    operation: String,
    error_text: Option<String>,
    _deps: PhantomData<fn() -> D>,
}

impl<D> FailedStatusAction<D> {
    pub fn new(operation: impl Into<String>, error_text: Option<String>) -> Self {
        Self {
            operation: operation.into(),
            error_text,
            _deps: PhantomData,
        }
    }
}

#[async_trait]
impl<D: HasStatusBroadcaster + Send + Sync> Action<D> for FailedStatusAction<D> {
    fn name(&self) -> &str {
        "failed_status"
    }

    fn is_status_broadcast(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        data: JobData,
        deps: &D,
        context: &ActionContext,
    ) -> Result<JobData, ActionError> {
        let message = self
            .error_text
            .clone()
            .unwrap_or_else(|| format!("{} failed", self.operation));

        // Unlike Processing/Completed, this always broadcasts: an empty
        // `importId` still routes to a stable placeholder so failure surfaces.
        let import_id = import_id(&data).unwrap_or_default();

        broadcast_best_effort(
            deps,
            StatusEvent {
                import_id,
                note_id: note_id(&data),
                status: JobStatus::Failed,
                message,
                context: self.operation.clone(),
                indent_level: IndentLevel::STAGE,
                metadata: Some(metadata_with_job(&context.job_id, &self.operation)),
            },
        )
        .await;

        Ok(data)
    }
}

/// Prepends a `ProcessingStatusAction` and appends a `CompletedStatusAction`
/// to `pipeline` in place (§4.5). Panics if `pipeline` construction already
/// failed to produce an operation name — mirrors `hook-worker`'s
/// construction-time `expect()` convention for invariants that indicate a
/// programming error, not a runtime condition.
pub fn inject_standard_status_actions<D>(
    pipeline: &mut Vec<Box<dyn Action<D>>>,
    operation: &str,
) where
    D: HasStatusBroadcaster + Send + Sync + 'static,
{
    if operation.is_empty() {
        panic!("inject_standard_status_actions requires a non-empty operation name");
    }

    tracing::info!("[{}] Adding status actions", operation.to_uppercase());

    pipeline.insert(0, Box::new(ProcessingStatusAction::new(operation)));
    pipeline.push(Box::new(CompletedStatusAction::new(operation)));
}

//! The job payload and per-job context that flow through every pipeline (§3).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};

/// A semi-structured job payload. All payloads extend a `BaseJobData` shape
/// (`noteId`, `importId`, plus arbitrary stage-specific fields); represented
/// as a JSON value so stages can merge in fields without a fixed schema.
pub type JobData = Value;

/// Merge `next` into `current` per the worker's replace-or-merge rule (§4.6):
/// if both are JSON objects, merge shallowly with `next`'s keys winning;
/// otherwise `next` replaces `current` wholesale.
pub fn merge_job_data(current: &JobData, next: JobData) -> JobData {
    match (current, next) {
        (Value::Object(base), Value::Object(overlay)) => {
            let mut merged = base.clone();
            for (key, value) in overlay {
                merged.insert(key, value);
            }
            Value::Object(merged)
        }
        (_, next) => next,
    }
}

/// Read the `importId` field from a payload, if present and non-empty.
pub fn import_id(data: &JobData) -> Option<String> {
    data.get("importId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Read the `noteId` field from a payload, if present and non-empty.
pub fn note_id(data: &JobData) -> Option<String> {
    data.get("noteId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Build an empty JSON object, the canonical "no payload yet" `JobData`.
pub fn empty_job_data() -> JobData {
    Value::Object(Map::new())
}

/// Cooperative cancellation signal threaded through an `ActionContext`.
///
/// A plain `AtomicBool` behind an `Arc` rather than `tokio_util::sync::CancellationToken`:
/// the engine only ever needs a single fire-once flag actions and the retry
/// wrapper can poll or race a sleep against, not the richer child-token tree
/// `CancellationToken` offers.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-job immutable descriptor carried alongside the payload through every
/// action in a pipeline (§3).
#[derive(Clone, Debug)]
pub struct ActionContext {
    /// Unique identifier for this attempt.
    pub job_id: String,
    /// 1-based attempt number, incremented on retry by the queue.
    pub attempt_number: u32,
    /// Attempts so far (usually `attempt_number - 1`).
    pub retry_count: u32,
    pub queue_name: String,
    pub worker_name: String,
    /// Human-readable stage name used in logs and status events.
    pub operation: String,
    /// Monotonic instant at worker pickup, used to compute elapsed wall time.
    pub start_time: Instant,
    /// Cooperative cancellation/deadline signal (§5).
    pub cancel: CancelSignal,
}

impl ActionContext {
    pub fn new(
        job_id: impl Into<String>,
        queue_name: impl Into<String>,
        worker_name: impl Into<String>,
        operation: impl Into<String>,
        attempt_number: u32,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            attempt_number,
            retry_count: attempt_number.saturating_sub(1),
            queue_name: queue_name.into(),
            worker_name: worker_name.into(),
            operation: operation.into(),
            start_time: Instant::now(),
            cancel: CancelSignal::new(),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start_time.elapsed().as_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merges_objects_shallowly_with_later_writes_winning() {
        let current = json!({"a": 1, "b": 2});
        let next = json!({"b": 3, "c": 4});
        let merged = merge_job_data(&current, next);
        assert_eq!(merged, json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn non_object_next_replaces_current_wholesale() {
        let current = json!({"a": 1});
        let next = json!("a string now");
        let merged = merge_job_data(&current, next.clone());
        assert_eq!(merged, next);
    }

    #[test]
    fn non_object_current_is_also_replaced() {
        let current = json!("whatever");
        let next = json!({"a": 1});
        let merged = merge_job_data(&current, next.clone());
        assert_eq!(merged, next);
    }

    #[test]
    fn import_id_ignores_blank_values() {
        assert_eq!(import_id(&json!({"importId": "i1"})), Some("i1".into()));
        assert_eq!(import_id(&json!({"importId": ""})), None);
        assert_eq!(import_id(&json!({})), None);
    }

    #[test]
    fn cancel_signal_is_shared_across_clones() {
        let signal = CancelSignal::new();
        let cloned = signal.clone();
        assert!(!cloned.is_cancelled());
        signal.cancel();
        assert!(cloned.is_cancelled());
    }
}

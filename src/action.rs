//! The action abstraction and its lifecycle: validate → execute → time →
//! error-dispatch (§4.1).
//!
//! Grounded on `hook-worker::worker`'s `WebhookJob` trait: a
//! small capability trait implemented by many concrete types and consumed
//! generically by free functions, rather than a class hierarchy.

use std::marker::PhantomData;

use async_trait::async_trait;
use tracing::error;

use crate::data::{ActionContext, JobData};
use crate::error::ActionError;

/// The successful half of an `ActionOutcome`: the transformed payload plus
/// how long `execute` took.
#[derive(Debug, Clone)]
pub struct ActionSuccess {
    pub data: JobData,
    pub duration_ms: u128,
}

/// The failed half of an `ActionOutcome`: the error plus how long the attempt
/// took (validation failures still carry a non-negative duration, per §8).
#[derive(Debug, Clone)]
pub struct ActionFailure {
    pub error: ActionError,
    pub duration_ms: u128,
}

/// `{success:true, data, durationMs} | {success:false, error, durationMs}` (§3).
pub type ActionOutcome = Result<ActionSuccess, ActionFailure>;

/// A composable unit of pipeline work (§3, §4.1).
///
/// `D` is the dependency-injection payload threaded through every action in
/// one worker's pipeline (parsers, persistence handles, HTTP clients, ...).
/// The engine never interprets `D`; it is passed through verbatim, matching
/// "Domain services" in §6.
#[async_trait]
pub trait Action<D>: Send + Sync {
    /// The name this action was registered under. Used in logs, status
    /// events, and metric tags.
    fn name(&self) -> &str;

    /// Whether the retry wrapper should attempt this action again on a
    /// retryable error. Defaults to `true`.
    fn retryable(&self) -> bool {
        true
    }

    /// Relative ordering hint for callers that schedule actions by priority.
    /// Defaults to `0`.
    fn priority(&self) -> i32 {
        0
    }

    /// Validate `data` before `execute` runs. Returning `Some(error)` aborts
    /// the action without calling `execute`.
    fn validate_input(&self, _data: &JobData) -> Option<ActionError> {
        None
    }

    /// Perform the action's work, producing the payload downstream actions
    /// will observe.
    async fn execute(&self, data: JobData, deps: &D, context: &ActionContext)
        -> Result<JobData, ActionError>;

    /// Called when `execute` returns an error, in place of the engine's
    /// default logging.
    async fn on_error(
        &self,
        _error: &ActionError,
        _data: &JobData,
        _deps: &D,
        _context: &ActionContext,
    ) {
    }

    /// Whether this action provides a real `on_error` handler. When `false`
    /// (the default), `execute_with_timing` falls back to its own error-level
    /// log line instead of relying on the no-op default above (§4.1).
    fn has_on_error(&self) -> bool {
        false
    }

    /// Whether this action exists purely to broadcast pipeline status
    /// (§4.6 step 4: its failures are advisory and never abort the pipeline).
    /// Overridden by `ProcessingStatusAction`/`CompletedStatusAction`/`FailedStatusAction`.
    fn is_status_broadcast(&self) -> bool {
        false
    }

    /// The uniform `validate → execute → time → error-dispatch` adapter used
    /// by every wrapper and worker (§4.1).
    async fn execute_with_timing(
        &self,
        data: JobData,
        deps: &D,
        context: &ActionContext,
    ) -> ActionOutcome {
        let t0 = std::time::Instant::now();

        if let Some(validation_error) = self.validate_input(&data) {
            return Err(ActionFailure {
                error: validation_error,
                duration_ms: t0.elapsed().as_millis(),
            });
        }

        match self.execute(data.clone(), deps, context).await {
            Ok(result) => Ok(ActionSuccess {
                data: result,
                duration_ms: t0.elapsed().as_millis(),
            }),
            Err(error) => {
                if self.has_on_error() {
                    self.on_error(&error, &data, deps, context).await;
                } else {
                    error!(
                        action = self.name(),
                        job_id = %context.job_id,
                        error = %error,
                        "action failed"
                    );
                }
                Err(ActionFailure {
                    error,
                    duration_ms: t0.elapsed().as_millis(),
                })
            }
        }
    }
}

/// Returns its input unchanged. Retryable, priority 0. A placeholder and a
/// test fixture (§4.1).
pub struct NoOpAction<D> {
    name: String,
    _deps: PhantomData<fn() -> D>,
}

impl<D> NoOpAction<D> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _deps: PhantomData,
        }
    }
}

#[async_trait]
impl<D: Send + Sync> Action<D> for NoOpAction<D> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        data: JobData,
        _deps: &D,
        _context: &ActionContext,
    ) -> Result<JobData, ActionError> {
        Ok(data)
    }
}

/// Either a literal message or a function deriving one from the payload and
/// context, used by `LoggingAction`.
pub enum LogMessage {
    Literal(String),
    Dynamic(Box<dyn Fn(&JobData, &ActionContext) -> String + Send + Sync>),
}

impl LogMessage {
    fn render(&self, data: &JobData, context: &ActionContext) -> String {
        match self {
            LogMessage::Literal(s) => s.clone(),
            LogMessage::Dynamic(f) => f(data, context),
        }
    }
}

/// Writes `"[{jobId}] {message}"` and returns its input unchanged. Not
/// retryable (§4.1).
pub struct LoggingAction<D> {
    name: String,
    message: LogMessage,
    _deps: PhantomData<fn() -> D>,
}

impl<D> LoggingAction<D> {
    pub fn new(name: impl Into<String>, message: LogMessage) -> Self {
        Self {
            name: name.into(),
            message,
            _deps: PhantomData,
        }
    }
}

#[async_trait]
impl<D: Send + Sync> Action<D> for LoggingAction<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn retryable(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        data: JobData,
        _deps: &D,
        context: &ActionContext,
    ) -> Result<JobData, ActionError> {
        let rendered = self.message.render(&data, context);
        tracing::info!("[{}] {}", context.job_id, rendered);
        Ok(data)
    }
}

/// On success returns its input; on failure throws. Not retryable (§4.1).
pub struct PredicateValidationAction<D> {
    name: String,
    validator: Box<dyn Fn(&JobData) -> Option<ActionError> + Send + Sync>,
    _deps: PhantomData<fn() -> D>,
}

impl<D> PredicateValidationAction<D> {
    pub fn new(
        name: impl Into<String>,
        validator: impl Fn(&JobData) -> Option<ActionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            validator: Box::new(validator),
            _deps: PhantomData,
        }
    }
}

#[async_trait]
impl<D: Send + Sync> Action<D> for PredicateValidationAction<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn retryable(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        data: JobData,
        _deps: &D,
        _context: &ActionContext,
    ) -> Result<JobData, ActionError> {
        match (self.validator)(&data) {
            None => Ok(data),
            Some(error) => Err(error),
        }
    }
}

/// Overrides applied by `with_config` (§4.1): `None` means "leave as-is".
#[derive(Default, Clone, Copy)]
pub struct ActionConfigOverride {
    pub retryable: Option<bool>,
    pub priority: Option<i32>,
}

/// Delegates everything to `inner` except `retryable`/`priority`, which are
/// overridden when set. `name()` is preserved so callers can't tell the
/// difference in logs or metrics.
struct ConfiguredAction<D> {
    inner: Box<dyn Action<D>>,
    overrides: ActionConfigOverride,
}

#[async_trait]
impl<D: Send + Sync> Action<D> for ConfiguredAction<D> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn retryable(&self) -> bool {
        self.overrides.retryable.unwrap_or_else(|| self.inner.retryable())
    }

    fn priority(&self) -> i32 {
        self.overrides.priority.unwrap_or_else(|| self.inner.priority())
    }

    fn validate_input(&self, data: &JobData) -> Option<ActionError> {
        self.inner.validate_input(data)
    }

    async fn execute(
        &self,
        data: JobData,
        deps: &D,
        context: &ActionContext,
    ) -> Result<JobData, ActionError> {
        self.inner.execute(data, deps, context).await
    }

    async fn on_error(
        &self,
        error: &ActionError,
        data: &JobData,
        deps: &D,
        context: &ActionContext,
    ) {
        self.inner.on_error(error, data, deps, context).await
    }

    fn has_on_error(&self) -> bool {
        self.inner.has_on_error()
    }

    fn is_status_broadcast(&self) -> bool {
        self.inner.is_status_broadcast()
    }
}

/// Returns a new logical action with `retryable`/`priority` overridden and
/// all other behavior, including `name()` identity, preserved. `inner` is
/// consumed; the original instance this was built from is unaffected since
/// ownership of a fresh `Box` is required to call this (§4.1).
pub fn with_config<D: Send + Sync + 'static>(
    inner: Box<dyn Action<D>>,
    overrides: ActionConfigOverride,
) -> Box<dyn Action<D>> {
    Box::new(ConfiguredAction { inner, overrides })
}

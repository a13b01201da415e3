//! Error kinds shared by the action pipeline engine.
//!
//! Mirrors `hook-worker`'s split between a request/processing error enum
//! (`WebhookError`) and an initialization/consumption error enum (`WorkerError`):
//! here `ActionError` covers everything that can go wrong while a pipeline runs,
//! and `FactoryError`/`ConfigError` cover the two remaining concerns that need
//! their own error identity.

use thiserror::Error;

/// Errors an action (or a wrapper around one) may report while a pipeline runs.
///
/// These are the semantic error kinds this pipeline's error handling design calls for;
/// they are not one-to-one with the underlying downstream error (a domain
/// action maps its own errors into one of these before returning).
#[derive(Error, Debug, Clone)]
pub enum ActionError {
    /// Input was rejected before `execute` ran. Never retried by the retry wrapper.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// A downstream timeout, connection reset, or 5xx. Retryable; may open a breaker.
    #[error("transient external failure: {0}")]
    TransientExternalFailure(String),

    /// A downstream 4xx or data-contract violation. Not retried by the wrapper.
    #[error("permanent external failure: {0}")]
    PermanentExternalFailure(String),

    /// Fast-fail from an open circuit breaker. The wrapped action was not called.
    #[error("circuit breaker is OPEN for {0}")]
    CircuitOpen(String),

    /// Cooperative cancellation observed mid-action or mid-backoff.
    #[error("action cancelled")]
    Cancelled,

    /// An unexpected invariant violation inside the action or the engine itself.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ActionError {
    /// Whether the retry wrapper should attempt another call after this error.
    ///
    /// `ValidationFailed`, `PermanentExternalFailure`, `CircuitOpen`, and
    /// `Cancelled` all short-circuit retries for different reasons; only
    /// `TransientExternalFailure` and `Internal` are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::TransientExternalFailure(_) | ActionError::Internal(_)
        )
    }
}

/// Errors from the action factory registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FactoryError {
    #[error("no action registered under name {0:?}")]
    ActionUnregistered(String),
}

/// Errors surfaced while parsing environment-provided configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Envconfig(#[from] envconfig::Error),
}

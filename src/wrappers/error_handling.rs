//! Delegates `execute` to the wrapped action; on a thrown error, invokes the
//! wrapped action's `on_error` if present, else logs at `error` level, then
//! re-throws the original error to the caller (§4.4).

use async_trait::async_trait;
use tracing::error;

use crate::action::Action;
use crate::data::{ActionContext, JobData};
use crate::error::ActionError;

pub struct ErrorHandlingAction<D> {
    inner: Box<dyn Action<D>>,
}

impl<D> ErrorHandlingAction<D> {
    pub fn new(inner: Box<dyn Action<D>>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<D: Send + Sync> Action<D> for ErrorHandlingAction<D> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn retryable(&self) -> bool {
        self.inner.retryable()
    }

    fn priority(&self) -> i32 {
        self.inner.priority()
    }

    fn validate_input(&self, data: &JobData) -> Option<ActionError> {
        self.inner.validate_input(data)
    }

    fn is_status_broadcast(&self) -> bool {
        self.inner.is_status_broadcast()
    }

    async fn execute(
        &self,
        data: JobData,
        deps: &D,
        context: &ActionContext,
    ) -> Result<JobData, ActionError> {
        match self.inner.execute(data.clone(), deps, context).await {
            Ok(result) => Ok(result),
            Err(err) => {
                if self.inner.has_on_error() {
                    self.inner.on_error(&err, &data, deps, context).await;
                } else {
                    error!(
                        action = self.inner.name(),
                        job_id = %context.job_id,
                        error = %err,
                        "action failed"
                    );
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, NoOpAction};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct Deps;

    struct Failing {
        on_error_called: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Action<Deps> for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn execute(
            &self,
            _data: JobData,
            _deps: &Deps,
            _context: &ActionContext,
        ) -> Result<JobData, ActionError> {
            Err(ActionError::Internal("boom".into()))
        }

        async fn on_error(
            &self,
            _error: &ActionError,
            _data: &JobData,
            _deps: &Deps,
            _context: &ActionContext,
        ) {
            self.on_error_called.store(true, Ordering::SeqCst);
        }

        fn has_on_error(&self) -> bool {
            true
        }
    }

    fn ctx() -> ActionContext {
        ActionContext::new("job-1", "queue", "worker", "op", 1)
    }

    #[tokio::test]
    async fn re_throws_original_error_and_calls_wrapped_on_error() {
        let called = Arc::new(AtomicBool::new(false));
        let wrapped = ErrorHandlingAction::new(Box::new(Failing {
            on_error_called: called.clone(),
        }));

        let err = wrapped.execute(json!({}), &Deps, &ctx()).await.unwrap_err();
        assert!(matches!(err, ActionError::Internal(_)));
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn passes_through_success_unchanged() {
        let wrapped = ErrorHandlingAction::new(Box::new(NoOpAction::<Deps>::new("noop")));
        let data = json!({"a": 1});
        let result = wrapped.execute(data.clone(), &Deps, &ctx()).await.unwrap();
        assert_eq!(result, data);
    }
}

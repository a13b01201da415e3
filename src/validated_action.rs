//! A base action whose `execute` step is always preceded by validation
//! against a declared schema that produces typed data (§4.2).
//!
//! "Schema" here is a `serde`-deserializable type, the same wire-typing
//! approach `hook-worker` uses for `WebhookJobParameters`/`WebhookJobMetadata`:
//! validating a payload is attempting `serde_json::from_value::<T>` and
//! turning a failure into a `ValidationFailed` whose message joins every
//! issue `serde_json` reports.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::action::Action;
use crate::data::{ActionContext, JobData};
use crate::error::ActionError;

/// A `ValidatedAction` validates `data` against `T` before calling `run`.
/// Implement this instead of `Action` directly when the action's first step
/// is always "parse the payload into a typed shape".
#[async_trait]
pub trait ValidatedAction<D, T>: Send + Sync
where
    T: DeserializeOwned + Send + Sync,
{
    fn name(&self) -> &str;

    fn retryable(&self) -> bool {
        true
    }

    fn priority(&self) -> i32 {
        0
    }

    /// Run the action against the already-validated, typed payload.
    async fn run(&self, typed: T, data: JobData, deps: &D, context: &ActionContext)
        -> Result<JobData, ActionError>;
}

/// Adapts any `ValidatedAction<D, T>` into a plain `Action<D>` by performing
/// the schema validation in `validate_input`/`execute`.
pub struct ValidatedActionAdapter<D, T, V> {
    inner: V,
    _data: std::marker::PhantomData<fn() -> (D, T)>,
}

impl<D, T, V> ValidatedActionAdapter<D, T, V>
where
    T: DeserializeOwned + Send + Sync,
    V: ValidatedAction<D, T>,
{
    pub fn new(inner: V) -> Self {
        Self {
            inner,
            _data: std::marker::PhantomData,
        }
    }

    fn validate(data: &JobData) -> Result<T, ActionError> {
        serde_json::from_value::<T>(data.clone()).map_err(|err| {
            ActionError::ValidationFailed(collect_issues(&err.to_string()))
        })
    }
}

/// `serde_json` reports a single issue per error; every
/// issue joined by `", "`. With one deserializer call we only ever have one,
/// but the join is kept so a future multi-issue validator slots in without
/// changing callers.
fn collect_issues(issues: &str) -> String {
    issues.to_owned()
}

#[async_trait]
impl<D, T, V> Action<D> for ValidatedActionAdapter<D, T, V>
where
    D: Send + Sync,
    T: DeserializeOwned + Send + Sync,
    V: ValidatedAction<D, T> + Send + Sync,
{
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
        Self::validate(data).err()
    }

    async fn execute(
        &self,
        data: JobData,
        deps: &D,
        context: &ActionContext,
    ) -> Result<JobData, ActionError> {
        let typed = Self::validate(&data)?;
        self.inner.run(typed, data, deps, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use serde::Deserialize;
    use serde_json::json;

    struct Deps;

    #[derive(Deserialize)]
    struct Typed {
        value: String,
    }

    struct Uppercase;

    #[async_trait]
    impl ValidatedAction<Deps, Typed> for Uppercase {
        fn name(&self) -> &str {
            "uppercase"
        }

        async fn run(
            &self,
            typed: Typed,
            data: JobData,
            _deps: &Deps,
            _context: &ActionContext,
        ) -> Result<JobData, ActionError> {
            let mut out = data;
            out["value"] = json!(typed.value.to_uppercase());
            Ok(out)
        }
    }

    fn ctx() -> ActionContext {
        ActionContext::new("job-1", "queue", "worker", "op", 1)
    }

    #[tokio::test]
    async fn valid_payload_runs_typed_action() {
        let action = ValidatedActionAdapter::new(Uppercase);
        let outcome = action
            .execute_with_timing(json!({"value": "hi"}), &Deps, &ctx())
            .await
            .unwrap();
        assert_eq!(outcome.data["value"], json!("HI"));
    }

    #[tokio::test]
    async fn invalid_payload_fails_before_run_with_validation_error() {
        let action = ValidatedActionAdapter::new(Uppercase);
        let failure = action
            .execute_with_timing(json!({"value": 123}), &Deps, &ctx())
            .await
            .unwrap_err();
        assert!(matches!(failure.error, ActionError::ValidationFailed(_)));
        assert!(failure.duration_ms < u128::MAX);
    }
}

//! Exponential backoff with jitter around a wrapped action (§4.4).
//!
//! Grounded on `hook-common::retry::RetryPolicy`: a small
//! value type computing a delay from an attempt number, but generalized from
//! "next PgQueue scheduled_at" to "how long to sleep before the next
//! in-process retry", and extended with the jitter and cancellation the
//! spec requires.

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use crate::action::Action;
use crate::config::RetryConfig;
use crate::data::{ActionContext, JobData};
use crate::error::ActionError;

/// Retries the wrapped action up to `max_attempts + 1` total calls,
/// backing off between attempts per `RetryConfig` (§4.4).
pub struct RetryAction<D> {
    inner: Box<dyn Action<D>>,
    config: RetryConfig,
}

impl<D> RetryAction<D> {
    pub fn new(inner: Box<dyn Action<D>>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

/// `delay_k = min(maxDelay, baseDelay * backoffMultiplier^k)`, plus, when
/// `jitter` is set, a uniform additive component in `[0, 0.1 * delay_k)`.
fn compute_delay(config: &RetryConfig, k: u32) -> std::time::Duration {
    let base = config.base_delay.0.as_secs_f64();
    let candidate = base * config.backoff_multiplier.powi(k as i32);
    let capped = candidate.min(config.max_delay.0.as_secs_f64());

    let with_jitter = if config.jitter {
        let jitter_amount = rand::thread_rng().gen_range(0.0..(capped * 0.1).max(f64::EPSILON));
        capped + jitter_amount
    } else {
        capped
    };

    std::time::Duration::from_secs_f64(with_jitter.max(0.0))
}

#[async_trait]
impl<D: Send + Sync> Action<D> for RetryAction<D> {
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
        let total_calls = self.config.max_attempts + 1;

        for call_index in 0..total_calls {
            if call_index > 0 {
                let retry_index = call_index - 1;
                let delay = compute_delay(&self.config, retry_index);

                warn!(
                    "Retrying {} for job {} (attempt {}/{}) after {}ms",
                    self.inner.name(),
                    context.job_id,
                    call_index + 1,
                    total_calls,
                    delay.as_millis()
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = wait_for_cancel(context) => {
                        return Err(ActionError::Cancelled);
                    }
                }
            }

            match self.inner.execute(data.clone(), deps, context).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    let is_last_call = call_index + 1 == total_calls;
                    if is_last_call || !err.is_retryable() {
                        return Err(err);
                    }
                }
            }
        }

        unreachable!("loop always returns on its last iteration")
    }
}

async fn wait_for_cancel(context: &ActionContext) {
    loop {
        if context.cancel.is_cancelled() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}

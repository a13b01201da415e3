//! Per-key circuit breaker wrapper, fast-failing during sustained failure
//! (§4.4).
//!
//! The breaker map is a process-global `DashMap`, the same "shared state
//! behind a concurrency-safe map" shape `HealthRegistry` uses for
//! `HealthRegistry`'s component table, but sharded instead of a single
//! `RwLock<HashMap<_>>` since every pipeline in every worker may touch a
//! breaker key concurrently.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use tokio::time::{Duration, Instant};
use tracing::error;

use crate::action::Action;
use crate::config::BreakerConfig;
use crate::data::{ActionContext, JobData};
use crate::error::ActionError;

/// `CLOSED | OPEN | HALF_OPEN` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// `{failures, lastFailureMs, state}` for one breaker key (§3).
#[derive(Debug, Clone)]
pub struct BreakerRecord {
    pub failures: u32,
    pub last_failure: Option<Instant>,
    pub state: BreakerState,
}

impl Default for BreakerRecord {
    fn default() -> Self {
        Self {
            failures: 0,
            last_failure: None,
            state: BreakerState::Closed,
        }
    }
}

type BreakerMap = DashMap<String, Arc<Mutex<BreakerRecord>>>;

static BREAKERS: Lazy<BreakerMap> = Lazy::new(DashMap::new);

fn breaker_for(key: &str) -> Arc<Mutex<BreakerRecord>> {
    BREAKERS
        .entry(key.to_owned())
        .or_insert_with(|| Arc::new(Mutex::new(BreakerRecord::default())))
        .clone()
}

/// Snapshot of one breaker key's state, for tests and observability.
pub fn breaker_state(key: &str) -> Option<(BreakerState, u32)> {
    BREAKERS.get(key).map(|record| {
        let guard = record.lock().expect("breaker lock poisoned");
        (guard.state, guard.failures)
    })
}

#[cfg(any(test, feature = "test-support"))]
pub fn reset_breaker(key: &str) {
    BREAKERS.remove(key);
}

pub struct CircuitBreakerAction<D> {
    inner: Box<dyn Action<D>>,
    config: BreakerConfig,
}

impl<D> CircuitBreakerAction<D> {
    pub fn new(inner: Box<dyn Action<D>>, config: BreakerConfig) -> Self {
        Self { inner, config }
    }

    fn key(&self, context: &ActionContext) -> String {
        self.config
            .breaker_key
            .clone()
            .unwrap_or_else(|| context.operation.clone())
    }
}

#[async_trait]
impl<D: Send + Sync> Action<D> for CircuitBreakerAction<D> {
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
        let key = self.key(context);
        let record = breaker_for(&key);

        let should_run = {
            let mut guard = record.lock().expect("breaker lock poisoned");
            match guard.state {
                BreakerState::Closed => true,
                BreakerState::HalfOpen => true,
                BreakerState::Open => {
                    let reset_elapsed = guard
                        .last_failure
                        .map(|t| t.elapsed() > self.config.reset_timeout.0)
                        .unwrap_or(false);
                    if reset_elapsed {
                        guard.state = BreakerState::HalfOpen;
                        true
                    } else {
                        false
                    }
                }
            }
        };

        if !should_run {
            return Err(ActionError::CircuitOpen(key));
        }

        let result = self.inner.execute(data, deps, context).await;

        let mut guard = record.lock().expect("breaker lock poisoned");
        match &result {
            Ok(_) => {
                if guard.state == BreakerState::HalfOpen {
                    guard.state = BreakerState::Closed;
                    guard.failures = 0;
                }
            }
            Err(_) => {
                guard.failures += 1;
                guard.last_failure = Some(Instant::now());
                match guard.state {
                    BreakerState::HalfOpen => guard.state = BreakerState::Open,
                    BreakerState::Closed => {
                        if guard.failures >= self.config.failure_threshold {
                            guard.state = BreakerState::Open;
                            error!(breaker_key = %key, failures = guard.failures, "circuit breaker opened");
                        }
                    }
                    BreakerState::Open => {}
                }
            }
        }

        result
    }
}

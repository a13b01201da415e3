//! Configuration recognized by the core (§6): retry policy, breaker policy,
//! worker concurrency/drain timeout, and metrics retention.
//!
//! Shaped like `hook-worker::config::Config`: `envconfig`-derived
//! structs with a small `EnvMsDuration` newtype so millisecond durations can be
//! read straight out of the environment, nested nicely for sub-policies.

use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;

/// A `Duration` parsed from an environment variable holding a millisecond count.
#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;
        Ok(EnvMsDuration(Duration::from_millis(ms)))
    }
}

/// Retry wrapper configuration (§4.4).
#[derive(Envconfig, Clone, Debug)]
pub struct RetryConfig {
    #[envconfig(default = "3")]
    pub max_attempts: u32,

    #[envconfig(default = "1000")]
    pub base_delay: EnvMsDuration,

    #[envconfig(default = "30000")]
    pub max_delay: EnvMsDuration,

    #[envconfig(default = "2")]
    pub backoff_multiplier: f64,

    #[envconfig(default = "true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: EnvMsDuration(Duration::from_millis(1000)),
            max_delay: EnvMsDuration(Duration::from_millis(30_000)),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Circuit breaker wrapper configuration (§4.4).
#[derive(Envconfig, Clone, Debug)]
pub struct BreakerConfig {
    #[envconfig(default = "5")]
    pub failure_threshold: u32,

    #[envconfig(default = "60000")]
    pub reset_timeout: EnvMsDuration,

    /// Defaults to `context.operation` when unset (see `wrappers::circuit_breaker`).
    pub breaker_key: Option<String>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: EnvMsDuration(Duration::from_millis(60_000)),
            breaker_key: None,
        }
    }
}

/// Worker concurrency and shutdown configuration (§4.6, §5).
#[derive(Envconfig, Clone, Debug)]
pub struct WorkerConfig {
    #[envconfig(default = "10")]
    pub concurrency: usize,

    #[envconfig(default = "30000")]
    pub drain_timeout: EnvMsDuration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            drain_timeout: EnvMsDuration(Duration::from_millis(30_000)),
        }
    }
}

/// Metrics retention configuration (§4.7).
#[derive(Envconfig, Clone, Debug)]
pub struct MetricsConfig {
    #[envconfig(default = "100")]
    pub retention: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { retention: 100 }
    }
}

use crate::backend::{short_type_name, CheckContext, Probe};
use crate::error::{HealthCheckError, ProbeError, ProbeResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_RETRIES: u32 = 3;
pub const EXHAUSTED_MESSAGE: &str = "Could not check status.";

/// A probe whose unclassified failures are retried a bounded number of times.
pub trait RetryingProbe: Send {
    fn identifier(&self) -> String {
        short_type_name::<Self>()
    }

    fn check_status_implementation(&mut self, ctx: &CheckContext<'_>) -> ProbeResult;

    fn retries(&self) -> u32 {
        DEFAULT_RETRIES
    }
}

/// Retry settings shared by every retrying backend of a runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Overrides `RetryingProbe::retries` when set.
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_backoff_max_ms() -> u64 { 2_000 }

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { retries: None, backoff_base_ms: 0, backoff_max_ms: default_backoff_max_ms() }
    }
}

impl RetryPolicy {
    /// Delay before the retry following failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        if self.backoff_base_ms == 0 {
            return Duration::ZERO;
        }
        calculate_backoff(attempt, self.backoff_base_ms, self.backoff_max_ms)
    }
}

/// Exponential backoff capped at `max_ms`, plus up to 10% jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(exponential_base).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 { rand::thread_rng().gen_range(0..jitter_range) } else { 0 };

    Duration::from_millis(capped + jitter)
}

/// Runs a `RetryingProbe` as a plain `Probe`.
///
/// Each `check_status` call:
/// - returns on the first success;
/// - returns `Unavailable`/`UnexpectedResult` failures at once, without retrying;
/// - logs any other failure as a warning and tries again;
/// - fails with `Unavailable("Could not check status.")` once `retries` attempts failed.
pub struct Retry<P> {
    inner: P,
    policy: RetryPolicy,
    last_attempts: u32,
}

impl<P: RetryingProbe> Retry<P> {
    pub fn new(inner: P) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    pub fn with_policy(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy, last_attempts: 0 }
    }

    pub fn retries(&self) -> u32 {
        self.policy.retries.unwrap_or_else(|| self.inner.retries())
    }

    /// Number of implementation calls made by the latest `check_status`.
    pub fn last_attempts(&self) -> u32 { self.last_attempts }
}

impl<P: RetryingProbe> Probe for Retry<P> {
    fn identifier(&self) -> String {
        self.inner.identifier()
    }

    fn check_status(&mut self, ctx: &CheckContext<'_>) -> ProbeResult {
        let retries = self.retries();
        let mut attempts = 0u32;
        self.last_attempts = 0;

        while attempts < retries {
            self.last_attempts = self.last_attempts.saturating_add(1);
            let outcome = self.inner.check_status_implementation(ctx);
            let err = match outcome.map_err(ProbeError::classify) {
                Ok(()) => return Ok(()),
                Err(err) if err.kind().is_some_and(|k| k.is_classified()) => return Err(err),
                Err(err) => err,
            };

            let kv = serde_json::json!({ "attempt": attempts, "error": format!("{err:?}") });
            ctx.warn(err.to_string(), kv);
            attempts += 1;

            let delay = self.policy.delay(attempts);
            if attempts < retries && !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }

        Err(ProbeError::Check(HealthCheckError::unavailable(EXHAUSTED_MESSAGE)))
    }
}

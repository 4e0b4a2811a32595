use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::{DeliveryConfig, RetryConfig};
use crate::models::BackoffState;
use crate::utils::error::FetchError;

/// Exponential backoff with additive jitter.
///
/// The non-jittered delay for `attempt` is `base * 2^min(attempt, max_exponent)`;
/// the sampled delay adds a uniform value in `[0, jitter_max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max_exponent: u32,
    pub jitter_max: Duration,
    pub max_attempts: u32,
}

/// Why a fetch gave up within the current cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryFailure {
    /// Permanent classification; no retry was attempted.
    Aborted(FetchError),
    /// Retryable errors used up every attempt this cycle.
    Exhausted { attempts: u32, last: FetchError },
    /// Shutdown was requested during a backoff sleep.
    Cancelled,
}

impl std::fmt::Display for RetryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryFailure::Aborted(e) => write!(f, "aborted: {}", e),
            RetryFailure::Exhausted { attempts, last } => {
                write!(f, "gave up after {} attempts: {}", attempts, last)
            }
            RetryFailure::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_delay_ms),
            max_exponent: config.max_exponent,
            jitter_max: Duration::from_millis(config.jitter_max_ms),
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Delivery uses the same shape; `max_attempts` counts the first try too.
    pub fn for_delivery(config: &DeliveryConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_delay_ms),
            max_exponent: config.max_exponent,
            jitter_max: Duration::from_millis(config.jitter_max_ms),
            max_attempts: config.max_retries + 1,
        }
    }

    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(self.max_exponent).min(31);
        self.base.saturating_mul(1u32 << exponent)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter_ms = self.jitter_max.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        let jitter = rand::rng().random_range(0..=jitter_ms);
        base.saturating_add(Duration::from_millis(jitter))
    }

    /// Longest single sleep the policy will take, `Retry-After` included.
    pub fn max_delay(&self) -> Duration {
        self.base_delay(self.max_exponent).saturating_add(self.jitter_max)
    }

    /// Sampled delays for attempts 0, 1, 2, ... limited to the retry budget.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        let policy = self.clone();
        (0..self.max_attempts.saturating_sub(1)).map(move |attempt| policy.delay(attempt))
    }

    /// Run `op` until it succeeds, fails permanently, runs out of attempts for
    /// this cycle, or `cancel` fires during a backoff sleep.
    ///
    /// `state` outlives the cycle: `attempt` keeps climbing across cycles while
    /// the target stays unhealthy and resets on the first success.
    pub async fn run<T, F, Fut>(
        &self,
        target: &str,
        state: &mut BackoffState,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempts_this_cycle = 0;

        loop {
            attempts_this_cycle += 1;
            let error = match op().await {
                Ok(value) => {
                    if state.consecutive_failures > 0 {
                        tracing::info!(
                            "{} recovered after {} consecutive failures",
                            target,
                            state.consecutive_failures
                        );
                    }
                    state.reset();
                    return Ok(value);
                }
                Err(e) => e,
            };

            state.consecutive_failures += 1;

            if !error.is_retryable() {
                tracing::warn!("{}: {} (not retrying)", target, error);
                return Err(RetryFailure::Aborted(error));
            }

            let mut delay = self.delay(state.attempt);
            if let FetchError::RateLimited {
                retry_after: Some(retry_after),
                ..
            } = &error
            {
                delay = delay.max((*retry_after).min(self.max_delay()));
            }
            state.attempt = state.attempt.saturating_add(1);

            if attempts_this_cycle >= self.max_attempts {
                tracing::warn!(
                    "{}: {} after {} attempts this cycle ({} consecutive failures)",
                    target,
                    error,
                    attempts_this_cycle,
                    state.consecutive_failures
                );
                return Err(RetryFailure::Exhausted {
                    attempts: attempts_this_cycle,
                    last: error,
                });
            }

            tracing::warn!(
                "{}: {}; backing off {:.1}s (attempt {}, {} consecutive failures)",
                target,
                error,
                delay.as_secs_f64(),
                state.attempt,
                state.consecutive_failures
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(RetryFailure::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

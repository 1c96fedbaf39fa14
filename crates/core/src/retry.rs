//! Bounded exponential-backoff retry policy.
//!
//! Endpoint resolution, store connect and worker reconnect all retry
//! through [`RetryPolicy`] instead of rolling their own sleep loops.
//! The event relay is the exception: it re-subscribes after a fixed
//! delay for as long as the process runs.

use std::future::Future;
use std::time::Duration;

/// Tunable parameters for a bounded retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Never zero.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Budget used when a process establishes its store connection at
    /// start-up: 10 attempts, 5 s doubling up to 60 s.
    pub fn startup() -> Self {
        Self::new(10, Duration::from_secs(5), Duration::from_secs(60))
    }

    /// Smaller budget for a worker that must not stall a job for long.
    pub fn worker() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(4))
    }

    /// Constant-delay policy (base equals cap), e.g. a fixed re-subscribe wait.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, delay, delay)
    }

    /// Backoff delay to wait after failed attempt number `attempt` (1-based):
    /// `base × 2^(attempt−1)`, clamped to `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::startup()
    }
}

/// Run `op` until it succeeds or the policy's attempts are exhausted.
///
/// `op` receives the 1-based attempt number. Sleeps between attempts but
/// never after the last one. Returns the last error on exhaustion.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(label, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt >= policy.max_attempts => {
                tracing::warn!(
                    label,
                    attempts = attempt,
                    error = %e,
                    "Retry budget exhausted",
                );
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, backing off",
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

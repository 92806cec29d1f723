//! Retry policy engine
//!
//! Wraps a remote call and retries it with exponential backoff while the
//! injected classifier says the failure is transient. Permanent and not-found
//! failures return on first occurrence. The sleep between attempts goes
//! through a [`Sleeper`] so callers can substitute their own clock.

use super::error::ErrorClass;
use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
#[cfg(test)]
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default number of attempts, including the first one
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Delay before the first retry
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Upper bound for any single delay
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Backoff schedule and attempt cap
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    fn attempt_cap(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Source of wall-clock delay between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real delay on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Fake clock that records requested delays and returns immediately
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

#[cfg(test)]
impl RecordingSleeper {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}

/// Last failure of a retried operation
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure<E> {
    pub error: E,
    pub class: ErrorClass,
    pub attempts: u32,
}

/// Retry engine: a policy plus a clock
#[derive(Debug, Clone, Default)]
pub struct Retrier<S = TokioSleeper> {
    policy: RetryPolicy,
    sleeper: S,
}

impl Retrier<TokioSleeper> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: TokioSleeper,
        }
    }
}

impl<S: Sleeper> Retrier<S> {
    pub fn with_sleeper(policy: RetryPolicy, sleeper: S) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `call` until it succeeds, fails non-transiently, or the attempt cap is hit.
    ///
    /// The returned failure always carries the error of the final attempt.
    pub async fn run<T, E, F, Fut, C>(
        &self,
        operation: &str,
        classify: C,
        mut call: F,
    ) -> Result<T, RetryFailure<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> ErrorClass,
        E: Display,
    {
        let cap = self.policy.attempt_cap();
        let mut attempt = 1;

        loop {
            let error = match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!("{} succeeded on attempt {}", operation, attempt);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let class = classify(&error);
            if class != ErrorClass::Transient || attempt >= cap {
                if class == ErrorClass::Transient {
                    tracing::warn!("{} giving up after {} attempts: {}", operation, attempt, error);
                }
                return Err(RetryFailure {
                    error,
                    class,
                    attempts: attempt,
                });
            }

            let delay = self.policy.backoff_for(attempt);
            tracing::debug!(
                "{} attempt {}/{} failed ({}), retrying in {:?}",
                operation,
                attempt,
                cap,
                error,
                delay
            );
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}

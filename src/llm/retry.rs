//! Exponential backoff for transient LLM failures
//!
//! The delay doubles each attempt (`base_delay * 2^attempt`, capped at
//! `max_delay`) and is stretched by up to `jitter_factor`. A Retry-After hint
//! from a rate-limit response replaces the computed delay. Non-retryable
//! errors are returned immediately.

use crate::llm::LlmError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry behaviour for one invocation
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = single attempt)
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Extra random stretch of each delay, 0.0 - 1.0
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.25,
        }
    }
}

impl RetryConfig {
    pub fn new(
        max_retries: usize,
        base_delay: Duration,
        max_delay: Duration,
        jitter_factor: f64,
    ) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    /// Default backoff with a custom retry budget
    pub fn with_max_retries(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Backoff before retry `attempt` (0-indexed), without jitter
    pub fn base_backoff(&self, attempt: usize) -> Duration {
        let exp = self
            .base_delay
            .as_millis()
            .saturating_mul(1u128 << attempt.min(32));
        Duration::from_millis(exp.min(self.max_delay.as_millis()) as u64)
    }

    /// Backoff with jitter applied
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        let base = self.base_backoff(attempt);
        if self.jitter_factor <= 0.0 {
            return base;
        }
        let stretch = 1.0 + rand::thread_rng().gen_range(0.0..=self.jitter_factor);
        base.mul_f64(stretch)
    }

    /// Delay before the next attempt, honouring a Retry-After hint
    pub fn delay_for(&self, attempt: usize, err: &LlmError) -> Duration {
        match err {
            LlmError::RateLimited {
                retry_after: Some(hint),
            } => *hint,
            _ => self.calculate_delay(attempt),
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out
pub async fn call_with_retry<F, Fut, T>(mut operation: F, config: &RetryConfig) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_retryable() || attempt >= config.max_retries {
            return Err(err);
        }

        let delay = config.delay_for(attempt, &err);
        tracing::debug!(
            attempt = attempt + 1,
            max_retries = config.max_retries,
            delay = %humantime::format_duration(delay),
            error = %err,
            "Retrying LLM call"
        );
        sleep(delay).await;
        attempt += 1;
    }
}

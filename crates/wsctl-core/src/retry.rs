//! Backoff helpers for operations that fail transiently: waiting on a
//! daemon to come up, probing a port, or racing another process for an
//! advisory file lock.
//!
//! Both an async and a blocking entry point are provided. The async one
//! drives things like `docker info` polling; the blocking one is used by
//! [`crate::state::StateStore`], which has to hold a synchronous file lock
//! across the retry loop.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// How much randomness to mix into a computed backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum JitterStrategy {
    /// Pick uniformly from `[0, delay]`.
    #[default]
    FullJitter,
    /// Pick uniformly from `[delay/2, delay]`.
    EqualJitter,
}

/// Exponential backoff parameters: `base * 2^attempt`, capped at `max`,
/// then jittered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Number of retries after the initial attempt.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            jitter: JitterStrategy::default(),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, jitter: JitterStrategy) -> Self {
        Self { max_attempts, base_delay, max_delay, jitter }
    }

    fn uncapped_delay_ms(&self, attempt: u32) -> u128 {
        self.base_delay.as_millis().saturating_mul(2_u128.pow(attempt))
    }

    /// The backoff delay before retrying `attempt` (0-based), jittered.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let capped = self.uncapped_delay_ms(attempt).min(self.max_delay.as_millis()) as u64;
        self.jitter(Duration::from_millis(capped), fastrand::Rng::new())
    }

    fn jitter(&self, delay: Duration, mut rng: fastrand::Rng) -> Duration {
        let ms = delay.as_millis() as u64;
        let jittered = match self.jitter {
            JitterStrategy::FullJitter => rng.u64(0..=ms),
            JitterStrategy::EqualJitter => {
                let half = ms / 2;
                half + rng.u64(0..=half)
            }
        };
        Duration::from_millis(jittered)
    }

    #[cfg(test)]
    pub fn calculate_delay_seeded(&self, attempt: u32, seed: u64) -> Duration {
        let capped = self.uncapped_delay_ms(attempt).min(self.max_delay.as_millis()) as u64;
        self.jitter(Duration::from_millis(capped), fastrand::Rng::with_seed(seed))
    }

    #[cfg(test)]
    fn jitter_seeded(&self, delay: Duration, seed: u64) -> Duration {
        self.jitter(delay, fastrand::Rng::with_seed(seed))
    }
}

/// Whether a retry loop should try again after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Stop,
}

/// Inspects a failure and decides whether it's worth retrying.
pub type ErrorClassifier<E> = fn(&E) -> RetryDecision;

/// A classifier that treats every error as retryable.
pub fn default_classifier<E>(_error: &E) -> RetryDecision {
    RetryDecision::Retry
}

/// Run `operation` up to `config.max_attempts + 1` times, sleeping between
/// attempts per `config`, until it succeeds or `classify_error` says to
/// give up. Returns the last error once attempts are exhausted.
#[instrument(level = "debug", skip(operation, classify_error))]
pub async fn retry_async<T, E, Fut, Op>(
    config: &RetryConfig,
    operation: Op,
    classify_error: ErrorClassifier<E>,
) -> std::result::Result<T, E>
where
    Op: Fn() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Debug,
{
    let mut last_error = None;
    for attempt in 0..=config.max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                debug!(attempt, ?error, "attempt failed");
                if classify_error(&error) == RetryDecision::Stop {
                    return Err(error);
                }
                if attempt < config.max_attempts {
                    tokio::time::sleep(config.calculate_delay(attempt)).await;
                }
                last_error = Some(error);
            }
        }
    }
    let error = last_error.expect("loop runs at least once");
    warn!(attempts = config.max_attempts + 1, ?error, "giving up after exhausting retries");
    Err(error)
}

/// Blocking counterpart of [`retry_async`] for operations that can't run
/// inside a future, such as acquiring an advisory file lock.
#[instrument(level = "debug", skip(operation, classify_error))]
pub fn retry_sync<T, E, Op>(
    config: &RetryConfig,
    operation: Op,
    classify_error: ErrorClassifier<E>,
) -> std::result::Result<T, E>
where
    Op: Fn() -> std::result::Result<T, E>,
    E: std::fmt::Debug,
{
    let mut last_error = None;
    for attempt in 0..=config.max_attempts {
        match operation() {
            Ok(value) => return Ok(value),
            Err(error) => {
                if classify_error(&error) == RetryDecision::Stop {
                    return Err(error);
                }
                if attempt < config.max_attempts {
                    std::thread::sleep(config.calculate_delay(attempt));
                }
                last_error = Some(error);
            }
        }
    }
    Err(last_error.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn default_config_matches_documented_values() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay, Duration::from_millis(100));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.jitter, JitterStrategy::FullJitter);
    }

    #[test]
    fn new_stores_the_given_fields() {
        let config = RetryConfig::new(5, Duration::from_millis(200), Duration::from_secs(60), JitterStrategy::EqualJitter);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay, Duration::from_millis(200));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert_eq!(config.jitter, JitterStrategy::EqualJitter);
    }

    #[test]
    fn delay_grows_exponentially_before_the_cap() {
        let config = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: JitterStrategy::FullJitter,
        };
        assert!(config.calculate_delay_seeded(0, 1).as_millis() <= 100);
        assert!(config.calculate_delay_seeded(1, 1).as_millis() <= 200);
        assert!(config.calculate_delay_seeded(2, 1).as_millis() <= 400);
    }

    #[test]
    fn delay_is_capped_at_max_delay() {
        let config = RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            jitter: JitterStrategy::FullJitter,
        };
        assert!(config.calculate_delay_seeded(10, 1).as_millis() <= 500);
    }

    #[test]
    fn full_jitter_stays_within_the_delay() {
        let config = RetryConfig {
            max_attempts: 1,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            jitter: JitterStrategy::FullJitter,
        };
        let delay = config.jitter_seeded(Duration::from_millis(1000), 54321);
        assert!(delay.as_millis() <= 1000);
    }

    #[test]
    fn equal_jitter_stays_in_the_upper_half() {
        let config = RetryConfig {
            max_attempts: 1,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            jitter: JitterStrategy::EqualJitter,
        };
        let delay = config.jitter_seeded(Duration::from_millis(1000), 12345);
        assert!(delay.as_millis() >= 500);
        assert!(delay.as_millis() <= 1000);
    }

    #[test]
    fn seeded_delay_is_deterministic() {
        let config = RetryConfig::default();
        assert_eq!(config.calculate_delay_seeded(2, 42), config.calculate_delay_seeded(2, 42));
    }

    #[test]
    fn default_classifier_always_retries() {
        assert_eq!(default_classifier(&"anything"), RetryDecision::Retry);
    }

    #[tokio::test]
    async fn retry_async_returns_immediately_on_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_inner = Arc::clone(&calls);
        let result = retry_async(
            &RetryConfig::default(),
            move || {
                let calls = calls_inner.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<i32, &'static str>(7)
                }
            },
            default_classifier,
        )
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_async_recovers_after_transient_failures() {
        let config = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: JitterStrategy::FullJitter,
        };
        let calls = Arc::new(AtomicU32::new(0));
        let calls_inner = Arc::clone(&calls);
        let result = retry_async(
            &config,
            move || {
                let calls = calls_inner.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 { Err("not yet") } else { Ok(42) }
                }
            },
            default_classifier,
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_async_gives_up_after_max_attempts() {
        let config = RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: JitterStrategy::FullJitter,
        };
        let calls = Arc::new(AtomicU32::new(0));
        let calls_inner = Arc::clone(&calls);
        let result: std::result::Result<i32, &str> = retry_async(
            &config,
            move || {
                let calls = calls_inner.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("down")
                }
            },
            default_classifier,
        )
        .await;
        assert_eq!(result.unwrap_err(), "down");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_async_stops_immediately_on_terminal_error() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: JitterStrategy::FullJitter,
        };
        let calls = Arc::new(AtomicU32::new(0));
        let calls_inner = Arc::clone(&calls);
        let classify = |error: &i32| if *error == 404 { RetryDecision::Stop } else { RetryDecision::Retry };
        let result = retry_async(
            &config,
            move || {
                let calls = calls_inner.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, i32>(404)
                }
            },
            classify,
        )
        .await;
        assert_eq!(result.unwrap_err(), 404);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retry_sync_recovers_after_transient_failures() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: JitterStrategy::FullJitter,
        };
        let attempts = AtomicU32::new(0);
        let result: std::result::Result<i32, &str> = retry_sync(
            &config,
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err("locked") } else { Ok(42) }
            },
            default_classifier,
        );
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = RetryConfig::new(5, Duration::from_millis(250), Duration::from_secs(45), JitterStrategy::EqualJitter);
        let json = serde_json::to_string(&config).unwrap();
        let back: RetryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_attempts, 5);
        assert_eq!(back.base_delay, Duration::from_millis(250));
        assert_eq!(back.max_delay, Duration::from_secs(45));
        assert_eq!(back.jitter, JitterStrategy::EqualJitter);
    }
}

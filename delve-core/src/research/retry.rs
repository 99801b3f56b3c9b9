//! Generic retry combinator with an explicit exponential backoff schedule.
//!
//! Attempts of one operation are strictly sequential. The delay between
//! attempt `n` and `n + 1` is `initial * multiplier^n`, capped at `max`.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffSchedule {
    initial: Duration,
    multiplier: f64,
    max: Duration,
}

impl BackoffSchedule {
    pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            initial,
            multiplier: multiplier.max(1.0),
            max,
        }
    }

    /// Base 1s, doubling: 1s, 2s, 4s, ...
    pub fn exponential_seconds() -> Self {
        Self::new(Duration::from_secs(1), 2.0, Duration::from_secs(30))
    }

    /// No delay between attempts.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, 1.0, Duration::ZERO)
    }

    /// Delay to wait after failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::exponential_seconds()
    }
}

/// The final result of a retried operation plus how many attempts it took.
#[derive(Debug)]
pub struct Retried<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Run `operation` up to `max_retries + 1` times, sleeping per `schedule`
/// between failures. The operation receives the 0-based attempt number.
pub async fn with_retry<F, Fut, T, E>(
    schedule: &BackoffSchedule,
    max_retries: u32,
    mut operation: F,
) -> Retried<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                return Retried {
                    result: Ok(value),
                    attempts: attempt + 1,
                };
            }
            Err(e) => {
                if attempt >= max_retries {
                    return Retried {
                        result: Err(e),
                        attempts: attempt + 1,
                    };
                }

                let backoff = schedule.delay_for(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = max_retries + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Retrying after failed attempt"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_exponential() {
        let schedule = BackoffSchedule::exponential_seconds();
        assert_eq!(schedule.delay_for(0), Duration::from_secs(1));
        assert_eq!(schedule.delay_for(1), Duration::from_secs(2));
        assert_eq!(schedule.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_respects_cap() {
        let schedule =
            BackoffSchedule::new(Duration::from_secs(1), 2.0, Duration::from_secs(3));
        assert_eq!(schedule.delay_for(1), Duration::from_secs(2));
        assert_eq!(schedule.delay_for(2), Duration::from_secs(3)); // capped
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_retries_with_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let retried: Retried<(), String> =
            with_retry(&BackoffSchedule::exponential_seconds(), 2, |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("unreachable".to_string())
                }
            })
            .await;

        assert!(retried.result.is_err());
        assert_eq!(retried.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second, none after the last
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_second_attempt() {
        let retried: Retried<u32, String> =
            with_retry(&BackoffSchedule::exponential_seconds(), 2, |attempt| async move {
                if attempt == 0 {
                    Err("flaky".to_string())
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(retried.result.unwrap(), 1);
        assert_eq!(retried.attempts, 2);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let retried: Retried<(), &str> =
            with_retry(&BackoffSchedule::immediate(), 0, |_| async { Err("nope") }).await;
        assert_eq!(retried.attempts, 1);
    }
}

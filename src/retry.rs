//! Polling discipline shared by confirmation, table fetch and record fetch
//!
//! Every read-after-write wait in the flow goes through [`poll_until`]:
//! exponential backoff with jitter, an optional attempt budget, an optional
//! wall-clock deadline, and a cancellation token. "Not visible yet" and
//! transient RPC errors keep the loop going; anything else ends it.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::rpc::RpcError;

/// Errors that know whether another attempt may succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for RpcError {
    fn is_retryable(&self) -> bool {
        RpcError::is_retryable(self)
    }
}

/// Backoff configuration with jitter
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
    /// Attempt budget including the first attempt; `None` means unbounded
    pub max_attempts: Option<u32>,
    /// Wall-clock budget measured from the first attempt
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(8000),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: Some(30),
            deadline: Some(Duration::from_secs(90)),
        }
    }
}

impl PollPolicy {
    /// Fixed spacing, no jitter; mostly useful in tests
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts: Some(max_attempts),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay after the given 0-indexed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64;
        let exp = base * self.multiplier.max(1.0).powi(attempt.min(32) as i32);
        let capped = exp.min(self.max_delay.as_millis() as f64);

        let jitter_range = capped * self.jitter_factor.clamp(0.0, 1.0);
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

/// Why a poll loop stopped without a value
#[derive(Debug, Error)]
pub enum PollError<E> {
    #[error("gave up after {attempts} attempts ({elapsed:?})")]
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        last_error: Option<E>,
    },

    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },

    #[error("non-retryable error: {0}")]
    Fatal(E),
}

/// Poll `operation` until it yields `Some`, a non-retryable error, the
/// budget runs out, or `cancel` fires.
///
/// `operation` receives the 0-indexed attempt number.
pub async fn poll_until<T, E, F, Fut>(
    operation_name: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, PollError<E>>
where
    E: Retryable + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let start = Instant::now();
    let mut last_error = None;
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled { attempts: attempt });
        }

        match operation(attempt).await {
            Ok(Some(value)) => {
                if attempt > 0 {
                    debug!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "became visible after polling"
                    );
                }
                return Ok(value);
            }
            Ok(None) => {
                debug!(operation = operation_name, attempt = attempt + 1, "not visible yet");
            }
            Err(err) if err.is_retryable() => {
                debug!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    error = %err,
                    "transient error while polling"
                );
                last_error = Some(err);
            }
            Err(err) => {
                warn!(operation = operation_name, error = %err, "permanent error, not retrying");
                return Err(PollError::Fatal(err));
            }
        }

        attempt += 1;
        let elapsed = start.elapsed();

        let out_of_attempts = policy.max_attempts.is_some_and(|max| attempt >= max);
        let past_deadline = policy.deadline.is_some_and(|d| elapsed >= d);
        if out_of_attempts || past_deadline {
            warn!(
                operation = operation_name,
                attempts = attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                "polling budget exhausted"
            );
            return Err(PollError::Exhausted {
                attempts: attempt,
                elapsed,
                last_error,
            });
        }

        let mut delay = policy.delay_for(attempt - 1);
        if let Some(deadline) = policy.deadline {
            delay = delay.min(deadline.saturating_sub(elapsed));
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(PollError::Cancelled { attempts: attempt });
            }
            _ = sleep(delay) => {}
        }
    }
}

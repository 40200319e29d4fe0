//! Bounded retry with exponential backoff around a [`Connector`].
//!
//! ```text
//! attempt 1 ── transient ──► sleep d      ──► attempt 2
//! attempt 2 ── transient ──► sleep d*1.5  ──► attempt 3
//! attempt N ── transient ──► Exhausted(last error)
//! any       ── fatal     ──► Fatal(error)   (no retry)
//! ```
//!
//! The delay grows by [`BACKOFF_FACTOR`] per attempt and is capped at
//! [`MAX_BACKOFF`].

use std::fmt;
use std::thread;
use std::time::Duration;

use scopeguard::ScopeGuard;

use crate::connector::{ConnectionHandle, Connector};
use crate::constants::{BACKOFF_FACTOR, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, MAX_BACKOFF};
use crate::endpoint::Endpoint;
use crate::error::{ConnectionError, TransportError};

use super::teardown::safe_close;

/// One failed attempt, kept only long enough to log it.
#[derive(Debug)]
pub struct RetryAttempt<'a> {
    /// 1-based attempt number.
    pub index: u32,
    /// Delay before the next attempt (zero on the last one).
    pub delay: Duration,
    /// What went wrong.
    pub error: &'a TransportError,
}

impl fmt::Display for RetryAttempt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt {} failed: {}", self.index, self.error)?;
        if !self.delay.is_zero() {
            write!(f, "; retrying in {:?}", self.delay)?;
        }
        Ok(())
    }
}

/// Attempt budget and backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total connect attempts, including the first. Zero behaves as one.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Growth factor per failure.
    pub multiplier: f64,
    /// Ceiling on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_RETRY_DELAY,
            multiplier: BACKOFF_FACTOR,
            max_delay: MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Policy with `max_attempts` attempts starting at `initial_delay`.
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            ..Self::default()
        }
    }

    /// Override the delay ceiling.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay to sleep after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_secs_f64() * 1000.0;
        let backoff = base_ms * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = backoff.min(self.max_delay.as_secs_f64() * 1000.0);
        Duration::from_millis(capped as u64)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Open a ready handle to `endpoint`, retrying transient failures.
    ///
    /// Each attempt is `connect` followed by `ensure_ready`. A handle whose
    /// readiness check failed is closed before the next attempt.
    pub fn connect<C: Connector>(
        &self,
        connector: &C,
        endpoint: &Endpoint,
    ) -> Result<C::Handle, ConnectionError> {
        let attempts = self.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match try_once(connector, endpoint) {
                Ok(handle) => {
                    if attempt > 1 {
                        log::info!("[retry] connected to {endpoint} on attempt {attempt}");
                    }
                    return Ok(handle);
                }
                Err(e) => e,
            };

            if !error.is_transient() {
                log::warn!("[retry] {endpoint}: fatal connect error, not retrying: {error}");
                return Err(ConnectionError::Fatal(error));
            }

            let delay = if attempt < attempts {
                self.delay_for(attempt)
            } else {
                Duration::ZERO
            };
            let record = RetryAttempt {
                index: attempt,
                delay,
                error: &error,
            };
            log::warn!("[retry] {endpoint} ({attempt}/{attempts}): {record}");

            if attempt >= attempts {
                return Err(ConnectionError::Exhausted {
                    attempts: attempt,
                    source: error,
                });
            }
            thread::sleep(delay);
        }
    }
}

/// One connect plus readiness check. The handle is torn down if the check
/// fails, whether by error or panic.
fn try_once<C: Connector>(connector: &C, endpoint: &Endpoint) -> Result<C::Handle, TransportError> {
    let handle = connector.connect(endpoint)?;
    let mut guard = scopeguard::guard(handle, |mut h| safe_close(Some(&mut h)));
    guard.ensure_ready()?;
    Ok(ScopeGuard::into_inner(guard))
}

//! Quiet period between a connection close and the next connect.

use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::constants::DEFAULT_COOLDOWN;

/// Tracks the last teardown and enforces a minimum gap before reconnecting.
#[derive(Debug)]
pub struct CooldownTimer {
    min_quiet: Duration,
    last_close: Mutex<Option<Instant>>,
}

impl Default for CooldownTimer {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl CooldownTimer {
    /// Timer enforcing `min_quiet` between a close and the next connect.
    pub fn new(min_quiet: Duration) -> Self {
        Self {
            min_quiet,
            last_close: Mutex::new(None),
        }
    }

    /// Configured quiet period.
    pub fn min_quiet(&self) -> Duration {
        self.min_quiet
    }

    /// Time left before a connect is allowed. Zero if never closed.
    pub fn remaining(&self) -> Duration {
        let last = *self.last_close.lock().unwrap_or_else(PoisonError::into_inner);
        match last {
            Some(at) => self.min_quiet.saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Sleep out whatever is left of the quiet period.
    ///
    /// Returns how long the caller slept.
    pub fn wait_for_cooldown(&self) -> Duration {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            log::debug!("[cooldown] waiting {remaining:?} for the daemon to free its slot");
            thread::sleep(remaining);
        }
        remaining
    }

    /// Stamp a teardown as happening now.
    pub fn record_close(&self) {
        *self.last_close.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    /// When the last teardown happened, if ever.
    pub fn last_close(&self) -> Option<Instant> {
        *self.last_close.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

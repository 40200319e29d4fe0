//! Single-client connection broker.
//!
//! # Purpose
//!
//! The mesh daemon accepts exactly one live API client. Every caller in the
//! process that wants to talk to it goes through one [`Broker`] per endpoint,
//! which hands out at most one [`Session`] at a time.
//!
//! # Session lifecycle
//!
//! ```text
//! IDLE ──► LOCK_WAIT ──► COOLDOWN_WAIT ──► CONNECTING ──► ACTIVE ──► CLOSING ──► IDLE
//!             │                                │                        ▲
//!             └── LockTimeout (no teardown)    └── Fatal / Exhausted ───┘
//! ```
//!
//! CLOSING runs on every exit path once the lock is held, including a panic
//! in the caller's body: the handle (if any) goes through
//! [`teardown::safe_close`], the cooldown timer is stamped, and the lock is
//! released, in that order.
//!
//! # Ownership
//!
//! A broker is constructed explicitly and passed by reference (or `Arc`) to
//! whatever needs daemon access. [`registry::BrokerRegistry`] keeps one
//! broker per endpoint when several endpoints are in play.

// Rust guideline compliant 2026-02

pub mod cooldown;
pub mod lock;
pub mod registry;
pub mod retry;
pub mod teardown;

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use scopeguard::ScopeGuard;

use crate::connector::{ConnectionHandle, Connector};
use crate::constants::{DEFAULT_LOCK_TIMEOUT, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, MAX_BACKOFF};
use crate::endpoint::Endpoint;
use crate::error::ConnectionError;

pub use cooldown::CooldownTimer;
pub use lock::{AccessGuard, AccessLock};
pub use registry::BrokerRegistry;
pub use retry::RetryPolicy;
pub use teardown::safe_close;

// ─── Options ───────────────────────────────────────────────────────────────

/// Per-session knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Connect attempts before giving up.
    pub max_retries: u32,
    /// Delay after the first failed attempt; grows 1.5x per failure.
    pub retry_delay: Duration,
    /// How long to wait for another session to finish.
    pub lock_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl SessionOptions {
    /// Override the attempt budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the initial retry delay.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Override the lock wait.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }
}

// ─── Phases ────────────────────────────────────────────────────────────────

/// Where a session invocation currently is. Used for trace logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No session in progress.
    Idle,
    /// Waiting for the access lock.
    LockWait,
    /// Sleeping out the post-close quiet period.
    CooldownWait,
    /// Inside the retry loop.
    Connecting,
    /// Handle handed to the caller.
    Active,
    /// Tearing down.
    Closing,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "IDLE",
            Self::LockWait => "LOCK_WAIT",
            Self::CooldownWait => "COOLDOWN_WAIT",
            Self::Connecting => "CONNECTING",
            Self::Active => "ACTIVE",
            Self::Closing => "CLOSING",
        })
    }
}

fn enter(endpoint: &Endpoint, phase: SessionPhase) {
    log::trace!("[broker] {endpoint}: {phase}");
}

// ─── Broker ────────────────────────────────────────────────────────────────

/// Serializes all access to one daemon endpoint.
pub struct Broker<C: Connector> {
    endpoint: Endpoint,
    connector: C,
    lock: AccessLock,
    cooldown: CooldownTimer,
    max_backoff: Duration,
    defaults: SessionOptions,
}

impl<C: Connector> fmt::Debug for Broker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("endpoint", &self.endpoint)
            .field("locked", &self.lock.is_held())
            .field("cooldown", &self.cooldown.min_quiet())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Broker<C> {
    /// Broker for `endpoint` with default cooldown and session options.
    pub fn new(endpoint: Endpoint, connector: C) -> Self {
        Self {
            endpoint,
            connector,
            lock: AccessLock::new(),
            cooldown: CooldownTimer::default(),
            max_backoff: MAX_BACKOFF,
            defaults: SessionOptions::default(),
        }
    }

    /// Override the post-close quiet period.
    pub fn with_cooldown(mut self, min_quiet: Duration) -> Self {
        self.cooldown = CooldownTimer::new(min_quiet);
        self
    }

    /// Override the retry delay ceiling.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Options used by the high-level operations.
    pub fn with_session_options(mut self, options: SessionOptions) -> Self {
        self.defaults = options;
        self
    }

    /// Target endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The access lock guarding this endpoint.
    pub fn lock(&self) -> &AccessLock {
        &self.lock
    }

    /// The cooldown timer for this endpoint.
    pub fn cooldown(&self) -> &CooldownTimer {
        &self.cooldown
    }

    /// Default session options.
    pub fn session_options(&self) -> &SessionOptions {
        &self.defaults
    }

    /// Underlying connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn retry_policy(&self, options: &SessionOptions) -> RetryPolicy {
        RetryPolicy::new(options.max_retries, options.retry_delay).with_max_delay(self.max_backoff)
    }

    /// Acquire the endpoint and open a ready connection.
    ///
    /// The returned [`Session`] dereferences to the live handle and tears it
    /// down when dropped.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::LockTimeout`] if another session is still active
    ///   after `options.lock_timeout`.
    /// - [`ConnectionError::Fatal`] / [`ConnectionError::Exhausted`] from the
    ///   retry loop. The lock is released and the cooldown stamped before
    ///   these return.
    pub fn session(&self, options: &SessionOptions) -> Result<Session<'_, C::Handle>, ConnectionError> {
        enter(&self.endpoint, SessionPhase::LockWait);
        let guard = self
            .lock
            .lock_for(options.lock_timeout)
            .ok_or_else(|| {
                log::warn!(
                    "[broker] {}: lock not acquired within {:?}; another operation in progress",
                    self.endpoint,
                    options.lock_timeout
                );
                ConnectionError::LockTimeout {
                    endpoint: self.endpoint.clone(),
                    waited: options.lock_timeout,
                }
            })?;

        // Until a handle exists, a failed or panicking connect still counts
        // as a teardown for cooldown purposes. Dropping the guard releases
        // the lock afterwards.
        let pending = scopeguard::guard(guard, |_guard| {
            enter(&self.endpoint, SessionPhase::Closing);
            self.cooldown.record_close();
            enter(&self.endpoint, SessionPhase::Idle);
        });

        enter(&self.endpoint, SessionPhase::CooldownWait);
        self.cooldown.wait_for_cooldown();

        enter(&self.endpoint, SessionPhase::Connecting);
        let handle = self.retry_policy(options).connect(&self.connector, &self.endpoint)?;

        enter(&self.endpoint, SessionPhase::Active);
        Ok(Session {
            handle,
            endpoint: &self.endpoint,
            cooldown: &self.cooldown,
            _lock: ScopeGuard::into_inner(pending),
        })
    }

    /// Run `body` with a live handle, tearing down afterwards on every path.
    ///
    /// A panic inside `body` still closes the handle, stamps the cooldown
    /// and releases the lock before it propagates.
    pub fn with_connection<T, F>(&self, options: &SessionOptions, body: F) -> Result<T, ConnectionError>
    where
        F: FnOnce(&mut C::Handle) -> Result<T, ConnectionError>,
    {
        let mut session = self.session(options)?;
        body(&mut *session)
    }
}

// ─── Session ───────────────────────────────────────────────────────────────

/// An active, exclusive connection to the daemon.
///
/// Dereferences to the handle. Dropping it runs safe teardown, stamps the
/// cooldown timer, then releases the access lock.
pub struct Session<'a, H: ConnectionHandle> {
    handle: H,
    endpoint: &'a Endpoint,
    cooldown: &'a CooldownTimer,
    // Declared last so the lock is released after teardown completes.
    _lock: AccessGuard<'a>,
}

impl<H: ConnectionHandle> fmt::Debug for Session<'_, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", self.endpoint)
            .finish_non_exhaustive()
    }
}

impl<H: ConnectionHandle> Deref for Session<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.handle
    }
}

impl<H: ConnectionHandle> DerefMut for Session<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        &mut self.handle
    }
}

impl<H: ConnectionHandle> Drop for Session<'_, H> {
    fn drop(&mut self) {
        enter(self.endpoint, SessionPhase::Closing);
        safe_close(Some(&mut self.handle));
        self.cooldown.record_close();
        enter(self.endpoint, SessionPhase::Idle);
    }
}

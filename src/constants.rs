//! Application-wide constants for meshlink.
//!
//! Centralizes the defaults the broker and CLI fall back to when neither the
//! config file nor the environment overrides them.
//!
//! # Categories
//!
//! - **Endpoint**: where the daemon listens
//! - **Session**: lock, cooldown and retry defaults
//! - **Transport**: socket timeouts
//! - **Protocol**: payload limits

use std::time::Duration;

// ============================================================================
// Endpoint
// ============================================================================

/// Host the daemon is expected on when nothing else is configured.
pub const DEFAULT_HOST: &str = "localhost";

/// TCP port the mesh daemon serves its single API client on.
pub const DEFAULT_PORT: u16 = 4403;

// ============================================================================
// Session
// ============================================================================

/// Minimum quiet period between a connection close and the next connect.
///
/// The daemon needs a short window to free its client slot after a
/// disconnect; reconnecting inside it tends to be reset or refused.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(500);

/// How long a session waits for another session to finish.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect attempts per session before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay before the second connect attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Backoff multiplier applied to the retry delay after each failure (1.5x).
pub const BACKOFF_FACTOR: f64 = 1.5;

/// Ceiling for the retry delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

// ============================================================================
// Transport
// ============================================================================

/// Per-address TCP connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Read/write timeout applied to every daemon socket.
pub const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for the lock-free reachability probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Protocol
// ============================================================================

/// Largest text message the daemon will accept, in bytes.
pub const MAX_TEXT_BYTES: usize = 228;

/// Client name sent in the session handshake.
pub const CLIENT_NAME: &str = concat!("meshlink/", env!("CARGO_PKG_VERSION"));

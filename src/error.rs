//! Broker error taxonomy.
//!
//! [`TransportError`] describes one failed transport action and knows whether
//! retrying can help. [`ConnectionError`] is what the broker surfaces to its
//! callers; the high-level operations in [`crate::client`] are the only place
//! it is turned into a safe default.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::endpoint::Endpoint;

/// Failure of a single connect, request or close on the daemon transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// OS-level socket failure: reset, broken pipe, refused, resolution, timeout.
    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    /// The client side lacks a capability needed to talk to the daemon.
    #[error("client unavailable: {0}")]
    Unavailable(String),

    /// The daemon explicitly refused the client.
    #[error("refused by daemon: {0}")]
    Refused(String),

    /// Malformed or unexpected data on the wire.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Whether a fresh attempt may succeed where this one failed.
    ///
    /// Every OS socket error counts (reset-by-peer, broken pipe, refused while
    /// the daemon frees its slot). Missing capabilities, explicit refusals and
    /// protocol violations do not improve with retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Whether this error means the peer already tore the channel down.
    ///
    /// Used by teardown to tell an expected close failure from a real defect.
    pub fn is_peer_gone(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::UnexpectedEof
            ) || e.raw_os_error().is_some(),
            _ => false,
        }
    }
}

/// Error surfaced by [`crate::broker::Broker`] sessions.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Another session held the access lock for longer than the lock timeout.
    #[error("another operation in progress on {endpoint} (waited {waited:?})")]
    LockTimeout {
        /// Endpoint whose lock could not be taken.
        endpoint: Endpoint,
        /// How long the caller waited.
        waited: Duration,
    },

    /// Every connect attempt failed transiently.
    #[error("gave up after {attempts} connect attempts: {source}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Last error observed.
        #[source]
        source: TransportError,
    },

    /// Connect failed in a way retrying cannot fix.
    #[error("connection failed: {0}")]
    Fatal(#[source] TransportError),

    /// The operation body failed while the session was active.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Caller input rejected before any network I/O.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ConnectionError {
    /// Whether this is lock contention rather than a transport failure.
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}

//! Connection factory: the single-attempt primitive that opens a daemon
//! connection.
//!
//! No retry logic lives here. [`crate::broker::retry::RetryPolicy`] wraps a
//! [`Connector`] and decides what to do when an attempt fails.
//!
//! # Seams
//!
//! ```text
//! Broker ──RetryPolicy──► Connector::connect(endpoint) ──► Handle
//!                                                          │ ensure_ready()
//!                                                          │ request(..)*
//!                                                          ▼ close()
//! ```
//!
//! [`TcpConnector`] is the production implementation. Tests plug in
//! closures through the blanket impl.

pub mod tcp;

use std::io;
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::endpoint::Endpoint;
use crate::error::TransportError;
use crate::protocol::{Request, Response};

pub use tcp::{TcpConnector, TcpHandle};

/// A live, exclusively owned daemon session.
///
/// Handles are created by a [`Connector`], used inside one broker session,
/// and closed exactly once by teardown. They never leave that session.
pub trait ConnectionHandle: Send {
    /// Confirm the daemon accepted this client.
    ///
    /// Called by the retry policy right after `connect`. A failure here still
    /// leaves a handle that must be closed before the next attempt.
    fn ensure_ready(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Perform one request/response round trip.
    fn request(&mut self, request: &Request) -> Result<Response, TransportError>;

    /// Close the handle. Errors here are absorbed by teardown.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens connections to a daemon endpoint, one attempt per call.
pub trait Connector: Send + Sync {
    /// Handle type produced by this connector.
    type Handle: ConnectionHandle;

    /// Make one connection attempt.
    fn connect(&self, endpoint: &Endpoint) -> Result<Self::Handle, TransportError>;

    /// Lightweight reachability check that does not claim the client slot.
    fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> bool {
        tcp_reachable(endpoint, timeout)
    }
}

impl<F, H> Connector for F
where
    F: Fn(&Endpoint) -> Result<H, TransportError> + Send + Sync,
    H: ConnectionHandle,
{
    type Handle = H;

    fn connect(&self, endpoint: &Endpoint) -> Result<H, TransportError> {
        self(endpoint)
    }
}

/// Resolve `endpoint` to socket addresses within `timeout`.
///
/// IP literals resolve inline. Names are looked up on a helper thread; if it
/// has not answered by `timeout` the lookup is abandoned and a `TimedOut`
/// I/O error is returned, so a stalled resolver cannot hold the access lock.
pub fn resolve(endpoint: &Endpoint, timeout: Duration) -> Result<Vec<SocketAddr>, TransportError> {
    if let Ok(ip) = endpoint.host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, endpoint.port)]);
    }
    let target = (endpoint.host.clone(), endpoint.port);
    resolve_within(timeout, move || target.to_socket_addrs().map(Iterator::collect))
}

fn resolve_within<F>(timeout: Duration, lookup: F) -> Result<Vec<SocketAddr>, TransportError>
where
    F: FnOnce() -> io::Result<Vec<SocketAddr>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("meshlink-resolve".to_owned())
        .spawn(move || {
            // The receiver is gone if the caller already timed out.
            let _ = tx.send(lookup());
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => Ok(result?),
        Err(RecvTimeoutError::Timeout) => Err(TransportError::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("name lookup did not finish within {timeout:?}"),
        ))),
        Err(RecvTimeoutError::Disconnected) => Err(TransportError::Io(io::Error::new(
            io::ErrorKind::Other,
            "name lookup thread exited without a result",
        ))),
    }
}

/// True if any resolved address for `endpoint` accepts a TCP connection
/// within `timeout`. The socket is dropped immediately.
pub fn tcp_reachable(endpoint: &Endpoint, timeout: Duration) -> bool {
    let addrs = match resolve(endpoint, timeout) {
        Ok(addrs) => addrs,
        Err(e) => {
            log::debug!("[probe] cannot resolve {endpoint}: {e}");
            return false;
        }
    };
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => return true,
            Err(e) => log::debug!("[probe] {addr} unreachable: {e}"),
        }
    }
    false
}

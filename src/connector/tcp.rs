//! TCP connector for the daemon's API socket.
//!
//! Operates in **blocking mode** with explicit connect, read and write
//! timeouts so a wedged daemon cannot hold the broker lock forever.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::codec::{encode_frame, FrameDecoder};
use crate::constants::{CLIENT_NAME, CONNECT_TIMEOUT, IO_TIMEOUT};
use crate::endpoint::Endpoint;
use crate::error::TransportError;
use crate::protocol::{decode_body, encode_body, Request, Response};

use super::{resolve, ConnectionHandle, Connector};

/// Opens [`TcpHandle`]s.
///
/// `connect_timeout` bounds name resolution and each per-address connect.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    io_timeout: Duration,
    client_name: String,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            io_timeout: IO_TIMEOUT,
            client_name: CLIENT_NAME.to_string(),
        }
    }
}

impl TcpConnector {
    /// Connector with default timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-address connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Read/write timeout on the established socket.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Name announced in the handshake.
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }
}

impl Connector for TcpConnector {
    type Handle = TcpHandle;

    fn connect(&self, endpoint: &Endpoint) -> Result<TcpHandle, TransportError> {
        let addrs = resolve(endpoint, self.connect_timeout)?;
        if addrs.is_empty() {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{endpoint} resolved to no addresses"),
            )));
        }

        let mut last_err = None;
        for addr in &addrs {
            match TcpStream::connect_timeout(addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.io_timeout))?;
                    stream.set_write_timeout(Some(self.io_timeout))?;
                    stream.set_nodelay(true)?;
                    log::debug!("[tcp] connected to {endpoint} via {addr}");
                    return Ok(TcpHandle::new(stream, self.client_name.clone()));
                }
                Err(e) => {
                    log::debug!("[tcp] connect {addr} failed: {e}");
                    last_err = Some(e);
                }
            }
        }
        Err(TransportError::Io(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "no address connected")
        })))
    }
}

/// Framed request/response session over one TCP stream.
#[derive(Debug)]
pub struct TcpHandle {
    stream: TcpStream,
    decoder: FrameDecoder,
    pending: VecDeque<Vec<u8>>,
    client_name: String,
    closed: bool,
}

impl TcpHandle {
    fn new(stream: TcpStream, client_name: String) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            client_name,
            closed: false,
        }
    }

    /// Whether [`ConnectionHandle::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn send(&mut self, request: &Request) -> Result<(), TransportError> {
        let frame = encode_frame(&encode_body(request)?)?;
        self.stream.write_all(&frame)?;
        Ok(())
    }

    /// Read one complete frame from the socket and decode it.
    fn read_response(&mut self) -> Result<Response, TransportError> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(payload) = self.pending.pop_front() {
                return decode_body(&payload);
            }
            let n = self.stream.read(&mut buf)?;
            if n == 0 {
                return Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "daemon closed connection",
                )));
            }
            self.pending.extend(self.decoder.feed(&buf[..n])?);
        }
    }
}

impl ConnectionHandle for TcpHandle {
    fn ensure_ready(&mut self) -> Result<(), TransportError> {
        let hello = Request::Hello {
            client: self.client_name.clone(),
        };
        match self.request(&hello)? {
            Response::Ready => Ok(()),
            other => Err(TransportError::Protocol(format!(
                "unexpected handshake reply: {}",
                other.kind()
            ))),
        }
    }

    fn request(&mut self, request: &Request) -> Result<Response, TransportError> {
        if self.closed {
            return Err(TransportError::Protocol("handle closed".into()));
        }
        self.send(request)?;
        self.read_response()?.into_result()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Best-effort goodbye so the daemon frees the slot promptly; the
        // shutdown below is what actually releases it.
        let goodbye = self.send(&Request::Disconnect);
        let shutdown = self.stream.shutdown(Shutdown::Both).map_err(TransportError::from);
        goodbye.and(shutdown)
    }
}

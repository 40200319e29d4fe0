//! meshlink - single-client connection broker for a mesh-radio daemon.
//!
//! The daemon serves one API client at a time over TCP. This crate makes it
//! safe to talk to from many threads at once: every caller goes through a
//! [`Broker`], which serializes sessions, waits out a short cooldown between
//! connections, retries transient connect failures with capped backoff, and
//! tears each connection down without ever failing.
//!
//! # Architecture
//!
//! ```text
//! client (get_nodes, send_message, ...)      best-effort, never errors
//!    │
//! broker::Broker::with_connection            ConnectionError boundary
//!    ├── lock::AccessLock                    one session at a time
//!    ├── cooldown::CooldownTimer             quiet period after close
//!    ├── retry::RetryPolicy                  1.5x backoff, capped
//!    └── teardown::safe_close                absorbs close failures
//!    │
//! connector::Connector (TcpConnector)        one attempt, one socket
//!    │
//! codec + protocol                           framed request/response
//! ```
//!
//! # Modules
//!
//! - [`broker`] - lock, cooldown, retry, teardown and scoped sessions
//! - [`client`] - high-level operations with safe defaults
//! - [`connector`] - connection factory trait and TCP implementation
//! - [`codec`] - stream framing
//! - [`protocol`] - request/response bodies and domain types
//! - [`config`] - configuration loading/saving

pub mod broker;
pub mod client;
pub mod codec;
pub mod config;
pub mod connector;
pub mod constants;
pub mod endpoint;
pub mod error;
pub mod protocol;

// Re-export commonly used types
pub use broker::{Broker, BrokerRegistry, Session, SessionOptions};
pub use config::Config;
pub use connector::{ConnectionHandle, Connector, TcpConnector, TcpHandle};
pub use endpoint::Endpoint;
pub use error::{ConnectionError, TransportError};
pub use protocol::{ChannelInfo, ChannelRole, Destination, NodeInfo, RadioInfo};

//! High-level daemon operations for UI and shell callers.
//!
//! Each operation opens exactly one broker session, performs one round trip
//! and returns a plain value. Broker errors stop here: [`best_effort`] is the
//! single place a [`ConnectionError`] becomes a logged warning plus a safe
//! default, so callers never see an error from this layer.
//!
//! | Operation          | Safe default           |
//! |--------------------|------------------------|
//! | `is_available`     | `false`                |
//! | `get_nodes`        | empty `Vec`            |
//! | `get_channels`     | empty `Vec`            |
//! | `get_radio_info`   | `RadioInfo::default()` |
//! | `send_message`     | `false`                |

use std::time::Duration;

use crate::broker::Broker;
use crate::connector::{ConnectionHandle, Connector};
use crate::error::{ConnectionError, TransportError};
use crate::protocol::{validate_text, ChannelInfo, Destination, NodeInfo, RadioInfo, Request, Response};

fn unexpected(op: &str, response: &Response) -> ConnectionError {
    ConnectionError::Transport(TransportError::Protocol(format!(
        "unexpected {} response to {op}",
        response.kind()
    )))
}

/// Collapse an operation result into its value or `default`.
fn best_effort<T>(op: &str, default: T, result: Result<T, ConnectionError>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            log::warn!("[client] {op} failed: {e}");
            default
        }
    }
}

impl<C: Connector> Broker<C> {
    /// Whether the daemon accepts TCP connections at all.
    ///
    /// Bypasses the access lock and does not claim the client slot, so it
    /// may run while a session is active.
    pub fn is_available(&self, timeout: Duration) -> bool {
        self.connector().probe(self.endpoint(), timeout)
    }

    /// Nodes the radio currently knows about.
    pub fn get_nodes(&self) -> Vec<NodeInfo> {
        best_effort("get_nodes", Vec::new(), self.try_get_nodes())
    }

    /// Channel slots configured on the radio.
    pub fn get_channels(&self) -> Vec<ChannelInfo> {
        best_effort("get_channels", Vec::new(), self.try_get_channels())
    }

    /// Identity summary of the local radio; empty if it cannot be reached.
    pub fn get_radio_info(&self) -> RadioInfo {
        best_effort("get_radio_info", RadioInfo::default(), self.try_get_radio_info())
    }

    /// Send `text` to `destination` on the primary channel.
    ///
    /// `destination` is `^all`, `!hexid` or a decimal node number. Malformed
    /// input is rejected without touching the network.
    pub fn send_message(&self, text: &str, destination: &str) -> bool {
        self.send_message_on(text, destination, 0)
    }

    /// Like [`send_message`](Self::send_message) on channel slot `channel`.
    pub fn send_message_on(&self, text: &str, destination: &str, channel: u8) -> bool {
        best_effort(
            "send_message",
            false,
            self.try_send_message(text, destination, channel).map(|packet_id| {
                log::info!("[client] queued packet {packet_id} for {destination}");
                true
            }),
        )
    }

    // ── Fallible forms ──────────────────────────────────────────────────────

    /// [`get_nodes`](Self::get_nodes) without the safe-default conversion.
    pub fn try_get_nodes(&self) -> Result<Vec<NodeInfo>, ConnectionError> {
        self.round_trip("get_nodes", &Request::ListNodes, |resp| match resp {
            Response::Nodes { nodes } => Ok(nodes),
            other => Err(other),
        })
    }

    /// [`get_channels`](Self::get_channels) without the safe-default conversion.
    pub fn try_get_channels(&self) -> Result<Vec<ChannelInfo>, ConnectionError> {
        self.round_trip("get_channels", &Request::ListChannels, |resp| match resp {
            Response::Channels { channels } => Ok(channels),
            other => Err(other),
        })
    }

    /// [`get_radio_info`](Self::get_radio_info) without the safe-default conversion.
    pub fn try_get_radio_info(&self) -> Result<RadioInfo, ConnectionError> {
        self.round_trip("get_radio_info", &Request::RadioInfo, |resp| match resp {
            Response::RadioInfo { info } => Ok(info),
            other => Err(other),
        })
    }

    /// Validate and send a text message; returns the radio's packet id.
    pub fn try_send_message(
        &self,
        text: &str,
        destination: &str,
        channel: u8,
    ) -> Result<u32, ConnectionError> {
        let destination: Destination = destination.parse().map_err(ConnectionError::InvalidInput)?;
        validate_text(text).map_err(ConnectionError::InvalidInput)?;

        let request = Request::SendText {
            text: text.to_string(),
            destination,
            channel,
        };
        self.round_trip("send_message", &request, |resp| match resp {
            Response::Sent { packet_id } => Ok(packet_id),
            other => Err(other),
        })
    }

    /// One session, one request, one response mapped by `extract`.
    fn round_trip<T>(
        &self,
        op: &str,
        request: &Request,
        extract: impl FnOnce(Response) -> Result<T, Response>,
    ) -> Result<T, ConnectionError> {
        self.with_connection(self.session_options(), |handle| {
            let response = handle.request(request)?.into_result()?;
            extract(response).map_err(|other| unexpected(op, &other))
        })
    }
}

//! Request/response bodies carried inside [`crate::codec`] frames.
//!
//! Bodies are JSON objects tagged by `type`. The broker never interprets
//! them; only [`crate::client`] and [`crate::connector::TcpHandle`] do.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::MAX_TEXT_BYTES;
use crate::error::TransportError;

// ── Domain types ────────────────────────────────────────────────────────────

/// A node the radio has heard on the mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Numeric node number.
    pub num: u32,
    /// User id string, conventionally `!` followed by 8 hex digits.
    pub id: String,
    /// Long display name.
    #[serde(default)]
    pub long_name: String,
    /// Up to four character short name.
    #[serde(default)]
    pub short_name: String,
    /// Hardware model name, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hw_model: Option<String>,
    /// Signal-to-noise ratio of the last packet heard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snr: Option<f32>,
    /// Unix timestamp (seconds) the node was last heard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heard: Option<i64>,
    /// Battery percentage, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u8>,
}

/// Role of a channel slot on the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelRole {
    /// The primary channel (index 0).
    Primary,
    /// An additional enabled channel.
    Secondary,
    /// An unused slot.
    Disabled,
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Disabled => "disabled",
        })
    }
}

/// One channel slot configured on the radio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Slot index (0-7).
    pub index: u8,
    /// Channel name; empty for the default primary channel.
    #[serde(default)]
    pub name: String,
    /// Slot role.
    pub role: ChannelRole,
}

/// Identity and configuration summary of the local radio.
///
/// `Default` is the empty value returned when the radio cannot be queried.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioInfo {
    /// The local node number.
    #[serde(default)]
    pub node_num: u32,
    /// Long owner name.
    #[serde(default)]
    pub long_name: String,
    /// Short owner name.
    #[serde(default)]
    pub short_name: String,
    /// Firmware version string.
    #[serde(default)]
    pub firmware_version: String,
    /// Hardware model name.
    #[serde(default)]
    pub hw_model: String,
    /// LoRa region code, e.g. `US` or `EU_868`.
    #[serde(default)]
    pub region: String,
    /// Modem preset, e.g. `LONG_FAST`.
    #[serde(default)]
    pub modem_preset: String,
}

impl RadioInfo {
    /// True when nothing was learned about the radio.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ── Destination ─────────────────────────────────────────────────────────────

/// Where a text message is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// Every node on the channel.
    Broadcast,
    /// A single node by number.
    Node(u32),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broadcast => f.write_str("^all"),
            Self::Node(num) => write!(f, "!{num:08x}"),
        }
    }
}

impl FromStr for Destination {
    type Err = String;

    /// Accepts `^all`, `!` followed by 1-8 hex digits, or a decimal node number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "^all" {
            return Ok(Self::Broadcast);
        }
        if let Some(hex) = s.strip_prefix('!') {
            if hex.is_empty() || hex.len() > 8 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(format!("node id must be ! followed by 1-8 hex digits: {s:?}"));
            }
            return u32::from_str_radix(hex, 16)
                .map(Self::Node)
                .map_err(|e| format!("invalid node id {s:?}: {e}"));
        }
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse::<u32>()
                .map(Self::Node)
                .map_err(|e| format!("invalid node number {s:?}: {e}"));
        }
        Err(format!("unrecognised destination {s:?} (expected ^all, !hex or a node number)"))
    }
}

/// Check a text message against the daemon's payload rules.
pub fn validate_text(text: &str) -> Result<(), String> {
    if text.trim().is_empty() {
        return Err("message text is empty".to_string());
    }
    if text.len() > MAX_TEXT_BYTES {
        return Err(format!(
            "message is {} bytes, the radio accepts at most {MAX_TEXT_BYTES}",
            text.len()
        ));
    }
    Ok(())
}

// ── Wire bodies ─────────────────────────────────────────────────────────────

/// Client → daemon request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Handshake claiming the client slot.
    Hello {
        /// Client name for the daemon's logs.
        client: String,
    },
    /// List known nodes.
    ListNodes,
    /// List channel slots.
    ListChannels,
    /// Describe the local radio.
    RadioInfo,
    /// Queue a text message.
    SendText {
        /// Message body.
        text: String,
        /// Target.
        destination: Destination,
        /// Channel slot index.
        channel: u8,
    },
    /// Release the client slot.
    Disconnect,
}

/// Daemon → client response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Handshake accepted.
    Ready,
    /// Reply to [`Request::ListNodes`].
    Nodes {
        /// Known nodes.
        nodes: Vec<NodeInfo>,
    },
    /// Reply to [`Request::ListChannels`].
    Channels {
        /// Channel slots.
        channels: Vec<ChannelInfo>,
    },
    /// Reply to [`Request::RadioInfo`].
    RadioInfo {
        /// Radio summary.
        info: RadioInfo,
    },
    /// Text message queued.
    Sent {
        /// Packet id the radio assigned.
        packet_id: u32,
    },
    /// The daemon will not serve this client.
    Refused {
        /// Why.
        reason: String,
    },
    /// The request failed on the daemon side.
    Error {
        /// Daemon error message.
        message: String,
    },
    /// Acknowledges [`Request::Disconnect`].
    Bye,
}

impl Response {
    /// Turn daemon-side `Refused`/`Error` replies into transport errors.
    pub fn into_result(self) -> Result<Self, TransportError> {
        match self {
            Self::Refused { reason } => Err(TransportError::Refused(reason)),
            Self::Error { message } => Err(TransportError::Protocol(format!("daemon error: {message}"))),
            other => Ok(other),
        }
    }

    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Nodes { .. } => "nodes",
            Self::Channels { .. } => "channels",
            Self::RadioInfo { .. } => "radio_info",
            Self::Sent { .. } => "sent",
            Self::Refused { .. } => "refused",
            Self::Error { .. } => "error",
            Self::Bye => "bye",
        }
    }
}

/// Serialize a body for framing.
pub fn encode_body<T: Serialize>(body: &T) -> Result<Vec<u8>, TransportError> {
    serde_json::to_vec(body).map_err(|e| TransportError::Protocol(format!("encode body: {e}")))
}

/// Parse a framed payload into a body.
pub fn decode_body<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> Result<T, TransportError> {
    serde_json::from_slice(payload).map_err(|e| TransportError::Protocol(format!("decode body: {e}")))
}

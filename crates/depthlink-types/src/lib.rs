use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default UDP port of the telemetry consumer.
pub const DEFAULT_PORT: u16 = 5005;

/// Largest UDP payload that fits one IPv4 datagram.
pub const MAX_DATAGRAM_BYTES: usize = 65_507;

/// Per-frame navigation heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationPacket {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub qx: f32,
    pub qy: f32,
    pub qz: f32,
    pub qw: f32,
    /// Smoothed obstacle distance in metres.
    pub obstacle_dist: f32,
}

/// Distance-triggered survey record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyPacket {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub label: String,
    pub note: String,
}

/// Outbound telemetry, discriminated on the wire by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TelemetryPacket {
    #[serde(rename = "nav")]
    Navigation(NavigationPacket),
    #[serde(rename = "survey")]
    Survey(SurveyPacket),
}

impl TelemetryPacket {
    /// Serialise to the UTF-8 JSON datagram payload.
    pub fn encode(&self) -> Result<Vec<u8>, LinkError> {
        let bytes = serde_json::to_vec(self).map_err(|e| LinkError::Encode(e.to_string()))?;
        if bytes.len() > MAX_DATAGRAM_BYTES {
            return Err(LinkError::Encode(format!(
                "packet is {} bytes, exceeding the datagram limit of {}",
                bytes.len(),
                MAX_DATAGRAM_BYTES
            )));
        }
        Ok(bytes)
    }

    /// Parse a datagram payload produced by [`TelemetryPacket::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, LinkError> {
        serde_json::from_slice(bytes).map_err(|e| LinkError::Encode(e.to_string()))
    }

    /// Wire discriminator of this packet.
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryPacket::Navigation(_) => "nav",
            TelemetryPacket::Survey(_) => "survey",
        }
    }
}

/// Convert a wall-clock instant into fractional Unix seconds.
pub fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

/// Remote consumer address. Immutable for the lifetime of one transport
/// session; the host may be changed between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Resolve to the first socket address the host maps to.
    pub fn resolve(&self) -> Result<SocketAddr, LinkError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(LinkError::InvalidEndpoint("empty host".to_string()));
        }
        if self.port == 0 {
            return Err(LinkError::InvalidEndpoint(format!("{host}: port 0")));
        }
        (host, self.port)
            .to_socket_addrs()
            .map_err(|e| LinkError::InvalidEndpoint(format!("{self}: {e}")))?
            .next()
            .ok_or_else(|| LinkError::InvalidEndpoint(format!("{self}: no address")))
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new("127.0.0.1", DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Lifecycle of a transport session.
///
/// `Closed → Opening → Ready → Closed`, with `Ready → Failed` on channel
/// failure. `Failed` is terminal until the session is closed and reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Closed,
    Opening,
    Ready,
    Failed,
}

/// Streaming on/off flag plus a label suitable for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingStatus {
    pub active: bool,
    pub label: String,
}

impl StreamingStatus {
    pub fn idle() -> Self {
        Self {
            active: false,
            label: "Idle".to_string(),
        }
    }

    pub fn streaming(endpoint: &Endpoint) -> Self {
        Self {
            active: true,
            label: format!("Streaming to {endpoint}"),
        }
    }

    pub fn stopped() -> Self {
        Self {
            active: false,
            label: "Stopped".to_string(),
        }
    }
}

impl Default for StreamingStatus {
    fn default() -> Self {
        Self::idle()
    }
}

/// The only meaningful inbound tokens. Matching is exact and case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    Start,
    Stop,
}

impl RemoteCommand {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "START" => Some(RemoteCommand::Start),
            "STOP" => Some(RemoteCommand::Stop),
            _ => None,
        }
    }
}

/// Messages accepted by the single-consumer control inbox of the
/// streaming pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Trimmed text received from the network.
    RemoteCommand(String),
    /// Local start/stop toggle.
    ToggleStreaming,
    /// Local start; no effect while already streaming.
    StartStreaming,
    /// Local stop; no effect while idle.
    StopStreaming,
    /// Replace the endpoint host used by the next activation.
    SetEndpointHost(String),
}

/// Transport and encoding failures. None of these are fatal to the host
/// process; the transport logs them and degrades to a no-op.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Packet encoding failed: {0}")]
    Encode(String),

    #[error("Transport session is not open")]
    NotOpen,

    #[error("Channel failed: {0}")]
    ChannelFailed(String),
}

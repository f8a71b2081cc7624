//! Error types for traceroute operations.

use std::net::IpAddr;
use thiserror::Error;

/// Main error type for traceroute operations.
#[derive(Error, Debug)]
pub enum TracerouteError {
    // Socket/IO errors
    #[error("Failed to create socket: {0}")]
    SocketCreation(#[source] std::io::Error),

    #[error("Failed to set socket option {option}: {source}")]
    SocketOption {
        option: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to set hop limit to {ttl}: {source}")]
    SetHopLimit {
        ttl: u8,
        #[source]
        source: std::io::Error,
    },

    #[error("Read timeout exceeded")]
    ReadTimeout,

    #[error("Read failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("Write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("Unsupported address {0}: only IPv4 destinations can be probed")]
    UnsupportedAddress(IpAddr),

    // Packet errors
    #[error("Packet too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort { expected: usize, actual: usize },

    #[error("Failed to parse {layer} layer: {reason}")]
    PacketParseFailed { layer: &'static str, reason: String },

    #[error("Failed to build packet: {0}")]
    PacketBuildFailed(String),

    #[error("Unexpected ICMP reply: {kind}")]
    UnexpectedReply { kind: String },

    #[error("Failed to resolve host {host}: {reason}")]
    ResolveFailed { host: String, reason: String },

    // Driver errors
    #[error("Driver not available on this platform")]
    DriverNotAvailable,

    // Configuration errors
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

impl TracerouteError {
    /// Returns true if this error means no reply arrived before the receive deadline.
    ///
    /// A timeout is the only receive error a sweep recovers from: the hop is
    /// recorded as unanswered and probing moves on to the next TTL.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ReadTimeout)
    }

    /// Returns true if a received message could not be parsed.
    pub fn is_malformed_packet(&self) -> bool {
        matches!(
            self,
            Self::PacketTooShort { .. } | Self::PacketParseFailed { .. }
        )
    }
}

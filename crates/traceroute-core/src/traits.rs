//! Capabilities the sweep controller is driven through.

use crate::{ControlMessage, DecodedReply, TracerouteError};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Instant;

/// Raw network I/O used to send probes and collect replies.
///
/// Implementations wrap a single socket; a sweep owns its transport for the
/// whole TTL loop.
#[async_trait]
pub trait Transport: Send {
    /// Sets the TTL used for subsequent sends.
    fn set_hop_limit(&mut self, ttl: u8) -> Result<(), TracerouteError>;

    /// Sends a probe to `destination`.
    async fn send(&mut self, buf: &[u8], destination: IpAddr) -> Result<(), TracerouteError>;

    /// Sets the absolute deadline for subsequent receives.
    fn set_receive_deadline(&mut self, deadline: Instant) -> Result<(), TracerouteError>;

    /// Receives one message into `buf`, starting at the ICMP header.
    ///
    /// Returns the message length and the metadata the network layer reported
    /// for it. Returns [`TracerouteError::ReadTimeout`] when the deadline
    /// passes without a message. A message whose network-layer header cannot
    /// be parsed is reported as [`TracerouteError::PacketTooShort`] or
    /// [`TracerouteError::PacketParseFailed`] and fails the sweep at the
    /// decode stage; every other error fails it at the receive stage.
    async fn receive(&mut self, buf: &mut [u8])
        -> Result<(usize, ControlMessage), TracerouteError>;

    /// Closes the transport, releasing resources.
    async fn close(&mut self) -> Result<(), TracerouteError>;
}

/// Wire format of the probe protocol.
pub trait ProbeCodec: Send + Sync {
    /// Encodes an echo request.
    fn encode_echo_request(
        &self,
        identifier: u16,
        sequence: u16,
        payload: &[u8],
    ) -> Result<Vec<u8>, TracerouteError>;

    /// Decodes a received message.
    fn decode(&self, buf: &[u8]) -> Result<DecodedReply, TracerouteError>;
}

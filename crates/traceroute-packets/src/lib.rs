//! Packet I/O for ICMP traceroute.
//!
//! Provides the raw socket [`Transport`](traceroute_core::Transport) used to
//! send echo probes with a chosen TTL and to receive replies together with
//! their network-layer metadata.

pub mod platform;

#[cfg(target_os = "linux")]
pub use platform::linux::RawIcmpTransport;

/// Opens the raw ICMP transport for the current platform.
///
/// Must be called from within a tokio runtime. Opening a raw socket needs
/// elevated privileges (`CAP_NET_RAW` on Linux).
pub fn new_transport(
) -> Result<Box<dyn traceroute_core::Transport>, traceroute_core::TracerouteError> {
    platform::new_transport()
}

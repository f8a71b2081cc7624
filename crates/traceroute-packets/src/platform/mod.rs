//! Platform-specific transport implementations.

#[cfg(target_os = "linux")]
pub mod linux;

use traceroute_core::{Transport, TracerouteError};

/// Opens the raw ICMP transport for the current platform.
pub fn new_transport() -> Result<Box<dyn Transport>, TracerouteError> {
    #[cfg(target_os = "linux")]
    return Ok(Box::new(linux::RawIcmpTransport::new()?));

    #[cfg(not(target_os = "linux"))]
    return Err(TracerouteError::DriverNotAvailable);
}

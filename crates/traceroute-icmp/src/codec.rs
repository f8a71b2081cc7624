//! ICMPv4 probe codec.

use crate::packet::{create_icmp_echo_request, parse_icmp_reply};
use traceroute_core::{DecodedReply, ProbeCodec, TracerouteError};

/// [`ProbeCodec`] for ICMPv4 echo probes.
///
/// Messages start at the ICMP header; the transport is responsible for the IP
/// header on both send and receive.
#[derive(Debug, Default, Clone, Copy)]
pub struct IcmpCodec;

impl IcmpCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ProbeCodec for IcmpCodec {
    fn encode_echo_request(
        &self,
        identifier: u16,
        sequence: u16,
        payload: &[u8],
    ) -> Result<Vec<u8>, TracerouteError> {
        create_icmp_echo_request(identifier, sequence, payload)
    }

    fn decode(&self, buf: &[u8]) -> Result<DecodedReply, TracerouteError> {
        parse_icmp_reply(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use traceroute_core::{ProbeId, ReplyKind};

    #[test]
    fn test_own_probe_round_trips_as_other() {
        let codec = IcmpCodec::new();
        let probe = codec.encode_echo_request(0x5151, 3, b"payload").unwrap();

        // On loopback a raw socket sees its own echo request.
        let reply = codec.decode(&probe).unwrap();
        assert_eq!(reply.kind, ReplyKind::Other("echo-request".to_string()));
        assert!(reply.matches_probe(
            ProbeId::new(0x5151),
            3,
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        ));
    }
}

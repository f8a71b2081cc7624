//! ICMP echo probe encoding and reply decoding using pnet.

use pnet_packet::icmp::echo_reply::EchoReplyPacket;
use pnet_packet::icmp::echo_request::{EchoRequestPacket, MutableEchoRequestPacket};
use pnet_packet::icmp::{IcmpCode, IcmpPacket, IcmpType, IcmpTypes, MutableIcmpPacket};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::Ipv4Packet;
use std::net::IpAddr;
use traceroute_core::{DecodedReply, ReplyKind, TracerouteError};

/// Type + code + checksum + identifier + sequence number.
const ECHO_HEADER_LEN: usize = 8;

/// Type + code + checksum + 4 bytes that precede the quoted datagram in ICMP
/// error messages.
const ERROR_HEADER_LEN: usize = 8;

/// Largest echo payload that still fits an unfragmented IPv4 datagram.
const MAX_PAYLOAD_LEN: usize = 65_535 - 20 - ECHO_HEADER_LEN;

/// Creates an ICMP Echo Request message (no IP header).
///
/// The kernel adds the IP header, so the TTL is not part of the message; the
/// sequence number is what ties a reply back to the probe.
pub fn create_icmp_echo_request(
    identifier: u16,
    sequence: u16,
    payload: &[u8],
) -> Result<Vec<u8>, TracerouteError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(TracerouteError::PacketBuildFailed(format!(
            "payload of {} bytes exceeds {} bytes",
            payload.len(),
            MAX_PAYLOAD_LEN
        )));
    }

    let mut buffer = vec![0u8; ECHO_HEADER_LEN + payload.len()];

    {
        let mut echo = MutableEchoRequestPacket::new(&mut buffer).ok_or_else(|| {
            TracerouteError::PacketBuildFailed("Failed to create ICMP packet".to_string())
        })?;

        echo.set_icmp_type(IcmpTypes::EchoRequest);
        echo.set_icmp_code(IcmpCode::new(0));
        echo.set_identifier(identifier);
        echo.set_sequence_number(sequence);
        echo.set_payload(payload);
    }

    let checksum = {
        let view = IcmpPacket::new(&buffer).ok_or_else(|| {
            TracerouteError::PacketBuildFailed("Failed to create ICMP view".to_string())
        })?;
        pnet_packet::icmp::checksum(&view)
    };

    MutableIcmpPacket::new(&mut buffer)
        .ok_or_else(|| TracerouteError::PacketBuildFailed("Failed to set checksum".to_string()))?
        .set_checksum(checksum);

    Ok(buffer)
}

/// Decodes an ICMP message (starting at the ICMP header).
pub fn parse_icmp_reply(buf: &[u8]) -> Result<DecodedReply, TracerouteError> {
    if buf.len() < ECHO_HEADER_LEN {
        return Err(TracerouteError::PacketTooShort {
            expected: ECHO_HEADER_LEN,
            actual: buf.len(),
        });
    }

    let icmp = IcmpPacket::new(buf).ok_or_else(|| TracerouteError::PacketParseFailed {
        layer: "ICMP",
        reason: "truncated header".to_string(),
    })?;
    let icmp_type = icmp.get_icmp_type();

    let reply = match icmp_type {
        IcmpTypes::EchoReply => {
            let echo = EchoReplyPacket::new(buf).ok_or_else(|| truncated("echo reply"))?;
            DecodedReply::new(ReplyKind::EchoReply)
                .with_echo(echo.get_identifier(), echo.get_sequence_number())
        }
        IcmpTypes::EchoRequest => {
            let echo = EchoRequestPacket::new(buf).ok_or_else(|| truncated("echo request"))?;
            DecodedReply::new(ReplyKind::Other(icmp_type_name(icmp_type)))
                .with_echo(echo.get_identifier(), echo.get_sequence_number())
        }
        IcmpTypes::TimeExceeded => {
            with_quoted_probe(DecodedReply::icmp_error(ReplyKind::TimeExceeded), buf)
        }
        IcmpTypes::DestinationUnreachable
        | IcmpTypes::ParameterProblem
        | IcmpTypes::SourceQuench
        | IcmpTypes::RedirectMessage => with_quoted_probe(
            DecodedReply::icmp_error(ReplyKind::Other(icmp_type_name(icmp_type))),
            buf,
        ),
        other => DecodedReply::new(ReplyKind::Other(icmp_type_name(other))),
    };

    Ok(reply)
}

/// Fills in the destination and echo header of the datagram quoted in an
/// ICMP error message.
///
/// The destination is kept whenever the quoted IPv4 header parses. The echo
/// header is only read when the quoted datagram is an ICMP echo request.
fn with_quoted_probe(mut reply: DecodedReply, buf: &[u8]) -> DecodedReply {
    let quoted = &buf[ERROR_HEADER_LEN..];

    let Some(ip) = Ipv4Packet::new(quoted) else {
        return reply;
    };
    let header_len = usize::from(ip.get_header_length()) * 4;
    if ip.get_version() != 4 || header_len < 20 || quoted.len() < header_len {
        return reply;
    }

    reply = reply.with_original_dst(IpAddr::V4(ip.get_destination()));

    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp
        || quoted.len() < header_len + ECHO_HEADER_LEN
    {
        return reply;
    }

    if let Some(echo) = EchoRequestPacket::new(&quoted[header_len..]) {
        if echo.get_icmp_type() == IcmpTypes::EchoRequest {
            reply = reply.with_echo(echo.get_identifier(), echo.get_sequence_number());
        }
    }

    reply
}

fn truncated(what: &str) -> TracerouteError {
    TracerouteError::PacketParseFailed {
        layer: "ICMP",
        reason: format!("truncated {}", what),
    }
}

/// Name used for ICMP types that are not classified directly.
pub fn icmp_type_name(icmp_type: IcmpType) -> String {
    let name = match icmp_type {
        IcmpTypes::EchoReply => "echo-reply",
        IcmpTypes::DestinationUnreachable => "destination-unreachable",
        IcmpTypes::SourceQuench => "source-quench",
        IcmpTypes::RedirectMessage => "redirect",
        IcmpTypes::EchoRequest => "echo-request",
        IcmpTypes::RouterAdvertisement => "router-advertisement",
        IcmpTypes::RouterSolicitation => "router-solicitation",
        IcmpTypes::TimeExceeded => "time-exceeded",
        IcmpTypes::ParameterProblem => "parameter-problem",
        IcmpTypes::Timestamp => "timestamp",
        IcmpTypes::TimestampReply => "timestamp-reply",
        IcmpType(other) => return format!("type-{}", other),
    };
    name.to_string()
}

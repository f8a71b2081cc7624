//! ICMPv4 echo probe codec for traceroute.

mod codec;
mod packet;

pub use codec::IcmpCodec;
pub use packet::{create_icmp_echo_request, icmp_type_name, parse_icmp_reply};

//! Sweeps over ICMP messages as they arrive on the wire.

use async_trait::async_trait;
use pnet_packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet_packet::ipv4::MutableIpv4Packet;
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};
use traceroute_core::{
    traceroute_sweep, CancellationToken, ControlMessage, HopStatus, Options, ProbeId,
    SweepOutcome, Transport, TracerouteError,
};
use traceroute_icmp::{create_icmp_echo_request, IcmpCodec};

const LOCAL: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
const DESTINATION: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 1);
const ROUTER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const ID: u16 = 0x5151;

/// Replays ICMP messages (from, bytes) one per receive, then times out.
struct ReplayTransport {
    replies: VecDeque<(Ipv4Addr, Vec<u8>)>,
}

#[async_trait]
impl Transport for ReplayTransport {
    fn set_hop_limit(&mut self, _ttl: u8) -> Result<(), TracerouteError> {
        Ok(())
    }

    async fn send(&mut self, _buf: &[u8], _destination: IpAddr) -> Result<(), TracerouteError> {
        Ok(())
    }

    fn set_receive_deadline(&mut self, _deadline: Instant) -> Result<(), TracerouteError> {
        Ok(())
    }

    async fn receive(
        &mut self,
        buf: &mut [u8],
    ) -> Result<(usize, ControlMessage), TracerouteError> {
        let (from, bytes) = self.replies.pop_front().ok_or(TracerouteError::ReadTimeout)?;
        buf[..bytes.len()].copy_from_slice(&bytes);
        let control = ControlMessage {
            src: Some(IpAddr::V4(from)),
            dst: Some(IpAddr::V4(LOCAL)),
            ..Default::default()
        };
        Ok((bytes.len(), control))
    }

    async fn close(&mut self) -> Result<(), TracerouteError> {
        Ok(())
    }
}

/// ICMP error of `icmp_type`/`code` quoting `inner` (protocol `proto`) sent
/// from LOCAL to `dst`.
fn icmp_error(icmp_type: u8, code: u8, proto: u8, dst: Ipv4Addr, inner: &[u8]) -> Vec<u8> {
    let mut quoted = vec![0u8; 20 + inner.len()];
    {
        let mut ip = MutableIpv4Packet::new(&mut quoted).unwrap();
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_total_length((20 + inner.len()) as u16);
        ip.set_next_level_protocol(IpNextHeaderProtocol(proto));
        ip.set_source(LOCAL);
        ip.set_destination(dst);
    }
    quoted[20..].copy_from_slice(inner);

    let mut message = vec![icmp_type, code, 0, 0, 0, 0, 0, 0];
    message.extend_from_slice(&quoted);
    message
}

fn udp_port_unreachable() -> Vec<u8> {
    let udp = [0x9c, 0x40, 0x00, 0x35, 0x00, 0x10, 0x00, 0x00];
    icmp_error(3, 3, 17, DESTINATION, &udp)
}

fn time_exceeded(ttl: u16) -> Vec<u8> {
    let probe = create_icmp_echo_request(ID, ttl, b"HELLO-R-U-THERE").unwrap();
    icmp_error(
        11,
        0,
        IpNextHeaderProtocols::Icmp.0,
        DESTINATION,
        &probe[..8],
    )
}

async fn run(replies: Vec<(Ipv4Addr, Vec<u8>)>, max_ttl: u8) -> traceroute_core::SweepReport {
    let mut transport = ReplayTransport {
        replies: replies.into(),
    };
    let options = Options {
        max_ttl,
        wait_time: Duration::from_millis(100),
        ..Default::default()
    };
    traceroute_sweep(
        &mut transport,
        &IcmpCodec::new(),
        IpAddr::V4(DESTINATION),
        &options,
        ProbeId::new(ID),
        &CancellationToken::new(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_port_unreachable_for_other_traffic_is_skipped() {
    let report = run(
        vec![
            (DESTINATION, udp_port_unreachable()),
            (ROUTER, time_exceeded(1)),
        ],
        1,
    )
    .await;

    assert!(matches!(report.outcome, SweepOutcome::Exhausted));
    assert_eq!(report.hops.len(), 1);
    assert_eq!(report.hops[0].src, Some(IpAddr::V4(ROUTER)));
    assert_eq!(report.hops[0].status(), HopStatus::Intermediate);
}

#[tokio::test]
async fn test_only_foreign_errors_leave_hop_blank() {
    let report = run(vec![(DESTINATION, udp_port_unreachable())], 2).await;

    assert!(matches!(report.outcome, SweepOutcome::Exhausted));
    assert_eq!(report.hops.len(), 2);
    assert!(report
        .hops
        .iter()
        .all(|hop| hop.status() == HopStatus::Pending && hop.rtt.is_none()));
}

#[tokio::test]
async fn test_unreachable_quoting_the_probe_fails_sweep() {
    let probe = create_icmp_echo_request(ID, 1, b"HELLO-R-U-THERE").unwrap();
    let unreachable = icmp_error(3, 1, IpNextHeaderProtocols::Icmp.0, DESTINATION, &probe);

    let report = run(vec![(ROUTER, unreachable)], 3).await;

    let failure = report.outcome.failure().expect("sweep failed");
    assert_eq!(
        failure.stage.to_string(),
        "unexpected-reply: destination-unreachable"
    );
    assert_eq!(report.hops.len(), 1);
    assert_eq!(report.hops[0].src, Some(IpAddr::V4(ROUTER)));
}

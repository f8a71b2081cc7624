#![cfg(target_os = "linux")]

//! Live probes against a real network. These need `CAP_NET_RAW` and are
//! ignored by default: `cargo test -p traceroute-packets -- --ignored`.

use std::net::IpAddr;
use std::time::Duration;
use traceroute_core::{
    traceroute_sweep, CancellationToken, HopStatus, Options, ProbeId, SweepOutcome, Transport,
};
use traceroute_icmp::IcmpCodec;
use traceroute_packets::RawIcmpTransport;

fn target() -> IpAddr {
    std::env::var("TRACEROUTE_TARGET")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or_else(|| IpAddr::from([8, 8, 8, 8]))
}

#[tokio::test]
#[ignore]
async fn loopback_answers_at_first_hop() {
    let mut transport = RawIcmpTransport::new().expect("raw socket (needs CAP_NET_RAW)");
    let options = Options {
        max_ttl: 3,
        wait_time: Duration::from_secs(1),
        ..Default::default()
    };

    let report = traceroute_sweep(
        &mut transport,
        &IcmpCodec::new(),
        IpAddr::from([127, 0, 0, 1]),
        &options,
        ProbeId::random(),
        &CancellationToken::new(),
    )
    .await
    .expect("valid options");
    transport.close().await.expect("close");

    assert!(matches!(report.outcome, SweepOutcome::ReachedDestination));
    assert_eq!(report.hops.len(), 1);
    assert_eq!(report.hops[0].status(), HopStatus::Answered);
    assert_eq!(report.hops[0].src, Some(IpAddr::from([127, 0, 0, 1])));
}

#[tokio::test]
#[ignore]
async fn first_hop_answers() {
    let mut transport = RawIcmpTransport::new().expect("raw socket (needs CAP_NET_RAW)");
    let options = Options {
        max_ttl: 1,
        wait_time: Duration::from_secs(3),
        ..Default::default()
    };

    let report = traceroute_sweep(
        &mut transport,
        &IcmpCodec::new(),
        target(),
        &options,
        ProbeId::random(),
        &CancellationToken::new(),
    )
    .await
    .expect("valid options");

    assert_eq!(report.hops.len(), 1);
    assert!(
        report.outcome.failure().is_none(),
        "sweep failed: {}",
        report.outcome
    );
    assert_ne!(report.hops[0].status(), HopStatus::Pending, "no reply from the first hop");
}

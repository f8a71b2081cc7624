//! Wires the raw transport and the ICMP codec into a single sweep.

use std::net::IpAddr;
use tokio_util::sync::CancellationToken;
use traceroute_core::{
    traceroute_sweep, ProbeId, SweepReport, TracerouteConfig, TracerouteError, TracerouteRun,
};
use traceroute_icmp::IcmpCodec;
use tracing::{debug, info, warn};

/// A finished sweep together with what it was run against.
#[derive(Debug)]
pub struct TraceSummary {
    pub target: String,
    pub destination: IpAddr,
    pub probe_id: ProbeId,
    pub max_ttl: u8,
    pub report: SweepReport,
}

impl TraceSummary {
    /// Builds the serializable record of this run.
    pub fn to_run(&self) -> TracerouteRun {
        TracerouteRun::from_report(
            &self.target,
            self.destination,
            self.probe_id,
            self.max_ttl,
            &self.report,
        )
    }

    /// Renders the classic one-line-per-hop listing.
    pub fn to_text(&self) -> String {
        let mut out = format!(
            "traceroute to {} ({}), {} hops max\n",
            self.target, self.destination, self.max_ttl
        );
        for hop in &self.report.hops {
            match (hop.src, hop.rtt) {
                (Some(src), Some(rtt)) => out.push_str(&format!(
                    "{:>2}  {}  {:.3} ms\n",
                    hop.hop,
                    src,
                    rtt.as_secs_f64() * 1000.0
                )),
                (Some(src), None) => out.push_str(&format!("{:>2}  {}\n", hop.hop, src)),
                _ => out.push_str(&format!("{:>2}  *\n", hop.hop)),
            }
        }
        out
    }
}

/// Resolves `host` to the address to probe.
///
/// Literal addresses are used as given. Names resolving to several addresses
/// yield the first IPv4 one.
pub async fn resolve_hostname(host: &str) -> Result<IpAddr, TracerouteError> {
    let ip = match host.parse::<IpAddr>() {
        Ok(ip) => ip,
        Err(_) => {
            let addrs: Vec<IpAddr> = tokio::net::lookup_host((host, 0))
                .await
                .map_err(|err| TracerouteError::ResolveFailed {
                    host: host.to_string(),
                    reason: err.to_string(),
                })?
                .map(|addr| addr.ip())
                .collect();

            addrs
                .iter()
                .copied()
                .find(IpAddr::is_ipv4)
                .or_else(|| addrs.first().copied())
                .ok_or_else(|| TracerouteError::ResolveFailed {
                    host: host.to_string(),
                    reason: "no addresses".to_string(),
                })?
        }
    };

    if !ip.is_ipv4() {
        return Err(TracerouteError::UnsupportedAddress(ip));
    }
    Ok(ip)
}

/// Runs one ICMP sweep for `config` over the platform's raw transport.
pub async fn run_traceroute(
    config: &TracerouteConfig,
    cancel: &CancellationToken,
) -> Result<TraceSummary, TracerouteError> {
    config.options.validate()?;

    let destination = resolve_hostname(&config.hostname).await?;
    let probe_id = config.probe_id.unwrap_or_else(ProbeId::random);
    info!(
        target_host = %config.hostname,
        %destination,
        id = %probe_id,
        max_ttl = config.options.max_ttl,
        "Starting traceroute"
    );

    let mut transport = traceroute_packets::new_transport()?;
    let result = traceroute_sweep(
        transport.as_mut(),
        &IcmpCodec::new(),
        destination,
        &config.options,
        probe_id,
        cancel,
    )
    .await;

    if let Err(err) = transport.close().await {
        warn!(error = %err, "Failed to close transport");
    }

    let report = result?;
    debug!(hops = report.hops.len(), outcome = %report.outcome, "Traceroute finished");

    Ok(TraceSummary {
        target: config.hostname.clone(),
        destination,
        probe_id,
        max_ttl: config.options.max_ttl,
        report,
    })
}

/// Cancels `cancel` when the process receives Ctrl-C.
pub fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    warn!("Interrupted, stopping before the next hop");
                    cancel.cancel();
                }
                Err(err) => warn!(error = %err, "Failed to listen for Ctrl-C"),
            },
            _ = cancel.cancelled() => {}
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use traceroute_core::{HopResult, SweepOutcome};

    fn summary(hops: Vec<HopResult>, outcome: SweepOutcome) -> TraceSummary {
        TraceSummary {
            target: "example.net".to_string(),
            destination: "192.0.2.9".parse().unwrap(),
            probe_id: ProbeId::new(0x1234),
            max_ttl: 30,
            report: SweepReport::new(hops, outcome),
        }
    }

    #[tokio::test]
    async fn test_resolve_literal_ipv4() {
        let ip = resolve_hostname("192.0.2.1").await.unwrap();
        assert_eq!(ip, "192.0.2.1".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_resolve_rejects_ipv6_literal() {
        let err = resolve_hostname("2001:db8::1").await.unwrap_err();
        assert!(matches!(err, TracerouteError::UnsupportedAddress(_)));
    }

    #[tokio::test]
    async fn test_invalid_options_fail_before_opening_socket() {
        let mut config = TracerouteConfig {
            hostname: "192.0.2.1".to_string(),
            ..Default::default()
        };
        config.options.max_ttl = 0;

        let err = run_traceroute(&config, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TracerouteError::InvalidOptions(_)));
    }

    #[test]
    fn test_text_listing() {
        let mut router = HopResult::pending(1);
        router.src = Some("10.0.0.1".parse().unwrap());
        router.rtt = Some(Duration::from_micros(1234));

        let mut dest = HopResult::pending(3);
        dest.src = Some("192.0.2.9".parse().unwrap());
        dest.rtt = Some(Duration::from_millis(20));
        dest.success = true;

        let text = summary(
            vec![router, HopResult::pending(2), dest],
            SweepOutcome::ReachedDestination,
        )
        .to_text();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "traceroute to example.net (192.0.2.9), 30 hops max"
        );
        assert_eq!(lines[1], " 1  10.0.0.1  1.234 ms");
        assert_eq!(lines[2], " 2  *");
        assert_eq!(lines[3], " 3  192.0.2.9  20.000 ms");
    }

    #[test]
    fn test_run_record() {
        let run = summary(vec![HopResult::pending(1)], SweepOutcome::Exhausted).to_run();
        assert_eq!(run.target, "example.net");
        assert_eq!(run.identifier, ProbeId::new(0x1234));
        assert_eq!(run.outcome, "exhausted");
        assert_eq!(run.hops.len(), 1);
    }
}

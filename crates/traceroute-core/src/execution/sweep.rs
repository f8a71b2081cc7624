//! TTL sweep execution.
//!
//! Sends one echo probe per TTL and waits for its reply (or the deadline)
//! before moving on to the next TTL.

use crate::{
    FailureStage, HopResult, Options, ProbeCodec, ProbeId, ReplyKind, SweepFailure, SweepOutcome,
    SweepReport, Transport, TracerouteError,
};
use std::net::IpAddr;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Size of the buffer replies are received into.
const RECEIVE_BUFFER_SIZE: usize = 1500;

/// What the sweep does after a probe has been handled.
#[derive(Debug, PartialEq, Eq)]
enum HopVerdict {
    /// No reply, or an intermediate hop answered.
    Continue,
    /// The destination answered.
    Reached,
}

/// Executes a traceroute sweep towards `destination`.
///
/// Probes TTL 1 through `options.max_ttl`, one at a time. The returned report
/// always carries the hops probed so far, whichever way the sweep ended.
/// Cancellation is checked before each probe, never while a probe is in
/// flight.
///
/// Returns `Err` only when `options` are invalid, before any probe is sent.
pub async fn traceroute_sweep<T, C>(
    transport: &mut T,
    codec: &C,
    destination: IpAddr,
    options: &Options,
    probe_id: ProbeId,
    cancel: &CancellationToken,
) -> Result<SweepReport, TracerouteError>
where
    T: Transport + ?Sized,
    C: ProbeCodec + ?Sized,
{
    options.validate()?;

    let mut hops = Vec::with_capacity(usize::from(options.max_ttl));
    let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];

    for ttl in 1..=options.max_ttl {
        if cancel.is_cancelled() {
            debug!(ttl = ttl, "Sweep cancelled");
            return Ok(SweepReport::new(hops, SweepOutcome::Cancelled));
        }

        let probe = Probe {
            destination,
            options,
            probe_id,
            ttl,
        };

        let mut hop = HopResult::pending(ttl);
        let verdict = probe.run(transport, codec, &mut hop, &mut buf).await;
        hops.push(hop);

        match verdict {
            Ok(HopVerdict::Continue) => {}
            Ok(HopVerdict::Reached) => {
                debug!(ttl = ttl, "Reached destination, stopping");
                return Ok(SweepReport::new(hops, SweepOutcome::ReachedDestination));
            }
            Err(failure) => {
                debug!(ttl = ttl, error = %failure, "Sweep failed");
                return Ok(SweepReport::new(hops, SweepOutcome::Failed(failure)));
            }
        }
    }

    debug!(max_ttl = options.max_ttl, "TTL budget exhausted");
    Ok(SweepReport::new(hops, SweepOutcome::Exhausted))
}

/// One probe of a sweep.
struct Probe<'a> {
    destination: IpAddr,
    options: &'a Options,
    probe_id: ProbeId,
    ttl: u8,
}

impl Probe<'_> {
    async fn run<T, C>(
        &self,
        transport: &mut T,
        codec: &C,
        hop: &mut HopResult,
        buf: &mut [u8],
    ) -> Result<HopVerdict, SweepFailure>
    where
        T: Transport + ?Sized,
        C: ProbeCodec + ?Sized,
    {
        let packet = codec
            .encode_echo_request(
                self.probe_id.get(),
                u16::from(self.ttl),
                &self.options.payload,
            )
            .map_err(|e| SweepFailure::new(FailureStage::Encode, e))?;

        transport
            .set_hop_limit(self.ttl)
            .map_err(|e| SweepFailure::new(FailureStage::SetTtl, e))?;

        let send_time = Instant::now();
        trace!(ttl = self.ttl, echo_id = %self.probe_id, "Sending ICMP Echo Request probe");
        transport
            .send(&packet, self.destination)
            .await
            .map_err(|e| SweepFailure::new(FailureStage::Send, e))?;

        transport
            .set_receive_deadline(Instant::now() + self.options.wait_time)
            .map_err(|e| SweepFailure::new(FailureStage::Deadline, e))?;

        // Replies that belong to someone else do not end the wait; keep
        // reading until the deadline set above.
        loop {
            let (n, control) = match transport.receive(buf).await {
                Ok(received) => received,
                Err(e) if e.is_timeout() => {
                    debug!(ttl = self.ttl, "Timeout waiting for response");
                    return Ok(HopVerdict::Continue);
                }
                // The transport could not unwrap the network-layer header.
                Err(e) if e.is_malformed_packet() => {
                    return Err(SweepFailure::new(FailureStage::Decode, e))
                }
                Err(e) => return Err(SweepFailure::new(FailureStage::Receive, e)),
            };

            hop.record_reply(&control, send_time.elapsed());

            let reply = codec
                .decode(&buf[..n])
                .map_err(|e| SweepFailure::new(FailureStage::Decode, e))?;

            if !reply.matches_probe(self.probe_id, self.ttl, self.destination) {
                trace!(
                    ttl = self.ttl,
                    kind = %reply.kind,
                    echo = ?reply.echo,
                    "Ignored reply that does not match the probe"
                );
                hop.reset();
                continue;
            }

            debug!(
                ttl = self.ttl,
                ip = ?hop.src,
                rtt_ms = hop.rtt.map(|rtt| rtt.as_secs_f64() * 1000.0),
                kind = %reply.kind,
                "Received probe response"
            );

            return match reply.kind {
                ReplyKind::TimeExceeded => Ok(HopVerdict::Continue),
                ReplyKind::EchoReply => {
                    hop.success = true;
                    Ok(HopVerdict::Reached)
                }
                ReplyKind::Other(kind) => Err(SweepFailure::new(
                    FailureStage::UnexpectedReply(kind.clone()),
                    TracerouteError::UnexpectedReply { kind },
                )),
            };
        }
    }
}

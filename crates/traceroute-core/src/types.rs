//! Core types for traceroute operations.

use crate::TracerouteError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Echo payload carried by every probe unless the caller overrides it.
pub const DEFAULT_PAYLOAD: &[u8] = b"HELLO-R-U-THERE";

/// Parameters for a single sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Highest TTL to probe. Probing starts at 1.
    pub max_ttl: u8,
    /// How long to wait for a reply to each probe.
    pub wait_time: Duration,
    /// Body of the echo request.
    pub payload: Vec<u8>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_ttl: 30,
            wait_time: Duration::from_secs(1),
            payload: DEFAULT_PAYLOAD.to_vec(),
        }
    }
}

impl Options {
    /// Validates the options.
    pub fn validate(&self) -> Result<(), TracerouteError> {
        if self.max_ttl == 0 {
            return Err(TracerouteError::InvalidOptions(
                "max_ttl must be at least 1".to_string(),
            ));
        }
        if self.wait_time.is_zero() {
            return Err(TracerouteError::InvalidOptions(
                "wait_time must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Echo identifier that scopes replies to one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProbeId(u16);

impl ProbeId {
    pub fn new(id: u16) -> Self {
        Self(id)
    }

    /// Draws a fresh identifier. Concurrent sweeps should each use their own.
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Result recorded for one TTL.
///
/// A hop starts out pending (`success == false`, no `src`/`dst`/`rtt`). Once a
/// reply that belongs to the probe arrives, `rtt` and the addresses from the
/// receive metadata are filled in; `success` is set only for the destination's
/// echo reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopResult {
    /// TTL used for the probe, starting at 1.
    pub hop: u8,
    /// Address that answered.
    pub src: Option<IpAddr>,
    /// Destination address of the reply as seen by the local network layer.
    pub dst: Option<IpAddr>,
    /// Time between sending the probe and receiving the reply.
    pub rtt: Option<Duration>,
    /// Whether the destination itself answered.
    pub success: bool,
}

/// Tagged view of a [`HopResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopStatus {
    /// No reply was recorded.
    Pending,
    /// A router (or another non-destination responder) answered.
    Intermediate,
    /// The destination answered.
    Answered,
}

impl HopResult {
    pub fn pending(hop: u8) -> Self {
        Self {
            hop,
            src: None,
            dst: None,
            rtt: None,
            success: false,
        }
    }

    pub fn status(&self) -> HopStatus {
        match (self.success, self.rtt) {
            (true, _) => HopStatus::Answered,
            (false, Some(_)) => HopStatus::Intermediate,
            (false, None) => HopStatus::Pending,
        }
    }

    pub(crate) fn record_reply(&mut self, control: &ControlMessage, rtt: Duration) {
        self.src = control.src;
        self.dst = control.dst;
        self.rtt = Some(rtt);
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::pending(self.hop);
    }
}

/// Ordered per-hop results of one sweep, in probing order.
pub type SweepResult = Vec<HopResult>;

/// Metadata the transport reports alongside a received message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlMessage {
    /// Sender of the message.
    pub src: Option<IpAddr>,
    /// Destination address from the received IP header.
    pub dst: Option<IpAddr>,
    /// TTL of the received packet.
    pub ttl: Option<u8>,
    /// Index of the interface the message arrived on.
    pub if_index: Option<u32>,
}

/// Meaning of a decoded ICMP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyKind {
    TimeExceeded,
    EchoReply,
    /// Any other message type, by name (e.g. `echo-request`).
    Other(String),
}

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyKind::TimeExceeded => write!(f, "time-exceeded"),
            ReplyKind::EchoReply => write!(f, "echo-reply"),
            ReplyKind::Other(kind) => write!(f, "{}", kind),
        }
    }
}

/// Echo identifier and sequence number carried by (or quoted in) a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoIdent {
    pub identifier: u16,
    pub sequence: u16,
}

/// A received message after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedReply {
    pub kind: ReplyKind,
    /// Echo header of the message itself, or of the echo request quoted in an
    /// ICMP error.
    pub echo: Option<EchoIdent>,
    /// Destination of the datagram quoted in an ICMP error.
    pub original_dst: Option<IpAddr>,
    /// The message is an ICMP error quoting the datagram that provoked it.
    pub is_error: bool,
}

impl DecodedReply {
    pub fn new(kind: ReplyKind) -> Self {
        Self {
            kind,
            echo: None,
            original_dst: None,
            is_error: false,
        }
    }

    /// An ICMP error message. Its echo header and destination, if any, come
    /// from the quoted datagram.
    pub fn icmp_error(kind: ReplyKind) -> Self {
        Self {
            is_error: true,
            ..Self::new(kind)
        }
    }

    pub fn with_echo(mut self, identifier: u16, sequence: u16) -> Self {
        self.echo = Some(EchoIdent {
            identifier,
            sequence,
        });
        self
    }

    pub fn with_original_dst(mut self, dst: IpAddr) -> Self {
        self.original_dst = Some(dst);
        self
    }

    /// Returns true if this reply was provoked by the probe sent with `id` and
    /// `ttl` towards `destination`.
    ///
    /// Echo replies and ICMP errors must carry a matching echo header; an
    /// error quoting anything other than our echo request belongs to someone
    /// else. Other message types are accepted when they carry nothing to
    /// compare against.
    pub fn matches_probe(&self, id: ProbeId, ttl: u8, destination: IpAddr) -> bool {
        if let Some(dst) = self.original_dst {
            if dst != destination {
                return false;
            }
        }

        match self.echo {
            Some(echo) => echo.identifier == id.get() && echo.sequence == u16::from(ttl),
            None => !self.is_error && matches!(self.kind, ReplyKind::Other(_)),
        }
    }
}

/// Step of a probe that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureStage {
    Encode,
    SetTtl,
    Send,
    Deadline,
    Receive,
    Decode,
    UnexpectedReply(String),
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Encode => write!(f, "encode"),
            FailureStage::SetTtl => write!(f, "set-ttl"),
            FailureStage::Send => write!(f, "send"),
            FailureStage::Deadline => write!(f, "deadline"),
            FailureStage::Receive => write!(f, "receive"),
            FailureStage::Decode => write!(f, "decode"),
            FailureStage::UnexpectedReply(kind) => write!(f, "unexpected-reply: {}", kind),
        }
    }
}

/// Fatal error that ended a sweep, with the step it happened in.
#[derive(Debug)]
pub struct SweepFailure {
    pub stage: FailureStage,
    pub error: TracerouteError,
}

impl SweepFailure {
    pub fn new(stage: FailureStage, error: TracerouteError) -> Self {
        Self { stage, error }
    }
}

impl fmt::Display for SweepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.error)
    }
}

impl std::error::Error for SweepFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// How a sweep ended.
#[derive(Debug)]
pub enum SweepOutcome {
    /// The destination sent an echo reply.
    ReachedDestination,
    /// Every TTL up to `max_ttl` was probed without reaching the destination.
    Exhausted,
    /// The caller cancelled the sweep.
    Cancelled,
    /// A fatal error stopped the sweep.
    Failed(SweepFailure),
}

impl SweepOutcome {
    /// Stable name used in logs and JSON output.
    pub fn name(&self) -> &'static str {
        match self {
            SweepOutcome::ReachedDestination => "reached_destination",
            SweepOutcome::Exhausted => "exhausted",
            SweepOutcome::Cancelled => "cancelled",
            SweepOutcome::Failed(_) => "failed",
        }
    }

    pub fn failure(&self) -> Option<&SweepFailure> {
        match self {
            SweepOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

impl fmt::Display for SweepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepOutcome::Failed(failure) => write!(f, "failed ({})", failure),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Hops gathered by a sweep together with how it ended.
#[derive(Debug)]
pub struct SweepReport {
    pub hops: SweepResult,
    pub outcome: SweepOutcome,
}

impl SweepReport {
    pub fn new(hops: SweepResult, outcome: SweepOutcome) -> Self {
        Self { hops, outcome }
    }
}

/// High-level traceroute configuration.
#[derive(Debug, Clone, Default)]
pub struct TracerouteConfig {
    /// Target hostname or IP address.
    pub hostname: String,
    /// Sweep options.
    pub options: Options,
    /// Fixed echo identifier. A random one is drawn when unset.
    pub probe_id: Option<ProbeId>,
}

//! Result types for traceroute output.

use crate::{HopResult, ProbeId, SweepReport};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A single hop in a traceroute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracerouteHop {
    /// The TTL for this hop.
    pub hop: u8,
    /// The IP address that responded (None if no response).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<IpAddr>,
    /// Destination address of the reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst: Option<IpAddr>,
    /// Round-trip time in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt: Option<f64>,
    /// Whether the destination answered at this hop.
    pub success: bool,
}

impl From<&HopResult> for TracerouteHop {
    fn from(hop: &HopResult) -> Self {
        Self {
            hop: hop.hop,
            src: hop.src,
            dst: hop.dst,
            rtt: hop.rtt.map(|rtt| rtt.as_secs_f64() * 1000.0),
            success: hop.success,
        }
    }
}

/// A single traceroute run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracerouteRun {
    /// Unique identifier for this run.
    pub run_id: String,
    /// Hostname or address the run was started for.
    pub target: String,
    /// Address that was probed.
    pub destination: IpAddr,
    /// Echo identifier used by the probes.
    pub identifier: ProbeId,
    /// Highest TTL the run was allowed to probe.
    pub max_ttl: u8,
    /// How the run ended.
    pub outcome: String,
    /// Cause of a failed run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The hops discovered in this run.
    pub hops: Vec<TracerouteHop>,
}

impl TracerouteRun {
    /// Builds the output record for a finished sweep.
    pub fn from_report(
        target: &str,
        destination: IpAddr,
        identifier: ProbeId,
        max_ttl: u8,
        report: &SweepReport,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            target: target.to_string(),
            destination,
            identifier,
            max_ttl,
            outcome: report.outcome.name().to_string(),
            error: report.outcome.failure().map(|f| f.to_string()),
            hops: report.hops.iter().map(TracerouteHop::from).collect(),
        }
    }

    /// Serializes the run to JSON with indentation.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Serializes the run to compact JSON.
    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

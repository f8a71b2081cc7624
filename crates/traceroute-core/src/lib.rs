//! Core types, traits, and the TTL sweep for ICMP traceroute.
//!
//! This crate provides the fundamental abstractions used throughout the
//! traceroute implementation:
//!
//! - [`Transport`] and [`ProbeCodec`] traits for network I/O and wire format
//! - [`traceroute_sweep`] which walks the path one TTL at a time
//! - [`HopResult`], [`SweepOutcome`] and other core types
//! - [`TracerouteError`] for error handling
//! - Result types for traceroute output

pub mod error;
pub mod execution;
pub mod result;
pub mod traits;
pub mod types;

pub use error::TracerouteError;
pub use execution::traceroute_sweep;
pub use result::{TracerouteHop, TracerouteRun};
pub use traits::{ProbeCodec, Transport};
pub use types::{
    ControlMessage, DecodedReply, EchoIdent, FailureStage, HopResult, HopStatus, Options, ProbeId,
    ReplyKind, SweepFailure, SweepOutcome, SweepReport, SweepResult, TracerouteConfig,
    DEFAULT_PAYLOAD,
};

pub use tokio_util::sync::CancellationToken;

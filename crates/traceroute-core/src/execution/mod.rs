//! Execution of traceroute sweeps.
//!
//! Probes are strictly sequential: one TTL at a time.

pub mod sweep;

pub use sweep::traceroute_sweep;

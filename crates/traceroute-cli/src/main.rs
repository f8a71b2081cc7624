//! CLI entrypoint for icmp-traceroute.

mod runner;

use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use traceroute_core::{Options, ProbeId, SweepOutcome, TracerouteConfig, DEFAULT_PAYLOAD};

const DEFAULT_MAX_TTL: u8 = 30;
const DEFAULT_WAIT_MS: u64 = 1000;

/// Exit status used when the run is interrupted.
const EXIT_CANCELLED: u8 = 130;

/// ICMP traceroute command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "icmp-traceroute")]
#[command(about = "Trace the route to a host with ICMP echo probes", long_about = None)]
struct Args {
    /// Target hostname or IPv4 address.
    #[arg(value_name = "target")]
    target: String,

    /// Maximum TTL.
    #[arg(short = 'm', long = "max-ttl", default_value_t = DEFAULT_MAX_TTL,
          value_parser = clap::value_parser!(u8).range(1..))]
    max_ttl: u8,

    /// Time to wait for each reply, in milliseconds.
    #[arg(short = 'w', long = "wait", value_name = "MS", default_value_t = DEFAULT_WAIT_MS,
          value_parser = clap::value_parser!(u64).range(1..))]
    wait_ms: u64,

    /// Echo identifier (random when unset).
    #[arg(long = "id")]
    id: Option<u16>,

    /// Echo request payload.
    #[arg(long = "payload")]
    payload: Option<String>,

    /// Print the run as JSON.
    #[arg(long = "json", default_value_t = false)]
    json: bool,

    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose", default_value_t = false)]
    verbose: bool,
}

impl Args {
    /// Convert CLI args to TracerouteConfig.
    fn to_config(&self) -> TracerouteConfig {
        let payload = self
            .payload
            .as_ref()
            .map(|p| p.as_bytes().to_vec())
            .unwrap_or_else(|| DEFAULT_PAYLOAD.to_vec());

        TracerouteConfig {
            hostname: self.target.clone(),
            options: Options {
                max_ttl: self.max_ttl,
                wait_time: Duration::from_millis(self.wait_ms),
                payload,
            },
            probe_id: self.id.map(ProbeId::new),
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = args.to_config();
    let cancel = CancellationToken::new();
    runner::cancel_on_ctrl_c(cancel.clone());

    let summary = match runner::run_traceroute(&config, &cancel).await {
        Ok(summary) => summary,
        Err(err) => {
            eprintln!("Error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        match summary.to_run().to_json() {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("Failed to encode response: {}", err);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print!("{}", summary.to_text());
    }

    match &summary.report.outcome {
        SweepOutcome::ReachedDestination | SweepOutcome::Exhausted => ExitCode::SUCCESS,
        SweepOutcome::Cancelled => ExitCode::from(EXIT_CANCELLED),
        SweepOutcome::Failed(failure) => {
            eprintln!("Error: {}", failure);
            ExitCode::FAILURE
        }
    }
}

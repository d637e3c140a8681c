//! Fork-join simulation CLI
//!
//! ```bash
//! # 10 requests, each split across 3 of 10 servers, printing the event log
//! fork_join 3
//!
//! # Average 50 seeded replications up to time 1000, as JSON
//! fork_join 3 -t 1000 --avg 50 --seed 7 --json
//! ```

use std::path::PathBuf;
use std::process;

use clap::Parser;
use fork_join::config::DEFAULT_REQUESTS;
use fork_join::{RunError, SimConfig, StopCondition, run_replications, run_single};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Fork-join queueing network simulator
///
/// Jobs pass through a shared preprocessor, then split across `n` distinct
/// servers out of `m`, and complete when the last piece finishes.
#[derive(Parser, Debug)]
#[command(name = "fork_join")]
#[command(version, about, long_about = None)]
struct Args {
    /// Servers each job is split across
    n: usize,

    /// Size of the server pool
    #[arg(short = 'm', long)]
    servers: Option<usize>,

    /// Stop after this many completed requests (default 10)
    #[arg(short = 'r', long, allow_negative_numbers = true)]
    requests: Option<i64>,

    /// Stop once virtual time reaches this value
    #[arg(short = 't', long)]
    time: Option<f64>,

    /// Average over this many replications instead of a single logged run
    #[arg(long)]
    avg: Option<usize>,

    /// Do not print the event log. Implied by --json.
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Random seed for reproducible results. When omitted, a random seed is used.
    #[arg(short = 's', long)]
    seed: Option<u64>,

    /// TOML file with the run configuration. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,fork_join=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), RunError> {
    let config = build_config(&args)?;
    config.validate()?;

    info!(
        fan_out = config.fan_out,
        servers = config.servers,
        stop = ?config.stop,
        replications = config.replications,
        "Starting simulation"
    );

    let config = match config.seed {
        Some(_) => config,
        None => {
            let seed: u64 = rand::random();
            if !args.json {
                println!("System seeded with {seed}");
            }
            config.with_seed(seed)
        }
    };

    if config.replications > 1 {
        let summary = run_replications(&config, None)?;
        if args.json {
            print_json(&summary);
        } else {
            summary.print_summary();
        }
        return Ok(());
    }

    let report = run_single(&config)?;
    if args.json {
        print_json(&report);
    } else {
        report.print_summary();
    }
    Ok(())
}

/// Start from the config file if given, then apply flags on top.
fn build_config(args: &Args) -> Result<SimConfig, RunError> {
    let stop_from_flags = match (args.requests, args.time) {
        (None, None) => None,
        (requests, time) => Some(StopCondition::from_options(requests, time)?),
    };

    let mut config = match &args.config {
        Some(path) => {
            let mut config = SimConfig::load(path)?;
            config.fan_out = args.n;
            config
        }
        None => SimConfig::new(args.n, StopCondition::Requests(DEFAULT_REQUESTS)),
    };

    if let Some(stop) = stop_from_flags {
        config.stop = stop;
    }
    if let Some(servers) = args.servers {
        config.servers = servers;
    }
    if let Some(replications) = args.avg {
        config.replications = replications;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if args.quiet || args.json {
        config.verbose = false;
    } else if args.config.is_none() {
        config.verbose = true;
    }
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to serialize report: {e}"),
    }
}

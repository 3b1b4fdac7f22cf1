use std::process;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use netool::dns::SystemResolver;
use netool::interface::SystemInterfaces;
use netool::probe::IcmpProber;
use netool::traceroute::trace_host;
use netool::{Config, HopStatus};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "netool", about = "Trace the IPv4 route to a host with ICMP echo probes")]
struct Args {
    /// Hostname or IPv4 address to trace
    host: String,

    /// Give up after this many hops
    #[arg(
        short = 'm',
        long,
        default_value_t = netool::config::MAX_TTL,
        value_parser = clap::value_parser!(u8).range(1..)
    )]
    max_hops: u8,

    /// Seconds to wait for each reply
    #[arg(
        short = 'w',
        long,
        default_value_t = netool::config::PROBE_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: u64,

    /// ICMP echo identifier (defaults to the process id)
    #[arg(long)]
    identifier: Option<u16>,

    /// Log probe activity to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(err) = run(&args) {
        eprintln!("[!] {:#}", err);
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "netool=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> anyhow::Result<()> {
    let config = args
        .identifier
        .map(Config::new)
        .unwrap_or_default()
        .with_max_hops(args.max_hops)
        .with_timeout(Duration::from_secs(args.timeout));

    println!("traceroute to {}", args.host);

    let report = trace_host(
        &config,
        &args.host,
        &SystemResolver,
        &SystemInterfaces,
        IcmpProber::open,
    )
    .with_context(|| format!("tracing {} failed", args.host))?;

    print!("{}", report);
    let stopped = report.hops.last().map(|hop| hop.status);
    if !matches!(stopped, Some(HopStatus::Reached | HopStatus::Unreachable)) {
        println!(
            "no reply from {} within {} hops",
            report.target, config.max_hops
        );
    }
    Ok(())
}

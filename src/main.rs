mod demo;
mod telemetry;

use anyhow::Result;
use clap::Parser;
use std::time::Duration;

/// Party/raid coordination core, demo harness.
#[derive(Parser, Debug)]
#[command(name = "emberhold", version, about)]
struct Args {
    /// Simulation tick length in milliseconds.
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,
    /// Number of ticks to run before disbanding.
    #[arg(long, default_value_t = 50)]
    ticks: u64,
    /// Prometheus exporter bind address (overrides telemetry config).
    #[arg(long)]
    metrics_addr: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut tcfg = data_runtime::configs::telemetry::load_default().unwrap_or_default();
    if args.metrics_addr.is_some() {
        tcfg.metrics_addr = args.metrics_addr.clone();
    }
    let _guard = telemetry::init(&tcfg)?;
    demo::run(Duration::from_millis(args.tick_ms), args.ticks)
}

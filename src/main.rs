//! # Butterfly-isochrone CLI
//!
//! Prepares the core hierarchy and eccentricity stores for a graph fixture,
//! then answers and validates isochrone queries against them.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

mod cli;

use cli::Cli;

/// Logs go to stderr so JSON results on stdout stay parseable
fn init_logging(json: bool, verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = Registry::default().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json, cli.verbose);
    cli.run()
}

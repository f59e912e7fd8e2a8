use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use logger::{init_tracing, init_tracing_with_level};
use srvwatch::config::Config;
use srvwatch::orchestrator::Orchestrator;
use tracing::{info, level_filters::LevelFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file, created with defaults if missing (default: ~/.config/srvwatch/config.toml)
    #[arg(short, long, env = "SRVWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.verbose {
        init_tracing_with_level(LevelFilter::DEBUG);
    } else {
        init_tracing();
    }

    let mut config = Config::from_config(cli.config.as_ref()).context("Failed to load configuration")?;
    config.apply_env_overrides();

    if cli.print_config {
        print!("{config}");
        return Ok(());
    }

    info!(
        version = clap::crate_version!(),
        period_secs = config.monitoring.period_seconds,
        storage = %config.storage.path.display(),
        "Starting srvwatch"
    );

    Orchestrator::start(config).await
}

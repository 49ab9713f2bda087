mod config;
mod health;
mod pool;
mod protocol;
mod server;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use health::run_standalone;
use server::CycleContext;

/// Galera/wsrep MySQL node health check
#[derive(Debug, Parser)]
#[command(name = "mysql-healthcheck", disable_version_flag = true)]
struct Cli {
    /// Run as a daemon and listen for HTTP connections on a socket
    #[arg(short = 'd')]
    daemon: bool,

    /// Verbose (debug) logging
    #[arg(short = 'v')]
    verbose: bool,

    /// Print version and exit
    #[arg(short = 'V')]
    version: bool,

    /// Configuration file, instead of searching the default locations
    #[arg(short = 'c', value_name = "PATH")]
    config: Option<PathBuf>,
}

fn version_line() -> String {
    format!(
        "{} version {}, compiled for {} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    if cli.version {
        println!("{}", version_line());
        return Ok(ExitCode::SUCCESS);
    }

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();

    if cli.daemon {
        info!(version = env!("CARGO_PKG_VERSION"), "Starting health check daemon");
        server::run_daemon(cli.config).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let cycle = CycleContext::open(config::load(cli.config.as_deref())?);
    let status = run_standalone(&cycle.service).await;
    if let Err(e) = cycle.service.close().await {
        warn!(error = %e, "Failed to close database pool");
    }
    Ok(status.into())
}

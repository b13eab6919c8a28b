//! Storage harness - integration tests for the gcloud storage CLI
//!
//! Drives the CLI through a shell, captures its output and checks it
//! against declarative expectations.

use std::path::PathBuf;

use clap::Parser;
use commands::Commands;
use storage_harness::common::{logging, Config};
use storage_harness::{cli, commands};

#[derive(Parser)]
#[command(name = "storage-harness", about = "Integration-test harness for gcloud storage")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to the harness log file
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Some(path) = logging::init(cli.log_file) {
        tracing::debug!(path = %path.display(), "Logging to file");
    }

    let result = match Config::load(cli.config.as_deref()) {
        Ok(config) => cli::dispatch(cli.command, &config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    }
}

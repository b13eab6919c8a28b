//! CLI command definitions
//!
//! Defines the clap commands for the storage harness.

use clap::Subcommand;
use std::path::PathBuf;

use crate::scenarios::Scenario;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the built-in storage scenarios against the configured bucket
    Suite {
        /// Only run these scenarios (repeatable), e.g. --only sign_url
        #[arg(long = "only")]
        only: Vec<Scenario>,

        /// Skip scenarios that need a headless browser
        #[arg(long)]
        skip_browser: bool,

        /// Print reports as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Run YAML test scenarios
    Test {
        /// Paths to YAML test scenario files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Verbose output
        #[arg(long, short)]
        verbose: bool,
    },

    /// Run one command line and print its captured output
    Exec {
        /// Command line, passed to the shell as-is
        command: String,

        /// Timeout in seconds (default: the configured command timeout)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show the resolved configuration and which tools were found
    Doctor,
}

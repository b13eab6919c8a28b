//! Storage harness - integration tests for the gcloud storage CLI
//!
//! The reusable core is the command runner (spawn a shell command line,
//! capture merged output within a timeout) and the expectation engine
//! (declarative checks over that output). The built-in scenarios and the
//! YAML scenario runner are thin layers on top.

pub mod browser;
pub mod cli;
pub mod commands;
pub mod common;
pub mod expect;
pub mod runner;
pub mod scenarios;
pub mod storage;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Config, Error, Result};
pub use expect::{Expectation, Predicate, Verdict};
pub use runner::{CapturedOutput, CommandInvocation, CommandRunner};

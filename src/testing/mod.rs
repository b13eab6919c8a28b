//! Declarative test scenarios
//!
//! Reads YAML scenario files whose steps run shell commands, write
//! fixture files and load pages, with expectations checked after each
//! step. Values extracted from one step can be used in later ones.

mod config;
mod runner;

pub use config::*;
pub use runner::{parse_scenario, run_parsed, run_scenario, ScenarioEnv, TestResult};

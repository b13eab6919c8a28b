//! Test scenario configuration types
//!
//! Defines the data structures for deserializing YAML test scenarios.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Deserialize;

use crate::common::{Error, Result};
use crate::expect::{compile_pattern, Expectation, Predicate};

/// A complete test scenario loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct TestScenario {
    /// Name of the test scenario
    pub name: String,
    /// Optional description of what the test verifies
    pub description: Option<String>,
    /// Optional setup steps to run before the test (e.g., creating fixtures)
    pub setup: Option<Vec<SetupStep>>,
    /// The sequence of test steps to execute
    pub steps: Vec<TestStep>,
}

/// A setup step that runs before the test
#[derive(Deserialize, Debug)]
pub struct SetupStep {
    /// Shell command to execute
    pub shell: String,
}

/// A single test step in the execution flow
#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Run a shell command line
    Run {
        /// The command line (e.g., "gcloud storage ls gs://bucket/")
        command: String,
        /// Timeout in seconds (default: the configured command timeout)
        timeout: Option<u64>,
        /// Expectations on the captured output
        expect: Option<Vec<OutputExpectation>>,
    },
    /// Write a local fixture file
    WriteFile {
        /// Path relative to the scenario file
        path: String,
        /// File contents
        contents: String,
    },
    /// Load a URL in the headless browser
    Browse {
        /// URL to navigate to, usually a `${variable}` from an extract
        url: String,
        /// Navigation timeout in seconds (default: the configured one)
        timeout: Option<u64>,
        /// Expectations on the rendered page
        expect: Option<Vec<OutputExpectation>>,
    },
}

/// Expectations for a command's output or a rendered page
///
/// Every field that is set becomes one check; all of them must pass.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct OutputExpectation {
    /// Substring that must be present
    pub contains: Option<String>,
    /// Substring that must be absent
    pub not_contains: Option<String>,
    /// Substring that must be present, ignoring case
    pub contains_ignore_case: Option<String>,
    /// At least one of these must be present, ignoring case
    pub contains_any: Option<Vec<String>>,
    /// None of these may be present, ignoring case
    pub not_contains_any: Option<Vec<String>>,
    /// Regex that must match; group 1 is extracted if present
    pub extract: Option<String>,
    /// Variable name receiving the extracted text
    pub into: Option<String>,
    /// Expected process exit code
    pub exit_code: Option<i32>,
    /// Message reported when a check fails
    pub message: Option<String>,
}

impl OutputExpectation {
    /// Build the expectations this entry describes, substituting variables
    pub fn to_expectations(&self, vars: &HashMap<String, String>) -> Result<Vec<Expectation>> {
        let mut predicates = Vec::new();

        if let Some(needle) = &self.contains {
            predicates.push(Predicate::Contains(substitute(needle, vars)?));
        }
        if let Some(needle) = &self.not_contains {
            predicates.push(Predicate::NotContains(substitute(needle, vars)?));
        }
        if let Some(needle) = &self.contains_ignore_case {
            predicates.push(Predicate::ContainsIgnoreCase(substitute(needle, vars)?));
        }
        if let Some(needles) = &self.contains_any {
            predicates.push(Predicate::ContainsAny(substitute_all(needles, vars)?));
        }
        if let Some(needles) = &self.not_contains_any {
            predicates.push(Predicate::NotContainsAny(substitute_all(needles, vars)?));
        }
        if let Some(pattern) = &self.extract {
            predicates.push(Predicate::Extract(compile_pattern(pattern)?));
        } else if self.into.is_some() {
            return Err(Error::Config("'into' requires an 'extract' pattern".to_string()));
        }
        if let Some(code) = self.exit_code {
            predicates.push(Predicate::ExitCode(code));
        }

        if predicates.is_empty() {
            return Err(Error::Config("Empty expectation".to_string()));
        }

        Ok(predicates
            .into_iter()
            .map(|p| match &self.message {
                Some(message) => Expectation::new(p, message.clone()),
                None => Expectation::described(p),
            })
            .collect())
    }
}

static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("variable pattern is valid"));

/// Replace `${name}` placeholders with extracted values
///
/// An unknown variable is an error rather than an empty string.
pub fn substitute(template: &str, vars: &HashMap<String, String>) -> Result<String> {
    let mut missing = None;
    let replaced = VARIABLE.replace_all(template, |caps: &Captures<'_>| {
        let name = &caps[1];
        match vars.get(name) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(Error::Config(format!("Unknown variable '${{{}}}'", name))),
        None => Ok(replaced.into_owned()),
    }
}

fn substitute_all(templates: &[String], vars: &HashMap<String, String>) -> Result<Vec<String>> {
    templates.iter().map(|t| substitute(t, vars)).collect()
}

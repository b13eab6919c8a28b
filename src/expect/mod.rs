//! Expectation engine
//!
//! Plain predicates over captured text, plus an `Expectation` value that
//! pairs a predicate with the message shown when it fails. Nothing here has
//! side effects.
//!
//! Assertions are made on output text, not exit status. The exit code is
//! still captured and `Predicate::ExitCode` is available where a stronger
//! check is wanted.

use std::sync::LazyLock;

use regex::Regex;

use crate::common::{Error, Result};
use crate::runner::CapturedOutput;

/// Markers in `buckets create` output that count as success
pub const BUCKET_CREATED_MARKERS: &[&str] = &["creating", "created", "already exists"];

/// Page text that indicates a browser interstitial instead of the object
pub const BROWSER_WARNING_MARKERS: &[&str] = &["phishing", "warning", "deceptive site"];

/// Signed URLs produced by `gcloud storage sign-url`
pub static SIGNED_URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://storage\.googleapis\.com[^\s]+").expect("signed URL pattern is valid")
});

/// Case-insensitive substring check
pub fn contains_ignore_case(text: &str, needle: &str) -> bool {
    text.to_lowercase().contains(&needle.to_lowercase())
}

/// True when any needle occurs in the text, ignoring case
pub fn contains_any<S: AsRef<str>>(text: &str, needles: &[S]) -> bool {
    let haystack = text.to_lowercase();
    needles
        .iter()
        .any(|n| haystack.contains(&n.as_ref().to_lowercase()))
}

/// Literal substring absence
pub fn not_contains(text: &str, needle: &str) -> bool {
    !text.contains(needle)
}

/// Compile a user-supplied pattern
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Config(format!("Invalid pattern '{}': {}", pattern, e)))
}

/// First match of `pattern` in `text`
///
/// Returns capture group 1 when the pattern has one, the whole match
/// otherwise. `None` when nothing matches.
pub fn extract_first_match(text: &str, pattern: &Regex) -> Option<String> {
    let caps = pattern.captures(text)?;
    caps.get(1)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty())
}

/// All non-overlapping matches of `pattern` in `text`
pub fn find_all_matches(text: &str, pattern: &Regex) -> Vec<String> {
    pattern
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Like `extract_first_match`, but a miss is an `Error::Extraction`
pub fn require_match(text: &str, pattern: &Regex, what: &str) -> Result<String> {
    extract_first_match(text, pattern).ok_or_else(|| Error::extraction(what))
}

/// What an expectation checks
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Literal substring is present
    Contains(String),
    /// Literal substring is absent
    NotContains(String),
    /// Substring is present, ignoring case
    ContainsIgnoreCase(String),
    /// At least one needle is present, ignoring case
    ContainsAny(Vec<String>),
    /// No needle is present, ignoring case
    NotContainsAny(Vec<String>),
    /// Pattern matches; the match is handed back to the caller
    Extract(Regex),
    /// Process exited with this code
    ExitCode(i32),
}

impl Predicate {
    fn describe(&self) -> String {
        match self {
            Predicate::Contains(n) => format!("output contains '{}'", n),
            Predicate::NotContains(n) => format!("output does not contain '{}'", n),
            Predicate::ContainsIgnoreCase(n) => format!("output contains '{}' (any case)", n),
            Predicate::ContainsAny(ns) => format!("output contains any of {:?}", ns),
            Predicate::NotContainsAny(ns) => format!("output contains none of {:?}", ns),
            Predicate::Extract(re) => format!("output matches /{}/", re.as_str()),
            Predicate::ExitCode(code) => format!("exit code is {}", code),
        }
    }
}

/// A predicate plus the message reported when it fails
#[derive(Debug, Clone)]
pub struct Expectation {
    pub predicate: Predicate,
    pub message: String,
}

/// Outcome of evaluating one expectation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    /// Failure message when failed, a description of the check when passed
    pub message: String,
    /// Text pulled out by an `Extract` predicate
    pub extracted: Option<String>,
    extraction: bool,
}

impl Verdict {
    /// Convert into a `Result`, surfacing the failure message verbatim
    ///
    /// A failed `Extract` becomes `Error::Extraction`, everything else
    /// `Error::Assertion`.
    pub fn into_result(self) -> Result<Option<String>> {
        if self.passed {
            Ok(self.extracted)
        } else if self.extraction {
            Err(Error::Extraction {
                message: self.message,
            })
        } else {
            Err(Error::Assertion(self.message))
        }
    }
}

impl Expectation {
    pub fn new(predicate: Predicate, message: impl Into<String>) -> Self {
        Self {
            predicate,
            message: message.into(),
        }
    }

    /// Expectation with a message generated from the predicate
    pub fn described(predicate: Predicate) -> Self {
        let message = format!("Expected {}", predicate.describe());
        Self { predicate, message }
    }

    pub fn contains(needle: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Predicate::Contains(needle.into()), message)
    }

    pub fn not_contains(needle: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Predicate::NotContains(needle.into()), message)
    }

    pub fn contains_any<S: AsRef<str>>(needles: &[S], message: impl Into<String>) -> Self {
        let needles = needles.iter().map(|n| n.as_ref().to_string()).collect();
        Self::new(Predicate::ContainsAny(needles), message)
    }

    pub fn not_contains_any<S: AsRef<str>>(needles: &[S], message: impl Into<String>) -> Self {
        let needles = needles.iter().map(|n| n.as_ref().to_string()).collect();
        Self::new(Predicate::NotContainsAny(needles), message)
    }

    pub fn extract(pattern: Regex, message: impl Into<String>) -> Self {
        Self::new(Predicate::Extract(pattern), message)
    }

    /// Evaluate against bare text; `ExitCode` is unknown here and fails
    pub fn evaluate_text(&self, text: &str) -> Verdict {
        self.evaluate_parts(text, None)
    }

    /// Evaluate against a finished command's output
    pub fn evaluate(&self, output: &CapturedOutput) -> Verdict {
        self.evaluate_parts(&output.text, output.exit_code)
    }

    /// Evaluate and convert to a `Result` in one go
    pub fn check(&self, output: &CapturedOutput) -> Result<Option<String>> {
        self.evaluate(output).into_result()
    }

    fn evaluate_parts(&self, text: &str, exit_code: Option<i32>) -> Verdict {
        let mut extracted = None;
        let passed = match &self.predicate {
            Predicate::Contains(n) => text.contains(n.as_str()),
            Predicate::NotContains(n) => not_contains(text, n),
            Predicate::ContainsIgnoreCase(n) => contains_ignore_case(text, n),
            Predicate::ContainsAny(ns) => contains_any(text, ns.as_slice()),
            Predicate::NotContainsAny(ns) => !contains_any(text, ns.as_slice()),
            Predicate::Extract(re) => {
                extracted = extract_first_match(text, re);
                extracted.is_some()
            }
            Predicate::ExitCode(code) => exit_code == Some(*code),
        };

        let message = if passed {
            self.predicate.describe()
        } else {
            self.message.clone()
        };

        Verdict {
            passed,
            message,
            extracted,
            extraction: matches!(self.predicate, Predicate::Extract(_)),
        }
    }
}

//! Per-scenario reports

use std::time::Duration;

use serde::Serialize;

use crate::common::Error;

/// Result of one scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub passed: bool,
    /// Error category, see `Error::kind`
    pub error_kind: Option<&'static str>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl ScenarioReport {
    pub fn pass(name: &str, elapsed: Duration) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            error_kind: None,
            error: None,
            elapsed_ms: millis(elapsed),
        }
    }

    pub fn fail(name: &str, error: &Error, elapsed: Duration) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            error_kind: Some(error.kind()),
            error: Some(error.to_string()),
            elapsed_ms: millis(elapsed),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Totals over a run
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
}

impl Summary {
    pub fn of(reports: &[ScenarioReport]) -> Self {
        let passed = reports.iter().filter(|r| r.passed).count();
        Self {
            passed,
            failed: reports.len() - passed,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let reports = vec![
            ScenarioReport::pass("a", Duration::from_millis(3)),
            ScenarioReport::fail("b", &Error::Assertion("nope".into()), Duration::ZERO),
            ScenarioReport::pass("c", Duration::ZERO),
        ];
        let summary = Summary::of(&reports);
        assert_eq!(summary, Summary { passed: 2, failed: 1 });
        assert!(!summary.all_passed());
        assert_eq!(reports[1].error_kind, Some("ASSERTION_FAILURE"));
        assert_eq!(reports[1].error.as_deref(), Some("nope"));
    }

    #[test]
    fn test_report_serializes_to_json() {
        let report = ScenarioReport::pass("sign_url", Duration::from_millis(42));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["name"], "sign_url");
        assert_eq!(json["passed"], true);
        assert_eq!(json["elapsed_ms"], 42);
    }
}

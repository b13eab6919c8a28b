//! Test runner implementation
//!
//! Executes YAML test scenarios step by step through the command runner
//! and the browser driver, evaluating expectations after each step.

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use colored::Colorize;

use crate::browser::BrowserDriver;
use crate::common::{Error, Result};
use crate::expect::Expectation;
use crate::runner::{CapturedOutput, CommandInvocation, CommandRunner};

use super::config::{substitute, OutputExpectation, TestScenario, TestStep};

/// Result of a test run
#[derive(Debug, serde::Serialize)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub steps_run: usize,
    pub steps_total: usize,
    /// Error category, see `Error::kind`
    pub error_kind: Option<&'static str>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl TestResult {
    fn finish(
        scenario: &TestScenario,
        steps_run: usize,
        error: Option<&Error>,
        started: Instant,
    ) -> Self {
        Self {
            name: scenario.name.clone(),
            passed: error.is_none(),
            steps_run,
            steps_total: scenario.steps.len(),
            error_kind: error.map(Error::kind),
            error: error.map(|e| e.to_string()),
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Collaborators a scenario file runs against
pub struct ScenarioEnv<'a> {
    pub runner: &'a CommandRunner,
    pub browser: Option<&'a dyn BrowserDriver>,
    pub navigation_timeout: Duration,
}

/// Parse a scenario from YAML text
pub fn parse_scenario(content: &str) -> Result<TestScenario> {
    Ok(serde_yaml::from_str(content)?)
}

/// Run a test scenario from a YAML file
///
/// Commands run in the directory containing the scenario file, and
/// `write_file` paths are relative to it.
pub async fn run_scenario(path: &Path, env: &ScenarioEnv<'_>, verbose: bool) -> Result<TestResult> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    let scenario = parse_scenario(&content)?;

    let scenario_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    run_parsed(&scenario, scenario_dir, env, verbose).await
}

/// Run an already parsed scenario rooted at `dir`
pub async fn run_parsed(
    scenario: &TestScenario,
    dir: &Path,
    env: &ScenarioEnv<'_>,
    verbose: bool,
) -> Result<TestResult> {
    let started = Instant::now();
    let steps_total = scenario.steps.len();
    let runner = env.runner.clone().with_working_dir(dir);

    println!(
        "\n{} {}",
        "Running Test:".blue().bold(),
        scenario.name.white().bold()
    );

    if let Some(desc) = &scenario.description {
        println!("  {}", desc.dimmed());
    }

    // Run setup steps
    if let Some(setup_steps) = &scenario.setup {
        println!("\n{}", "Setup:".cyan());
        for step in setup_steps {
            if verbose {
                println!("  $ {}", step.shell.dimmed());
            }

            let output = runner.run(&step.shell, None).await?;
            if verbose && !output.is_empty() {
                println!("{}", indent(&output.text).dimmed());
            }

            if !output.success() {
                let err = Error::Assertion(format!(
                    "Setup command '{}' failed with exit code {:?}",
                    step.shell, output.exit_code
                ));
                return Ok(TestResult::finish(scenario, 0, Some(&err), started));
            }
            println!("  {} {}", "✓".green(), step.shell.dimmed());
        }
    }

    // Execute test steps
    println!("\n{}", "Steps:".cyan());

    let mut vars = HashMap::new();
    for (i, step) in scenario.steps.iter().enumerate() {
        let step_num = i + 1;

        if let Err(e) = execute_step(&runner, env, dir, step, &mut vars, step_num, verbose).await {
            println!("  {} Step {}: {}", "✗".red(), step_num, e);

            return Ok(TestResult::finish(scenario, step_num, Some(&e), started));
        }
    }

    println!(
        "\n{} {}\n",
        "✓".green().bold(),
        "Test Passed".green().bold()
    );

    Ok(TestResult::finish(scenario, steps_total, None, started))
}

/// Execute a single test step
async fn execute_step(
    runner: &CommandRunner,
    env: &ScenarioEnv<'_>,
    dir: &Path,
    step: &TestStep,
    vars: &mut HashMap<String, String>,
    step_num: usize,
    verbose: bool,
) -> Result<()> {
    match step {
        TestStep::Run {
            command,
            timeout,
            expect,
        } => {
            execute_run_step(runner, command, *timeout, expect.as_deref(), vars, step_num, verbose)
                .await
        }
        TestStep::WriteFile { path, contents } => {
            let path = substitute(path, vars)?;
            let contents = substitute(contents, vars)?;
            std::fs::write(dir.join(&path), format!("{}\n", contents))?;
            println!("  {} Step {}: write {}", "✓".green(), step_num, path.dimmed());
            Ok(())
        }
        TestStep::Browse {
            url,
            timeout,
            expect,
        } => execute_browse_step(env, url, *timeout, expect.as_deref(), vars, step_num, verbose).await,
    }
}

/// Execute a run step
async fn execute_run_step(
    runner: &CommandRunner,
    command: &str,
    timeout: Option<u64>,
    expect: Option<&[OutputExpectation]>,
    vars: &mut HashMap<String, String>,
    step_num: usize,
    verbose: bool,
) -> Result<()> {
    let command = substitute(command, vars)?;
    let mut invocation = CommandInvocation::new(command.as_str());
    if let Some(secs) = timeout {
        invocation = invocation.timeout(Duration::from_secs(secs));
    }

    let output = runner.run_invocation(&invocation).await?;
    if verbose {
        println!("  $ {}", command.dimmed());
        if !output.is_empty() {
            println!("{}", indent(&output.text).dimmed());
        }
    }

    check_all(expect, &output, vars)?;

    println!(
        "  {} Step {}: {}",
        "✓".green(),
        step_num,
        command.dimmed()
    );
    Ok(())
}

/// Execute a browse step
async fn execute_browse_step(
    env: &ScenarioEnv<'_>,
    url: &str,
    timeout: Option<u64>,
    expect: Option<&[OutputExpectation]>,
    vars: &mut HashMap<String, String>,
    step_num: usize,
    verbose: bool,
) -> Result<()> {
    let browser = env
        .browser
        .ok_or_else(|| Error::Config("Scenario needs a browser but none is available".to_string()))?;

    let url = substitute(url, vars)?;
    let timeout = timeout
        .map(Duration::from_secs)
        .unwrap_or(env.navigation_timeout);

    let page = browser.fetch_page(&url, timeout).await?;
    if verbose {
        println!("{}", indent(&page).dimmed());
    }

    // Pages have no exit code; report them as a clean exit
    let output = CapturedOutput {
        text: page,
        exit_code: Some(0),
        elapsed: Duration::ZERO,
    };
    check_all(expect, &output, vars)?;

    println!("  {} Step {}: browse {}", "✓".green(), step_num, url.dimmed());
    Ok(())
}

/// Evaluate every expectation, storing extracted values in `vars`
fn check_all(
    expect: Option<&[OutputExpectation]>,
    output: &CapturedOutput,
    vars: &mut HashMap<String, String>,
) -> Result<()> {
    for entry in expect.unwrap_or_default() {
        let expectations: Vec<Expectation> = entry.to_expectations(vars)?;
        for expectation in &expectations {
            let extracted = expectation.check(output)?;
            if let (Some(name), Some(value)) = (&entry.into, extracted) {
                vars.insert(name.clone(), value);
            }
        }
    }
    Ok(())
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|l| format!("    {}", l))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoPage;

    #[async_trait]
    impl BrowserDriver for EchoPage {
        async fn fetch_page(&self, url: &str, _timeout: Duration) -> Result<String> {
            Ok(format!("<html><body>loaded {}</body></html>", url))
        }
    }

    fn sh() -> CommandRunner {
        CommandRunner::new("/bin/sh", Duration::from_secs(10))
    }

    async fn run_yaml(yaml: &str, browser: Option<&dyn BrowserDriver>) -> TestResult {
        let dir = tempfile::tempdir().unwrap();
        let runner = sh();
        let env = ScenarioEnv {
            runner: &runner,
            browser,
            navigation_timeout: Duration::from_secs(5),
        };
        let scenario = parse_scenario(yaml).unwrap();
        run_parsed(&scenario, dir.path(), &env, false).await.unwrap()
    }

    #[tokio::test]
    async fn test_write_then_list_passes() {
        let result = run_yaml(
            r#"
name: write and list
steps:
  - action: write_file
    path: listed.txt
    contents: Temporary file
  - action: run
    command: ls
    expect:
      - contains: listed.txt
      - exit_code: 0
"#,
            None,
        )
        .await;
        assert!(result.passed, "{:?}", result.error);
        assert_eq!(result.steps_run, 2);
    }

    #[tokio::test]
    async fn test_failed_expectation_stops_at_step() {
        let result = run_yaml(
            r#"
name: absent
steps:
  - action: run
    command: "echo gs://b/test-file-to-delete.txt"
    expect:
      - not_contains: test-file-to-delete.txt
        message: File deletion failed.
  - action: run
    command: "true"
"#,
            None,
        )
        .await;
        assert!(!result.passed);
        assert_eq!(result.steps_run, 1);
        assert_eq!(result.steps_total, 2);
        assert_eq!(result.error.as_deref(), Some("File deletion failed."));
        assert_eq!(result.error_kind, Some("ASSERTION_FAILURE"));
    }

    #[tokio::test]
    async fn test_extract_feeds_browse_step() {
        let result = run_yaml(
            r#"
name: signed url
steps:
  - action: run
    command: "echo 'signed_url: https://storage.googleapis.com/b/o?sig=1'"
    expect:
      - extract: "https://storage\\.googleapis\\.com\\S+"
        into: url
  - action: browse
    url: "${url}"
    expect:
      - contains: "loaded https://storage.googleapis.com/b/o?sig=1"
      - not_contains_any: [phishing, warning, "deceptive site"]
"#,
            Some(&EchoPage),
        )
        .await;
        assert!(result.passed, "{:?}", result.error);
    }

    #[tokio::test]
    async fn test_failed_extract_reports_custom_message() {
        let result = run_yaml(
            r#"
name: no url
steps:
  - action: run
    command: "echo 'ERROR: (gcloud.storage.sign-url) permission denied'"
    expect:
      - extract: "https://storage\\.googleapis\\.com\\S+"
        into: url
        message: Failed to extract the signed URL from the command output.
"#,
            None,
        )
        .await;
        assert!(!result.passed);
        assert_eq!(result.error_kind, Some("EXTRACTION_ERROR"));
        assert_eq!(
            result.error.as_deref(),
            Some("Failed to extract the signed URL from the command output.")
        );
    }

    #[tokio::test]
    async fn test_browse_without_browser_fails() {
        let result = run_yaml(
            "name: b\nsteps:\n  - action: browse\n    url: https://example.com\n",
            None,
        )
        .await;
        assert!(!result.passed);
        assert!(result.error.unwrap().contains("browser"));
    }

    #[tokio::test]
    async fn test_failing_setup_reports_exit_code() {
        let result = run_yaml(
            "name: s\nsetup:\n  - shell: \"exit 4\"\nsteps:\n  - action: run\n    command: \"true\"\n",
            None,
        )
        .await;
        assert!(!result.passed);
        assert_eq!(result.steps_run, 0);
        assert!(result.error.unwrap().contains("Some(4)"));
    }

    #[tokio::test]
    async fn test_run_step_timeout_fails_step() {
        let result = run_yaml(
            "name: t\nsteps:\n  - action: run\n    command: \"sleep 5\"\n    timeout: 1\n",
            None,
        )
        .await;
        assert!(!result.passed);
        assert!(result.error.unwrap().contains("timed out"));
    }
}

//! CLI command handling
//!
//! Dispatches CLI commands and formats their reports.

use std::path::PathBuf;
use std::time::Duration;

use colored::Colorize;

use crate::browser::{BrowserDriver, HeadlessChrome};
use crate::commands::Commands;
use crate::common::config::CREDENTIALS_ENV;
use crate::common::{Config, Result};
use crate::runner::CommandRunner;
use crate::scenarios::{Scenario, ScenarioReport, Suite, Summary};
use crate::storage::StorageCli;
use crate::testing::{self, ScenarioEnv};

/// Dispatch a CLI command
///
/// Returns whether everything that ran passed.
pub async fn dispatch(command: Commands, config: &Config) -> Result<bool> {
    let runner = CommandRunner::from_config(config);

    match command {
        Commands::Suite {
            only,
            skip_browser,
            json,
        } => {
            let selected: Vec<Scenario> = if only.is_empty() {
                Scenario::ALL.to_vec()
            } else {
                only
            };
            let selected: Vec<Scenario> = selected
                .into_iter()
                .filter(|s| !(skip_browser && s.needs_browser()))
                .collect();

            let browser = if selected.iter().any(|s| s.needs_browser()) {
                Some(make_browser(config, &runner)?)
            } else {
                None
            };

            if config.storage_cli_path().is_none() {
                tracing::warn!(cli = %config.storage.cli, "Storage CLI not found on PATH");
            }

            let storage = StorageCli::from_config(config, runner);
            let suite = Suite::new(config, storage, browser);
            let reports = suite.run(&selected).await;
            let summary = Summary::of(&reports);

            if json {
                let doc = serde_json::json!({ "reports": reports, "summary": summary });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                print_reports(suite.bucket(), &reports, summary);
            }

            Ok(summary.all_passed())
        }

        Commands::Test { paths, verbose } => {
            let browser = match make_browser(config, &runner) {
                Ok(browser) => Some(browser),
                Err(e) => {
                    tracing::debug!(error = %e, "No headless browser, browse steps will fail");
                    None
                }
            };
            let env = ScenarioEnv {
                runner: &runner,
                browser: browser.as_deref(),
                navigation_timeout: config.timeouts.navigation(),
            };

            let mut all_passed = true;
            for path in &paths {
                let result = testing::run_scenario(path, &env, verbose).await?;
                if !result.passed {
                    all_passed = false;
                    println!(
                        "\n{} {}: {}\n",
                        "✗ Test Failed".red().bold(),
                        result.name,
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            Ok(all_passed)
        }

        Commands::Exec { command, timeout } => {
            let output = runner
                .run(&command, timeout.map(Duration::from_secs))
                .await?;
            if !output.is_empty() {
                println!("{}", output.text);
            }
            tracing::info!(
                exit_code = ?output.exit_code,
                elapsed_ms = output.elapsed.as_millis() as u64,
                "Command finished"
            );
            Ok(output.success())
        }

        Commands::Doctor => {
            print_doctor(config);
            Ok(true)
        }
    }
}

fn make_browser(config: &Config, runner: &CommandRunner) -> Result<Box<dyn BrowserDriver>> {
    let chrome = HeadlessChrome::from_config(config, runner.clone())?;
    tracing::debug!(program = %chrome.program().display(), "Using headless browser");
    Ok(Box::new(chrome))
}

fn print_reports(bucket: &str, reports: &[ScenarioReport], summary: Summary) {
    println!("\n{} {}", "Bucket:".blue().bold(), bucket.white().bold());
    for report in reports {
        if report.passed {
            println!(
                "  {} {} {}",
                "✓".green(),
                report.name,
                format!("({}ms)", report.elapsed_ms).dimmed()
            );
        } else {
            println!(
                "  {} {} {}",
                "✗".red(),
                report.name,
                format!("({}ms)", report.elapsed_ms).dimmed()
            );
            if let Some(error) = &report.error {
                println!("      {}", error.red());
            }
        }
    }

    let line = format!("{} passed, {} failed", summary.passed, summary.failed);
    if summary.all_passed() {
        println!("\n{}\n", line.green().bold());
    } else {
        println!("\n{}\n", line.red().bold());
    }
}

fn print_doctor(config: &Config) {
    let found = |p: Option<PathBuf>| match p {
        Some(path) => path.display().to_string().green(),
        None => "not found".red(),
    };

    println!("{}", "Storage harness".blue().bold());
    println!("  Shell:          {}", config.shell.program);
    println!(
        "  Storage CLI:    {} -> {}",
        config.storage.cli,
        found(config.storage_cli_path())
    );
    println!("  Browser:        {}", found(config.browser.resolve()));
    match &config.credentials_path {
        Some(path) if path.exists() => {
            println!("  Credentials:    {}", path.display().to_string().green())
        }
        Some(path) => println!(
            "  Credentials:    {} {}",
            path.display(),
            "(missing)".red()
        ),
        None => println!("  Credentials:    {} ({} unset)", "none".yellow(), CREDENTIALS_ENV),
    }
    println!("  Bucket:         {}", config.storage.bucket);
    println!("  Location:       {}", config.storage.location);
    println!(
        "  Timeouts:       command {}s, navigation {}s",
        config.timeouts.command_secs, config.timeouts.navigation_secs
    );
    println!("  Fixtures dir:   {}", config.fixtures.dir().display());
}

//! Headless browser driver
//!
//! The harness only needs two things from a browser: load a URL within a
//! time bound and hand back the rendered page. `HeadlessChrome` gets that
//! from Chromium's `--dump-dom` mode through the command runner.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::common::{Config, Error, Result};
use crate::expect::{Expectation, BROWSER_WARNING_MARKERS};
use crate::runner::CommandRunner;

/// Anything that can load a page and return its rendered content
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate to `url`, giving up after `timeout`, and return page text
    async fn fetch_page(&self, url: &str, timeout: Duration) -> Result<String>;
}

/// Quote a value for a POSIX shell command line
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Chromium/Chrome in headless mode
#[derive(Debug, Clone)]
pub struct HeadlessChrome {
    program: PathBuf,
    runner: CommandRunner,
}

impl HeadlessChrome {
    pub fn new(program: impl Into<PathBuf>, runner: CommandRunner) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    /// Build from configuration, searching PATH when no browser is configured
    pub fn from_config(config: &Config, runner: CommandRunner) -> Result<Self> {
        let program = config.browser.resolve().ok_or_else(|| {
            Error::Config(
                "No headless browser found. Set [browser] program in the config file".to_string(),
            )
        })?;
        Ok(Self::new(program, runner))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command_line(&self, url: &str, timeout: Duration) -> String {
        // stderr is dropped: Chromium logs there and its noise must not
        // be mistaken for page content
        format!(
            "{} --headless --disable-gpu --no-first-run --timeout={} --dump-dom {} 2>/dev/null",
            shell_quote(&self.program.to_string_lossy()),
            timeout.as_millis(),
            shell_quote(url)
        )
    }
}

#[async_trait]
impl BrowserDriver for HeadlessChrome {
    async fn fetch_page(&self, url: &str, timeout: Duration) -> Result<String> {
        tracing::debug!(url, "Navigating");

        // Leave the browser a moment past its own timeout to exit cleanly
        let hard_limit = timeout + Duration::from_secs(1);
        let output = match self
            .runner
            .run(&self.command_line(url, timeout), Some(hard_limit))
            .await
        {
            Ok(output) => output,
            Err(Error::CommandTimeout { .. }) => {
                tracing::warn!(url, "Navigation timeout: possible phishing warning or slow network");
                return Err(Error::navigation(
                    url,
                    format!("timed out after {}ms", timeout.as_millis()),
                ));
            }
            Err(e) => return Err(e),
        };

        if !output.success() {
            return Err(Error::navigation(
                url,
                format!("browser exited with code {:?}", output.exit_code),
            ));
        }

        Ok(output.text)
    }
}

/// Load a signed URL and fail if the browser shows a security interstitial
pub async fn check_signed_url(
    driver: &dyn BrowserDriver,
    url: &str,
    timeout: Duration,
) -> Result<()> {
    let page = driver.fetch_page(url, timeout).await?;
    Expectation::not_contains_any(
        BROWSER_WARNING_MARKERS,
        "Signed URL triggered a phishing warning in Chrome.",
    )
    .evaluate_text(&page)
    .into_result()?;

    tracing::info!("Signed URL is accessible without phishing warnings");
    Ok(())
}

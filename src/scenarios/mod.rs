//! Built-in storage scenarios
//!
//! Setup provisions a known bucket and object, then each scenario drives
//! the storage CLI and checks its output. Scenarios are independent: a
//! failure is recorded in its report and the next scenario still runs.
//!
//! Fixture files and buckets created here are left in place after the run.

mod report;

pub use report::{ScenarioReport, Summary};

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::browser::{check_signed_url, BrowserDriver};
use crate::common::{Config, Error, Result};
use crate::expect::{require_match, Expectation, BUCKET_CREATED_MARKERS, SIGNED_URL_PATTERN};
use crate::storage::{Provisioned, StorageCli};

/// Name under which the setup phase is reported
pub const SETUP: &str = "setup";

/// Contents of the object the signed-URL scenarios sign
const SIGNED_URL_FIXTURE: &str = "Sample test file for signed URL test";

/// Write a local fixture file, returning its path
pub fn write_fixture(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, format!("{}\n", contents))?;
    tracing::debug!(path = %path.display(), "Wrote fixture file");
    Ok(path)
}

/// The scenarios shipped with the harness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    SignUrlSecurity,
    SignUrl,
    CreateBucket,
    UploadFile,
    ListFiles,
    DeleteFile,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Scenario::SignUrlSecurity,
        Scenario::SignUrl,
        Scenario::CreateBucket,
        Scenario::UploadFile,
        Scenario::ListFiles,
        Scenario::DeleteFile,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::SignUrlSecurity => "sign_url_security",
            Scenario::SignUrl => "sign_url",
            Scenario::CreateBucket => "create_bucket",
            Scenario::UploadFile => "upload_file",
            Scenario::ListFiles => "list_files",
            Scenario::DeleteFile => "delete_file",
        }
    }

    /// Whether the scenario needs a browser driver
    pub fn needs_browser(self) -> bool {
        matches!(self, Scenario::SignUrlSecurity)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.replace('-', "_");
        Scenario::ALL
            .into_iter()
            .find(|sc| sc.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<_> = Scenario::ALL.iter().map(|s| s.name()).collect();
                format!("unknown scenario '{}', expected one of: {}", s, names.join(", "))
            })
    }
}

/// Runs the built-in scenarios against one bucket
pub struct Suite {
    storage: StorageCli,
    browser: Option<Box<dyn BrowserDriver>>,
    bucket: String,
    fixture_object: String,
    fixtures_dir: PathBuf,
    navigation_timeout: Duration,
}

impl Suite {
    pub fn new(config: &Config, storage: StorageCli, browser: Option<Box<dyn BrowserDriver>>) -> Self {
        Self {
            storage,
            browser,
            bucket: config.storage.bucket.clone(),
            fixture_object: config.storage.fixture_object.clone(),
            fixtures_dir: config.fixtures.dir(),
            navigation_timeout: config.timeouts.navigation(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Run setup, then every selected scenario in order
    ///
    /// A failed setup is reported but does not stop the scenarios.
    pub async fn run(&self, selected: &[Scenario]) -> Vec<ScenarioReport> {
        let mut reports = Vec::with_capacity(selected.len() + 1);
        reports.push(timed(SETUP, self.setup()).await);
        for &scenario in selected {
            reports.push(self.run_scenario(scenario).await);
        }
        reports
    }

    pub async fn run_scenario(&self, scenario: Scenario) -> ScenarioReport {
        let name = scenario.name();
        match scenario {
            Scenario::SignUrlSecurity => timed(name, self.sign_url_security()).await,
            Scenario::SignUrl => timed(name, self.sign_url()).await,
            Scenario::CreateBucket => timed(name, self.create_bucket()).await,
            Scenario::UploadFile => timed(name, self.upload_file()).await,
            Scenario::ListFiles => timed(name, self.list_files()).await,
            Scenario::DeleteFile => timed(name, self.delete_file()).await,
        }
    }

    /// Make sure the shared bucket and the signed-URL object exist
    pub async fn setup(&self) -> Result<()> {
        if let Provisioned::Created(output) = self.storage.ensure_bucket(&self.bucket).await? {
            Expectation::contains_any(BUCKET_CREATED_MARKERS, "Bucket creation failed.")
                .check(&output)?;
        }

        let dir = self.fixtures_dir.clone();
        let object = self.fixture_object.clone();
        self.storage
            .ensure_object(&self.bucket, &self.fixture_object, move || {
                write_fixture(&dir, &object, SIGNED_URL_FIXTURE).map(|_| ())
            })
            .await?;

        Ok(())
    }

    async fn sign_url_security(&self) -> Result<()> {
        let browser = self.browser.as_deref().ok_or_else(|| {
            Error::Config("No browser driver available for the signed URL check".to_string())
        })?;

        let output = self
            .storage
            .sign_url(&self.bucket, &self.fixture_object)
            .await?;
        tracing::debug!(output = %output.text, "Raw signed URL output");

        let url = require_match(&output.text, &SIGNED_URL_PATTERN, "the signed URL")?;
        tracing::info!(url = %url, "Extracted signed URL");

        check_signed_url(browser, &url, self.navigation_timeout).await
    }

    async fn sign_url(&self) -> Result<()> {
        let output = self
            .storage
            .sign_url(&self.bucket, &self.fixture_object)
            .await?;
        tracing::debug!(output = %output.text, "Signed URL output");

        Expectation::contains("https://", "Signed URL not generated correctly.").check(&output)?;
        Ok(())
    }

    async fn create_bucket(&self) -> Result<()> {
        let bucket = fresh_bucket_name();
        tracing::info!(bucket = %bucket, "Attempting to create bucket");

        let output = self.storage.create_bucket(&bucket).await?;
        tracing::debug!(output = %output.text, "Create bucket output");

        Expectation::contains_any(BUCKET_CREATED_MARKERS, "Bucket creation failed.")
            .check(&output)?;
        Ok(())
    }

    async fn upload_file(&self) -> Result<()> {
        let file = "test-file-2.txt";
        let path = write_fixture(&self.fixtures_dir, file, "Test content")?;
        if !path.exists() {
            return Err(Error::Assertion("File creation failed!".to_string()));
        }

        let started = Instant::now();
        let output = self.storage.upload(file, &self.bucket).await?;
        tracing::info!(
            upload_ms = started.elapsed().as_millis() as u64,
            output = %output.text,
            "Uploaded file"
        );

        let listing = self.storage.list(&self.bucket).await?;
        Expectation::contains(file, "File upload failed or not visible in Cloud Storage.")
            .check(&listing)?;
        Ok(())
    }

    async fn list_files(&self) -> Result<()> {
        let file = "test-file-for-list.txt";
        write_fixture(&self.fixtures_dir, file, "Temporary file")?;
        self.storage.upload(file, &self.bucket).await?;

        let listing = self.storage.list(&self.bucket).await?;
        tracing::debug!(output = %listing.text, "List files output");

        Expectation::contains(file, "File listing failed.").check(&listing)?;
        Ok(())
    }

    async fn delete_file(&self) -> Result<()> {
        let file = "test-file-to-delete.txt";
        write_fixture(&self.fixtures_dir, file, "Temporary file")?;
        self.storage.upload(file, &self.bucket).await?;

        let output = self.storage.remove(&self.bucket, file).await?;
        tracing::debug!(output = %output.text, "Delete file output");

        let listing = self.storage.list(&self.bucket).await?;
        Expectation::not_contains(
            file,
            "File deletion failed. The file is still present in Cloud Storage.",
        )
        .check(&listing)?;
        Ok(())
    }
}

/// `gcloud-bucket-<millis mod 1e6>`, fresh enough for one run
pub fn fresh_bucket_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("gcloud-bucket-{}", millis % 1_000_000)
}

async fn timed<F>(name: &str, scenario: F) -> ScenarioReport
where
    F: Future<Output = Result<()>>,
{
    tracing::info!(scenario = name, "Running scenario");
    let started = Instant::now();
    match scenario.await {
        Ok(()) => ScenarioReport::pass(name, started.elapsed()),
        Err(e) => {
            tracing::error!(scenario = name, error = %e, "Scenario failed");
            ScenarioReport::fail(name, &e, started.elapsed())
        }
    }
}

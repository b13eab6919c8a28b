//! Configuration file handling
//!
//! The configuration is read once at startup and then passed by reference
//! into everything that needs it. Nothing mutates it afterwards.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Environment variable carrying the path to the service account credentials
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Path to the credential file handed to every command
    ///
    /// Falls back to `GOOGLE_APPLICATION_CREDENTIALS` when not set here.
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,

    /// Shell settings
    #[serde(default)]
    pub shell: ShellConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Storage CLI and bucket settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Headless browser settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Local fixture file settings
    #[serde(default)]
    pub fixtures: FixturesConfig,
}

/// Shell used to interpret command lines
#[derive(Debug, Deserialize, Clone)]
pub struct ShellConfig {
    /// Shell executable, invoked as `<program> -c <command line>`
    #[serde(default = "default_shell")]
    pub program: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: default_shell(),
        }
    }
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Upper bound for any single command invocation
    #[serde(default = "default_command")]
    pub command_secs: u64,

    /// Upper bound for a browser navigation
    #[serde(default = "default_navigation")]
    pub navigation_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command_secs: default_command(),
            navigation_secs: default_navigation(),
        }
    }
}

impl Timeouts {
    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    pub fn navigation(&self) -> Duration {
        Duration::from_secs(self.navigation_secs)
    }
}

fn default_command() -> u64 {
    120
}
fn default_navigation() -> u64 {
    5
}

/// Storage CLI settings
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// The storage CLI executable
    #[serde(default = "default_cli")]
    pub cli: String,

    /// Bucket shared by the suite's scenarios
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Location used when creating buckets
    #[serde(default = "default_location")]
    pub location: String,

    /// Object that must exist for the signed-URL scenarios
    #[serde(default = "default_fixture_object")]
    pub fixture_object: String,

    /// Lifetime passed to `sign-url --duration`
    #[serde(default = "default_sign_duration")]
    pub sign_duration: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cli: default_cli(),
            bucket: default_bucket(),
            location: default_location(),
            fixture_object: default_fixture_object(),
            sign_duration: default_sign_duration(),
        }
    }
}

fn default_cli() -> String {
    "gcloud".to_string()
}
fn default_bucket() -> String {
    "gcloud-storage-tests-bucket-1".to_string()
}
fn default_location() -> String {
    "us-central1".to_string()
}
fn default_fixture_object() -> String {
    "test-file.txt".to_string()
}
fn default_sign_duration() -> String {
    "1h".to_string()
}

/// Headless browser settings
#[derive(Debug, Deserialize, Clone, Default)]
pub struct BrowserConfig {
    /// Browser executable; searched on PATH when unset
    #[serde(default)]
    pub program: Option<PathBuf>,
}

/// Browser executables tried in order when none is configured
const BROWSER_CANDIDATES: &[&str] = &["chromium", "chromium-browser", "google-chrome", "chrome"];

impl BrowserConfig {
    /// Resolve the browser executable
    ///
    /// Falls back to searching PATH if not explicitly configured
    pub fn resolve(&self) -> Option<PathBuf> {
        if let Some(program) = &self.program {
            return Some(program.clone());
        }
        BROWSER_CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
    }
}

/// Local fixture file settings
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FixturesConfig {
    /// Directory where fixture files are written and commands run
    ///
    /// Defaults to the current working directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl FixturesConfig {
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

impl Config {
    /// Load configuration from an explicit path or the default config file
    ///
    /// Returns default configuration if no file exists. The credential path
    /// is filled from the environment exactly once, here.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        if config.credentials_path.is_none() {
            config.credentials_path = std::env::var_os(CREDENTIALS_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from);
        }

        Ok(config)
    }

    /// Parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Locate the storage CLI on PATH
    ///
    /// Only used for diagnostics; commands still go through the shell.
    pub fn storage_cli_path(&self) -> Option<PathBuf> {
        which::which(&self.storage.cli).ok()
    }
}

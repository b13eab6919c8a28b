//! Error types for the storage harness
//!
//! Every failure a scenario can hit maps onto one variant here. The
//! message is what ends up in the scenario report, so it should read
//! well on its own.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Process Errors ===
    #[error("Failed to start '{shell}' for command '{command}': {source}")]
    Spawn {
        shell: String,
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Command '{command}' timed out after {}s", .timeout.as_secs_f64())]
    CommandTimeout { command: String, timeout: Duration },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // === Expectation Errors ===
    #[error("{message}")]
    Extraction { message: String },

    #[error("{0}")]
    Assertion(String),

    // === Browser Errors ===
    #[error("Navigation to '{url}' failed: {reason}")]
    Navigation { url: String, reason: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid scenario file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create a spawn error for a shell that could not be started
    pub fn spawn(shell: &str, command: &str, source: io::Error) -> Self {
        Self::Spawn {
            shell: shell.to_string(),
            command: command.to_string(),
            source,
        }
    }

    /// Create a timeout error for a command
    pub fn command_timeout(command: &str, timeout: Duration) -> Self {
        Self::CommandTimeout {
            command: command.to_string(),
            timeout,
        }
    }

    /// Create an extraction error naming what was being looked for
    pub fn extraction(what: &str) -> Self {
        Self::Extraction {
            message: format!("Could not extract {} from command output", what),
        }
    }

    /// Create a navigation error
    pub fn navigation(url: &str, reason: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Short machine-friendly category for reports
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Spawn { .. } => "SPAWN_ERROR",
            Error::CommandTimeout { .. } => "TIMEOUT_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Extraction { .. } => "EXTRACTION_ERROR",
            Error::Assertion(_) => "ASSERTION_FAILURE",
            Error::Navigation { .. } => "NAVIGATION_ERROR",
            Error::Config(_) | Error::ConfigParse(_) | Error::FileRead { .. } => "CONFIG_ERROR",
            Error::Json(_) | Error::Yaml(_) => "PARSE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_command() {
        let err = Error::command_timeout("gcloud storage ls", Duration::from_millis(1500));
        let msg = err.to_string();
        assert!(msg.contains("gcloud storage ls"));
        assert!(msg.contains("1.5s"));
        assert_eq!(err.kind(), "TIMEOUT_ERROR");
    }

    #[test]
    fn test_assertion_message_is_verbatim() {
        let err = Error::Assertion("Bucket creation failed.".to_string());
        assert_eq!(err.to_string(), "Bucket creation failed.");
        assert_eq!(err.kind(), "ASSERTION_FAILURE");
    }

    #[test]
    fn test_extraction_helper_names_target() {
        let err = Error::extraction("the signed URL");
        assert_eq!(err.to_string(), "Could not extract the signed URL from command output");
        assert_eq!(err.kind(), "EXTRACTION_ERROR");
    }
}

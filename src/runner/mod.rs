//! Command runner
//!
//! Runs a single shell command line, merges stdout and stderr into one
//! text blob in arrival order and waits for the process with a bounded
//! timeout. A non-zero exit code is not an error: callers decide success
//! by inspecting the captured text (and, optionally, the exit code).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::common::config::CREDENTIALS_ENV;
use crate::common::{Config, Error, Result};

/// Read chunk size for the output pipes
const READ_CHUNK: usize = 8192;

/// A command line to run, with optional per-invocation overrides
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    /// Shell command line, interpreted by the runner's shell as-is
    pub command_line: String,
    /// Working directory; the runner's default when unset
    pub working_dir: Option<PathBuf>,
    /// Timeout; the runner's default when unset
    pub timeout: Option<Duration>,
}

impl CommandInvocation {
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
            working_dir: None,
            timeout: None,
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Merged output of one finished process
#[derive(Debug, Clone, Serialize)]
pub struct CapturedOutput {
    /// stdout and stderr merged, trailing whitespace trimmed
    pub text: String,
    /// Exit code, `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// Wall-clock time from spawn to exit
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(
    d: &Duration,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u128(d.as_millis())
}

impl CapturedOutput {
    /// Whether the process exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Whether the process produced no (non-whitespace) output
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Trim trailing whitespace from captured text
pub fn trim_output(raw: &str) -> &str {
    raw.trim_end()
}

/// Spawns shell command lines and captures their merged output
///
/// Built once from configuration; the credential path and any other
/// environment is passed explicitly to every child rather than being set
/// on the harness process.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    shell: String,
    default_timeout: Duration,
    working_dir: Option<PathBuf>,
    env: Vec<(String, OsString)>,
}

impl CommandRunner {
    pub fn new(shell: impl Into<String>, default_timeout: Duration) -> Self {
        Self {
            shell: shell.into(),
            default_timeout,
            working_dir: None,
            env: Vec::new(),
        }
    }

    /// Build a runner from the harness configuration
    pub fn from_config(config: &Config) -> Self {
        let mut runner = Self::new(config.shell.program.clone(), config.timeouts.command());
        if let Some(dir) = &config.fixtures.dir {
            runner = runner.with_working_dir(dir.clone());
        }
        if let Some(creds) = &config.credentials_path {
            runner = runner.with_env(CREDENTIALS_ENV, creds.as_os_str());
        }
        runner
    }

    /// Add an environment variable passed to every child
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the default working directory for every child
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Working directory children run in (`None` means inherit)
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Run a command line with an optional timeout override
    pub async fn run(&self, command_line: &str, timeout: Option<Duration>) -> Result<CapturedOutput> {
        let mut invocation = CommandInvocation::new(command_line);
        invocation.timeout = timeout;
        self.run_invocation(&invocation).await
    }

    /// Run a fully specified invocation
    pub async fn run_invocation(&self, invocation: &CommandInvocation) -> Result<CapturedOutput> {
        let line = invocation.command_line.as_str();
        let timeout = invocation.timeout.unwrap_or(self.default_timeout);

        tracing::debug!(command = line, timeout_secs = timeout.as_secs_f64(), "Running command");

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(dir) = invocation.working_dir.as_ref().or(self.working_dir.as_ref()) {
            cmd.current_dir(dir);
        }

        // Own process group so a timeout can take down the whole pipeline
        #[cfg(unix)]
        cmd.process_group(0);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| Error::spawn(&self.shell, line, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("stdout was not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("stderr was not captured")))?;

        let outcome = tokio::time::timeout(timeout, capture(&mut child, stdout, stderr)).await;

        match outcome {
            Ok(Ok((bytes, status))) => {
                let elapsed = started.elapsed();
                let raw = String::from_utf8_lossy(&bytes);
                let output = CapturedOutput {
                    text: trim_output(&raw).to_string(),
                    exit_code: status.code(),
                    elapsed,
                };
                tracing::debug!(
                    exit_code = ?output.exit_code,
                    elapsed_ms = elapsed.as_millis() as u64,
                    bytes = bytes.len(),
                    "Command finished"
                );
                Ok(output)
            }
            Ok(Err(e)) => {
                terminate(&mut child).await;
                Err(Error::Io(e))
            }
            Err(_) => {
                tracing::warn!(command = line, "Command timed out, killing it");
                terminate(&mut child).await;
                Err(Error::command_timeout(line, timeout))
            }
        }
    }
}

/// Drain both pipes to EOF, then reap the process
async fn capture(
    child: &mut Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
) -> std::io::Result<(Vec<u8>, ExitStatus)> {
    let merged = drain_merged(stdout, stderr).await?;
    let status = child.wait().await?;
    Ok((merged, status))
}

/// Read stdout and stderr concurrently into one buffer in arrival order
async fn drain_merged(mut stdout: ChildStdout, mut stderr: ChildStderr) -> std::io::Result<Vec<u8>> {
    let mut merged = Vec::new();
    let mut out_buf = [0u8; READ_CHUNK];
    let mut err_buf = [0u8; READ_CHUNK];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            n = stdout.read(&mut out_buf), if out_open => {
                match n? {
                    0 => out_open = false,
                    n => merged.extend_from_slice(&out_buf[..n]),
                }
            }
            n = stderr.read(&mut err_buf), if err_open => {
                match n? {
                    0 => err_open = false,
                    n => merged.extend_from_slice(&err_buf[..n]),
                }
            }
        }
    }

    Ok(merged)
}

/// Kill the child (and its process group on unix) and reap it
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // Negative pid addresses the process group created at spawn
        let _ = unsafe { libc::kill(-(pid as i32), libc::SIGKILL) };
    }
    let _ = child.kill().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sh() -> CommandRunner {
        CommandRunner::new("/bin/sh", Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_merges_stdout_and_stderr() {
        let out = sh()
            .run("echo out; sleep 0.2; echo err 1>&2", None)
            .await
            .unwrap();
        assert_eq!(out.text, "out\nerr");
        assert_eq!(out.exit_code, Some(0));
        assert!(out.success());
    }

    #[tokio::test]
    async fn test_trailing_whitespace_is_trimmed() {
        let out = sh().run("printf '  hello \\n\\n\\t'", None).await.unwrap();
        assert_eq!(out.text, "  hello");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let out = sh().run("echo failed; exit 3", None).await.unwrap();
        assert_eq!(out.text, "failed");
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_empty_output() {
        let out = sh().run("true", None).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_is_interpreted_by_shell() {
        let out = sh()
            .run("printf 'a\\nbucket-1\\nc\\n' | grep '^bucket-1$'", None)
            .await
            .unwrap();
        assert_eq!(out.text, "bucket-1");

        let out = sh()
            .run("printf 'a\\nc\\n' | grep '^bucket-1$'", None)
            .await
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(out.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let started = Instant::now();
        let err = sh()
            .run("sleep 5", Some(Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommandTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_missing_shell_is_spawn_error() {
        let runner = CommandRunner::new("/nonexistent/shell", Duration::from_secs(1));
        let err = runner.run("echo hi", None).await.unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_env_is_passed_to_child() {
        let runner = sh().with_env(CREDENTIALS_ENV, "/tmp/creds.json");
        let out = runner
            .run(&format!("echo ${}", CREDENTIALS_ENV), None)
            .await
            .unwrap();
        assert_eq!(out.text, "/tmp/creds.json");
    }

    #[tokio::test]
    async fn test_from_config_threads_credentials() {
        let mut config = Config::default();
        config.shell.program = "/bin/sh".to_string();
        config.credentials_path = Some(PathBuf::from("/etc/creds.json"));
        let runner = CommandRunner::from_config(&config);
        let out = runner
            .run(&format!("echo ${}", CREDENTIALS_ENV), None)
            .await
            .unwrap();
        assert_eq!(out.text, "/etc/creds.json");
        assert_eq!(runner.default_timeout(), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_invocation_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = CommandInvocation::new("ls").working_dir(dir.path());
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let out = sh().run_invocation(&invocation).await.unwrap();
        assert_eq!(out.text, "marker.txt");
    }

    #[tokio::test]
    async fn test_large_output_is_fully_drained() {
        let out = sh()
            .run("i=0; while [ $i -lt 5000 ]; do echo line-$i; i=$((i+1)); done", None)
            .await
            .unwrap();
        assert_eq!(out.text.lines().count(), 5000);
        assert!(out.text.ends_with("line-4999"));
    }

    proptest! {
        #[test]
        fn prop_trim_is_idempotent(s in ".*") {
            let once = trim_output(&s);
            prop_assert_eq!(trim_output(once), once);
        }

        #[test]
        fn prop_trim_never_ends_with_whitespace(s in ".*") {
            let trimmed = trim_output(&s);
            prop_assert!(!trimmed.ends_with(char::is_whitespace));
        }
    }
}

//! `gcloud storage` command lines
//!
//! Builds the command lines the suite needs and runs them through the
//! `CommandRunner`. The CLI owns all storage semantics; this module only
//! knows how to phrase requests and where the results show up.

use std::sync::LazyLock;

use regex::Regex;

use crate::common::{Config, Error, Result};
use crate::runner::{CapturedOutput, CommandRunner};

/// Characters accepted in bucket and object names passed to the shell
static SAFE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._/-]+$").expect("name pattern is valid"));

/// Reject names that the shell would reinterpret
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if SAFE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid {} name '{}': only letters, digits, '.', '_', '-' and '/' are allowed",
            kind, name
        )))
    }
}

/// Result of a create-if-absent step
#[derive(Debug, Clone)]
pub enum Provisioned {
    /// The existence check found it; nothing was run
    AlreadyPresent,
    /// It was missing and this is the output of the creating command
    Created(CapturedOutput),
}

/// Storage CLI front end
#[derive(Debug, Clone)]
pub struct StorageCli {
    runner: CommandRunner,
    cli: String,
    location: String,
    sign_duration: String,
}

impl StorageCli {
    pub fn new(runner: CommandRunner, cli: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            runner,
            cli: cli.into(),
            location: location.into(),
            sign_duration: "1h".to_string(),
        }
    }

    pub fn from_config(config: &Config, runner: CommandRunner) -> Self {
        Self {
            runner,
            cli: config.storage.cli.clone(),
            location: config.storage.location.clone(),
            sign_duration: config.storage.sign_duration.clone(),
        }
    }

    pub fn with_sign_duration(mut self, duration: impl Into<String>) -> Self {
        self.sign_duration = duration.into();
        self
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    // === Command lines ===

    /// Lists bucket names and keeps only an exact match for `bucket`
    pub fn bucket_exists_command(&self, bucket: &str) -> String {
        format!(
            "{} storage buckets list --format='value(name)' | grep '^{}$'",
            self.cli, bucket
        )
    }

    pub fn create_bucket_command(&self, bucket: &str) -> String {
        format!(
            "{} storage buckets create gs://{} --location={}",
            self.cli, bucket, self.location
        )
    }

    pub fn list_command(&self, bucket: &str) -> String {
        format!("{} storage ls gs://{}/", self.cli, bucket)
    }

    pub fn list_object_command(&self, bucket: &str, object: &str) -> String {
        format!("{} storage ls gs://{}/{}", self.cli, bucket, object)
    }

    pub fn upload_command(&self, local_path: &str, bucket: &str) -> String {
        format!("{} storage cp {} gs://{}/", self.cli, local_path, bucket)
    }

    pub fn remove_command(&self, bucket: &str, object: &str) -> String {
        format!("{} storage rm gs://{}/{}", self.cli, bucket, object)
    }

    pub fn sign_url_command(&self, bucket: &str, object: &str) -> String {
        format!(
            "{} storage sign-url gs://{}/{} --duration={}",
            self.cli, bucket, object, self.sign_duration
        )
    }

    // === Invocations ===

    /// Output is the bucket name when it exists, empty otherwise
    pub async fn bucket_exists(&self, bucket: &str) -> Result<CapturedOutput> {
        validate_name("bucket", bucket)?;
        self.runner.run(&self.bucket_exists_command(bucket), None).await
    }

    pub async fn create_bucket(&self, bucket: &str) -> Result<CapturedOutput> {
        validate_name("bucket", bucket)?;
        self.runner.run(&self.create_bucket_command(bucket), None).await
    }

    pub async fn list(&self, bucket: &str) -> Result<CapturedOutput> {
        validate_name("bucket", bucket)?;
        self.runner.run(&self.list_command(bucket), None).await
    }

    /// Output is the object URL when it exists, an error message otherwise
    pub async fn list_object(&self, bucket: &str, object: &str) -> Result<CapturedOutput> {
        validate_name("bucket", bucket)?;
        validate_name("object", object)?;
        self.runner
            .run(&self.list_object_command(bucket, object), None)
            .await
    }

    pub async fn upload(&self, local_path: &str, bucket: &str) -> Result<CapturedOutput> {
        validate_name("file", local_path)?;
        validate_name("bucket", bucket)?;
        self.runner
            .run(&self.upload_command(local_path, bucket), None)
            .await
    }

    pub async fn remove(&self, bucket: &str, object: &str) -> Result<CapturedOutput> {
        validate_name("bucket", bucket)?;
        validate_name("object", object)?;
        self.runner.run(&self.remove_command(bucket, object), None).await
    }

    pub async fn sign_url(&self, bucket: &str, object: &str) -> Result<CapturedOutput> {
        validate_name("bucket", bucket)?;
        validate_name("object", object)?;
        self.runner.run(&self.sign_url_command(bucket, object), None).await
    }

    // === Create-if-absent ===

    /// Create `bucket` unless the existence check already finds it
    pub async fn ensure_bucket(&self, bucket: &str) -> Result<Provisioned> {
        let check = self.bucket_exists(bucket).await?;
        if !check.is_empty() {
            tracing::info!(bucket, "Bucket already exists");
            return Ok(Provisioned::AlreadyPresent);
        }

        tracing::info!(bucket, "Bucket not found, creating it");
        let created = self.create_bucket(bucket).await?;
        tracing::debug!(output = %created.text, "Bucket creation output");
        Ok(Provisioned::Created(created))
    }

    /// Upload `local_path` as `object` unless listing the object finds it
    ///
    /// `write_local` is called to produce the local file only when the
    /// upload is actually needed. The object is listed again afterwards and
    /// a missing object is an `Error::Assertion`.
    pub async fn ensure_object<F>(
        &self,
        bucket: &str,
        object: &str,
        write_local: F,
    ) -> Result<Provisioned>
    where
        F: FnOnce() -> Result<()>,
    {
        let check = self.list_object(bucket, object).await?;
        if object_listed(&check, object) {
            tracing::info!(bucket, object, "Object already exists");
            return Ok(Provisioned::AlreadyPresent);
        }

        tracing::info!(bucket, object, "Object not found, uploading it");
        write_local()?;
        let uploaded = self.upload(object, bucket).await?;
        tracing::debug!(output = %uploaded.text, "Object upload output");

        let recheck = self.list_object(bucket, object).await?;
        if !object_listed(&recheck, object) {
            return Err(Error::Assertion(format!(
                "Failed to upload gs://{}/{}: {}",
                bucket, object, uploaded.text
            )));
        }
        Ok(Provisioned::Created(uploaded))
    }
}

/// Whether an `ls gs://bucket/object` result names the object
///
/// A missing object still prints an error mentioning the URL, so a
/// non-empty result alone is not proof of existence.
fn object_listed(output: &CapturedOutput, object: &str) -> bool {
    output.success() && output.text.lines().any(|l| l.trim_end().ends_with(object))
}

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::http::{cancellable, ensure_active};
use super::validate;
use crate::search::{Emitter, ModuleError, ModuleResult, SearchModule};

/// Google account lookup for an email address through the `ghunt` CLI
pub struct GoogleAccount {
    binary: String,
}

impl GoogleAccount {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run `ghunt email --json <file> <email>` and read back the report
    pub async fn lookup(&self, email: &str, token: &CancellationToken) -> ModuleResult<Value> {
        ensure_active(token)?;

        let report = ReportFile::new(std::env::temp_dir().join(format!("ghunt_{}.json", Uuid::new_v4())));

        let mut command = Command::new(&self.binary);
        command
            .arg("email")
            .arg("--json")
            .arg(report.path())
            .arg(email)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!("Executing GHunt for {}", email);
        let start_time = Instant::now();

        let output = cancellable(token, async { Ok(command.output().await?) }).await?;

        info!("GHunt completed in {:.2}s", start_time.elapsed().as_secs_f64());

        if !output.status.success() {
            error!(
                "GHunt failed with status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Err(ModuleError::Subprocess(format!(
                "Failed to retrieve information from Google ({})",
                output.status
            )));
        }

        let raw = tokio::fs::read(report.path()).await?;
        parse_report(&raw)
    }
}

/// Decode the JSON report GHunt writes
pub fn parse_report(raw: &[u8]) -> ModuleResult<Value> {
    let report: Value = serde_json::from_slice(raw)
        .map_err(|e| ModuleError::Parse(format!("Failed to parse GHunt output: {}", e)))?;
    if report.is_null() {
        return Err(ModuleError::NotFound("GHunt returned an empty report".to_string()));
    }
    Ok(report)
}

/// Temporary report path, removed when the lookup ends or is cancelled
struct ReportFile(PathBuf);

impl ReportFile {
    fn new(path: PathBuf) -> Self {
        Self(path)
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ReportFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            debug!("Could not remove {}: {}", self.0.display(), e);
        }
    }
}

#[async_trait]
impl SearchModule for GoogleAccount {
    fn name(&self) -> &'static str {
        "google-account"
    }

    fn validate(&self, query: &str) -> Result<(), String> {
        validate::email(query)
    }

    async fn run(&self, query: &str, token: CancellationToken, emit: &Emitter) -> ModuleResult<Value> {
        let email = query.trim();
        emit.started(None);
        emit.progress("Executing GHunt for Google account...", None, None);

        let found = self.lookup(email, &token).await?;

        emit.progress("Processing Google account data...", None, None);
        Ok(json!({
            "email": email,
            "found": found,
        }))
    }
}

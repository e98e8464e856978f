use async_trait::async_trait;
use serde_json::{Map, Value};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::http::{cancellable, ensure_active};
use super::validate;
use crate::search::{Emitter, ModuleError, ModuleResult, SearchModule};

/// Domain registration lookup through the system `whois` client
pub struct WhoisLookup {
    binary: String,
}

impl WhoisLookup {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run the client and return the parsed record
    pub async fn lookup(&self, domain: &str, token: &CancellationToken) -> ModuleResult<Value> {
        ensure_active(token)?;

        let mut command = Command::new(&self.binary);
        command
            .arg(domain)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!("Executing whois for {}", domain);
        let start_time = Instant::now();

        // Dropping the output future on cancel kills the child
        let output = cancellable(token, async { Ok(command.output().await?) }).await?;

        info!("whois completed in {:.2}s", start_time.elapsed().as_secs_f64());

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Some clients exit non-zero but still print a usable record
            if stdout.trim().is_empty() {
                error!("whois failed with status: {}", output.status);
                return Err(ModuleError::Subprocess(format!(
                    "whois exited with {}: {}",
                    output.status,
                    stderr.trim()
                )));
            }
        }

        let record = parse_whois(&stdout);
        if record.is_empty() {
            return Err(ModuleError::Parse(format!(
                "no whois fields returned for {}",
                domain
            )));
        }
        Ok(Value::Object(record))
    }
}

#[async_trait]
impl SearchModule for WhoisLookup {
    fn name(&self) -> &'static str {
        "whois"
    }

    fn validate(&self, query: &str) -> Result<(), String> {
        validate::domain(query)
    }

    async fn run(&self, query: &str, token: CancellationToken, emit: &Emitter) -> ModuleResult<Value> {
        let domain = query.trim().to_lowercase();
        emit.started(None);
        emit.progress("Retrieving WHOIS information...", None, None);

        let record = self.lookup(&domain, &token).await?;

        emit.progress("Processing results...", None, None);
        Ok(serde_json::json!({
            "domain": domain,
            "results": record,
        }))
    }
}

/// Parse `Key: Value` lines into an object. Keys are normalised to
/// snake_case; keys that repeat collect their values into an array.
pub fn parse_whois(raw: &str) -> Map<String, Value> {
    let mut record = Map::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('%') || line.starts_with('#') || line.starts_with(">>>") {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = normalise_key(key);
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            continue;
        }

        let value = Value::String(value.to_string());
        match record.get_mut(&key) {
            None => {
                record.insert(key, value);
            }
            Some(Value::Array(values)) => {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
            Some(existing) => {
                if *existing != value {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            }
        }
    }

    record
}

fn normalise_key(key: &str) -> String {
    key.trim()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

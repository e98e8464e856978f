use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::http::{ensure_active, send_json};
use super::validate;
use crate::search::{Emitter, ModuleResult, SearchModule};

const CRTSH_URL: &str = "https://crt.sh/";

#[derive(Debug, Deserialize)]
struct CertificateEntry {
    #[serde(default)]
    name_value: String,
}

/// Subdomain discovery from certificate transparency logs (crt.sh)
pub struct CertificateTransparency {
    client: Client,
    base_url: String,
}

impl CertificateTransparency {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, CRTSH_URL)
    }

    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Sorted, de-duplicated names seen in certificates for `domain`
    pub async fn subdomains(&self, domain: &str, token: &CancellationToken) -> ModuleResult<Vec<String>> {
        ensure_active(token)?;
        info!("Contacting crt.sh for {}", domain);

        let request = self
            .client
            .get(&self.base_url)
            .query(&[("q", domain), ("output", "json")]);
        let entries: Vec<CertificateEntry> = send_json(request, token).await?;

        Ok(collect_subdomains(&entries))
    }
}

fn collect_subdomains(entries: &[CertificateEntry]) -> Vec<String> {
    entries
        .iter()
        .flat_map(|entry| entry.name_value.lines())
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[async_trait]
impl SearchModule for CertificateTransparency {
    fn name(&self) -> &'static str {
        "certificate-transparency"
    }

    fn validate(&self, query: &str) -> Result<(), String> {
        validate::domain(query)
    }

    async fn run(&self, query: &str, token: CancellationToken, emit: &Emitter) -> ModuleResult<Value> {
        let domain = query.trim().to_lowercase();
        emit.started(None);
        emit.progress("Contacting crt.sh API...", None, None);

        let subdomains = self.subdomains(&domain, &token).await?;

        info!("crt.sh returned {} names for {}", subdomains.len(), domain);
        Ok(json!({
            "domain": domain,
            "count": subdomains.len(),
            "results": subdomains,
        }))
    }
}

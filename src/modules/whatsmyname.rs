use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::ops::ControlFlow;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::fanout::fan_out;
use super::http::{ensure_active, fetch_text, send_json};
use super::validate;
use crate::search::{Emitter, ModuleResult, SearchModule};

/// Emit a progress event every this many finished probes
const PROGRESS_EVERY: usize = 25;

#[derive(Debug, Deserialize)]
struct SiteList {
    sites: Vec<Site>,
}

#[derive(Debug, Clone, Deserialize)]
struct Site {
    name: String,
    uri_check: String,
    #[serde(default)]
    uri_pretty: Option<String>,
    #[serde(default)]
    cat: Option<String>,
    e_code: u16,
    e_string: String,
    #[serde(default)]
    m_string: String,
    #[serde(default)]
    post_body: Option<String>,
}

impl Site {
    /// Account exists if the expected status and marker show up and the
    /// missing-account marker does not
    fn is_hit(&self, status: u16, body: &str) -> bool {
        status == self.e_code
            && body.contains(&self.e_string)
            && (self.m_string.is_empty() || !body.contains(&self.m_string))
    }
}

/// Username enumeration across the WhatsMyName site list
pub struct CrossSiteEnumeration {
    client: Client,
    data_url: String,
    concurrency: usize,
    probe_timeout: Duration,
}

impl CrossSiteEnumeration {
    pub fn new(client: Client, data_url: impl Into<String>, concurrency: usize, probe_timeout: Duration) -> Self {
        Self {
            client,
            data_url: data_url.into(),
            concurrency,
            probe_timeout,
        }
    }
}

#[async_trait]
impl SearchModule for CrossSiteEnumeration {
    fn name(&self) -> &'static str {
        "cross-site-enumeration"
    }

    fn validate(&self, query: &str) -> Result<(), String> {
        validate::username(query)
    }

    async fn run(&self, query: &str, token: CancellationToken, emit: &Emitter) -> ModuleResult<Value> {
        let username = query.trim().to_string();
        ensure_active(&token)?;

        let list: SiteList = send_json(self.client.get(&self.data_url), &token).await?;
        // POST-based checks need per-site request bodies; only GET probes run
        let sites: Vec<Site> = list
            .sites
            .into_iter()
            .filter(|site| site.post_body.is_none())
            .collect();
        let total = sites.len();

        emit.started(Some(total as u64));
        info!("Searching {} sites for {}", total, username);

        let client = self.client.clone();
        let account = username.clone();
        let timeout = self.probe_timeout;
        let mut found = Vec::new();

        let summary = fan_out(
            &token,
            self.concurrency,
            sites,
            move |site: Site| {
                let client = client.clone();
                let uri = site.uri_check.replace("{account}", &account);
                let pretty = site
                    .uri_pretty
                    .as_ref()
                    .map(|pretty| pretty.replace("{account}", &account))
                    .unwrap_or_else(|| uri.clone());
                async move {
                    match fetch_text(client.get(&uri).timeout(timeout)).await {
                        Ok((status, body)) if site.is_hit(status, &body) => Some(json!({
                            "site": site.name,
                            "category": site.cat,
                            "uri_check": uri,
                            "url": pretty,
                        })),
                        Ok(_) => None,
                        Err(e) => {
                            debug!("Probe of {} failed: {}", site.name, e);
                            None
                        }
                    }
                }
            },
            |done, hit| {
                if let Some(hit) = hit {
                    emit.partial(json!({
                        "site_found": &hit,
                        "progress": { "current": done, "total": total },
                    }));
                    found.push(hit);
                }
                if done % PROGRESS_EVERY == 0 || done == total {
                    emit.progress(
                        format!("Checked {} of {} sites", done, total),
                        Some(done as u64),
                        Some(total as u64),
                    );
                }
                ControlFlow::Continue(())
            },
        )
        .await?;

        info!("Search completed. Found {} sites.", found.len());
        Ok(json!({
            "username": username,
            "found_sites": found,
            "total_sites": summary.total,
        }))
    }
}

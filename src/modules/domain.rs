use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::crtsh::CertificateTransparency;
use super::http::soft_fail;
use super::validate;
use super::whois::WhoisLookup;
use crate::search::{Emitter, ModuleResult, SearchModule};

/// Combined domain report: certificate transparency names, then WHOIS
pub struct DomainReport {
    crtsh: CertificateTransparency,
    whois: WhoisLookup,
}

impl DomainReport {
    pub fn new(crtsh: CertificateTransparency, whois: WhoisLookup) -> Self {
        Self { crtsh, whois }
    }
}

#[async_trait]
impl SearchModule for DomainReport {
    fn name(&self) -> &'static str {
        "domain"
    }

    fn validate(&self, query: &str) -> Result<(), String> {
        validate::domain(query)
    }

    async fn run(&self, query: &str, token: CancellationToken, emit: &Emitter) -> ModuleResult<Value> {
        let domain = query.trim().to_lowercase();
        emit.started(Some(2));

        emit.progress("Searching certificate transparency logs...", Some(0), Some(2));
        let subdomains = soft_fail(
            "certificate-transparency",
            self.crtsh
                .subdomains(&domain, &token)
                .await
                .map(|names| json!(names)),
        )?;
        emit.partial(json!({ "source": "certificate-transparency", "results": subdomains }));

        emit.progress("Retrieving WHOIS information...", Some(1), Some(2));
        let whois = soft_fail("whois", self.whois.lookup(&domain, &token).await)?;
        emit.partial(json!({ "source": "whois", "results": whois }));

        Ok(json!({
            "domain": domain,
            "subdomains": subdomains,
            "whois": whois,
        }))
    }
}

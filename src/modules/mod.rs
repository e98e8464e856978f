// Search modules available to the orchestrator
//
// Every module shares one HTTP client, checks its cancellation token at each
// suspension point and caps its own fan-out concurrency.

mod crtsh;
mod discord;
mod domain;
mod fanout;
mod github;
mod google;
pub mod http;
mod mastodon;
mod reddit;
mod tiktok;
pub mod validate;
mod whatsmyname;
mod whois;

pub use crtsh::CertificateTransparency;
pub use discord::{snowflake_created_at, AccountRegistry};
pub use domain::DomainReport;
pub use fanout::{fan_out, FanOutSummary};
pub use github::CodeHosting;
pub use google::{parse_report, GoogleAccount};
pub use mastodon::{FederatedSocial, FediverseInstance};
pub use reddit::ForumProfile;
pub use tiktok::{creation_timestamp, extract_video_id, VideoPlatform, VideoProfile};
pub use whatsmyname::CrossSiteEnumeration;
pub use whois::{parse_whois, WhoisLookup};

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::search::{ModuleRegistry, ModuleResult};

/// Short names accepted in place of the canonical module names
pub const ALIASES: &[(&str, &str)] = &[
    ("subdomains", "certificate-transparency"),
    ("github", "code-hosting"),
    ("mastodon", "federated-social"),
    ("mastodon-instance", "fediverse-instance"),
    ("tiktok", "video-platform"),
    ("tiktok-profile", "video-profile"),
    ("google", "google-account"),
    ("email", "google-account"),
    ("reddit", "forum-profile"),
    ("discord", "account-registry"),
    ("username", "cross-site-enumeration"),
];

/// Knobs shared by the built-in modules
#[derive(Debug, Clone)]
pub struct ModuleSettings {
    pub user_agent: String,
    pub http_timeout: Duration,
    pub site_timeout: Duration,
    pub lookup_concurrency: usize,
    pub instance_concurrency: usize,
    pub wmn_data_url: String,
    pub fediverse_instances_url: String,
    pub whois_binary: String,
    pub ghunt_binary: String,
}

/// Registry holding every built-in module and its aliases
pub fn default_registry(settings: &ModuleSettings) -> ModuleResult<ModuleRegistry> {
    let client = http::build_client(&settings.user_agent, settings.http_timeout)?;
    let mut registry = ModuleRegistry::new();

    registry.register(Arc::new(WhoisLookup::new(&settings.whois_binary)));
    registry.register(Arc::new(CertificateTransparency::new(client.clone())));
    registry.register(Arc::new(DomainReport::new(
        CertificateTransparency::new(client.clone()),
        WhoisLookup::new(&settings.whois_binary),
    )));
    registry.register(Arc::new(CodeHosting::new(client.clone())));
    registry.register(Arc::new(FederatedSocial::new(
        client.clone(),
        &settings.fediverse_instances_url,
        settings.instance_concurrency,
        settings.site_timeout,
    )));
    registry.register(Arc::new(FediverseInstance::new(client.clone())));
    registry.register(Arc::new(VideoPlatform));
    registry.register(Arc::new(VideoProfile::new(client.clone())));
    registry.register(Arc::new(GoogleAccount::new(&settings.ghunt_binary)));
    registry.register(Arc::new(ForumProfile::new(client.clone())));
    registry.register(Arc::new(AccountRegistry::new(client.clone())));
    registry.register(Arc::new(CrossSiteEnumeration::new(
        client,
        &settings.wmn_data_url,
        settings.lookup_concurrency,
        settings.site_timeout,
    )));

    for (alias, target) in ALIASES {
        registry.alias(*alias, target);
    }

    info!("Registered {} search modules", registry.len());
    Ok(registry)
}

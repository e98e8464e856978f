use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::ops::ControlFlow;
use std::sync::OnceLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::fanout::fan_out;
use super::http::{ensure_active, fetch_text, send_json, soft_fail};
use super::validate;
use crate::search::{Emitter, ModuleError, ModuleResult, SearchModule};

const SEARCH_API: &str = "https://mastodon.social/api/v2/search";
const MAX_INSTANCE_MATCHES: usize = 5;

const ADMIN_FIELDS: &[&str] = &[
    "id",
    "username",
    "acct",
    "display_name",
    "followers_count",
    "following_count",
    "statuses_count",
    "last_status_at",
    "locked",
    "bot",
    "discoverable",
    "group",
    "created_at",
    "url",
    "avatar",
    "header",
];

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag regex"))
}

fn href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href="([^"]+)""#).expect("valid href regex"))
}

fn strip_tags(html: &str) -> String {
    tag_re().replace_all(html, "").trim().to_string()
}

#[derive(Debug, Deserialize)]
struct InstanceList {
    sites: Vec<InstanceSite>,
}

#[derive(Debug, Clone, Deserialize)]
struct InstanceSite {
    name: String,
    uri_check: String,
    e_string: String,
}

/// Mastodon account search: the mastodon.social directory plus direct probes
/// of known fediverse instances
pub struct FederatedSocial {
    client: Client,
    instances_url: String,
    concurrency: usize,
    probe_timeout: Duration,
}

impl FederatedSocial {
    pub fn new(client: Client, instances_url: impl Into<String>, concurrency: usize, probe_timeout: Duration) -> Self {
        Self {
            client,
            instances_url: instances_url.into(),
            concurrency,
            probe_timeout,
        }
    }

    async fn search_api(&self, username: &str, token: &CancellationToken) -> ModuleResult<Value> {
        let request = self.client.get(SEARCH_API).query(&[("q", username)]);
        let data: Value = send_json(request, token).await?;

        let accounts = data["accounts"].as_array().cloned().unwrap_or_default();
        if accounts.is_empty() {
            return Err(ModuleError::NotFound("Username not found on Mastodon API".to_string()));
        }

        accounts
            .iter()
            .find(|account| {
                account["username"]
                    .as_str()
                    .is_some_and(|name| name.eq_ignore_ascii_case(username))
            })
            .map(account_details)
            .ok_or_else(|| ModuleError::NotFound(format!("Target username: [{}] NOT found!", username)))
    }

    async fn probe_instances(
        &self,
        username: &str,
        token: &CancellationToken,
        emit: &Emitter,
    ) -> ModuleResult<Value> {
        let list: InstanceList = send_json(self.client.get(&self.instances_url), token).await?;
        info!("Retrieved {} instances to check", list.sites.len());

        let client = self.client.clone();
        let account = username.to_string();
        let timeout = self.probe_timeout;
        let mut matched = Vec::new();

        fan_out(
            token,
            self.concurrency,
            list.sites,
            move |site: InstanceSite| {
                let client = client.clone();
                let uri = site.uri_check.replace("{account}", &account);
                async move {
                    debug!("Checking instance: {}", uri);
                    match fetch_text(client.get(&uri).timeout(timeout)).await {
                        Ok((200, body)) if body.contains(&site.e_string) => {
                            Some(json!({ "name": site.name, "profile_url": uri }))
                        }
                        Ok(_) => None,
                        Err(e) => {
                            debug!("Error checking {}: {}", uri, e);
                            None
                        }
                    }
                }
            },
            |_, hit| {
                if let Some(hit) = hit {
                    info!("Found match on instance: {}", hit["name"]);
                    emit.partial(json!({ "instance_match": &hit }));
                    matched.push(hit);
                }
                if matched.len() >= MAX_INSTANCE_MATCHES {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
        )
        .await?;

        if matched.is_empty() {
            return Err(ModuleError::NotFound(
                "Username not found on the server database".to_string(),
            ));
        }
        Ok(json!({ "matched_sites": matched }))
    }
}

fn account_details(account: &Value) -> Value {
    let fields: Vec<Value> = account["fields"]
        .as_array()
        .map(|fields| {
            fields
                .iter()
                .filter_map(|field| {
                    let name = field["name"].as_str()?;
                    let value = field["value"].as_str()?;
                    let href = href_re().captures(value)?.get(1)?.as_str();
                    let mut link = serde_json::Map::new();
                    link.insert(name.to_string(), json!(href));
                    Some(Value::Object(link))
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "user_id": account["id"],
        "profile_url": account["url"],
        "locked": account["locked"],
        "username": account["username"],
        "acct": account["acct"],
        "display_name": account["display_name"],
        "created_at": account["created_at"],
        "bot": account["bot"],
        "discoverable": account["discoverable"],
        "followers_count": account["followers_count"],
        "following_count": account["following_count"],
        "statuses_count": account["statuses_count"],
        "last_status_at": account["last_status_at"],
        "group": account["group"],
        "bio": strip_tags(account["note"].as_str().unwrap_or_default()),
        "fields": fields,
        "avatar": account["avatar"],
    })
}

#[async_trait]
impl SearchModule for FederatedSocial {
    fn name(&self) -> &'static str {
        "federated-social"
    }

    fn validate(&self, query: &str) -> Result<(), String> {
        validate::handle(query, "@").map(|_| ())
    }

    async fn run(&self, query: &str, token: CancellationToken, emit: &Emitter) -> ModuleResult<Value> {
        let username = validate::handle(query, "@").map_err(ModuleError::Parse)?;
        ensure_active(&token)?;
        emit.started(None);
        emit.progress(format!("Searching Mastodon for {}...", username), None, None);

        let (api_data, instances) = tokio::join!(
            self.search_api(username, &token),
            self.probe_instances(username, &token, emit),
        );
        let api_data = soft_fail("mastodon.social", api_data)?;
        let instances = soft_fail("instance probe", instances)?;

        Ok(json!({
            "api_data": api_data,
            "instances": instances,
        }))
    }
}

/// Public metadata of a Mastodon server: `/api/v1/instance`
pub struct FediverseInstance {
    client: Client,
}

impl FediverseInstance {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchModule for FediverseInstance {
    fn name(&self) -> &'static str {
        "fediverse-instance"
    }

    fn validate(&self, query: &str) -> Result<(), String> {
        validate::domain(query)
    }

    async fn run(&self, query: &str, token: CancellationToken, emit: &Emitter) -> ModuleResult<Value> {
        let instance = query.trim().to_lowercase();
        ensure_active(&token)?;
        emit.started(None);
        emit.progress(format!("Fetching instance information for {}...", instance), None, None);

        let url = format!("https://{}/api/v1/instance", instance);
        let data: Value = match send_json(self.client.get(&url), &token).await {
            Err(ModuleError::NotFound(_)) => Value::Null,
            other => other?,
        };
        if !matches!(data.as_object(), Some(fields) if !fields.is_empty()) {
            return Err(ModuleError::NotFound(format!(
                "Mastodon instance [{}] NOT found!",
                instance
            )));
        }

        Ok(instance_details(&data))
    }
}

fn instance_details(data: &Value) -> Value {
    let admin = &data["contact_account"];
    let admin_info: serde_json::Map<String, Value> = ADMIN_FIELDS
        .iter()
        .map(|field| (field.to_string(), admin[*field].clone()))
        .collect();

    json!({
        "instance": data["uri"],
        "title": data["title"],
        "description": strip_tags(data["short_description"].as_str().unwrap_or_default()),
        "detailed_description": strip_tags(data["description"].as_str().unwrap_or_default()),
        "email": data["email"],
        "thumbnail": data["thumbnail"],
        "languages": data["languages"],
        "registrations": data["registrations"],
        "approval_required": data["approval_required"],
        "admin_info": admin_info,
    })
}

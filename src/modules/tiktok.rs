use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::ORIGIN;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::http::{ensure_active, send_json};
use super::validate;
use crate::search::{Emitter, ModuleError, ModuleResult, SearchModule};

const PROFILE_API: &str = "https://nopean.click";
const PROFILE_ORIGIN: &str = "https://omar-thing.nekoweb.org";

fn video_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"tiktok\.com/.*/(\d+)").expect("valid video id regex"))
}

/// Numeric video id embedded in a TikTok URL
pub fn extract_video_id(url: &str) -> Option<u64> {
    video_id_re()
        .captures(url)
        .and_then(|caps| caps.get(1))
        .and_then(|id| id.as_str().parse().ok())
}

/// Upload time encoded in the top 32 bits of the id (unix seconds)
pub fn creation_timestamp(video_id: u64) -> i64 {
    (video_id >> 32) as i64
}

/// Creation time of a TikTok video, recovered from its id. Needs no network.
pub struct VideoPlatform;

#[async_trait]
impl SearchModule for VideoPlatform {
    fn name(&self) -> &'static str {
        "video-platform"
    }

    fn validate(&self, query: &str) -> Result<(), String> {
        validate::url(query)?;
        extract_video_id(query.trim())
            .map(|_| ())
            .ok_or_else(|| "Invalid TikTok URL format".to_string())
    }

    async fn run(&self, query: &str, token: CancellationToken, emit: &Emitter) -> ModuleResult<Value> {
        ensure_active(&token)?;
        emit.started(None);
        emit.progress("Extracting timestamp...", None, None);

        let video_id = extract_video_id(query.trim())
            .ok_or_else(|| ModuleError::Parse("Invalid TikTok URL format".to_string()))?;
        let unix = creation_timestamp(video_id);
        let created = DateTime::<Utc>::from_timestamp(unix, 0)
            .ok_or_else(|| ModuleError::Parse(format!("timestamp {} out of range", unix)))?;

        Ok(json!({
            "video_id": video_id.to_string(),
            "binary": format!("{:b}", video_id),
            "creation_time": {
                "iso": created.to_rfc3339(),
                "unix": unix,
            },
        }))
    }
}

/// TikTok profile data for a username, via a public lookup service
pub struct VideoProfile {
    client: Client,
}

impl VideoProfile {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn profile_request(&self, username: &str) -> RequestBuilder {
        self.client
            .post(PROFILE_API)
            .header(ORIGIN, PROFILE_ORIGIN)
            .json(&json!({ "username": username }))
    }
}

#[async_trait]
impl SearchModule for VideoProfile {
    fn name(&self) -> &'static str {
        "video-profile"
    }

    fn validate(&self, query: &str) -> Result<(), String> {
        validate::handle(query, "@").map(|_| ())
    }

    async fn run(&self, query: &str, token: CancellationToken, emit: &Emitter) -> ModuleResult<Value> {
        let username = validate::handle(query, "@").map_err(ModuleError::Parse)?;
        ensure_active(&token)?;
        emit.started(None);
        emit.progress(format!("Requesting profile data for {}...", username), None, None);

        let profile: Value = send_json(self.profile_request(username), &token).await?;
        info!("TikTok profile lookup completed for {}", username);

        Ok(json!({
            "username": username,
            "profile": profile,
        }))
    }
}

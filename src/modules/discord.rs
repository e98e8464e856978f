use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::http::{ensure_active, send_json};
use super::validate;
use crate::search::{Emitter, ModuleError, ModuleResult, SearchModule};

const LOOKUP_API: &str = "https://discordlookup.mesalytic.moe/v1/user";

/// Milliseconds since the unix epoch at 2015-01-01, the Discord epoch
const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

/// Account creation time encoded in a snowflake id
pub fn snowflake_created_at(id: u64) -> Option<DateTime<Utc>> {
    let millis = (id >> 22) + DISCORD_EPOCH_MS;
    DateTime::<Utc>::from_timestamp_millis(i64::try_from(millis).ok()?)
}

/// Discord user lookup by numeric id
pub struct AccountRegistry {
    client: Client,
}

impl AccountRegistry {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn summarise(data: &Value) -> Value {
    let banner_color = if data["banner"]["color"].is_null() {
        &data["banner_color"]
    } else {
        &data["banner"]["color"]
    };
    json!({
        "user_id": data["id"],
        "username": data["username"],
        "global_name": data["global_name"],
        "created_at": data["created_at"],
        "avatar_url": data["avatar"]["link"],
        "is_avatar_animated": data["avatar"]["is_animated"].as_bool().unwrap_or(false),
        "accent_color": data["accent_color"],
        "banner_color": banner_color,
        "banner_url": data["banner"]["link"],
        "discriminator": data["raw"]["discriminator"].as_str().unwrap_or("0"),
        "badges": data["badges"],
        "public_flags": data["raw"]["public_flags"],
        "flags": data["raw"]["flags"].as_u64().unwrap_or(0),
    })
}

#[async_trait]
impl SearchModule for AccountRegistry {
    fn name(&self) -> &'static str {
        "account-registry"
    }

    fn validate(&self, query: &str) -> Result<(), String> {
        validate::snowflake(query)
    }

    async fn run(&self, query: &str, token: CancellationToken, emit: &Emitter) -> ModuleResult<Value> {
        let id_text = query.trim();
        let id: u64 = id_text
            .parse()
            .map_err(|_| ModuleError::Parse(format!("'{}' is not a numeric id", id_text)))?;
        ensure_active(&token)?;
        emit.started(None);

        let created = snowflake_created_at(id).map(|dt| dt.to_rfc3339());
        emit.partial(json!({ "user_id": id_text, "snowflake_created_at": created }));

        emit.progress("Querying lookup service...", None, None);
        let data: Value = send_json(
            self.client.get(format!("{}/{}", LOOKUP_API, id_text)),
            &token,
        )
        .await?;

        let mut result = summarise(&data);
        result["snowflake_created_at"] = json!(created);
        Ok(result)
    }
}

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::http::{ensure_active, send_json};
use super::validate;
use crate::search::{Emitter, ModuleError, ModuleResult, SearchModule};

const REDDIT_BASE: &str = "https://www.reddit.com";
const RECENT_LIMIT: usize = 5;

#[derive(Debug, Deserialize)]
struct Thing<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct Listing<T> {
    children: Vec<Thing<T>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProfileSubreddit {
    title: Option<String>,
    public_description: Option<String>,
    subscribers: Option<u64>,
    banner_img: Option<String>,
    over_18: Option<bool>,
    display_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Redditor {
    name: String,
    id: String,
    created_utc: f64,
    #[serde(default)]
    link_karma: i64,
    #[serde(default)]
    comment_karma: i64,
    #[serde(default)]
    is_gold: bool,
    #[serde(default)]
    is_mod: bool,
    has_verified_email: Option<bool>,
    icon_img: Option<String>,
    #[serde(default)]
    is_employee: bool,
    subreddit: Option<ProfileSubreddit>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Submission {
    title: String,
    url: Option<String>,
    created_utc: f64,
    score: i64,
    num_comments: u64,
    #[serde(default)]
    selftext: String,
    subreddit: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Comment {
    body: String,
    created_utc: f64,
    score: i64,
    link_title: Option<String>,
    link_url: Option<String>,
    permalink: Option<String>,
    subreddit: String,
}

/// Reddit profile with the most recent submissions and comments
pub struct ForumProfile {
    client: Client,
}

impl ForumProfile {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn recent<T: for<'de> Deserialize<'de>>(
        &self,
        username: &str,
        kind: &str,
        token: &CancellationToken,
    ) -> ModuleResult<Vec<T>> {
        let request = self
            .client
            .get(format!("{}/user/{}/{}.json", REDDIT_BASE, username, kind))
            .query(&[("limit", RECENT_LIMIT.to_string())]);
        let listing: Thing<Listing<T>> = send_json(request, token).await?;
        Ok(listing
            .data
            .children
            .into_iter()
            .take(RECENT_LIMIT)
            .map(|child| child.data)
            .collect())
    }
}

#[async_trait]
impl SearchModule for ForumProfile {
    fn name(&self) -> &'static str {
        "forum-profile"
    }

    fn validate(&self, query: &str) -> Result<(), String> {
        validate::handle(query, "u/").map(|_| ())
    }

    async fn run(&self, query: &str, token: CancellationToken, emit: &Emitter) -> ModuleResult<Value> {
        let username = validate::handle(query, "u/").map_err(ModuleError::Parse)?;
        ensure_active(&token)?;
        emit.started(None);

        let about = self
            .client
            .get(format!("{}/user/{}/about.json", REDDIT_BASE, username));
        let profile: Thing<Redditor> = match send_json(about, &token).await {
            Err(ModuleError::NotFound(_)) => {
                return Err(ModuleError::NotFound("User does not exist.".to_string()))
            }
            other => other?,
        };
        emit.partial(json!({ "profile": &profile.data }));

        emit.progress("Fetching submissions and comments...", None, None);
        let (submissions, comments) = tokio::try_join!(
            self.recent::<Submission>(username, "submitted", &token),
            self.recent::<Comment>(username, "comments", &token),
        )?;

        emit.partial(json!({ "submissions": &submissions }));
        emit.partial(json!({ "comments": &comments }));
        emit.progress("Completed Reddit data collection.", None, None);

        info!(
            "Reddit lookup for {}: {} submissions, {} comments",
            username,
            submissions.len(),
            comments.len()
        );
        Ok(json!({
            "profile": profile.data,
            "submissions": submissions,
            "comments": comments,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_shape() {
        let listing: Thing<Listing<Comment>> = serde_json::from_value(json!({
            "kind": "Listing",
            "data": {
                "after": null,
                "children": [{
                    "kind": "t1",
                    "data": {
                        "body": "hello",
                        "created_utc": 1700000000.0,
                        "score": 3,
                        "link_title": "A thread",
                        "permalink": "/r/rust/comments/abc/",
                        "subreddit": "rust"
                    }
                }]
            }
        }))
        .unwrap();

        let comment = &listing.data.children[0].data;
        assert_eq!(comment.subreddit, "rust");
        assert_eq!(comment.link_title.as_deref(), Some("A thread"));
        assert!(comment.link_url.is_none());
    }
}

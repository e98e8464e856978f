use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::http::{ensure_active, send_json};
use super::validate;
use crate::search::{Emitter, ModuleResult, SearchModule};

const GITHUB_API: &str = "https://api.github.com";

#[derive(Debug, Serialize, Deserialize)]
struct GithubUser {
    login: String,
    id: u64,
    name: Option<String>,
    company: Option<String>,
    blog: Option<String>,
    location: Option<String>,
    email: Option<String>,
    bio: Option<String>,
    twitter_username: Option<String>,
    html_url: String,
    avatar_url: Option<String>,
    public_repos: u64,
    public_gists: u64,
    followers: u64,
    following: u64,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct GithubRepo {
    name: String,
    html_url: String,
    description: Option<String>,
    language: Option<String>,
    fork: bool,
    stargazers_count: u64,
    forks_count: u64,
    updated_at: Option<String>,
}

/// Public profile and repositories of a GitHub account
pub struct CodeHosting {
    client: Client,
    api_base: String,
}

impl CodeHosting {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            api_base: GITHUB_API.to_string(),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.api_base, path))
            .header("Accept", "application/vnd.github+json")
    }
}

#[async_trait]
impl SearchModule for CodeHosting {
    fn name(&self) -> &'static str {
        "code-hosting"
    }

    fn validate(&self, query: &str) -> Result<(), String> {
        validate::username(query)
    }

    async fn run(&self, query: &str, token: CancellationToken, emit: &Emitter) -> ModuleResult<Value> {
        let username = query.trim();
        ensure_active(&token)?;
        emit.started(None);
        emit.progress(format!("Looking up GitHub user {}...", username), None, None);

        let user: GithubUser = send_json(self.get(&format!("/users/{}", username)), &token).await?;
        emit.partial(json!({ "profile": &user }));

        emit.progress("Fetching public repositories...", None, None);
        let repos: Vec<GithubRepo> = send_json(
            self.get(&format!("/users/{}/repos", username))
                .query(&[("per_page", "100"), ("sort", "updated")]),
            &token,
        )
        .await?;

        info!("GitHub lookup for {} found {} repositories", username, repos.len());
        Ok(json!({
            "profile": user,
            "repositories": repos,
        }))
    }
}

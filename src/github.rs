use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, SyncError};

/// Hard stop for runaway pagination; reaching it fails the listing
const MAX_PAGES: u32 = 255;

/// Kind of hosted entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Repository,
    Gist,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Repository => f.write_str("repo"),
            EntityKind::Gist => f.write_str("gist"),
        }
    }
}

/// A hosted repository or gist to be mirrored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntity {
    /// Repository name or gist id
    pub identifier: String,
    pub clone_url: String,
    pub kind: EntityKind,
}

impl RemoteEntity {
    pub fn repository(name: impl Into<String>, clone_url: impl Into<String>) -> Self {
        Self {
            identifier: name.into(),
            clone_url: clone_url.into(),
            kind: EntityKind::Repository,
        }
    }

    pub fn gist(id: impl Into<String>, clone_url: impl Into<String>) -> Self {
        Self {
            identifier: id.into(),
            clone_url: clone_url.into(),
            kind: EntityKind::Gist,
        }
    }

    /// Deterministic local path: `<root>/<identifier>`
    pub fn local_path(&self, root: &Path) -> PathBuf {
        root.join(&self.identifier)
    }
}

#[derive(Debug, Deserialize)]
struct RepoItem {
    name: String,
    ssh_url: Option<String>,
    clone_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GistItem {
    id: String,
    git_pull_url: String,
}

/// Source of remote entities for mirror mode
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Every repository owned by the account, all pages
    async fn list_repositories(&self) -> Result<Vec<RemoteEntity>>;

    /// Every gist of the account, all pages
    async fn list_gists(&self) -> Result<Vec<RemoteEntity>>;
}

/// GitHub REST client for repository and gist enumeration
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
    per_page: usize,
}

/// GitHub authentication strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Use GitHub CLI authentication
    GitHubCLI,
    /// Use environment variable token
    EnvironmentToken,
    /// Read the token from a file
    TokenFile,
}

impl GitHubClient {
    /// Create a client with a token resolved from the configured auth method
    pub async fn from_config(config: &Config) -> Result<Self> {
        let (strategy, token) = detect_authentication(config).await?;
        info!("Using authentication strategy: {:?}", strategy);
        Self::new(config, token)
    }

    /// Create a client with an explicit bearer token
    pub fn new(config: &Config, token: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );

        let http = reqwest::Client::builder()
            .user_agent(concat!("wsync/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| SyncError::Api(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_url: config.github.api_url.trim_end_matches('/').to_string(),
            token: token.into(),
            per_page: config.github.per_page.clamp(1, 100),
        })
    }

    /// Fetch every page of `path` until a short or empty page.
    ///
    /// Any failed page fails the whole call; no partial list is returned.
    async fn fetch_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let url = format!("{}{}", self.api_url, path);
        let per_page = self.per_page.to_string();
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            debug!("GET {} page {}", url, page);
            let page_param = page.to_string();

            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .query(query)
                .query(&[("per_page", per_page.as_str()), ("page", page_param.as_str())])
                .send()
                .await
                .map_err(|e| SyncError::Api(format!("{} page {}: {}", path, page, e)))?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                let body = response.text().await.unwrap_or_default();
                return Err(SyncError::Auth(format!(
                    "{} returned {}: {}",
                    path,
                    status,
                    api_message(&body)
                )));
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SyncError::Api(format!(
                    "{} page {} returned {}: {}",
                    path,
                    page,
                    status,
                    api_message(&body)
                )));
            }

            let batch: Vec<T> = response.json().await.map_err(|e| {
                SyncError::Api(format!("{} page {}: invalid response body: {}", path, page, e))
            })?;
            let count = batch.len();
            items.extend(batch);

            if count < self.per_page {
                break;
            }

            info!(
                "{} page {} hit the {}-entry page ceiling, fetching next page",
                path, page, self.per_page
            );

            if page >= MAX_PAGES {
                warn!("Reached maximum pagination limit ({} pages) for {}", MAX_PAGES, path);
                return Err(SyncError::Api(format!(
                    "{} exceeded {} pages",
                    path, MAX_PAGES
                )));
            }
            page += 1;
        }

        info!("Fetched {} entries from {}", items.len(), path);
        Ok(items)
    }
}

#[async_trait]
impl RemoteSource for GitHubClient {
    async fn list_repositories(&self) -> Result<Vec<RemoteEntity>> {
        let repos: Vec<RepoItem> = self
            .fetch_all(
                "/user/repos",
                &[("visibility", "all"), ("affiliation", "owner")],
            )
            .await?;

        repos
            .into_iter()
            .map(|repo| {
                let url = repo.ssh_url.or(repo.clone_url).ok_or_else(|| {
                    SyncError::Api(format!("repository {} has no clone URL", repo.name))
                })?;
                Ok(RemoteEntity::repository(repo.name, url))
            })
            .collect()
    }

    async fn list_gists(&self) -> Result<Vec<RemoteEntity>> {
        let gists: Vec<GistItem> = self.fetch_all("/gists", &[]).await?;

        Ok(gists
            .into_iter()
            .map(|gist| RemoteEntity::gist(gist.id, gist.git_pull_url))
            .collect())
    }
}

/// Pull `message` out of a GitHub error body, or fall back to the raw text
fn api_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Detect and obtain a bearer token for the configured auth method
pub async fn detect_authentication(config: &Config) -> Result<(AuthStrategy, String)> {
    let token_file = config.github.token_file.as_deref().map(Path::new);

    match config.github.auth_method.as_str() {
        "auto" => {
            if let Ok(token) = try_environment_token() {
                Ok((AuthStrategy::EnvironmentToken, token))
            } else if let Some(token) = token_file.and_then(|p| try_token_file(p).ok()) {
                Ok((AuthStrategy::TokenFile, token))
            } else if let Ok(token) = try_github_cli(config.http_timeout()).await {
                Ok((AuthStrategy::GitHubCLI, token))
            } else {
                Err(SyncError::Auth(
                    "no GitHub credentials found. Either:\n\
                     1. Set the GITHUB_TOKEN environment variable\n\
                     2. Set github.token_file in the configuration\n\
                     3. Authenticate the GitHub CLI: gh auth login"
                        .to_string(),
                ))
            }
        }
        "token" => Ok((AuthStrategy::EnvironmentToken, try_environment_token()?)),
        "file" => {
            let path = token_file.ok_or_else(|| {
                SyncError::Auth("auth_method is 'file' but github.token_file is not set".into())
            })?;
            Ok((AuthStrategy::TokenFile, try_token_file(path)?))
        }
        "gh_cli" => Ok((
            AuthStrategy::GitHubCLI,
            try_github_cli(config.http_timeout()).await?,
        )),
        other => Err(SyncError::Auth(format!("unknown auth method: {}", other))),
    }
}

fn try_environment_token() -> Result<String> {
    debug!("Attempting environment variable authentication");

    match env::var("GITHUB_TOKEN") {
        Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        Ok(_) => Err(SyncError::Auth("GITHUB_TOKEN is empty".into())),
        Err(_) => Err(SyncError::Auth("GITHUB_TOKEN is not set".into())),
    }
}

fn try_token_file(path: &Path) -> Result<String> {
    debug!("Reading token from {}", path.display());

    let token = std::fs::read_to_string(path)
        .map_err(|e| SyncError::Auth(format!("cannot read {}: {}", path.display(), e)))?;
    let token = token.trim();
    if token.is_empty() {
        return Err(SyncError::Auth(format!("{} is empty", path.display())));
    }
    Ok(token.to_string())
}

async fn try_github_cli(limit: Duration) -> Result<String> {
    debug!("Attempting GitHub CLI authentication");

    let child = Command::new("gh")
        .args(["auth", "token"])
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(limit, child)
        .await
        .map_err(|_| {
            SyncError::Auth(format!(
                "`gh auth token` timed out after {}s",
                limit.as_secs()
            ))
        })?
        .map_err(|e| SyncError::Auth(format!("GitHub CLI (gh) is not available: {}", e)))?;

    if !output.status.success() {
        return Err(SyncError::Auth(format!(
            "GitHub CLI is not authenticated: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(SyncError::Auth("GitHub CLI returned empty token".into()));
    }

    debug!("Successfully obtained token from GitHub CLI");
    Ok(token)
}

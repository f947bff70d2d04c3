// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Forge API client
//!
//! Only GitHub is supported. The client answers two questions: is the
//! upstream project archived, and what happened to the latest pull request
//! opened from a branch.

use crate::error::PlatformError;
use crate::process::run_capture;
use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use tracing::debug;

/// Default GitHub host
pub const GITHUB_HOST: &str = "github.com";

/// Default GitHub REST endpoint
pub const GITHUB_API: &str = "https://api.github.com";

/// `owner/name` of a hosted repository
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoSlug {
    /// User or organisation
    pub owner: String,
    /// Repository name without `.git`
    pub name: String,
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// State of the most recent pull request for a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrState {
    /// Still open
    Open,
    /// Merged (by any method, including squash)
    Merged,
    /// Closed without merging
    Closed,
    /// No pull request was ever opened from the branch
    None,
}

/// What the forge knows about a branch's latest pull request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrInfo {
    /// Pull request state
    pub state: PrState,
    /// Pull request number
    pub number: Option<u64>,
    /// Head commit the pull request pointed at
    pub head_sha: Option<String>,
    /// When it was merged
    pub merged_at: Option<DateTime<Utc>>,
}

impl PrInfo {
    /// A branch without any pull request
    #[must_use]
    pub fn none() -> Self {
        Self {
            state: PrState::None,
            number: None,
            head_sha: None,
            merged_at: None,
        }
    }
}

/// Forge capabilities used by the decision engines
pub trait Platform: Send + Sync {
    /// Recognise a remote URL as belonging to this forge
    fn parse_remote(&self, url: &str) -> Option<RepoSlug>;

    /// Whether the repository is archived upstream
    fn is_archived(&self, repo: &RepoSlug) -> Result<bool, PlatformError>;

    /// Latest pull request whose head is `branch` in the same repository
    fn branch_pr(&self, repo: &RepoSlug, branch: &str) -> Result<PrInfo, PlatformError>;
}

/// Parse an SSH (`git@host:owner/repo.git`) or HTTP(S)
/// (`https://host/owner/repo[/...][.git]`) remote URL for the given host.
#[must_use]
pub fn parse_remote_url(url: &str, host: &str) -> Option<RepoSlug> {
    let url = url.trim();
    let path = if let Some(rest) = url.strip_prefix("git@") {
        rest.strip_prefix(host)?.strip_prefix(':')?
    } else {
        let rest = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))?;
        let rest = rest.split_once('@').map_or(rest, |(_, after)| after);
        rest.strip_prefix(host)?.strip_prefix('/')?
    };

    let mut parts = path.split('/');
    let owner = parts.next()?;
    let name = parts.next()?;
    let name = name.strip_suffix(".git").unwrap_or(name);
    if owner.is_empty() || name.is_empty() {
        return None;
    }
    Some(RepoSlug {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

/// Pick credentials: the `gh` CLI's login first, then an explicit token,
/// otherwise anonymous.
#[must_use]
pub fn resolve_token(explicit: Option<&str>) -> Option<String> {
    match run_capture("gh", &["auth", "token"], None) {
        Ok(out) if out.status.success() && !out.stdout.trim().is_empty() => {
            debug!("using gh CLI credentials");
            return Some(out.stdout.trim().to_string());
        }
        Ok(_) => debug!("gh CLI not logged in"),
        Err(e) => debug!("gh CLI unavailable: {e}"),
    }
    explicit
        .filter(|t| !t.trim().is_empty())
        .map(|t| t.trim().to_string())
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    #[serde(default)]
    archived: bool,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    number: u64,
    state: String,
    merged_at: Option<DateTime<Utc>>,
    head: PullHead,
}

#[derive(Debug, Deserialize)]
struct PullHead {
    sha: String,
}

impl From<PullResponse> for PrInfo {
    fn from(pr: PullResponse) -> Self {
        let state = if pr.merged_at.is_some() {
            PrState::Merged
        } else if pr.state == "open" {
            PrState::Open
        } else {
            PrState::Closed
        };
        Self {
            state,
            number: Some(pr.number),
            head_sha: Some(pr.head.sha),
            merged_at: pr.merged_at,
        }
    }
}

/// GitHub REST client
#[derive(Debug, Clone)]
pub struct GitHub {
    client: Client,
    api_base: String,
    host: String,
    token: Option<String>,
}

impl GitHub {
    /// Client for github.com
    pub fn new(token: Option<String>) -> Result<Self, PlatformError> {
        Self::with_endpoint(GITHUB_API, GITHUB_HOST, token)
    }

    /// Client for a custom endpoint (GitHub Enterprise, tests)
    pub fn with_endpoint(
        api_base: &str,
        host: &str,
        token: Option<String>,
    ) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .user_agent(concat!("katazuke/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            host: host.to_string(),
            token,
        })
    }

    /// Whether requests carry credentials
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let req = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn send<T: DeserializeOwned>(&self, url: &str, req: RequestBuilder) -> Result<T, PlatformError> {
        let resp = req.send()?;
        let resp = check_status(url, resp)?;
        resp.json::<T>().map_err(PlatformError::from)
    }
}

fn check_status(url: &str, resp: Response) -> Result<Response, PlatformError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let exhausted = resp
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        == Some("0");
    if status == StatusCode::TOO_MANY_REQUESTS || (status == StatusCode::FORBIDDEN && exhausted) {
        return Err(PlatformError::RateLimited);
    }
    Err(PlatformError::Status {
        url: url.to_string(),
        status: status.as_u16(),
    })
}

impl Platform for GitHub {
    fn parse_remote(&self, url: &str) -> Option<RepoSlug> {
        parse_remote_url(url, &self.host)
    }

    fn is_archived(&self, repo: &RepoSlug) -> Result<bool, PlatformError> {
        let url = format!("{}/repos/{}/{}", self.api_base, repo.owner, repo.name);
        let body: RepoResponse = self.send(&url, self.get(&url))?;
        Ok(body.archived)
    }

    fn branch_pr(&self, repo: &RepoSlug, branch: &str) -> Result<PrInfo, PlatformError> {
        let url = format!("{}/repos/{}/{}/pulls", self.api_base, repo.owner, repo.name);
        let head = format!("{}:{}", repo.owner, branch);
        let req = self.get(&url).query(&[
            ("head", head.as_str()),
            ("state", "all"),
            ("sort", "updated"),
            ("direction", "desc"),
            ("per_page", "1"),
        ]);
        let pulls: Vec<PullResponse> = self.send(&url, req)?;
        Ok(pulls.into_iter().next().map_or_else(PrInfo::none, PrInfo::from))
    }
}

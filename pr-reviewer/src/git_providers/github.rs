//! GitHub REST client: PR metadata, unified diff and review comments.
//!
//! Endpoints used:
//! - GET /repos/{owner}/{repo}/pulls/{number}                  (metadata)
//! - GET /repos/{owner}/{repo}/pulls/{number}  + diff media type (unified diff)
//! - GET /repos/{owner}/{repo}/pulls/{number}/comments         (paginated)
//!
//! Write endpoints live in `publish::github`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::debug;

use crate::errors::{Error, MrResult, ProviderError};
use crate::git_providers::types::*;

const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_DIFF: &str = "application/vnd.github.v3.diff";
const PER_PAGE: usize = 100;
/// Hard stop for comment pagination.
const MAX_PAGES: usize = 50;

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    base_api: String, // "https://api.github.com"
    headers: HeaderMap,
    pub id: PullRequestId,
    /// When set, write calls are logged instead of sent.
    pub dry_run: bool,
}

impl GitHubClient {
    pub fn new(cfg: &super::ProviderConfig, id: PullRequestId) -> MrResult<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()?;
        Ok(Self {
            http,
            base_api: cfg.base_api.trim_end_matches('/').to_string(),
            headers: build_github_headers(&cfg.token)?,
            id,
            dry_run: cfg.dry_run,
        })
    }

    /// `{base}/repos/{owner}/{repo}/{tail}`
    pub(crate) fn url(&self, tail: &str) -> String {
        format!("{}/repos/{}/{}", self.base_api, self.id.slug(), tail)
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Fetches title, body and head/base SHAs.
    pub async fn get_pull_request(&self) -> MrResult<PullRequestMeta> {
        let url = self.url(&format!("pulls/{}", self.id.number));
        debug!("github: GET {}", url);
        let resp = self
            .http
            .get(&url)
            .headers(self.headers.clone())
            .send()
            .await?;
        let pr: GhPull = check_status(resp).await?.json().await?;
        Ok(pr.into())
    }

    /// Fetches the whole PR as a unified diff.
    pub async fn get_diff(&self) -> MrResult<String> {
        let url = self.url(&format!("pulls/{}", self.id.number));
        debug!("github: GET {} (diff)", url);
        let resp = self
            .http
            .get(&url)
            .headers(self.headers.clone())
            .header(ACCEPT, ACCEPT_DIFF)
            .send()
            .await?;
        Ok(check_status(resp).await?.text().await?)
    }

    /// Lists every review comment of the PR, following pagination.
    pub async fn list_review_comments(&self) -> MrResult<Vec<ReviewCommentRecord>> {
        let mut out = Vec::new();
        for page in 1..=MAX_PAGES {
            let url = self.url(&format!(
                "pulls/{}/comments?per_page={}&page={}",
                self.id.number, PER_PAGE, page
            ));
            let resp = self
                .http
                .get(&url)
                .headers(self.headers.clone())
                .send()
                .await?;
            let batch: Vec<GhReviewComment> = check_status(resp).await?.json().await?;
            let n = batch.len();
            out.extend(batch.into_iter().map(ReviewCommentRecord::from));
            if n < PER_PAGE {
                break;
            }
        }
        debug!("github: listed {} review comments", out.len());
        Ok(out)
    }
}

fn build_github_headers(token: &str) -> MrResult<HeaderMap> {
    let mut h = HeaderMap::new();
    h.insert(USER_AGENT, HeaderValue::from_static("pr-reviewer/1.0"));
    h.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON));
    h.insert("X-GitHub-Api-Version", HeaderValue::from_static("2022-11-28"));
    if !token.is_empty() {
        let mut v = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| Error::Validation(format!("bad token: {e}")))?;
        v.set_sensitive(true);
        h.insert(AUTHORIZATION, v);
    }
    Ok(h)
}

/// Passes successful responses through and maps the rest to [`ProviderError`].
///
/// A 403 with an exhausted rate-limit budget is reported as `RateLimited`.
pub(crate) async fn check_status(resp: Response) -> MrResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let retry_after_secs = resp
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok());
    let exhausted = resp
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");
    let snippet: String = resp
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(300)
        .collect();

    let err = match ProviderError::from_status(status.as_u16(), snippet) {
        ProviderError::RateLimited { .. } => ProviderError::RateLimited { retry_after_secs },
        ProviderError::Forbidden if exhausted => ProviderError::RateLimited { retry_after_secs },
        other => other,
    };
    Err(err.into())
}

// ===== Wire types =====

#[derive(Debug, Deserialize)]
pub(crate) struct GhUser {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GhRef {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GhPull {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    #[serde(default)]
    pub state: String,
    pub user: Option<GhUser>,
    pub head: GhRef,
    pub base: GhRef,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<GhPull> for PullRequestMeta {
    fn from(p: GhPull) -> Self {
        Self {
            number: p.number,
            title: p.title,
            description: p.body.unwrap_or_default(),
            author: p.user.map(|u| u.login).unwrap_or_default(),
            state: p.state,
            head_sha: p.head.sha,
            base_sha: p.base.sha,
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GhReviewComment {
    pub id: u64,
    #[serde(default)]
    pub body: String,
    pub user: Option<GhUser>,
    pub in_reply_to_id: Option<u64>,
    pub path: Option<String>,
    pub line: Option<u32>,
    pub original_line: Option<u32>,
    pub diff_hunk: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<GhReviewComment> for ReviewCommentRecord {
    fn from(c: GhReviewComment) -> Self {
        Self {
            id: c.id,
            author: c.user.map(|u| u.login).unwrap_or_default(),
            body: c.body,
            in_reply_to: c.in_reply_to_id,
            path: c.path,
            line: c.line.or(c.original_line),
            diff_hunk: c.diff_hunk,
            created_at: c.created_at,
        }
    }
}

//! Host-agnostic data model for pull requests and their review comments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, MrResult};

/// A pull request inside a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestId {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl PullRequestId {
    /// Builds an id from `"owner/repo"` and a PR number.
    pub fn parse(repository: &str, number: u64) -> MrResult<Self> {
        let (owner, repo) = split_owner_repo(repository)?;
        Ok(Self {
            owner,
            repo,
            number,
        })
    }

    /// `"owner/repo"` as used in REST paths (each segment URL-encoded).
    pub fn slug(&self) -> String {
        format!(
            "{}/{}",
            urlencoding::encode(&self.owner),
            urlencoding::encode(&self.repo)
        )
    }
}

/// Splits `"owner/repo"`, rejecting anything else.
pub fn split_owner_repo(repository: &str) -> MrResult<(String, String)> {
    let mut parts = repository.trim().splitn(2, '/');
    match (parts.next(), parts.next()) {
        (Some(o), Some(r)) if !o.is_empty() && !r.is_empty() && !r.contains('/') => {
            Ok((o.to_string(), r.to_string()))
        }
        _ => Err(ConfigError::InvalidValue {
            var: "REPOSITORY",
            reason: format!("expected 'owner/repo', got '{repository}'"),
        }
        .into()),
    }
}

/// Metadata of the pull request under review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestMeta {
    pub number: u64,
    pub title: String,
    /// PR body; empty when the author left it blank.
    pub description: String,
    pub author: String,
    pub state: String,
    pub head_sha: String,
    pub base_sha: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// One review comment (line comment or reply) as stored by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewCommentRecord {
    pub id: u64,
    /// Login of the author.
    pub author: String,
    pub body: String,
    /// Parent comment id; `None` for thread roots.
    pub in_reply_to: Option<u64>,
    pub path: Option<String>,
    pub line: Option<u32>,
    pub diff_hunk: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A new reply on a review comment thread (reply mode input).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyEvent {
    pub pr_number: u64,
    pub comment: ReviewCommentRecord,
}

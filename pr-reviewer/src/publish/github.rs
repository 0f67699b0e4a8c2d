//! GitHub publisher.
//!
//! API:
//! - POST /repos/{owner}/{repo}/pulls/{n}/reviews                 (batched review)
//! - POST /repos/{owner}/{repo}/pulls/{n}/comments                (single line comment)
//! - POST /repos/{owner}/{repo}/issues/{n}/comments               (PR-level comment)
//! - POST /repos/{owner}/{repo}/pulls/{n}/comments/{id}/replies   (thread reply)
//!
//! Line comments anchor on the head commit, RIGHT side of the diff.
//! Dry-run logs the request and returns id `0`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::MrResult;
use crate::git_providers::github::{GitHubClient, check_status};
use crate::publish::CommentPoster;
use crate::review::format::Comment;

#[derive(Debug, Serialize)]
pub(crate) struct ReviewReq<'a> {
    pub commit_id: &'a str,
    pub event: &'a str,
    pub body: &'a str,
    pub comments: Vec<ReviewLineReq<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReviewLineReq<'a> {
    pub path: &'a str,
    pub line: u32,
    pub side: &'a str,
    pub body: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct LineCommentReq<'a> {
    pub commit_id: &'a str,
    pub path: &'a str,
    pub line: u32,
    pub side: &'a str,
    pub body: &'a str,
}

#[derive(Debug, Serialize)]
struct BodyReq<'a> {
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedResp {
    #[serde(default)]
    id: u64,
}

pub(crate) fn review_request<'a>(head_sha: &'a str, comments: &'a [Comment]) -> ReviewReq<'a> {
    ReviewReq {
        commit_id: head_sha,
        event: "COMMENT",
        body: "",
        comments: comments
            .iter()
            .map(|c| ReviewLineReq {
                path: &c.path,
                line: c.line,
                side: "RIGHT",
                body: &c.body,
            })
            .collect(),
    }
}

/// Posts to one PR, anchoring line comments on `head_sha`.
#[derive(Debug, Clone)]
pub struct GitHubPoster {
    client: GitHubClient,
    head_sha: String,
}

impl GitHubPoster {
    pub fn new(client: GitHubClient, head_sha: impl Into<String>) -> Self {
        Self {
            client,
            head_sha: head_sha.into(),
        }
    }

    async fn post_json<T: Serialize + Sync>(&self, tail: &str, payload: &T) -> MrResult<u64> {
        let url = self.client.url(tail);
        if self.client.dry_run {
            info!(
                "publish: dry-run POST {} payload={}",
                url,
                serde_json::to_string(payload).unwrap_or_default()
            );
            return Ok(0);
        }
        debug!("publish: POST {}", url);
        let resp = self
            .client
            .http()
            .post(&url)
            .headers(self.client.headers().clone())
            .json(payload)
            .send()
            .await?;
        let created: CreatedResp = check_status(resp).await?.json().await?;
        Ok(created.id)
    }
}

impl CommentPoster for GitHubPoster {
    async fn post_review(&self, comments: &[Comment]) -> MrResult<u64> {
        let req = review_request(&self.head_sha, comments);
        self.post_json(&format!("pulls/{}/reviews", self.client.id.number), &req)
            .await
    }

    async fn post_line_comment(&self, comment: &Comment) -> MrResult<u64> {
        let req = LineCommentReq {
            commit_id: &self.head_sha,
            path: &comment.path,
            line: comment.line,
            side: "RIGHT",
            body: &comment.body,
        };
        self.post_json(&format!("pulls/{}/comments", self.client.id.number), &req)
            .await
    }

    async fn post_issue_comment(&self, body: &str) -> MrResult<u64> {
        self.post_json(
            &format!("issues/{}/comments", self.client.id.number),
            &BodyReq { body },
        )
        .await
    }

    async fn post_thread_reply(&self, root_id: u64, body: &str) -> MrResult<u64> {
        self.post_json(
            &format!("pulls/{}/comments/{}/replies", self.client.id.number, root_id),
            &BodyReq { body },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git_providers::{ProviderConfig, PullRequestId};

    fn dry_poster() -> GitHubPoster {
        let cfg = ProviderConfig {
            // Unroutable on purpose: dry-run must never reach it.
            base_api: "http://127.0.0.1:9".into(),
            token: String::new(),
            dry_run: true,
        };
        let id = PullRequestId::parse("acme/widgets", 5).unwrap();
        GitHubPoster::new(GitHubClient::new(&cfg, id).unwrap(), "abc123")
    }

    #[test]
    fn review_payload_shape() {
        let comments = vec![Comment {
            path: "src/a.rs".into(),
            line: 4,
            body: "Prefer `?` here".into(),
        }];
        let v = serde_json::to_value(review_request("abc123", &comments)).unwrap();
        assert_eq!(v["commit_id"], "abc123");
        assert_eq!(v["event"], "COMMENT");
        assert_eq!(v["comments"][0]["side"], "RIGHT");
        assert_eq!(v["comments"][0]["line"], 4);
    }

    #[tokio::test]
    async fn dry_run_never_sends() {
        let p = dry_poster();
        assert_eq!(p.post_issue_comment("hello").await.unwrap(), 0);
        assert_eq!(p.post_thread_reply(9, "hi").await.unwrap(), 0);
        let c = Comment {
            path: "a.rs".into(),
            line: 1,
            body: "x".into(),
        };
        assert_eq!(p.post_review(std::slice::from_ref(&c)).await.unwrap(), 0);
    }
}

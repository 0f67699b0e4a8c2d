//! Publisher: delivers formatted comments and thread replies to the host.
//!
//! Review comments go through a three-tier cascade:
//!   1) one batched review carrying every line comment;
//!   2) individual line comments (whatever succeeds is kept);
//!   3) a single consolidated issue comment grouped by file.
//!
//! Replies try a threaded reply first and fall back to an issue comment that
//! quotes the user. Nothing here retries a tier; the cascade is the retry.
//! Dry-run lives in the host client, so the cascade logic is identical.

pub mod github;

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::errors::MrResult;
use crate::review::format::Comment;

/// Host operations needed to publish. Implementations return the id of the
/// created object (`0` when nothing was sent, e.g. dry-run).
pub trait CommentPoster {
    /// Posts every comment as one review.
    fn post_review(&self, comments: &[Comment]) -> impl Future<Output = MrResult<u64>> + Send;

    /// Posts one line-anchored comment.
    fn post_line_comment(&self, comment: &Comment) -> impl Future<Output = MrResult<u64>> + Send;

    /// Posts a PR-level (issue) comment.
    fn post_issue_comment(&self, body: &str) -> impl Future<Output = MrResult<u64>> + Send;

    /// Replies inside the thread whose root comment is `root_id`.
    fn post_thread_reply(
        &self,
        root_id: u64,
        body: &str,
    ) -> impl Future<Output = MrResult<u64>> + Send;
}

/// Which tier ended up delivering the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishTier {
    Nothing,
    BatchedReview,
    Individual,
    Consolidated,
    ThreadReply,
    IssueFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    /// Nothing was there to post.
    Empty,
    Success,
    /// Some individual comments failed.
    Partial,
    /// Every tier failed.
    Failed,
}

/// Outcome of one publish cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub tier: PublishTier,
    pub status: PublishStatus,
    pub posted: usize,
    pub failed: usize,
    /// Last error seen, for the run summary.
    pub last_error: Option<String>,
}

impl PublishReport {
    /// Report for a run with nothing to post.
    pub fn empty() -> Self {
        Self {
            tier: PublishTier::Nothing,
            status: PublishStatus::Empty,
            posted: 0,
            failed: 0,
            last_error: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == PublishStatus::Failed
    }
}

/// Publishes review comments through the batched → individual → consolidated cascade.
pub async fn publish_comments<P: CommentPoster>(poster: &P, comments: &[Comment]) -> PublishReport {
    if comments.is_empty() {
        info!("publish: nothing to post");
        return PublishReport::empty();
    }

    let t0 = Instant::now();
    info!("publish: start comments={}", comments.len());

    // Tier 1
    let mut last_error = match poster.post_review(comments).await {
        Ok(id) => {
            info!(
                "publish: batched review posted id={} comments={} in {} ms",
                id,
                comments.len(),
                t0.elapsed().as_millis()
            );
            return PublishReport {
                tier: PublishTier::BatchedReview,
                status: PublishStatus::Success,
                posted: comments.len(),
                failed: 0,
                last_error: None,
            };
        }
        Err(e) => {
            warn!("publish: batched review failed: {e}; falling back to individual comments");
            e.to_string()
        }
    };

    // Tier 2
    let mut posted = 0usize;
    let mut failed = 0usize;
    for c in comments {
        match poster.post_line_comment(c).await {
            Ok(id) => {
                debug!("publish: line comment {}:{} id={}", c.path, c.line, id);
                posted += 1;
            }
            Err(e) => {
                warn!("publish: line comment {}:{} failed: {e}", c.path, c.line);
                last_error = e.to_string();
                failed += 1;
            }
        }
    }
    if posted > 0 {
        let status = if failed == 0 {
            PublishStatus::Success
        } else {
            PublishStatus::Partial
        };
        info!(
            "publish: individual comments posted={} failed={} in {} ms",
            posted,
            failed,
            t0.elapsed().as_millis()
        );
        return PublishReport {
            tier: PublishTier::Individual,
            status,
            posted,
            failed,
            last_error: (failed > 0).then_some(last_error),
        };
    }

    // Tier 3
    let body = consolidated_body(comments);
    match poster.post_issue_comment(&body).await {
        Ok(id) => {
            info!(
                "publish: consolidated comment posted id={} in {} ms",
                id,
                t0.elapsed().as_millis()
            );
            PublishReport {
                tier: PublishTier::Consolidated,
                status: PublishStatus::Success,
                posted: comments.len(),
                failed: 0,
                last_error: None,
            }
        }
        Err(e) => {
            warn!("publish: consolidated comment failed: {e}; all tiers exhausted");
            PublishReport {
                tier: PublishTier::Nothing,
                status: PublishStatus::Failed,
                posted: 0,
                failed: comments.len(),
                last_error: Some(e.to_string()),
            }
        }
    }
}

/// Markdown body for the consolidated fallback: files in path order, comments
/// sorted by line inside each file.
pub fn consolidated_body(comments: &[Comment]) -> String {
    let mut by_file: BTreeMap<&str, Vec<&Comment>> = BTreeMap::new();
    for c in comments {
        by_file.entry(c.path.as_str()).or_default().push(c);
    }

    let mut out = String::new();
    out.push_str("## Automated review\n\n");
    out.push_str("Inline comments could not be attached, so here is the full review.\n");
    for (path, mut items) in by_file {
        items.sort_by_key(|c| c.line);
        out.push_str(&format!("\n### `{path}`\n\n"));
        for c in items {
            out.push_str(&format!("- **Line {}**: {}\n", c.line, c.body));
        }
    }
    out
}

/// Publishes a thread reply, falling back to a quoting issue comment.
pub async fn publish_reply<P: CommentPoster>(
    poster: &P,
    root_id: u64,
    user_login: &str,
    user_message: &str,
    reply: &str,
) -> PublishReport {
    let first_error = match poster.post_thread_reply(root_id, reply).await {
        Ok(id) => {
            info!("publish: thread reply posted id={} root={}", id, root_id);
            return PublishReport {
                tier: PublishTier::ThreadReply,
                status: PublishStatus::Success,
                posted: 1,
                failed: 0,
                last_error: None,
            };
        }
        Err(e) => {
            warn!("publish: thread reply to {} failed: {e}; falling back to issue comment", root_id);
            e
        }
    };

    let body = quoted_reply_body(user_login, user_message, reply);
    match poster.post_issue_comment(&body).await {
        Ok(id) => {
            info!("publish: fallback reply posted as issue comment id={}", id);
            PublishReport {
                tier: PublishTier::IssueFallback,
                status: PublishStatus::Success,
                posted: 1,
                failed: 0,
                last_error: Some(first_error.to_string()),
            }
        }
        Err(e) => {
            warn!("publish: fallback reply failed: {e}");
            PublishReport {
                tier: PublishTier::Nothing,
                status: PublishStatus::Failed,
                posted: 0,
                failed: 1,
                last_error: Some(e.to_string()),
            }
        }
    }
}

/// Issue-comment body that quotes the user message and mentions the author.
pub fn quoted_reply_body(user_login: &str, user_message: &str, reply: &str) -> String {
    let quoted: Vec<String> = user_message.lines().map(|l| format!("> {l}")).collect();
    let mention = if user_login.is_empty() {
        String::new()
    } else {
        format!("@{user_login} ")
    };
    format!("{}\n\n{}{}", quoted.join("\n"), mention, reply.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakePoster;

    fn c(path: &str, line: u32, body: &str) -> Comment {
        Comment {
            path: path.into(),
            line,
            body: body.into(),
        }
    }

    #[tokio::test]
    async fn batch_success_stops_cascade() {
        let poster = FakePoster::default();
        let r = publish_comments(&poster, &[c("a.rs", 1, "x")]).await;
        assert_eq!(r.tier, PublishTier::BatchedReview);
        assert_eq!(r.status, PublishStatus::Success);
        assert_eq!(poster.calls(), vec!["review:1"]);
    }

    #[tokio::test]
    async fn falls_back_to_individual_and_reports_partial() {
        let poster = FakePoster {
            fail_review: true,
            fail_line: vec![2],
            ..Default::default()
        };
        let r = publish_comments(&poster, &[c("a.rs", 1, "x"), c("a.rs", 2, "y")]).await;
        assert_eq!(r.tier, PublishTier::Individual);
        assert_eq!(r.status, PublishStatus::Partial);
        assert_eq!((r.posted, r.failed), (1, 1));
        assert_eq!(poster.calls(), vec!["review:2", "line:a.rs:1", "line:a.rs:2"]);
    }

    #[tokio::test]
    async fn consolidated_is_last_resort() {
        let poster = FakePoster {
            fail_review: true,
            fail_line: vec![1, 7],
            ..Default::default()
        };
        let r = publish_comments(&poster, &[c("b.rs", 7, "second"), c("a.rs", 1, "first")]).await;
        assert_eq!(r.tier, PublishTier::Consolidated);
        assert_eq!(r.status, PublishStatus::Success);
        let issues = poster.issue_bodies();
        assert_eq!(issues.len(), 1);
        let a = issues[0].find("`a.rs`").unwrap();
        let b = issues[0].find("`b.rs`").unwrap();
        assert!(a < b);
    }

    #[tokio::test]
    async fn every_tier_failing_is_failed() {
        let poster = FakePoster {
            fail_review: true,
            fail_line: vec![1],
            fail_issue: true,
            ..Default::default()
        };
        let r = publish_comments(&poster, &[c("a.rs", 1, "x")]).await;
        assert!(r.is_failure());
        assert!(r.last_error.is_some());
    }

    #[tokio::test]
    async fn empty_list_posts_nothing() {
        let poster = FakePoster::default();
        let r = publish_comments(&poster, &[]).await;
        assert_eq!(r.status, PublishStatus::Empty);
        assert!(poster.calls().is_empty());
    }

    #[test]
    fn consolidated_sorts_lines_within_file() {
        let body = consolidated_body(&[c("a.rs", 9, "late"), c("a.rs", 2, "early")]);
        assert!(body.find("Line 2").unwrap() < body.find("Line 9").unwrap());
    }

    #[tokio::test]
    async fn reply_falls_back_to_quoted_issue_comment() {
        let poster = FakePoster {
            fail_reply: true,
            ..Default::default()
        };
        let r = publish_reply(&poster, 10, "alice", "why?\nreally?", "Because.").await;
        assert_eq!(r.tier, PublishTier::IssueFallback);
        assert_eq!(poster.issue_bodies(), vec!["> why?\n> really?\n\n@alice Because.".to_string()]);
    }
}

//! Public entry for the pr-reviewer pipeline.
//!
//! Two runs are exposed, one per operating mode:
//!
//! 1) **Review** ([`run_review`])
//!    - Fetch PR metadata and the unified diff from GitHub
//!    - Parse the diff into files → chunks → changes, drop excluded paths
//!    - Drive every chunk through the review state machine
//!      (guidelines → review → feedback with bounded retries → formatting)
//!    - Publish line comments through the batched → individual → consolidated cascade
//!
//! 2) **Reply** ([`run_reply`])
//!    - Load the review-comment event, list the PR's review comments
//!    - Resolve the conversation thread, generate a reply, post it at the root
//!
//! The pipeline uses `tracing` for logging and avoids `async-trait` and heap
//! trait objects (no `Box<dyn ...>`). Collaborators are plain traits with
//! `async fn` implementations, so the orchestrators are testable with fakes.

pub mod config;
pub mod errors;
pub mod git_providers;
pub mod parser;
pub mod publish;
pub mod reply;
pub mod review;
pub mod telemetry;
pub mod threads;

#[cfg(test)]
mod test_support;

use std::time::Instant;

use tracing::{debug, info, warn};

use config::{ReviewerConfig, RunSettings};
use errors::MrResult;
use git_providers::event::load_reply_event;
use git_providers::github::GitHubClient;
use git_providers::{ProviderConfig, PullRequestId, PullRequestMeta};
use parser::filter::filter_excluded;
use parser::parse_diff_report;
use publish::github::GitHubPoster;
use publish::{CommentPoster, PublishReport, PublishStatus, PublishTier};
use reply::ReplyOrchestrator;
use review::agents::{FeedbackEvaluator, GuidelineLookup, ReviewGenerator};
use review::guidelines::{DirGuidelineStore, SummarizingLookup};
use review::llm::{LlmAgents, LlmClient, LlmConfig};
use review::ReviewOrchestrator;

/// Overall result of a run, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    PartialSuccess,
    NothingToPost,
    Failed,
}

impl RunStatus {
    pub fn from_publish(report: &PublishReport) -> Self {
        match report.status {
            PublishStatus::Empty => Self::NothingToPost,
            PublishStatus::Success => Self::Success,
            PublishStatus::Partial => Self::PartialSuccess,
            PublishStatus::Failed => Self::Failed,
        }
    }

    /// `1` only when posting failed entirely.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Failed => 1,
            _ => 0,
        }
    }
}

/// Summary of a review run, logged at `INFO` and returned to the caller.
#[derive(Debug, Clone)]
pub struct ReviewSummary {
    pub files_total: usize,
    pub files_reviewed: usize,
    /// Paths removed by `INPUT_EXCLUDE`.
    pub files_excluded: Vec<String>,
    /// Paths the parser dropped (deleted files, no destination).
    pub files_dropped: Vec<String>,
    pub chunks_reviewed: usize,
    pub chunks_skipped: usize,
    pub review_calls: usize,
    pub comments: usize,
    pub publish: PublishReport,
}

impl ReviewSummary {
    pub fn status(&self) -> RunStatus {
        RunStatus::from_publish(&self.publish)
    }

    /// One-line, human readable final status.
    pub fn status_line(&self) -> String {
        status_line(&self.publish, self.comments)
    }
}

/// Final status line: how many comments went out and through which tier.
pub fn status_line(report: &PublishReport, total: usize) -> String {
    match report.status {
        PublishStatus::Empty => "no comments to post".to_string(),
        PublishStatus::Failed => format!(
            "posting failed for {} comment(s): {}",
            total,
            report.last_error.as_deref().unwrap_or("unknown error")
        ),
        _ => format!(
            "posted {}/{} comment(s) via {}",
            report.posted,
            total,
            tier_name(report.tier)
        ),
    }
}

fn tier_name(tier: PublishTier) -> &'static str {
    match tier {
        PublishTier::Nothing => "nothing",
        PublishTier::BatchedReview => "batched review",
        PublishTier::Individual => "individual comments",
        PublishTier::Consolidated => "consolidated comment",
        PublishTier::ThreadReply => "thread reply",
        PublishTier::IssueFallback => "issue comment fallback",
    }
}

/// Reviews an already-fetched diff with the given collaborators.
///
/// This is the host-independent core of [`run_review`].
pub async fn review_diff<A, G, P>(
    cfg: &ReviewerConfig,
    pr: &PullRequestMeta,
    diff: &str,
    agents: &A,
    guidelines: Option<&G>,
    poster: &P,
) -> ReviewSummary
where
    A: ReviewGenerator + FeedbackEvaluator + Sync,
    G: GuidelineLookup + Sync,
    P: CommentPoster + Sync,
{
    let parsed = parse_diff_report(diff);
    debug!("review: parsed {} reviewable file(s)", parsed.files.len());
    for path in &parsed.dropped {
        info!("review: skipped {} (no destination, deleted or unreadable path)", path);
    }

    let filtered = filter_excluded(parsed.files, &cfg.exclude_patterns);
    for path in &filtered.excluded {
        info!("review: excluded {} (matches INPUT_EXCLUDE)", path);
    }

    let out = ReviewOrchestrator::new(cfg, pr, agents, guidelines)
        .run(filtered.kept, poster)
        .await;

    let summary = ReviewSummary {
        files_total: out.stats.files_total + filtered.excluded.len() + parsed.dropped.len(),
        files_reviewed: out.stats.files_reviewed,
        files_excluded: filtered.excluded,
        files_dropped: parsed.dropped,
        chunks_reviewed: out.stats.chunks_reviewed,
        chunks_skipped: out.stats.chunks_skipped,
        review_calls: out.stats.review_calls,
        comments: out.comments.len(),
        publish: out.publish,
    };
    info!(
        "review: summary files={}/{} excluded={} dropped={} chunks={} skipped={} calls={} -> {}",
        summary.files_reviewed,
        summary.files_total,
        summary.files_excluded.len(),
        summary.files_dropped.len(),
        summary.chunks_reviewed,
        summary.chunks_skipped,
        summary.review_calls,
        summary.status_line()
    );
    summary
}

/// Full review run against GitHub.
///
/// # Errors
/// Configuration problems and failures to fetch the PR or its diff. Everything
/// after the diff is fetched is reported through [`ReviewSummary`].
pub async fn run_review(
    cfg: &ReviewerConfig,
    settings: &RunSettings,
    provider: &ProviderConfig,
    llm: LlmConfig,
) -> MrResult<ReviewSummary> {
    let t0 = Instant::now();
    let number = settings
        .pull_number
        .ok_or(errors::ConfigError::MissingVar("PULL_NUMBER"))?;
    let id = PullRequestId::parse(&settings.repository, number)?;
    let client = GitHubClient::new(provider, id)?;

    let pr = client.get_pull_request().await?;
    let diff = client.get_diff().await?;
    info!(
        "review: PR #{} '{}' head={} diff_bytes={}",
        pr.number,
        pr.title,
        pr.head_sha,
        diff.len()
    );

    let llm_client = LlmClient::new(llm)?;
    let agents = LlmAgents::new(llm_client.clone());
    let guidelines = match &settings.guidelines_dir {
        Some(dir) => {
            let store = DirGuidelineStore::load(dir, settings.guideline_top_k)?;
            Some(SummarizingLookup::new(store, llm_client))
        }
        None => None,
    };
    let poster = GitHubPoster::new(client, pr.head_sha.clone());

    let summary = review_diff(cfg, &pr, &diff, &agents, guidelines.as_ref(), &poster).await;
    debug!("review: run finished in {} ms", t0.elapsed().as_millis());
    Ok(summary)
}

/// Full reply run against GitHub.
///
/// # Errors
/// Configuration problems (unreadable event payload, bad repository).
/// Listing failures degrade to a single-comment thread.
pub async fn run_reply(
    cfg: &ReviewerConfig,
    settings: &RunSettings,
    provider: &ProviderConfig,
    llm: LlmConfig,
) -> MrResult<RunStatus> {
    let path = settings
        .event_path
        .as_deref()
        .ok_or(errors::ConfigError::MissingVar("GITHUB_EVENT_PATH"))?;
    let event = load_reply_event(path)?;
    let number = settings.pull_number.unwrap_or(event.pr_number);
    let id = PullRequestId::parse(&settings.repository, number)?;
    let client = GitHubClient::new(provider, id)?;

    let comments = match client.list_review_comments().await {
        Ok(c) => c,
        Err(e) => {
            warn!("reply: listing review comments failed, thread limited to the event: {e}");
            Vec::new()
        }
    };

    let agents = LlmAgents::new(LlmClient::new(llm)?);
    let poster = GitHubPoster::new(client, String::new());
    let out = ReplyOrchestrator::new(cfg, &agents, &poster)
        .run(&event, &comments)
        .await;

    let status = match &out.publish {
        Some(report) => {
            info!("reply: {}", status_line(report, 1));
            RunStatus::from_publish(report)
        }
        None => RunStatus::NothingToPost,
    };
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::agents::NoGuidelines;
    use crate::test_support::{FakeAgents, FakePoster, suggestion, verdict};

    const DIFF: &str = "diff --git a/Cargo.lock b/Cargo.lock
--- a/Cargo.lock
+++ b/Cargo.lock
@@ -1,1 +1,2 @@
 [[package]]
+name = \"x\"
diff --git a/old.rs b/old.rs
deleted file mode 100644
--- a/old.rs
+++ /dev/null
@@ -1,1 +0,0 @@
-fn gone() {}
diff --git a/src/main.rs b/src/main.rs
--- a/src/main.rs
+++ b/src/main.rs
@@ -1,2 +1,3 @@
 fn main() {
+    let v = load().unwrap();
 }
";

    #[tokio::test]
    async fn review_diff_excludes_then_reviews() {
        let cfg = ReviewerConfig {
            exclude_patterns: vec!["*.lock".into()],
            ..Default::default()
        };
        let agents = FakeAgents::default()
            .with_reviews(vec![Ok(suggestion(2, "Propagate the error instead of unwrap."))])
            .with_verdicts(vec![Ok(verdict(true, ""))]);
        let poster = FakePoster::default();

        let s = review_diff(
            &cfg,
            &PullRequestMeta::default(),
            DIFF,
            &agents,
            None::<&NoGuidelines>,
            &poster,
        )
        .await;

        assert_eq!(s.files_excluded, vec!["Cargo.lock".to_string()]);
        assert_eq!(s.files_dropped, vec!["old.rs".to_string()]);
        assert_eq!(s.files_total, 3);
        assert_eq!(s.files_reviewed, 1);
        assert_eq!(s.comments, 1);
        assert_eq!(s.status(), RunStatus::Success);
        assert_eq!(s.status_line(), "posted 1/1 comment(s) via batched review");
    }

    #[test]
    fn exit_codes() {
        let mut r = PublishReport::empty();
        assert_eq!(RunStatus::from_publish(&r).exit_code(), 0);
        r.status = PublishStatus::Partial;
        assert_eq!(RunStatus::from_publish(&r).exit_code(), 0);
        r.status = PublishStatus::Failed;
        assert_eq!(RunStatus::from_publish(&r).exit_code(), 1);
    }
}

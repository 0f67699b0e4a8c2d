//! Review orchestrator: drives every reviewable chunk through
//! guideline retrieval → review → feedback (bounded retries) → formatting,
//! then hands the collected comments to the publisher.
//!
//! Flow per chunk:
//!   1) `RetrieveGuidelines` (only when a guideline source is configured);
//!   2) `Review` asks the generator for line-anchored suggestions;
//!   3) `Feedback` grades them; unsatisfied → retry with the critique, until
//!      `max_retries` is reached and acceptance is forced;
//!   4) `FormatComments` keeps suggestions that land on added lines.
//!
//! Collaborator failures never abort the run: a failed lookup yields a
//! placeholder, a failed generation yields an empty review, a failed
//! evaluation accepts what is there.
//!
//! Logs:
//! - `INFO`: run summary, safety valves, forced acceptances.
//! - `DEBUG`: every state transition.

pub mod agents;
pub mod format;
pub mod guidelines;
pub mod llm;
pub mod prompt;
pub mod state;

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::ReviewerConfig;
use crate::git_providers::PullRequestMeta;
use crate::parser::DiffFile;
use crate::publish::{CommentPoster, PublishReport, publish_comments};
use agents::{
    FeedbackContext, FeedbackEvaluator, GuidelineLookup, Message, ReviewContext, ReviewFeedback,
    ReviewGenerator, ReviewResponse, Role, truncate_chars,
};
use format::{Comment, format_comments};
use state::{ChunkScratch, Guards, ReviewStats, ReviewStep, RunState, next_step};

/// Placeholder stored on a chunk when the lookup found nothing.
pub const NO_GUIDELINES_FOUND: &str = "No relevant guidelines found.";
/// Placeholder stored on a chunk when the lookup failed.
pub const GUIDELINES_UNAVAILABLE: &str = "Guidelines unavailable.";
/// Guideline text kept per chunk, in characters.
const GUIDELINES_MAX_CHARS: usize = 2_000;

/// Final product of a review run.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    /// Diff model with guideline summaries and accepted reviews attached.
    pub files: Vec<DiffFile>,
    pub comments: Vec<Comment>,
    pub stats: ReviewStats,
    pub publish: PublishReport,
}

/// Review state machine over a parsed diff.
///
/// Generic over its collaborators; `guidelines` is optional and its absence
/// removes `RetrieveGuidelines` from every path.
pub struct ReviewOrchestrator<'a, A, G> {
    cfg: &'a ReviewerConfig,
    pr: &'a PullRequestMeta,
    agents: &'a A,
    guidelines: Option<&'a G>,
}

impl<'a, A, G> ReviewOrchestrator<'a, A, G>
where
    A: ReviewGenerator + FeedbackEvaluator + Sync,
    G: GuidelineLookup + Sync,
{
    pub fn new(
        cfg: &'a ReviewerConfig,
        pr: &'a PullRequestMeta,
        agents: &'a A,
        guidelines: Option<&'a G>,
    ) -> Self {
        Self {
            cfg,
            pr,
            agents,
            guidelines,
        }
    }

    /// Runs the state machine to `Done` and publishes through `poster`.
    pub async fn run<P: CommentPoster + Sync>(&self, files: Vec<DiffFile>, poster: &P) -> ReviewOutcome {
        let t0 = Instant::now();
        let mut run = RunState::new(files);
        let mut scratch = ChunkScratch::default();
        let mut publish = None;
        let mut step = ReviewStep::NextChunk;

        info!(
            "review: start files={} chunks={} max_retries={} guidelines={}",
            run.stats.files_total,
            run.stats.chunks_total,
            self.cfg.max_retries,
            self.guidelines.is_some()
        );

        while step != ReviewStep::Done {
            let mut guards = Guards {
                has_guidelines: self.guidelines.is_some(),
                ..Default::default()
            };
            match step {
                ReviewStep::NextChunk => {
                    guards.chunk_available = run.advance(self.cfg);
                    scratch = ChunkScratch::default();
                    if guards.chunk_available {
                        let path = run.current_path();
                        scratch.history.push(Message::new(
                            Role::System,
                            format!("Observe the code chunk in file: {path}"),
                        ));
                    }
                }
                ReviewStep::RetrieveGuidelines => {
                    scratch = self.retrieve_guidelines(&mut run, scratch).await;
                }
                ReviewStep::Review => {
                    scratch = self.review(&mut run, scratch).await;
                }
                ReviewStep::Feedback => {
                    scratch = self.feedback(&mut run, scratch).await;
                    guards.accepted = scratch.is_accepted();
                    guards.refresh_guidelines =
                        self.cfg.guideline_refresh.refresh_on(scratch.retry);
                }
                ReviewStep::FormatComments => {
                    self.format(&mut run, &scratch);
                }
                ReviewStep::SendComments => {
                    publish = Some(publish_comments(poster, &run.comments).await);
                }
                ReviewStep::Done => {}
            }

            let next = next_step(step, &guards);
            debug!("review: {:?} -> {:?}", step, next);
            step = next;
        }

        let publish = publish.unwrap_or_else(PublishReport::empty);

        info!(
            "review: done files={}/{} chunks={} skipped={} calls={} comments={} publish={:?} in {} ms",
            run.stats.files_reviewed,
            run.stats.files_total,
            run.stats.chunks_reviewed,
            run.stats.chunks_skipped,
            run.stats.review_calls,
            run.comments.len(),
            publish.status,
            t0.elapsed().as_millis()
        );

        ReviewOutcome {
            files: run.files,
            comments: run.comments,
            stats: run.stats,
            publish,
        }
    }

    async fn retrieve_guidelines(&self, run: &mut RunState, mut scratch: ChunkScratch) -> ChunkScratch {
        let Some(lookup) = self.guidelines else {
            return scratch;
        };
        let path = run.current_path();
        let query = guideline_query(run, &scratch);

        let summary = match lookup.lookup_guidelines(&query, &path).await {
            Ok(snippets) if snippets.is_empty() => NO_GUIDELINES_FOUND.to_string(),
            Ok(snippets) => truncate_chars(snippets.join("\n").trim(), GUIDELINES_MAX_CHARS),
            Err(e) => {
                warn!("review: guideline lookup failed for {}: {e}", path);
                GUIDELINES_UNAVAILABLE.to_string()
            }
        };
        debug!(
            "review: guidelines for {} retry={} chars={}",
            path,
            scratch.retry,
            summary.chars().count()
        );

        scratch.history.push(Message::new(
            Role::User,
            format!("Guidelines to follow: {summary}\nin file: {path}"),
        ));
        if let Some(chunk) = run.current_chunk_mut() {
            chunk.guidelines = summary;
        }
        scratch
    }

    async fn review(&self, run: &mut RunState, mut scratch: ChunkScratch) -> ChunkScratch {
        let Some(chunk) = run.current_chunk() else {
            return scratch;
        };
        let path = run.current_path();
        scratch.history.push(Message::new(
            Role::Assistant,
            format!(
                "Reviewing chunk {} in file {} for PR: {}",
                chunk.header(),
                path,
                self.pr.title
            ),
        ));

        let feedback = scratch.feedback.as_ref();
        let ctx = ReviewContext {
            pr_title: &self.pr.title,
            pr_description: &self.pr.description,
            file_path: &path,
            code_diff: chunk.formatted_text(),
            guidelines: &chunk.guidelines,
            critique: feedback.and_then(|f| f.critique.as_deref()),
            suggestions: feedback.map(|f| f.suggestions.as_slice()).unwrap_or_default(),
            history: &scratch.history,
        };

        let response = match self.agents.generate_review(&ctx).await {
            Ok(r) => r,
            Err(e) => {
                warn!("review: generation failed for {} retry={}: {e}", path, scratch.retry);
                ReviewResponse::default()
            }
        };
        run.stats.review_calls += 1;
        debug!(
            "review: {} retry={} suggestions={}",
            path,
            scratch.retry,
            response.reviews.len()
        );

        scratch.history.push(Message::new(
            Role::Assistant,
            format!("Git Reviewer Response: {}", response_json(&response)),
        ));
        scratch.response = Some(response);
        scratch
    }

    async fn feedback(&self, run: &mut RunState, mut scratch: ChunkScratch) -> ChunkScratch {
        let Some(chunk) = run.current_chunk() else {
            scratch.accepted = Some(ReviewResponse::default());
            return scratch;
        };
        if scratch.retry == 0 {
            scratch.first_response = scratch.response.clone();
        }
        let latest = scratch.response.clone().unwrap_or_default();

        let ctx = FeedbackContext {
            code_diff: chunk.formatted_text(),
            history: &scratch.history,
            response: &latest,
        };
        let verdict = match self.agents.evaluate_review(&ctx).await {
            Ok(v) => v,
            Err(e) => {
                warn!("review: feedback evaluation failed, accepting current review: {e}");
                ReviewFeedback::accepted()
            }
        };
        run.stats.feedback_calls += 1;

        let path = run.current_path();
        if verdict.satisfied {
            debug!("review: {} accepted at retry={}", path, scratch.retry);
            scratch.accepted = Some(pick_accepted(&scratch));
        } else if scratch.retry >= self.cfg.max_retries {
            info!(
                "review: {} forced acceptance after {} retries",
                path, scratch.retry
            );
            run.stats.forced_acceptances += 1;
            scratch.accepted = Some(pick_accepted(&scratch));
        } else {
            let critique = verdict.critique.clone().unwrap_or_default();
            scratch.history.push(Message::new(
                Role::User,
                format!("Feedback critique: {critique}"),
            ));
            scratch.retry += 1;
            debug!("review: {} retry={} critique={}", path, scratch.retry, critique);
        }
        scratch.feedback = Some(verdict);
        scratch
    }

    fn format(&self, run: &mut RunState, scratch: &ChunkScratch) {
        let path = run.current_path();
        let accepted = scratch.accepted.clone().unwrap_or_default();
        let Some(chunk) = run.current_chunk_mut() else {
            return;
        };

        let comments = format_comments(&path, chunk, &accepted);
        for c in &comments {
            if let Some(change) = chunk
                .changes
                .iter_mut()
                .find(|ch| ch.line_number == Some(c.line))
            {
                change.suggestion = Some(c.body.clone());
            }
        }
        if !accepted.is_empty() {
            chunk.generated_review = Some(response_json(&accepted));
        }
        debug!(
            "review: {} formatted {} comment(s) from {} suggestion(s)",
            path,
            comments.len(),
            accepted.reviews.len()
        );

        run.stats.chunks_reviewed += 1;
        run.comments.extend(comments);
    }
}

/// The latest response wins; the first-pass snapshot covers a missing one.
fn pick_accepted(scratch: &ChunkScratch) -> ReviewResponse {
    scratch
        .response
        .clone()
        .or_else(|| scratch.first_response.clone())
        .unwrap_or_default()
}

/// Query for the guideline lookup: the chunk plus, on retries, the last
/// response and critique.
fn guideline_query(run: &RunState, scratch: &ChunkScratch) -> String {
    let mut q = String::new();
    if let Some(chunk) = run.current_chunk() {
        q.push_str("code chunk:\n");
        q.push_str(&chunk.content);
    }
    if let Some(resp) = &scratch.response {
        q.push_str("\nreview comment: ");
        q.push_str(&response_json(resp));
    }
    if let Some(critique) = scratch.feedback.as_ref().and_then(|f| f.critique.as_deref()) {
        q.push_str("\nfeedback: ");
        q.push_str(critique);
    }
    q
}

fn response_json(r: &ReviewResponse) -> String {
    serde_json::to_string(r).unwrap_or_default()
}

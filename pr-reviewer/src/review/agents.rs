//! Collaborator contracts consumed by the orchestrators, plus the validated
//! result types that cross the boundary.
//!
//! LLM output is loosely structured; everything is validated here (bounded
//! counts, bounded lengths, required fields) before it enters a state machine.
//! Invalid entries are dropped, never propagated.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::MrResult;

/// At most this many suggestions per review-generation call.
pub const MAX_SUGGESTIONS: usize = 5;
/// Allowed length of a single review comment, in characters.
pub const COMMENT_MIN_CHARS: usize = 10;
pub const COMMENT_MAX_CHARS: usize = 500;
/// Bounds on feedback-evaluation output.
pub const CRITIQUE_MAX_CHARS: usize = 200;
pub const MAX_FEEDBACK_SUGGESTIONS: usize = 3;

/// One line-anchored suggestion from the review generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSuggestion {
    #[serde(rename = "lineNumber")]
    pub line_number: u32,
    #[serde(rename = "reviewComment")]
    pub comment: String,
}

/// Validated, bounded review result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub reviews: Vec<ReviewSuggestion>,
}

/// Wire shape of a review as the model writes it; fields are optional and loose.
#[derive(Debug, Default, Deserialize)]
pub struct RawReviewResponse {
    #[serde(default)]
    pub reviews: Vec<RawReviewSuggestion>,
}

/// Fields are kept as raw JSON so one badly typed entry cannot fail the whole list.
#[derive(Debug, Deserialize)]
pub struct RawReviewSuggestion {
    #[serde(rename = "lineNumber", alias = "line_number", alias = "line", default)]
    pub line_number: Option<Value>,
    #[serde(rename = "reviewComment", alias = "comment", alias = "body", default)]
    pub comment: Option<Value>,
}

/// Reads a line number written as `3`, `3.0` or `"3"`.
fn line_from_value(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl ReviewResponse {
    /// Validates a raw model response: drops entries with a non-positive line or
    /// an out-of-bounds comment, and keeps at most [`MAX_SUGGESTIONS`].
    pub fn from_raw(raw: RawReviewResponse) -> Self {
        let total = raw.reviews.len();
        let reviews: Vec<ReviewSuggestion> = raw
            .reviews
            .into_iter()
            .filter_map(|r| {
                let line = r.line_number.as_ref().and_then(line_from_value).filter(|n| *n > 0)?;
                let line = u32::try_from(line).ok()?;
                let comment = match r.comment? {
                    Value::String(c) => c.trim().to_string(),
                    _ => return None,
                };
                let len = comment.chars().count();
                if !(COMMENT_MIN_CHARS..=COMMENT_MAX_CHARS).contains(&len) {
                    return None;
                }
                Some(ReviewSuggestion {
                    line_number: line,
                    comment,
                })
            })
            .take(MAX_SUGGESTIONS)
            .collect();

        if reviews.len() != total {
            debug!(
                "agents: review validation kept {} of {} suggestions",
                reviews.len(),
                total
            );
        }
        Self { reviews }
    }

    pub fn is_empty(&self) -> bool {
        self.reviews.is_empty()
    }
}

/// Validated result of the feedback evaluator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFeedback {
    pub satisfied: bool,
    pub critique: Option<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawReviewFeedback {
    pub satisfied: Option<bool>,
    #[serde(default)]
    pub critique: Option<String>,
    #[serde(default)]
    pub suggestions: Option<Vec<String>>,
}

impl ReviewFeedback {
    /// Validates raw feedback. A missing `satisfied` field is read as "not
    /// satisfied"; critique and suggestions are bounded.
    pub fn from_raw(raw: RawReviewFeedback) -> Self {
        let critique = raw
            .critique
            .map(|c| truncate_chars(c.trim(), CRITIQUE_MAX_CHARS))
            .filter(|c| !c.is_empty());
        let suggestions = raw
            .suggestions
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .take(MAX_FEEDBACK_SUGGESTIONS)
            .collect();
        Self {
            satisfied: raw.satisfied.unwrap_or(false),
            critique,
            suggestions,
        }
    }

    /// Neutral verdict used when no evaluation is available.
    pub fn accepted() -> Self {
        Self {
            satisfied: true,
            critique: None,
            suggestions: Vec::new(),
        }
    }
}

/// Who said a message in the per-chunk history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "SYSTEM",
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        }
    }
}

/// One entry of the accumulated message history handed to the LLM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Renders history as `ROLE: content` lines.
pub fn render_history(history: &[Message]) -> String {
    history
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .map(|m| format!("{}: {}", m.role.as_str(), m.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Everything the review generator sees for one chunk pass.
#[derive(Debug, Clone)]
pub struct ReviewContext<'a> {
    pub pr_title: &'a str,
    pub pr_description: &'a str,
    pub file_path: &'a str,
    /// Addressable lines prefixed by their target line number.
    pub code_diff: String,
    pub guidelines: &'a str,
    pub critique: Option<&'a str>,
    pub suggestions: &'a [String],
    pub history: &'a [Message],
}

/// Everything the feedback evaluator sees for one chunk pass.
#[derive(Debug, Clone)]
pub struct FeedbackContext<'a> {
    pub code_diff: String,
    pub history: &'a [Message],
    pub response: &'a ReviewResponse,
}

/// Everything the reply generator sees for one thread.
#[derive(Debug, Clone)]
pub struct ReplyContext<'a> {
    pub original_comment: &'a str,
    pub file_path: &'a str,
    pub line_number: Option<u32>,
    pub diff_hunk: &'a str,
    pub conversation_history: String,
    pub last_user_message: &'a str,
}

/// Guideline retrieval: query in, ranked snippets out (may be empty).
pub trait GuidelineLookup {
    fn lookup_guidelines(
        &self,
        query: &str,
        file_path: &str,
    ) -> impl Future<Output = MrResult<Vec<String>>> + Send;
}

/// Produces line-anchored suggestions for one chunk.
pub trait ReviewGenerator {
    fn generate_review(
        &self,
        ctx: &ReviewContext<'_>,
    ) -> impl Future<Output = MrResult<ReviewResponse>> + Send;
}

/// Grades a generated review.
pub trait FeedbackEvaluator {
    fn evaluate_review(
        &self,
        ctx: &FeedbackContext<'_>,
    ) -> impl Future<Output = MrResult<ReviewFeedback>> + Send;
}

/// Writes a conversational reply inside a comment thread.
pub trait ReplyGenerator {
    fn generate_reply(&self, ctx: &ReplyContext<'_>) -> impl Future<Output = MrResult<String>> + Send;
}

/// Lookup used when no guideline source is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGuidelines;

impl GuidelineLookup for NoGuidelines {
    async fn lookup_guidelines(&self, _query: &str, _file_path: &str) -> MrResult<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Cuts a string to at most `max` characters (char boundary safe).
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

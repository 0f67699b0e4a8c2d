//! Scripted collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::{Error, LlmError, MrResult, ProviderError};
use crate::publish::CommentPoster;
use crate::review::agents::{
    FeedbackContext, FeedbackEvaluator, GuidelineLookup, ReplyContext, ReplyGenerator,
    ReviewContext, ReviewFeedback, ReviewGenerator, ReviewResponse, ReviewSuggestion,
};
use crate::review::format::Comment;

pub fn llm_down() -> Error {
    LlmError::Transport("connection refused".into()).into()
}

pub fn suggestion(line: u32, comment: &str) -> ReviewResponse {
    ReviewResponse {
        reviews: vec![ReviewSuggestion {
            line_number: line,
            comment: comment.to_string(),
        }],
    }
}

pub fn verdict(satisfied: bool, critique: &str) -> ReviewFeedback {
    ReviewFeedback {
        satisfied,
        critique: (!critique.is_empty()).then(|| critique.to_string()),
        suggestions: Vec::new(),
    }
}

/// Agents answering from queues. Empty queues fall back to an empty review,
/// an unsatisfied verdict and a fixed reply.
#[derive(Default)]
pub struct FakeAgents {
    pub reviews: Mutex<VecDeque<MrResult<ReviewResponse>>>,
    pub verdicts: Mutex<VecDeque<MrResult<ReviewFeedback>>>,
    pub reply: Mutex<Option<MrResult<String>>>,
    pub generate_calls: AtomicUsize,
    pub evaluate_calls: AtomicUsize,
    pub reply_calls: AtomicUsize,
    /// Critique handed to each `generate_review` call.
    pub seen_critiques: Mutex<Vec<Option<String>>>,
    pub seen_guidelines: Mutex<Vec<String>>,
    pub seen_histories: Mutex<Vec<String>>,
}

impl FakeAgents {
    pub fn with_reviews(self, items: Vec<MrResult<ReviewResponse>>) -> Self {
        *self.reviews.lock().unwrap() = items.into();
        self
    }

    pub fn with_verdicts(self, items: Vec<MrResult<ReviewFeedback>>) -> Self {
        *self.verdicts.lock().unwrap() = items.into();
        self
    }

    pub fn with_reply(self, reply: MrResult<String>) -> Self {
        *self.reply.lock().unwrap() = Some(reply);
        self
    }

    pub fn generated(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn evaluated(&self) -> usize {
        self.evaluate_calls.load(Ordering::SeqCst)
    }
}

impl ReviewGenerator for FakeAgents {
    async fn generate_review(&self, ctx: &ReviewContext<'_>) -> MrResult<ReviewResponse> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_critiques
            .lock()
            .unwrap()
            .push(ctx.critique.map(str::to_string));
        self.seen_guidelines
            .lock()
            .unwrap()
            .push(ctx.guidelines.to_string());
        self.reviews
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ReviewResponse::default()))
    }
}

impl FeedbackEvaluator for FakeAgents {
    async fn evaluate_review(&self, _ctx: &FeedbackContext<'_>) -> MrResult<ReviewFeedback> {
        self.evaluate_calls.fetch_add(1, Ordering::SeqCst);
        self.verdicts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(verdict(false, "needs work")))
    }
}

impl ReplyGenerator for FakeAgents {
    async fn generate_reply(&self, ctx: &ReplyContext<'_>) -> MrResult<String> {
        self.reply_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_histories
            .lock()
            .unwrap()
            .push(ctx.conversation_history.clone());
        self.reply
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Ok("Thanks, addressed.".to_string()))
    }
}

/// Guideline source returning fixed snippets.
#[derive(Default)]
pub struct FakeGuidelines {
    pub snippets: Vec<String>,
    pub fail: bool,
    pub calls: AtomicUsize,
    pub queries: Mutex<Vec<String>>,
}

impl FakeGuidelines {
    pub fn returning(snippets: &[&str]) -> Self {
        Self {
            snippets: snippets.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

impl GuidelineLookup for FakeGuidelines {
    async fn lookup_guidelines(&self, query: &str, _file_path: &str) -> MrResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(ProviderError::Timeout.into());
        }
        Ok(self.snippets.clone())
    }
}

/// Host fake recording every call as a short string.
#[derive(Default)]
pub struct FakePoster {
    pub fail_review: bool,
    /// Lines whose individual comment fails.
    pub fail_line: Vec<u32>,
    pub fail_issue: bool,
    pub fail_reply: bool,
    pub log: Mutex<Vec<String>>,
    pub issues: Mutex<Vec<String>>,
    pub replies: Mutex<Vec<(u64, String)>>,
}

impl FakePoster {
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn issue_bodies(&self) -> Vec<String> {
        self.issues.lock().unwrap().clone()
    }

    fn record(&self, s: String) {
        self.log.lock().unwrap().push(s);
    }
}

fn host_down() -> Error {
    ProviderError::Server(502).into()
}

impl CommentPoster for FakePoster {
    async fn post_review(&self, comments: &[Comment]) -> MrResult<u64> {
        self.record(format!("review:{}", comments.len()));
        if self.fail_review {
            return Err(host_down());
        }
        Ok(1)
    }

    async fn post_line_comment(&self, comment: &Comment) -> MrResult<u64> {
        self.record(format!("line:{}:{}", comment.path, comment.line));
        if self.fail_line.contains(&comment.line) {
            return Err(ProviderError::Unprocessable("line not in diff".into()).into());
        }
        Ok(u64::from(comment.line))
    }

    async fn post_issue_comment(&self, body: &str) -> MrResult<u64> {
        self.record("issue".to_string());
        if self.fail_issue {
            return Err(host_down());
        }
        self.issues.lock().unwrap().push(body.to_string());
        Ok(2)
    }

    async fn post_thread_reply(&self, root_id: u64, body: &str) -> MrResult<u64> {
        self.record(format!("reply:{root_id}"));
        if self.fail_reply {
            return Err(host_down());
        }
        self.replies
            .lock()
            .unwrap()
            .push((root_id, body.to_string()));
        Ok(3)
    }
}

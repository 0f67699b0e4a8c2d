//! Reply orchestrator: `ResolveThread → GenerateReply → SendReply → Done`.
//!
//! Replies are addressed to the thread root. A reply written by the bot itself
//! ends the run right after resolution. A failed generation is answered with
//! a short apology.

use tracing::{debug, info, warn};

use crate::config::ReviewerConfig;
use crate::git_providers::{ReplyEvent, ReviewCommentRecord};
use crate::publish::{CommentPoster, PublishReport, publish_reply};
use crate::review::agents::{ReplyContext, ReplyGenerator};
use crate::threads::{ConversationThread, format_conversation, resolve_thread};

/// Sent when the generator fails.
pub const APOLOGY_REPLY: &str =
    "Sorry, I could not generate a response to this comment right now. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStep {
    ResolveThread,
    GenerateReply,
    SendReply,
    Done,
}

/// Final product of a reply run.
#[derive(Debug, Clone)]
pub struct ReplyOutcome {
    pub thread: Option<ConversationThread>,
    pub reply: Option<String>,
    /// `None` when nothing had to be sent.
    pub publish: Option<PublishReport>,
}

pub struct ReplyOrchestrator<'a, R, P> {
    cfg: &'a ReviewerConfig,
    generator: &'a R,
    poster: &'a P,
}

impl<'a, R, P> ReplyOrchestrator<'a, R, P>
where
    R: ReplyGenerator + Sync,
    P: CommentPoster + Sync,
{
    pub fn new(cfg: &'a ReviewerConfig, generator: &'a R, poster: &'a P) -> Self {
        Self {
            cfg,
            generator,
            poster,
        }
    }

    /// Runs the reply state machine for one event.
    pub async fn run(&self, event: &ReplyEvent, comments: &[ReviewCommentRecord]) -> ReplyOutcome {
        let mut out = ReplyOutcome {
            thread: None,
            reply: None,
            publish: None,
        };
        let mut step = ReplyStep::ResolveThread;

        while step != ReplyStep::Done {
            let next = match step {
                ReplyStep::ResolveThread => {
                    let thread = resolve_thread(&event.comment, comments, &self.cfg.bot_login);
                    let needs_reply = thread.needs_reply;
                    out.thread = Some(thread);
                    if needs_reply {
                        ReplyStep::GenerateReply
                    } else {
                        info!(
                            "reply: comment {} is from the bot, nothing to answer",
                            event.comment.id
                        );
                        ReplyStep::Done
                    }
                }
                ReplyStep::GenerateReply => {
                    if let Some(thread) = &out.thread {
                        out.reply = Some(self.generate(thread).await);
                    }
                    ReplyStep::SendReply
                }
                ReplyStep::SendReply => {
                    if let (Some(thread), Some(reply)) = (&out.thread, &out.reply) {
                        out.publish = Some(
                            publish_reply(
                                self.poster,
                                thread.root_id,
                                &event.comment.author,
                                &thread.last_user_reply,
                                reply,
                            )
                            .await,
                        );
                    }
                    ReplyStep::Done
                }
                ReplyStep::Done => ReplyStep::Done,
            };
            debug!("reply: {:?} -> {:?}", step, next);
            step = next;
        }
        out
    }

    async fn generate(&self, thread: &ConversationThread) -> String {
        let ctx = ReplyContext {
            original_comment: &thread.original_comment,
            file_path: thread.file_path.as_deref().unwrap_or_default(),
            line_number: thread.line,
            diff_hunk: thread.diff_hunk.as_deref().unwrap_or_default(),
            conversation_history: format_conversation(thread, &self.cfg.bot_login),
            last_user_message: &thread.last_user_reply,
        };
        match self.generator.generate_reply(&ctx).await {
            Ok(r) if !r.trim().is_empty() => r.trim().to_string(),
            Ok(_) => {
                warn!("reply: generator returned an empty reply");
                APOLOGY_REPLY.to_string()
            }
            Err(e) => {
                warn!("reply: generation failed: {e}");
                APOLOGY_REPLY.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::PublishTier;
    use crate::test_support::{FakeAgents, FakePoster, llm_down};
    use std::sync::atomic::Ordering;

    const BOT: &str = "github-actions[bot]";

    fn rec(id: u64, parent: Option<u64>, author: &str, body: &str) -> ReviewCommentRecord {
        ReviewCommentRecord {
            id,
            author: author.into(),
            body: body.into(),
            in_reply_to: parent,
            path: Some("src/lib.rs".into()),
            line: Some(12),
            diff_hunk: Some("@@ -10,2 +10,3 @@".into()),
            ..Default::default()
        }
    }

    fn event(c: ReviewCommentRecord) -> ReplyEvent {
        ReplyEvent {
            pr_number: 3,
            comment: c,
        }
    }

    fn thread_comments() -> Vec<ReviewCommentRecord> {
        vec![
            rec(100, None, BOT, "Avoid cloning here."),
            rec(101, Some(100), "alice", "Is it expensive?"),
            rec(102, Some(101), BOT, "It copies the whole buffer."),
        ]
    }

    #[tokio::test]
    async fn answers_user_at_thread_root() {
        let cfg = ReviewerConfig::default();
        let agents = FakeAgents::default().with_reply(Ok("  Use a borrow instead.  ".into()));
        let poster = FakePoster::default();
        let ev = event(rec(103, Some(102), "alice", "What should I do then?"));

        let out = ReplyOrchestrator::new(&cfg, &agents, &poster)
            .run(&ev, &thread_comments())
            .await;

        assert_eq!(out.reply.as_deref(), Some("Use a borrow instead."));
        assert_eq!(
            poster.replies.lock().unwrap().clone(),
            vec![(100, "Use a borrow instead.".to_string())]
        );
        assert_eq!(out.publish.unwrap().tier, PublishTier::ThreadReply);
        let history = agents.seen_histories.lock().unwrap()[0].clone();
        assert!(history.starts_with("**ASSISTANT**: Avoid cloning here."));
        assert!(history.ends_with("**USER**: What should I do then?"));
    }

    #[tokio::test]
    async fn bot_authored_reply_is_ignored() {
        let cfg = ReviewerConfig::default();
        let agents = FakeAgents::default();
        let poster = FakePoster::default();
        let ev = event(rec(103, Some(102), BOT, "self reply"));

        let out = ReplyOrchestrator::new(&cfg, &agents, &poster)
            .run(&ev, &thread_comments())
            .await;

        assert!(out.reply.is_none());
        assert!(out.publish.is_none());
        assert_eq!(agents.reply_calls.load(Ordering::SeqCst), 0);
        assert!(poster.calls().is_empty());
    }

    #[tokio::test]
    async fn generation_failure_sends_apology() {
        let cfg = ReviewerConfig::default();
        let agents = FakeAgents::default().with_reply(Err(llm_down()));
        let poster = FakePoster::default();
        let ev = event(rec(103, Some(102), "alice", "?"));

        let out = ReplyOrchestrator::new(&cfg, &agents, &poster)
            .run(&ev, &thread_comments())
            .await;

        assert_eq!(out.reply.as_deref(), Some(APOLOGY_REPLY));
        assert_eq!(poster.calls(), vec!["reply:100"]);
    }
}

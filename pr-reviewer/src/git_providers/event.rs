//! Reply-mode input: the `pull_request_review_comment` event payload that
//! GitHub Actions writes to `GITHUB_EVENT_PATH`.

use serde::Deserialize;
use tracing::debug;

use crate::errors::{ConfigError, MrResult};
use crate::git_providers::github::GhReviewComment;
use crate::git_providers::types::{ReplyEvent, ReviewCommentRecord};

#[derive(Debug, Deserialize)]
struct EventPayload {
    comment: Option<GhReviewComment>,
    pull_request: Option<EventPull>,
}

#[derive(Debug, Deserialize)]
struct EventPull {
    number: u64,
}

/// Reads and decodes the event file at `path`.
pub fn load_reply_event(path: &str) -> MrResult<ReplyEvent> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::EventPayload {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    parse_reply_event(&raw, path)
}

/// Decodes an event payload; `origin` only labels errors.
pub fn parse_reply_event(raw: &str, origin: &str) -> MrResult<ReplyEvent> {
    let bad = |reason: String| ConfigError::EventPayload {
        path: origin.to_string(),
        reason,
    };
    let payload: EventPayload = serde_json::from_str(raw).map_err(|e| bad(e.to_string()))?;
    let comment = payload
        .comment
        .ok_or_else(|| bad("payload has no 'comment'".into()))?;
    let pr = payload
        .pull_request
        .ok_or_else(|| bad("payload has no 'pull_request'".into()))?;

    let comment = ReviewCommentRecord::from(comment);
    debug!(
        "event: reply id={} parent={:?} pr={} author={}",
        comment.id, comment.in_reply_to, pr.number, comment.author
    );
    Ok(ReplyEvent {
        pr_number: pr.number,
        comment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    #[test]
    fn parses_review_comment_event() {
        let raw = r#"{
            "action": "created",
            "comment": {
                "id": 103, "body": "Could you explain?", "user": {"login": "carol"},
                "in_reply_to_id": 102, "path": "src/lib.rs", "line": 9,
                "diff_hunk": "@@ -1,2 +1,3 @@"
            },
            "pull_request": {"number": 41}
        }"#;
        let ev = parse_reply_event(raw, "event.json").unwrap();
        assert_eq!(ev.pr_number, 41);
        assert_eq!(ev.comment.id, 103);
        assert_eq!(ev.comment.in_reply_to, Some(102));
        assert_eq!(ev.comment.author, "carol");
    }

    #[test]
    fn missing_comment_is_config_error() {
        let err = parse_reply_event(r#"{"pull_request":{"number":1}}"#, "e.json").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::EventPayload { .. })));
    }

    #[test]
    fn unreadable_file_is_config_error() {
        let err = load_reply_event("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::EventPayload { .. })));
    }
}

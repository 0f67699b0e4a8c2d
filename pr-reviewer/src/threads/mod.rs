//! Conversation thread resolution for reply mode.
//!
//! Given a new reply and every review comment of the PR, find the thread root
//! by walking parent links, then collect the thread breadth-first. Both walks
//! keep a visited set, so malformed data with cycles still terminates.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::git_providers::ReviewCommentRecord;

/// One resolved thread, root first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationThread {
    pub root_id: u64,
    /// Root followed by replies in breadth-first order.
    pub comments: Vec<ReviewCommentRecord>,
    /// Body of the root comment.
    pub original_comment: String,
    /// Body of the reply that triggered resolution.
    pub last_user_reply: String,
    /// False when the triggering reply was written by the bot itself.
    pub needs_reply: bool,
    pub file_path: Option<String>,
    pub line: Option<u32>,
    pub diff_hunk: Option<String>,
}

/// True if `author` is the configured bot or a GitHub App account (`name[bot]`).
pub fn is_bot(author: &str, bot_login: &str) -> bool {
    author == bot_login || author.ends_with("[bot]")
}

/// Looser check used only for labelling history: any login mentioning `bot`.
fn looks_like_bot(author: &str, bot_login: &str) -> bool {
    is_bot(author, bot_login) || author.to_ascii_lowercase().contains("bot")
}

/// Resolves the thread that `reply` belongs to.
///
/// `reply` is added to the index when the comment list does not contain it.
/// A missing or unknown parent yields a one-comment thread rooted at `reply`.
pub fn resolve_thread(
    reply: &ReviewCommentRecord,
    all: &[ReviewCommentRecord],
    bot_login: &str,
) -> ConversationThread {
    let mut index: HashMap<u64, &ReviewCommentRecord> = all.iter().map(|c| (c.id, c)).collect();
    index.entry(reply.id).or_insert(reply);

    let needs_reply = !is_bot(&reply.author, bot_login);

    let parent = reply.in_reply_to.filter(|p| index.contains_key(p));
    let Some(parent) = parent else {
        if reply.in_reply_to.is_some() {
            warn!(
                "threads: parent {:?} of comment {} not found, using it as root",
                reply.in_reply_to, reply.id
            );
        }
        return build(reply.id, vec![reply.clone()], reply, needs_reply);
    };

    let root_id = find_root(parent, &index);

    let mut children: HashMap<u64, Vec<u64>> = HashMap::new();
    for c in index.values() {
        if let Some(p) = c.in_reply_to {
            children.entry(p).or_default().push(c.id);
        }
    }
    for ids in children.values_mut() {
        ids.sort_unstable();
    }

    let mut visited = HashSet::from([root_id]);
    let mut queue = VecDeque::from([root_id]);
    let mut ordered = Vec::new();
    while let Some(id) = queue.pop_front() {
        if let Some(c) = index.get(&id) {
            ordered.push((*c).clone());
        }
        for child in children.get(&id).map(Vec::as_slice).unwrap_or_default() {
            if visited.insert(*child) {
                queue.push_back(*child);
            }
        }
    }

    debug!(
        "threads: reply {} resolved to root {} with {} comment(s)",
        reply.id,
        root_id,
        ordered.len()
    );
    build(root_id, ordered, reply, needs_reply)
}

/// Walks parent links from `start` until a comment without a (known) parent,
/// or until a comment repeats.
fn find_root(start: u64, index: &HashMap<u64, &ReviewCommentRecord>) -> u64 {
    let mut visited = HashSet::new();
    let mut cur = start;
    loop {
        if !visited.insert(cur) {
            warn!("threads: parent cycle detected at comment {}", cur);
            return cur;
        }
        match index.get(&cur).and_then(|c| c.in_reply_to) {
            Some(p) if index.contains_key(&p) => cur = p,
            _ => return cur,
        }
    }
}

fn build(
    root_id: u64,
    comments: Vec<ReviewCommentRecord>,
    reply: &ReviewCommentRecord,
    needs_reply: bool,
) -> ConversationThread {
    let root = comments.first();
    ConversationThread {
        root_id,
        original_comment: root.map(|c| c.body.clone()).unwrap_or_default(),
        last_user_reply: reply.body.clone(),
        needs_reply,
        file_path: root.and_then(|c| c.path.clone()).or_else(|| reply.path.clone()),
        line: root.and_then(|c| c.line).or(reply.line),
        diff_hunk: root
            .and_then(|c| c.diff_hunk.clone())
            .or_else(|| reply.diff_hunk.clone()),
        comments,
    }
}

/// Renders the thread as alternating `**ASSISTANT**:` / `**USER**:` blocks.
pub fn format_conversation(thread: &ConversationThread, bot_login: &str) -> String {
    thread
        .comments
        .iter()
        .filter(|c| !c.body.trim().is_empty())
        .map(|c| {
            let who = if looks_like_bot(&c.author, bot_login) {
                "ASSISTANT"
            } else {
                "USER"
            };
            format!("**{}**: {}", who, c.body.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT: &str = "github-actions[bot]";

    fn c(id: u64, parent: Option<u64>, author: &str, body: &str) -> ReviewCommentRecord {
        ReviewCommentRecord {
            id,
            author: author.into(),
            body: body.into(),
            in_reply_to: parent,
            path: Some("src/lib.rs".into()),
            line: Some(3),
            ..Default::default()
        }
    }

    fn ids(t: &ConversationThread) -> Vec<u64> {
        t.comments.iter().map(|c| c.id).collect()
    }

    #[test]
    fn chain_resolves_to_root_in_order() {
        let all = vec![
            c(1, None, BOT, "Consider a bounded queue."),
            c(2, Some(1), "alice", "Why?"),
            c(3, Some(2), BOT, "Backpressure."),
        ];
        let reply = c(4, Some(3), "alice", "Makes sense, thanks");
        let t = resolve_thread(&reply, &all, BOT);
        assert_eq!(t.root_id, 1);
        assert_eq!(ids(&t), vec![1, 2, 3, 4]);
        assert_eq!(t.original_comment, "Consider a bounded queue.");
        assert_eq!(t.last_user_reply, "Makes sense, thanks");
        assert!(t.needs_reply);
    }

    #[test]
    fn siblings_are_breadth_first() {
        let all = vec![
            c(10, None, BOT, "root"),
            c(12, Some(10), "bob", "second child"),
            c(11, Some(10), "alice", "first child"),
            c(13, Some(11), "alice", "grandchild"),
        ];
        let t = resolve_thread(&all[3], &all, BOT);
        assert_eq!(ids(&t), vec![10, 11, 12, 13]);
    }

    #[test]
    fn cycle_terminates_without_duplicates() {
        let all = vec![
            c(1, Some(3), "alice", "a"),
            c(2, Some(1), "bob", "b"),
            c(3, Some(2), "carol", "c"),
        ];
        let reply = c(4, Some(3), "dave", "d");
        let t = resolve_thread(&reply, &all, BOT);
        let got = ids(&t);
        let unique: HashSet<u64> = got.iter().copied().collect();
        assert_eq!(unique.len(), got.len());
        assert!(got.contains(&4));
    }

    #[test]
    fn missing_parent_gives_single_comment_thread() {
        let reply = c(9, Some(777), "alice", "hello?");
        let t = resolve_thread(&reply, &[], BOT);
        assert_eq!(t.root_id, 9);
        assert_eq!(ids(&t), vec![9]);
    }

    #[test]
    fn bot_reply_needs_no_answer() {
        let all = vec![c(1, None, "alice", "q")];
        let reply = c(2, Some(1), BOT, "a");
        assert!(!resolve_thread(&reply, &all, BOT).needs_reply);
        assert!(is_bot("dependabot[bot]", BOT));
        assert!(!is_bot("alice", BOT));
    }

    #[test]
    fn human_login_containing_bot_still_gets_reply() {
        let all = vec![c(1, None, BOT, "Prefer iterators here.")];
        let reply = c(2, Some(1), "abbott", "Could you show an example?");
        let t = resolve_thread(&reply, &all, BOT);
        assert!(t.needs_reply);
        assert!(!is_bot("talbot", BOT));
        assert!(looks_like_bot("robotics-dev", BOT));
    }

    #[test]
    fn conversation_labels_roles() {
        let all = vec![c(1, None, BOT, "Use a const."), c(2, Some(1), "alice", "ok")];
        let t = resolve_thread(&all[1], &all, BOT);
        assert_eq!(
            format_conversation(&t, BOT),
            "**ASSISTANT**: Use a const.\n\n**USER**: ok"
        );
    }
}

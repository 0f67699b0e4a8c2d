//! Maps an accepted review response back onto concrete diff lines.
//!
//! Only added lines are ever commented on. A suggestion naming a context line,
//! a removed line, or a line outside the chunk is dropped.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::parser::Chunk;
use crate::review::agents::ReviewResponse;

/// A line-anchored comment ready for the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Normalized path of the destination file.
    pub path: String,
    /// Target-file line number (always an added line).
    pub line: u32,
    pub body: String,
}

/// Builds one [`Comment`] per suggestion that lands on an addition in `chunk`.
pub fn format_comments(path: &str, chunk: &Chunk, response: &ReviewResponse) -> Vec<Comment> {
    let mut out = Vec::with_capacity(response.reviews.len());
    for s in &response.reviews {
        let Some(change) = chunk.change_at(s.line_number) else {
            debug!(
                "format: drop suggestion for {}:{} (line not in chunk)",
                path, s.line_number
            );
            continue;
        };
        if !change.is_addition() {
            debug!(
                "format: drop suggestion for {}:{} (not an added line)",
                path, s.line_number
            );
            continue;
        }
        let body = s.comment.trim();
        if body.is_empty() {
            continue;
        }
        out.push(Comment {
            path: path.to_string(),
            line: s.line_number,
            body: body.to_string(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_diff;
    use crate::review::agents::ReviewSuggestion;

    fn chunk() -> Chunk {
        let diff = "diff --git a/s.rs b/s.rs
--- a/s.rs
+++ b/s.rs
@@ -1,3 +1,3 @@
 a
-gone
+b
 c
";
        parse_diff(diff).remove(0).chunks.remove(0)
    }

    fn resp(items: &[(u32, &str)]) -> ReviewResponse {
        ReviewResponse {
            reviews: items
                .iter()
                .map(|(l, c)| ReviewSuggestion {
                    line_number: *l,
                    comment: c.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn only_additions_survive() {
        let c = chunk();
        let out = format_comments(
            "s.rs",
            &c,
            &resp(&[
                (1, "context line comment"),
                (2, "  added line comment \n"),
                (3, "context again"),
                (42, "outside"),
            ]),
        );
        assert_eq!(
            out,
            vec![Comment {
                path: "s.rs".into(),
                line: 2,
                body: "added line comment".into()
            }]
        );
    }

    #[test]
    fn never_emits_for_non_additions() {
        let c = chunk();
        let all: Vec<(u32, &str)> = (0..10).map(|l| (l, "some comment text")).collect();
        for comment in format_comments("s.rs", &c, &resp(&all)) {
            let change = c.change_at(comment.line).unwrap();
            assert!(change.content.starts_with('+'));
        }
    }
}

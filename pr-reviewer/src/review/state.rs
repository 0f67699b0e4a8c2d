//! Review state machine: steps, per-run state and per-chunk scratch.
//!
//! The transition table is a pure function of the current step and a small set
//! of guard values, so it can be checked without any collaborator.

use tracing::{debug, info};

use crate::config::ReviewerConfig;
use crate::parser::{Chunk, DiffFile};
use crate::review::agents::{Message, ReviewFeedback, ReviewResponse};
use crate::review::format::Comment;

/// Steps of the review state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStep {
    NextChunk,
    RetrieveGuidelines,
    Review,
    Feedback,
    FormatComments,
    SendComments,
    Done,
}

/// Guard values the transition table branches on.
#[derive(Debug, Clone, Copy, Default)]
pub struct Guards {
    /// `NextChunk` found another chunk to review.
    pub chunk_available: bool,
    /// A guideline source is configured.
    pub has_guidelines: bool,
    /// Guidelines must be re-fetched before the next retry.
    pub refresh_guidelines: bool,
    /// Feedback accepted the review (possibly forced).
    pub accepted: bool,
}

/// Pure transition table.
pub fn next_step(step: ReviewStep, g: &Guards) -> ReviewStep {
    match step {
        ReviewStep::NextChunk if !g.chunk_available => ReviewStep::SendComments,
        ReviewStep::NextChunk if g.has_guidelines => ReviewStep::RetrieveGuidelines,
        ReviewStep::NextChunk => ReviewStep::Review,
        ReviewStep::RetrieveGuidelines => ReviewStep::Review,
        ReviewStep::Review => ReviewStep::Feedback,
        ReviewStep::Feedback if g.accepted => ReviewStep::FormatComments,
        ReviewStep::Feedback if g.has_guidelines && g.refresh_guidelines => {
            ReviewStep::RetrieveGuidelines
        }
        ReviewStep::Feedback => ReviewStep::Review,
        ReviewStep::FormatComments => ReviewStep::NextChunk,
        ReviewStep::SendComments | ReviewStep::Done => ReviewStep::Done,
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewStats {
    pub files_total: usize,
    pub files_reviewed: usize,
    pub chunks_total: usize,
    pub chunks_reviewed: usize,
    pub chunks_skipped: usize,
    pub review_calls: usize,
    pub feedback_calls: usize,
    pub forced_acceptances: usize,
    /// True when a safety valve (file or call cap) cut the run short.
    pub truncated: bool,
}

/// Per-run state: the diff model, the cursor and accumulated comments.
#[derive(Debug)]
pub struct RunState {
    pub files: Vec<DiffFile>,
    /// Chunk currently under review as `(file_idx, chunk_idx)`.
    pub current: Option<(usize, usize)>,
    next_file: usize,
    next_chunk: usize,
    last_file: Option<usize>,
    pub comments: Vec<Comment>,
    pub stats: ReviewStats,
}

impl RunState {
    pub fn new(files: Vec<DiffFile>) -> Self {
        let stats = ReviewStats {
            files_total: files.len(),
            chunks_total: files.iter().map(|f| f.chunks.len()).sum(),
            ..Default::default()
        };
        Self {
            files,
            current: None,
            next_file: 0,
            next_chunk: 0,
            last_file: None,
            comments: Vec::new(),
            stats,
        }
    }

    /// Moves the cursor to the next reviewable chunk.
    ///
    /// Chunks without changes are skipped. Returns `false` once every chunk is
    /// consumed or a safety valve in `cfg` is hit.
    pub fn advance(&mut self, cfg: &ReviewerConfig) -> bool {
        self.current = None;
        while self.next_file < self.files.len() {
            if self.next_file >= cfg.max_files {
                info!(
                    "review: file limit reached (max_files={}), {} file(s) not reviewed",
                    cfg.max_files,
                    self.files.len() - self.next_file
                );
                self.stats.truncated = true;
                break;
            }
            let file = &self.files[self.next_file];
            if self.next_chunk >= file.chunks.len() {
                self.next_file += 1;
                self.next_chunk = 0;
                continue;
            }
            if !file.chunks[self.next_chunk].has_changes() {
                debug!(
                    "review: skipping chunk {} of {:?} (no changes)",
                    self.next_chunk, file.to_file
                );
                self.next_chunk += 1;
                continue;
            }
            if self.stats.review_calls >= cfg.max_review_calls {
                info!(
                    "review: call limit reached (max_review_calls={}), remaining chunks not reviewed",
                    cfg.max_review_calls
                );
                self.stats.truncated = true;
                break;
            }

            let pos = (self.next_file, self.next_chunk);
            self.next_chunk += 1;
            if self.last_file != Some(pos.0) {
                self.last_file = Some(pos.0);
                self.stats.files_reviewed += 1;
            }
            self.current = Some(pos);
            return true;
        }
        self.stats.chunks_skipped = self.stats.chunks_total - self.stats.chunks_reviewed;
        false
    }

    /// Normalized path of the file owning the current chunk.
    pub fn current_path(&self) -> String {
        self.current
            .and_then(|(f, _)| self.files[f].target_path())
            .unwrap_or_default()
    }

    pub fn current_chunk(&self) -> Option<&Chunk> {
        self.current.map(|(f, c)| &self.files[f].chunks[c])
    }

    pub fn current_chunk_mut(&mut self) -> Option<&mut Chunk> {
        self.current.map(|(f, c)| &mut self.files[f].chunks[c])
    }
}

/// Scratch for the chunk under review; reset on every `NextChunk`.
#[derive(Debug, Clone, Default)]
pub struct ChunkScratch {
    /// Number of completed retries (0 on the first pass).
    pub retry: u32,
    /// Response of the latest `Review` pass.
    pub response: Option<ReviewResponse>,
    /// Provisional response snapshotted on the first pass.
    pub first_response: Option<ReviewResponse>,
    /// Response chosen once feedback accepts (or acceptance is forced).
    pub accepted: Option<ReviewResponse>,
    /// Latest verdict from the evaluator.
    pub feedback: Option<ReviewFeedback>,
    pub history: Vec<Message>,
}

impl ChunkScratch {
    pub fn is_accepted(&self) -> bool {
        self.accepted.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_diff;

    fn guards(chunk: bool, gl: bool, refresh: bool, ok: bool) -> Guards {
        Guards {
            chunk_available: chunk,
            has_guidelines: gl,
            refresh_guidelines: refresh,
            accepted: ok,
        }
    }

    #[test]
    fn transition_table() {
        use ReviewStep::*;
        assert_eq!(next_step(NextChunk, &guards(false, true, false, false)), SendComments);
        assert_eq!(next_step(NextChunk, &guards(true, true, false, false)), RetrieveGuidelines);
        assert_eq!(next_step(NextChunk, &guards(true, false, false, false)), Review);
        assert_eq!(next_step(RetrieveGuidelines, &Guards::default()), Review);
        assert_eq!(next_step(Review, &Guards::default()), Feedback);
        assert_eq!(next_step(Feedback, &guards(true, true, true, true)), FormatComments);
        assert_eq!(next_step(Feedback, &guards(true, true, true, false)), RetrieveGuidelines);
        assert_eq!(next_step(Feedback, &guards(true, false, true, false)), Review);
        assert_eq!(next_step(Feedback, &guards(true, true, false, false)), Review);
        assert_eq!(next_step(FormatComments, &Guards::default()), NextChunk);
        assert_eq!(next_step(SendComments, &Guards::default()), Done);
        assert_eq!(next_step(Done, &Guards::default()), Done);
    }

    fn two_files() -> Vec<DiffFile> {
        parse_diff(
            "diff --git a/a.rs b/a.rs
--- a/a.rs
+++ b/a.rs
@@ -1,1 +1,2 @@
 x
+y
@@ -10,1 +11,2 @@
 p
+q
diff --git a/b.rs b/b.rs
--- a/b.rs
+++ b/b.rs
@@ -1,1 +1,2 @@
 m
+n
",
        )
    }

    #[test]
    fn cursor_walks_chunks_in_order() {
        let cfg = ReviewerConfig::default();
        let mut run = RunState::new(two_files());
        let mut seen = Vec::new();
        while run.advance(&cfg) {
            seen.push((run.current_path(), run.current.map(|c| c.1)));
            run.stats.chunks_reviewed += 1;
        }
        assert_eq!(
            seen,
            vec![
                ("a.rs".to_string(), Some(0)),
                ("a.rs".to_string(), Some(1)),
                ("b.rs".to_string(), Some(0)),
            ]
        );
        assert_eq!(run.stats.files_reviewed, 2);
        assert_eq!(run.stats.chunks_skipped, 0);
        assert!(!run.stats.truncated);
        assert!(run.current.is_none());
    }

    #[test]
    fn file_cap_stops_cursor() {
        let cfg = ReviewerConfig {
            max_files: 1,
            ..Default::default()
        };
        let mut run = RunState::new(two_files());
        let mut n = 0;
        while run.advance(&cfg) {
            n += 1;
            run.stats.chunks_reviewed += 1;
        }
        assert_eq!(n, 2);
        assert!(run.stats.truncated);
        assert_eq!(run.stats.chunks_skipped, 1);
    }
}

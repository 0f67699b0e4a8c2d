//! Structural model of a parsed unified diff: files → chunks → changes.
//!
//! Passive data only. The parser guarantees the invariants documented on each
//! type; the orchestrator attaches guideline summaries and generated text.

use serde::{Deserialize, Serialize};

/// Marker used by git for the "no file" side of an add/delete.
pub const DEV_NULL: &str = "/dev/null";

/// Kind of a diff line, derived from its leading marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Context,
    Added,
    Removed,
}

/// One line inside a chunk.
///
/// Invariant: `line_number.is_some()` iff `content` starts with `+` or ` `.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Raw line including its leading `+`/`-`/` ` marker.
    pub content: String,
    /// Line number in the target file; `None` for removed lines.
    pub line_number: Option<u32>,
    /// Position within the flattened diff of the owning file (1-based).
    pub diff_position: u32,
    /// Optional generated suggestion for this line.
    pub suggestion: Option<String>,
}

impl Change {
    pub fn kind(&self) -> ChangeKind {
        if self.content.starts_with('+') {
            ChangeKind::Added
        } else if self.content.starts_with('-') {
            ChangeKind::Removed
        } else {
            ChangeKind::Context
        }
    }

    /// Only added lines may ever carry a review comment.
    pub fn is_addition(&self) -> bool {
        self.kind() == ChangeKind::Added
    }
}

/// One `@@ ... @@` hunk.
///
/// Invariant: target line numbers of its changes are strictly increasing and
/// start at `target_start`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Raw header line followed by the body lines, newline-separated.
    pub content: String,
    pub changes: Vec<Change>,
    /// `"<line> <raw>"` for addressable lines, `"<raw>"` for removals.
    pub formatted: Vec<String>,
    pub source_start: u32,
    pub source_length: u32,
    pub target_start: u32,
    pub target_length: u32,
    /// Concise guideline summary attached by the review orchestrator.
    pub guidelines: String,
    /// Accepted review text for this chunk, if any.
    pub generated_review: Option<String>,
}

impl Chunk {
    /// Header line (`@@ -a,b +c,d @@ ...`).
    pub fn header(&self) -> &str {
        self.content.lines().next().unwrap_or_default()
    }

    /// Diff body as shown to the agents: one formatted change per line.
    pub fn formatted_text(&self) -> String {
        self.formatted.join("\n")
    }

    /// Looks up the change that owns a target line number.
    pub fn change_at(&self, line: u32) -> Option<&Change> {
        self.changes.iter().find(|c| c.line_number == Some(line))
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// One file entry of the diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffFile {
    /// Source path as written in the diff (`a/...` or `/dev/null`).
    pub from_file: Option<String>,
    /// Destination path as written in the diff (`b/...` or `/dev/null`).
    pub to_file: Option<String>,
    pub is_binary: bool,
    pub chunks: Vec<Chunk>,
}

impl DiffFile {
    /// Normalized destination path, `None` for deletions or unknown paths.
    pub fn target_path(&self) -> Option<String> {
        self.to_file
            .as_deref()
            .filter(|p| !p.is_empty() && *p != DEV_NULL)
            .map(normalize_path)
    }

    /// True if the file can be reviewed at all (it has a destination).
    pub fn is_reviewable(&self) -> bool {
        self.target_path().is_some()
    }
}

/// Strips git's `a/` / `b/` prefix. `/dev/null` and empty paths pass through.
pub fn normalize_path(path: &str) -> String {
    if path.is_empty() || path == DEV_NULL {
        return path.to_string();
    }
    path.strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path)
        .to_string()
}

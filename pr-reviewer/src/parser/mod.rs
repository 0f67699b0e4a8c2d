//! Unified-diff parser: raw diff text → files → chunks → changes.
//!
//! Features:
//! - Multi-file diffs split on `diff --git`; `---`/`+++` headers refine paths.
//! - Hunk bodies are consumed by their declared lengths, so a removed line
//!   whose text starts with `-- ` is never mistaken for a file header.
//! - Ignores `\ No newline at end of file` marker lines (kept in raw content).
//! - Binary patches (`GIT binary patch`, `Binary files ... differ`) produce no chunks.
//!
//! The parser never fails: malformed headers fall back to defaults and the
//! anomaly is logged, so one broken file cannot abort review of the others.

pub mod filter;
pub mod types;

pub use types::*;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

lazy_static! {
    /// `@@ -start[,len] +start[,len] @@ optional section heading`
    static ref HUNK_HEADER: Regex =
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("valid hunk regex");
}

/// In-flight parser state for the file being assembled.
#[derive(Default)]
struct Cursor {
    file: Option<DiffFile>,
    chunk: Option<Chunk>,
    in_binary: bool,
    /// Target line number assigned to the next context/added line.
    target_line: u32,
    /// Remaining (source, target) body lines declared by the open hunk header.
    remaining: Option<(u32, u32)>,
}

impl Cursor {
    fn close_chunk(&mut self) {
        if let Some(chunk) = self.chunk.take() {
            match self.file.as_mut() {
                Some(f) => f.chunks.push(chunk),
                None => warn!("diff: dropping chunk without an owning file"),
            }
        }
        self.remaining = None;
    }

    fn close_file(&mut self, out: &mut Vec<DiffFile>) {
        self.close_chunk();
        if let Some(f) = self.file.take() {
            debug!(
                "diff: closed file to={:?} chunks={}",
                f.to_file,
                f.chunks.len()
            );
            out.push(f);
        }
        self.in_binary = false;
    }

    /// True while the open hunk still expects body lines.
    fn in_body(&self) -> bool {
        self.chunk.is_some() && matches!(self.remaining, Some((s, t)) if s > 0 || t > 0)
    }

    fn consume(&mut self, source: bool, target: bool) {
        if let Some((s, t)) = self.remaining.as_mut() {
            if source {
                *s = s.saturating_sub(1);
            }
            if target {
                *t = t.saturating_sub(1);
            }
        }
    }
}

/// Result of [`parse_diff_report`]: reviewable files plus the ones dropped.
#[derive(Debug, Clone, Default)]
pub struct ParsedDiff {
    pub files: Vec<DiffFile>,
    /// Source paths of files without a destination (`<unknown>` when undeterminable).
    pub dropped: Vec<String>,
}

/// Parses raw unified diff text into reviewable files.
///
/// Files without a destination (deletions, undeterminable paths) are dropped,
/// and diff positions are assigned per file in a final pass.
pub fn parse_diff(diff_text: &str) -> Vec<DiffFile> {
    parse_diff_report(diff_text).files
}

/// Same as [`parse_diff`], also reporting which files were dropped.
pub fn parse_diff_report(diff_text: &str) -> ParsedDiff {
    let mut files: Vec<DiffFile> = Vec::new();
    let mut cur = Cursor::default();

    for line in diff_text.lines() {
        if line.starts_with("diff --git") {
            cur.close_file(&mut files);
            cur.file = Some(file_from_marker(line));
            continue;
        }

        if cur.in_body() && !line.starts_with("@@") {
            push_body_line(&mut cur, line);
            continue;
        }

        if looks_like_binary_patch(line) {
            debug!("diff: binary content, skipping until next file: {}", line);
            cur.close_chunk();
            cur.in_binary = true;
            if let Some(f) = cur.file.as_mut() {
                f.is_binary = true;
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("--- ") {
            // Without `diff --git` markers a new `---` after hunks starts the next file.
            let starts_new = match &cur.file {
                None => true,
                Some(f) => cur.chunk.is_some() || !f.chunks.is_empty(),
            };
            if starts_new {
                cur.close_file(&mut files);
                cur.file = Some(DiffFile::default());
            }
            if let Some(f) = cur.file.as_mut() {
                f.from_file = Some(strip_header_path(rest));
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("+++ ") {
            if cur.file.is_none() {
                cur.file = Some(DiffFile::default());
            }
            cur.close_chunk();
            if let Some(f) = cur.file.as_mut() {
                f.to_file = Some(strip_header_path(rest));
            }
            continue;
        }

        if line.starts_with("@@") {
            if cur.in_binary || cur.file.is_none() {
                debug!("diff: hunk header outside a text file ignored: {}", line);
                continue;
            }
            cur.close_chunk();
            open_chunk(&mut cur, line);
            continue;
        }

        if cur.chunk.is_some() && !cur.in_binary {
            // Declared lengths are exhausted or unknown; keep consuming best-effort.
            push_body_line(&mut cur, line);
        }
        // Anything else (index, mode, rename lines, prelude) is metadata.
    }

    cur.close_file(&mut files);

    let mut dropped = Vec::new();
    files.retain(|f| {
        let keep = f.is_reviewable();
        if !keep {
            debug!(
                "diff: excluded file without destination from={:?} to={:?}",
                f.from_file, f.to_file
            );
            let path = f
                .from_file
                .as_deref()
                .map(normalize_path)
                .filter(|p| !p.is_empty() && p != "/dev/null")
                .unwrap_or_else(|| "<unknown>".to_string());
            dropped.push(path);
        }
        keep
    });
    assign_diff_positions(&mut files);

    debug!(
        "diff: parsed files={} (dropped {} without destination)",
        files.len(),
        dropped.len()
    );
    ParsedDiff { files, dropped }
}

/// Builds a new file from `diff --git a/x b/x`, taking the path hints if present.
fn file_from_marker(line: &str) -> DiffFile {
    let mut file = DiffFile::default();
    let parts: Vec<&str> = line.split_whitespace().collect();
    if let Some(p) = parts.get(2).filter(|p| p.starts_with("a/")) {
        file.from_file = Some(p.to_string());
    }
    if let Some(p) = parts.get(3).filter(|p| p.starts_with("b/")) {
        file.to_file = Some(p.to_string());
    }
    file
}

/// Path part of a `---`/`+++` line: drops git's trailing tab-separated timestamp.
fn strip_header_path(rest: &str) -> String {
    let path = rest.split('\t').next().unwrap_or(rest).trim_end();
    path.trim_matches('"').to_string()
}

fn open_chunk(cur: &mut Cursor, header: &str) {
    let mut chunk = Chunk {
        content: header.to_string(),
        ..Default::default()
    };

    match parse_hunk_header(header) {
        Some(h) => {
            chunk.source_start = h.source_start;
            chunk.source_length = h.source_length;
            chunk.target_start = h.target_start;
            chunk.target_length = h.target_length;
            cur.remaining = Some((h.source_length, h.target_length));
        }
        None => {
            warn!("diff: malformed hunk header, defaulting to 1: {}", header);
            chunk.source_start = 1;
            chunk.source_length = 1;
            chunk.target_start = 1;
            chunk.target_length = 1;
            cur.remaining = None;
        }
    }

    cur.target_line = chunk.target_start;
    cur.chunk = Some(chunk);
}

fn push_body_line(cur: &mut Cursor, line: &str) {
    let mut line_overflow = false;
    let Some(chunk) = cur.chunk.as_mut() else {
        return;
    };
    chunk.content.push('\n');
    chunk.content.push_str(line);

    // Marker lines are part of the raw text only.
    if line.starts_with('\\') {
        return;
    }

    let (raw, is_source, is_target) = if line.starts_with('+') {
        (line.to_string(), false, true)
    } else if line.starts_with('-') {
        (line.to_string(), true, false)
    } else if line.starts_with(' ') {
        (line.to_string(), true, true)
    } else if line.is_empty() {
        // Some tools strip the single space of an empty context line.
        (" ".to_string(), true, true)
    } else {
        debug!("diff: unclassified body line kept as raw text: {}", line);
        return;
    };

    if is_target {
        let n = cur.target_line;
        chunk.formatted.push(format!("{n} {raw}"));
        chunk.changes.push(Change {
            content: raw,
            line_number: Some(n),
            diff_position: 0,
            suggestion: None,
        });
        match cur.target_line.checked_add(1) {
            Some(next) => cur.target_line = next,
            None => line_overflow = true,
        }
    } else {
        chunk.formatted.push(raw.clone());
        chunk.changes.push(Change {
            content: raw,
            line_number: None,
            diff_position: 0,
            suggestion: None,
        });
    }
    cur.consume(is_source, is_target);

    if line_overflow {
        warn!("diff: target line number overflows, closing hunk early");
        cur.close_chunk();
    }
}

/// Parsed numbers of a hunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkHeader {
    pub source_start: u32,
    pub source_length: u32,
    pub target_start: u32,
    pub target_length: u32,
}

/// Parses `@@ -a[,b] +c[,d] @@`; omitted lengths default to 1.
pub fn parse_hunk_header(line: &str) -> Option<HunkHeader> {
    let caps = HUNK_HEADER.captures(line)?;
    let num = |i: usize, default: u32| -> Option<u32> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(default),
        }
    };
    Some(HunkHeader {
        source_start: num(1, 1)?,
        source_length: num(2, 1)?,
        target_start: num(3, 1)?,
        target_length: num(4, 1)?,
    })
}

/// Numbers each file's flattened diff: one slot per chunk boundary, one per change.
fn assign_diff_positions(files: &mut [DiffFile]) {
    for file in files.iter_mut() {
        let mut position = 0u32;
        for chunk in file.chunks.iter_mut() {
            position += 1;
            for change in chunk.changes.iter_mut() {
                position += 1;
                change.diff_position = position;
            }
        }
    }
}

/// Simple heuristic to detect binary patches or messages in unified diff.
pub fn looks_like_binary_patch(s: &str) -> bool {
    s.starts_with("GIT binary patch")
        || s.starts_with("Binary files ")
        || (s.starts_with("Files ") && s.ends_with(" differ"))
}

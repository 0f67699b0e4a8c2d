//! Path-based exclusion of parsed files (`INPUT_EXCLUDE` globs).

use glob::Pattern;
use tracing::{debug, warn};

use super::types::DiffFile;

/// Result of filtering: files to review plus the excluded paths (for the summary).
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub kept: Vec<DiffFile>,
    pub excluded: Vec<String>,
}

/// Removes files whose normalized destination path matches any pattern.
///
/// Invalid patterns are logged and ignored rather than failing the run.
pub fn filter_excluded(files: Vec<DiffFile>, patterns: &[String]) -> FilterOutcome {
    let compiled: Vec<Pattern> = patterns
        .iter()
        .filter_map(|p| match Pattern::new(p) {
            Ok(pat) => Some(pat),
            Err(e) => {
                warn!("filter: ignoring invalid exclude pattern '{}': {}", p, e);
                None
            }
        })
        .collect();

    let mut out = FilterOutcome::default();
    for file in files {
        let path = file.target_path().unwrap_or_default();
        if compiled.iter().any(|pat| pat.matches(&path)) {
            debug!("filter: excluding file {}", path);
            out.excluded.push(path);
        } else {
            out.kept.push(file);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(to: &str) -> DiffFile {
        DiffFile {
            to_file: Some(to.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn excludes_matching_paths() {
        let files = vec![file("b/Cargo.lock"), file("b/src/main.rs"), file("b/docs/a.md")];
        let patterns = vec!["*.lock".to_string(), "docs/*".to_string(), "[".to_string()];
        let out = filter_excluded(files, &patterns);
        assert_eq!(out.excluded, vec!["Cargo.lock".to_string(), "docs/a.md".to_string()]);
        assert_eq!(out.kept.len(), 1);
        assert_eq!(out.kept[0].target_path().as_deref(), Some("src/main.rs"));
    }
}

//! Guideline sources: a local directory store ranked by token overlap, and a
//! decorator that condenses retrieved snippets with the LLM.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::errors::{ConfigError, MrResult};
use crate::review::agents::{GuidelineLookup, truncate_chars};
use crate::review::llm::{LlmClient, clean_text};
use crate::review::prompt::build_guideline_summary_prompt;

/// Paragraphs shorter than this are headings or noise.
const MIN_SNIPPET_CHARS: usize = 20;
/// Score bonus for snippets written for (or mentioning) the file's language.
const LANGUAGE_BOOST: usize = 3;
/// Upper bound on a summary kept per chunk.
const SUMMARY_MAX_CHARS: usize = 1_500;

#[derive(Debug, Clone)]
struct Snippet {
    /// Lowercased stem of the source document, e.g. `rust` for `rust.md`.
    source: String,
    text: String,
    tokens: HashSet<String>,
}

/// Guidelines loaded from `*.md` / `*.txt` files under one directory.
#[derive(Debug, Clone, Default)]
pub struct DirGuidelineStore {
    snippets: Vec<Snippet>,
    top_k: usize,
}

impl DirGuidelineStore {
    /// Loads every markdown/text document below `dir`, split into paragraphs.
    pub fn load(dir: &str, top_k: usize) -> MrResult<Self> {
        if !Path::new(dir).is_dir() {
            return Err(ConfigError::InvalidValue {
                var: "GUIDELINES_DIR",
                reason: format!("not a directory: {dir}"),
            }
            .into());
        }
        let mut docs = Vec::new();
        for ext in ["md", "txt"] {
            let pattern = format!("{}/**/*.{}", dir.trim_end_matches('/'), ext);
            let paths = glob::glob(&pattern)
                .map_err(|e| ConfigError::InvalidValue {
                    var: "GUIDELINES_DIR",
                    reason: format!("bad glob pattern: {e}"),
                })?;
            for path in paths.flatten() {
                let source = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                docs.push((source, std::fs::read_to_string(&path)?));
            }
        }
        let store = Self::from_documents(docs, top_k);
        info!(
            "guidelines: loaded {} snippet(s) from {}",
            store.snippets.len(),
            dir
        );
        Ok(store)
    }

    /// Builds a store from `(source_name, text)` pairs.
    pub fn from_documents(docs: Vec<(String, String)>, top_k: usize) -> Self {
        let mut snippets = Vec::new();
        for (source, text) in docs {
            let source = source.to_ascii_lowercase();
            let text = text.replace("\r\n", "\n");
            for para in text.split("\n\n") {
                let para = para.trim();
                if para.chars().count() < MIN_SNIPPET_CHARS {
                    continue;
                }
                snippets.push(Snippet {
                    source: source.clone(),
                    text: para.to_string(),
                    tokens: tokenize(para),
                });
            }
        }
        Self {
            snippets,
            top_k: top_k.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    /// Top-k snippets by overlap with `query`, boosted for the file's language.
    /// Ties keep document order; zero-score snippets are never returned.
    pub fn rank(&self, query: &str, file_path: &str) -> Vec<String> {
        let q = tokenize(query);
        let lang = language_of(file_path);

        let mut scored: Vec<(usize, usize)> = self
            .snippets
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let mut score = s.tokens.intersection(&q).count();
                let for_lang = lang
                    .is_some_and(|l| l.iter().any(|n| *n == s.source || s.tokens.contains(*n)));
                if score > 0 && for_lang {
                    score += LANGUAGE_BOOST;
                }
                (i, score)
            })
            .filter(|(_, score)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        scored
            .into_iter()
            .take(self.top_k)
            .map(|(i, _)| self.snippets[i].text.clone())
            .collect()
    }
}

impl GuidelineLookup for DirGuidelineStore {
    async fn lookup_guidelines(&self, query: &str, file_path: &str) -> MrResult<Vec<String>> {
        let hits = self.rank(query, file_path);
        debug!("guidelines: {} hit(s) for {}", hits.len(), file_path);
        Ok(hits)
    }
}

fn tokenize(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() > 2)
        .map(str::to_ascii_lowercase)
        .collect()
}

/// Document names that count as "written for" the file's language.
fn language_of(file_path: &str) -> Option<&'static [&'static str]> {
    let ext = Path::new(file_path).extension()?.to_str()?;
    Some(match ext {
        "rs" => &["rust", "rs"],
        "py" => &["python", "py"],
        "ts" | "tsx" => &["typescript", "ts"],
        "js" | "jsx" => &["javascript", "js"],
        "go" => &["go", "golang"],
        "java" => &["java"],
        "kt" => &["kotlin", "kt"],
        "dart" => &["dart", "flutter"],
        "rb" => &["ruby", "rb"],
        _ => return None,
    })
}

/// Wraps a lookup and replaces its snippets with one LLM-written summary.
///
/// On summarization failure the raw snippets are passed through.
#[derive(Debug, Clone)]
pub struct SummarizingLookup<G> {
    inner: G,
    llm: LlmClient,
}

impl<G> SummarizingLookup<G> {
    pub fn new(inner: G, llm: LlmClient) -> Self {
        Self { inner, llm }
    }
}

impl<G: GuidelineLookup + Sync> GuidelineLookup for SummarizingLookup<G> {
    async fn lookup_guidelines(&self, query: &str, file_path: &str) -> MrResult<Vec<String>> {
        let snippets = self.inner.lookup_guidelines(query, file_path).await?;
        if snippets.is_empty() {
            return Ok(snippets);
        }
        let prompt = build_guideline_summary_prompt(file_path, query, &snippets);
        crate::telemetry::prompt_dump::dump_prompt("guidelines", file_path, &prompt);
        match self.llm.generate_raw(&prompt).await {
            Ok(raw) => {
                let summary = clean_text(&raw);
                if summary.is_empty() {
                    return Ok(snippets);
                }
                Ok(vec![truncate_chars(&summary, SUMMARY_MAX_CHARS)])
            }
            Err(e) => {
                warn!("guidelines: summarization failed, using raw snippets: {e}");
                Ok(snippets)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    fn store() -> DirGuidelineStore {
        DirGuidelineStore::from_documents(
            vec![
                (
                    "general".into(),
                    "# Style\n\nAlways handle errors explicitly instead of ignoring them.\n\nshort".into(),
                ),
                (
                    "Rust".into(),
                    "Prefer returning errors with the question mark operator.\n\nAvoid unwrap in library code paths.".into(),
                ),
            ],
            2,
        )
    }

    #[test]
    fn paragraphs_are_split_and_short_ones_dropped() {
        assert_eq!(store().len(), 3);
    }

    #[test]
    fn crlf_documents_split_into_paragraphs() {
        let s = DirGuidelineStore::from_documents(
            vec![(
                "windows".into(),
                "Keep functions under fifty lines where possible.\r\n\r\nName tests after the behavior they check.".into(),
            )],
            2,
        );
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn missing_dir_is_a_config_error() {
        let err = DirGuidelineStore::load("/nonexistent/guidelines-dir", 2).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidValue { var: "GUIDELINES_DIR", .. })
        ));
    }

    #[test]
    fn language_boost_breaks_ties() {
        let hits = store().rank("+ let v = thing.unwrap(); // errors", "src/lib.rs");
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| !h.starts_with("Always")));
    }

    #[test]
    fn unrelated_query_returns_nothing() {
        assert!(store().rank("zzz qqq", "a.py").is_empty());
    }

    #[tokio::test]
    async fn summarizer_passes_snippets_through_when_llm_fails() {
        let llm = LlmClient::new(crate::review::llm::LlmConfig {
            endpoint: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..Default::default()
        })
        .unwrap();
        let lookup = SummarizingLookup::new(store(), llm);
        let out = lookup
            .lookup_guidelines("avoid unwrap in code", "src/lib.rs")
            .await
            .unwrap();
        assert!(!out.is_empty());
        assert!(out.iter().any(|s| s.contains("unwrap")));
    }

    #[test]
    fn load_rejects_missing_dir() {
        assert!(DirGuidelineStore::load("/no/such/guidelines", 4).is_err());
    }
}

//! Runtime configuration loaded from environment variables.
//!
//! Read once at startup and shared by reference; nothing mutates it afterwards,
//! so concurrent runs in the same process may share one instance.

use crate::errors::{ConfigError, MrResult};

/// Which state machine the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Review the whole PR diff and post line comments.
    Review,
    /// Answer a user reply inside an existing comment thread.
    Reply,
}

impl RunMode {
    pub fn parse(raw: &str) -> MrResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "review" => Ok(Self::Review),
            "reply" => Ok(Self::Reply),
            other => Err(ConfigError::InvalidValue {
                var: "MODE",
                reason: format!("unknown mode '{other}', expected 'review' or 'reply'"),
            }
            .into()),
        }
    }
}

/// When guidelines are fetched again after the first pass over a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuidelineRefresh {
    /// Refresh once, on the first retry, then reuse.
    FirstRetry,
    /// Refresh before every retry.
    EveryRetry,
    /// Fetch once per chunk only.
    Never,
}

impl GuidelineRefresh {
    pub fn parse(raw: &str) -> MrResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "first_retry" | "first" => Ok(Self::FirstRetry),
            "every_retry" | "every" => Ok(Self::EveryRetry),
            "never" | "none" => Ok(Self::Never),
            other => Err(ConfigError::InvalidValue {
                var: "GUIDELINE_REFRESH",
                reason: format!("unknown policy '{other}'"),
            }
            .into()),
        }
    }

    /// True if guidelines must be re-fetched before the pass numbered `retry` (1-based).
    pub fn refresh_on(self, retry: u32) -> bool {
        match self {
            Self::FirstRetry => retry == 1,
            Self::EveryRetry => retry >= 1,
            Self::Never => false,
        }
    }
}

/// Knobs for one review/reply run.
#[derive(Debug, Clone)]
pub struct ReviewerConfig {
    /// Max `Review`↔`Feedback` retries per chunk before acceptance is forced.
    pub max_retries: u32,
    /// Safety valve: files processed per run.
    pub max_files: usize,
    /// Safety valve: review-generation calls per run.
    pub max_review_calls: usize,
    /// Glob patterns matched against normalized destination paths.
    pub exclude_patterns: Vec<String>,
    pub guideline_refresh: GuidelineRefresh,
    /// Login of the bot account; used to attribute thread messages.
    pub bot_login: String,
    /// Log what would be posted instead of calling the host.
    pub dry_run: bool,
}

impl Default for ReviewerConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            max_files: 10,
            max_review_calls: 20,
            exclude_patterns: Vec::new(),
            guideline_refresh: GuidelineRefresh::FirstRetry,
            bot_login: "github-actions[bot]".to_string(),
            dry_run: false,
        }
    }
}

impl ReviewerConfig {
    /// Build from environment variables, defaults for everything optional.
    ///
    /// # Errors
    /// [`ConfigError::InvalidNumber`] / [`ConfigError::InvalidValue`] when a
    /// variable is set but malformed.
    pub fn from_env() -> MrResult<Self> {
        let d = Self::default();
        let guideline_refresh = match env_opt("GUIDELINE_REFRESH") {
            Some(v) => GuidelineRefresh::parse(&v)?,
            None => d.guideline_refresh,
        };

        Ok(Self {
            max_retries: env_parse("MAX_LOOP", d.max_retries)?,
            max_files: env_parse("MAX_FILES_TO_REVIEW", d.max_files)?,
            max_review_calls: env_parse("MAX_API_CALLS", d.max_review_calls)?,
            exclude_patterns: split_patterns(&env_opt("INPUT_EXCLUDE").unwrap_or_default()),
            guideline_refresh,
            bot_login: env_opt("BOT_LOGIN").unwrap_or(d.bot_login),
            dry_run: env_bool("PUBLISH_DRY_RUN", d.dry_run),
        })
    }
}

/// Run identity and optional inputs, read once at startup.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub mode: RunMode,
    /// `owner/repo`.
    pub repository: String,
    /// Required in review mode; reply mode falls back to the event payload.
    pub pull_number: Option<u64>,
    /// Event payload path (reply mode).
    pub event_path: Option<String>,
    /// Enables the directory guideline store when set.
    pub guidelines_dir: Option<String>,
    pub guideline_top_k: usize,
}

impl RunSettings {
    /// Reads `MODE`, `REPOSITORY`, `PULL_NUMBER`, `GITHUB_EVENT_PATH`,
    /// `GUIDELINES_DIR` and `GUIDELINE_TOP_K`.
    ///
    /// # Errors
    /// [`ConfigError::MissingVar`] for a missing identifier of the selected mode.
    pub fn from_env() -> MrResult<Self> {
        let mode = RunMode::parse(&must_env("MODE")?)?;
        let repository = must_env("REPOSITORY")?;
        let pull_number = match env_opt("PULL_NUMBER") {
            Some(_) => Some(env_parse::<u64>("PULL_NUMBER", 0)?),
            None => None,
        };
        let event_path = env_opt("GITHUB_EVENT_PATH");

        match mode {
            RunMode::Review if pull_number.is_none() => {
                return Err(ConfigError::MissingVar("PULL_NUMBER").into());
            }
            RunMode::Reply if event_path.is_none() => {
                return Err(ConfigError::MissingVar("GITHUB_EVENT_PATH").into());
            }
            _ => {}
        }

        Ok(Self {
            mode,
            repository,
            pull_number,
            event_path,
            guidelines_dir: env_opt("GUIDELINES_DIR"),
            guideline_top_k: env_parse("GUIDELINE_TOP_K", 4usize)?,
        })
    }
}

/// Splits a comma-separated pattern list, dropping blanks.
pub fn split_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fetches a required, non-empty environment variable.
pub fn must_env(name: &'static str) -> MrResult<String> {
    env_opt(name).ok_or_else(|| ConfigError::MissingVar(name).into())
}

/// Returns the variable if set and non-blank.
pub fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
}

/// Parses an optional variable, falling back to `default` when unset.
pub fn env_parse<T: std::str::FromStr>(name: &'static str, default: T) -> MrResult<T> {
    match env_opt(name) {
        Some(v) => v.trim().parse::<T>().map_err(|_| {
            ConfigError::InvalidNumber {
                var: name,
                value: v.clone(),
            }
            .into()
        }),
        None => Ok(default),
    }
}

pub fn env_bool(name: &str, default: bool) -> bool {
    env_opt(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

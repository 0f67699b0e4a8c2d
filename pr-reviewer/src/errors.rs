//! Crate-wide error hierarchy for pr-reviewer.
//!
//! Goals:
//! - Single root `Error` for all public functions.
//! - Provider-aware mapping (401→Unauthorized, 429→RateLimited, 5xx→Server, etc.).
//! - No dynamic dispatch, no async-trait, ergonomic `?` via `From` impls.
//!
//! Diff parsing has no error type on purpose: the parser is best-effort and
//! recovers locally from malformed input.

use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type MrResult<T> = Result<T, Error>;

/// Root error type for the pr-reviewer crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Host (GitHub) related failure.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// LLM collaborator failure (transport, status, or unusable output).
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Configuration problems (missing identifiers, bad numbers, bad event payload).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Local file I/O (guideline documents, prompt dumps, event payload).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Input validation errors (bad IDs, unsupported values, etc.).
    #[error("validation error: {0}")]
    Validation(String),
}

/// Detailed provider-specific error used inside the provider layer.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Unauthorized (HTTP 401).
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden (HTTP 403).
    #[error("forbidden")]
    Forbidden,

    /// Not found (HTTP 404).
    #[error("not found")]
    NotFound,

    /// Validation failed on the host side (HTTP 422), e.g. line outside the diff.
    #[error("unprocessable entity: {0}")]
    Unprocessable(String),

    /// Rate limited (HTTP 429).
    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Gateway/Server error (HTTP 5xx).
    #[error("server error: status {0}")]
    Server(u16),

    /// Other HTTP status (4xx/3xx) not covered above.
    #[error("http status error: {0}")]
    HttpStatus(u16),

    /// Timeout at transport level.
    #[error("timeout")]
    Timeout,

    /// Network/transport failure without status (DNS/connect/reset).
    #[error("network error: {0}")]
    Network(String),

    /// JSON deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Unexpected/invalid shape of provider response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Errors raised while talking to the language model.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Transport/HTTP client error.
    #[error("llm transport error: {0}")]
    Transport(String),

    /// Non-successful HTTP status from the model server.
    #[error("llm http status {status}: {snippet}")]
    HttpStatus { status: u16, snippet: String },

    /// The reply did not contain a JSON document where one was required.
    #[error("llm reply has no json object: {0}")]
    NoJson(String),

    /// The JSON document did not match the expected schema.
    #[error("llm reply failed schema validation: {0}")]
    Schema(String),
}

/// Configuration and setup errors (missing identifiers, invalid values, etc.).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing or empty.
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// A number failed to parse (limits, PR number, timeouts).
    #[error("invalid number in {var}: {value}")]
    InvalidNumber { var: &'static str, value: String },

    /// Value had the wrong format.
    #[error("invalid value in {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },

    /// Reply mode could not read or decode the event payload.
    #[error("unreadable event payload {path}: {reason}")]
    EventPayload { path: String, reason: String },
}

// ===== Conversions for `?` ergonomics =====

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Provider(ProviderError::from(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Provider(ProviderError::Serde(e))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return ProviderError::Timeout;
        }
        if let Some(status) = e.status() {
            return ProviderError::from_status(status.as_u16(), String::new());
        }
        ProviderError::Network(e.to_string())
    }
}

impl ProviderError {
    /// Maps a raw HTTP status (plus a short body snippet) to a provider error.
    pub fn from_status(code: u16, snippet: String) -> Self {
        match code {
            401 => ProviderError::Unauthorized,
            403 => ProviderError::Forbidden,
            404 => ProviderError::NotFound,
            422 => ProviderError::Unprocessable(snippet),
            429 => ProviderError::RateLimited {
                retry_after_secs: None,
            },
            500..=599 => ProviderError::Server(code),
            _ => ProviderError::HttpStatus(code),
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            ProviderError::from_status(401, String::new()),
            ProviderError::Unauthorized
        ));
        assert!(matches!(
            ProviderError::from_status(422, "line must be part of the diff".into()),
            ProviderError::Unprocessable(ref s) if s.contains("diff")
        ));
        assert!(matches!(
            ProviderError::from_status(503, String::new()),
            ProviderError::Server(503)
        ));
        assert!(matches!(
            ProviderError::from_status(409, String::new()),
            ProviderError::HttpStatus(409)
        ));
    }
}

//! Host facade for GitHub pull requests.
//!
//! One concrete client, no async-trait and no trait objects. The publish side
//! implements `publish::CommentPoster` on top of the same client.

pub mod event;
pub mod github;
pub mod types;
pub use types::*;

use crate::config::{env_bool, env_opt, must_env};
use crate::errors::MrResult;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Runtime configuration for the host client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API base, e.g. "https://api.github.com".
    pub base_api: String,
    /// Access token; may be empty in dry-run.
    pub token: String,
    pub dry_run: bool,
}

impl ProviderConfig {
    /// Reads `GITHUB_API_URL`, `GITHUB_TOKEN` and `PUBLISH_DRY_RUN`.
    ///
    /// The token is required unless dry-run is on.
    pub fn from_env() -> MrResult<Self> {
        let dry_run = env_bool("PUBLISH_DRY_RUN", false);
        let token = if dry_run {
            env_opt("GITHUB_TOKEN").unwrap_or_default()
        } else {
            must_env("GITHUB_TOKEN")?
        };
        Ok(Self {
            base_api: env_opt("GITHUB_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            token,
            dry_run,
        })
    }
}

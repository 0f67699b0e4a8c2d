//! LLM layer: thin Ollama client plus the review/feedback/reply agents built on it.

use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{env_opt, env_parse};
use crate::errors::{LlmError, MrResult};
use crate::review::agents::{
    FeedbackContext, FeedbackEvaluator, RawReviewFeedback, RawReviewResponse, ReplyContext,
    ReplyGenerator, ReviewContext, ReviewFeedback, ReviewGenerator, ReviewResponse,
};
use crate::review::prompt::{build_feedback_prompt, build_reply_prompt, build_review_prompt};
use crate::telemetry::prompt_dump::dump_prompt;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:11434";
pub const DEFAULT_MODEL: &str = "qwen3:14b";

lazy_static! {
    static ref THINK_BLOCK: Regex = Regex::new(r"(?s)<think>.*?</think>").unwrap();
    static ref JSON_FENCE: Regex = Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap();
}

/// Model endpoint configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 120,
        }
    }
}

impl LlmConfig {
    /// Reads `OLLAMA_URL`, `OLLAMA_MODEL` and `LLM_TIMEOUT_SECS`.
    pub fn from_env() -> MrResult<Self> {
        let d = Self::default();
        Ok(Self {
            endpoint: env_opt("OLLAMA_URL").unwrap_or(d.endpoint),
            model: env_opt("OLLAMA_MODEL").unwrap_or(d.model),
            timeout_secs: env_parse("LLM_TIMEOUT_SECS", d.timeout_secs)?,
        })
    }
}

/// Thin Ollama client.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    cfg: LlmConfig,
}

impl LlmClient {
    pub fn new(cfg: LlmConfig) -> MrResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .build()
            .map_err(LlmError::from)?;
        Ok(Self { http, cfg })
    }

    /// Minimal `/api/generate` wrapper, returns plain text.
    pub async fn generate_raw(&self, prompt: &str) -> MrResult<String> {
        #[derive(serde::Serialize)]
        struct Req<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            response: String,
        }

        let url = format!("{}/api/generate", self.cfg.endpoint.trim_end_matches('/'));
        debug!(
            "llm.generate model={} url={} prompt_chars={}",
            self.cfg.model,
            url,
            prompt.chars().count()
        );
        let resp = self
            .http
            .post(&url)
            .json(&Req {
                model: &self.cfg.model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(LlmError::from)?;

        let status = resp.status();
        if !status.is_success() {
            let snippet: String = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(LlmError::HttpStatus {
                status: status.as_u16(),
                snippet,
            }
            .into());
        }
        let body: Resp = resp.json().await.map_err(LlmError::from)?;
        Ok(body.response)
    }

    /// Generates and decodes a JSON document of type `T`.
    pub async fn generate_json<T: DeserializeOwned>(&self, prompt: &str) -> MrResult<T> {
        let raw = self.generate_raw(prompt).await?;
        let json = extract_json(&raw).ok_or_else(|| LlmError::NoJson(preview(&raw)))?;
        serde_json::from_str(json).map_err(|e| LlmError::Schema(e.to_string()).into())
    }
}

/// Finds the JSON object inside a model reply: a fenced block if present,
/// else the outermost `{ ... }` span. Reasoning blocks are ignored.
pub fn extract_json(text: &str) -> Option<&str> {
    let start_at = THINK_BLOCK.find_iter(text).last().map_or(0, |m| m.end());
    let text = &text[start_at..];
    if let Some(c) = JSON_FENCE.captures(text) {
        return c.get(1).map(|m| m.as_str());
    }
    let open = text.find('{')?;
    let close = text.rfind('}')?;
    (close > open).then(|| &text[open..=close])
}

/// Removes reasoning blocks and surrounding whitespace from free text.
pub fn clean_text(text: &str) -> String {
    THINK_BLOCK.replace_all(text, "").trim().to_string()
}

fn preview(s: &str) -> String {
    s.chars().take(120).collect()
}

/// Review, feedback and reply agents backed by one model.
#[derive(Debug, Clone)]
pub struct LlmAgents {
    client: LlmClient,
}

impl LlmAgents {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

impl ReviewGenerator for LlmAgents {
    async fn generate_review(&self, ctx: &ReviewContext<'_>) -> MrResult<ReviewResponse> {
        let prompt = build_review_prompt(ctx);
        dump_prompt("review", ctx.file_path, &prompt);
        let raw: RawReviewResponse = self.client.generate_json(&prompt).await?;
        Ok(ReviewResponse::from_raw(raw))
    }
}

impl FeedbackEvaluator for LlmAgents {
    async fn evaluate_review(&self, ctx: &FeedbackContext<'_>) -> MrResult<ReviewFeedback> {
        let prompt = build_feedback_prompt(ctx);
        dump_prompt("feedback", "chunk", &prompt);
        let raw: RawReviewFeedback = self.client.generate_json(&prompt).await?;
        Ok(ReviewFeedback::from_raw(raw))
    }
}

impl ReplyGenerator for LlmAgents {
    async fn generate_reply(&self, ctx: &ReplyContext<'_>) -> MrResult<String> {
        let prompt = build_reply_prompt(ctx);
        dump_prompt("reply", ctx.file_path, &prompt);
        let raw = self.client.generate_raw(&prompt).await?;
        Ok(clean_text(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_from_fenced_block() {
        let t = "Sure!\n```json\n{\"reviews\": []}\n```\nbye";
        assert_eq!(extract_json(t), Some("{\"reviews\": []}"));
    }

    #[test]
    fn json_from_bare_text_after_reasoning() {
        let t = "<think>maybe {not this}</think>\nResult: {\"satisfied\": true} done";
        assert_eq!(extract_json(t), Some("{\"satisfied\": true}"));
    }

    #[test]
    fn no_json_is_none() {
        assert_eq!(extract_json("nothing here"), None);
        assert_eq!(extract_json("} {"), None);
    }

    #[test]
    fn reply_text_is_cleaned() {
        assert_eq!(clean_text("<think>hmm</think>\n  Use a borrow. "), "Use a borrow.");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let client = LlmClient::new(LlmConfig {
            endpoint: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..Default::default()
        })
        .unwrap();
        let err = client.generate_raw("ping").await.unwrap_err();
        assert!(matches!(err, crate::errors::Error::Llm(LlmError::Transport(_))));
    }
}

//! Optional diagnostics around LLM calls.

pub mod prompt_dump;

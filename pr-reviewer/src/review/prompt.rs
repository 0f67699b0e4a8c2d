//! Prompt builders for review, feedback, guideline summaries and replies.
//!
//! Keep prompts compact; JSON-producing prompts spell out the exact schema.

use crate::review::agents::{
    COMMENT_MAX_CHARS, CRITIQUE_MAX_CHARS, FeedbackContext, MAX_FEEDBACK_SUGGESTIONS,
    MAX_SUGGESTIONS, ReplyContext, ReviewContext, render_history,
};

const REVIEW_SCHEMA: &str = r#"{"reviews": [{"lineNumber": <int>, "reviewComment": "<markdown>"}]}"#;
const FEEDBACK_SCHEMA: &str =
    r#"{"satisfied": <bool>, "critique": "<text or null>", "suggestions": ["<text>"]}"#;

/// Prompt for the review generator.
pub fn build_review_prompt(ctx: &ReviewContext<'_>) -> String {
    let mut s = String::new();
    s.push_str("You are an expert code reviewer. Answer with JSON only.\n");
    s.push_str("\n# Output schema\n");
    s.push_str(REVIEW_SCHEMA);
    s.push('\n');
    s.push_str("\n# Rules\n");
    s.push_str("- Only reference added lines (those starting with '+'); use the number printed before the line.\n");
    s.push_str("- Only comment when an improvement is needed: bugs, performance, security, major readability.\n");
    s.push_str(&format!(
        "- At most {MAX_SUGGESTIONS} comments, each under {COMMENT_MAX_CHARS} characters, GitHub Markdown.\n"
    ));
    s.push_str("- Do not suggest adding code comments.\n");
    s.push_str("- Return an empty `reviews` array for clean code.\n");

    s.push_str(&format!("\n# Pull request\nTitle: {}\n", ctx.pr_title));
    if !ctx.pr_description.trim().is_empty() {
        s.push_str(&format!("Description: {}\n", ctx.pr_description.trim()));
    }
    s.push_str(&format!("File: {}\n", ctx.file_path));

    if !ctx.guidelines.trim().is_empty() {
        s.push_str("\n# Guidelines\n");
        s.push_str(ctx.guidelines.trim());
        s.push('\n');
    }
    if let Some(critique) = ctx.critique.filter(|c| !c.trim().is_empty()) {
        s.push_str("\n# The previous response had issues\n");
        s.push_str(critique.trim());
        s.push('\n');
    }
    if !ctx.suggestions.is_empty() {
        s.push_str("\n# Suggestions for improvement\n");
        for sug in ctx.suggestions {
            s.push_str(&format!("- {sug}\n"));
        }
    }
    if !ctx.history.is_empty() {
        s.push_str("\n# History\n");
        s.push_str(&render_history(ctx.history));
        s.push('\n');
    }

    s.push_str("\n# Diff (line number, then the raw diff line)\n```diff\n");
    s.push_str(&ctx.code_diff);
    s.push_str("\n```\n");
    s
}

/// Prompt for the feedback evaluator.
pub fn build_feedback_prompt(ctx: &FeedbackContext<'_>) -> String {
    let mut s = String::new();
    s.push_str("You are a feedback evaluator for automated code reviews. Answer with JSON only.\n");
    s.push_str("\n# Output schema\n");
    s.push_str(FEEDBACK_SCHEMA);
    s.push('\n');
    s.push_str("\n# Mark satisfied=true if\n");
    s.push_str("- the review refers only to added lines (`+`);\n");
    s.push_str("- it points out real problems and each comment is actionable and technically sound;\n");
    s.push_str("- it follows the guidelines from the history, if any;\n");
    s.push_str("- or it returns an empty `reviews` array for clean code.\n");
    s.push_str("\n# Mark satisfied=false if\n");
    s.push_str("- comments are vague, trivial, incorrect, or unrelated to the diff.\n");
    s.push_str(&format!(
        "\nKeep `critique` under {CRITIQUE_MAX_CHARS} characters and give at most {MAX_FEEDBACK_SUGGESTIONS} suggestions.\n"
    ));

    s.push_str("\n# Diff\n```diff\n");
    s.push_str(&ctx.code_diff);
    s.push_str("\n```\n");
    if !ctx.history.is_empty() {
        s.push_str("\n# History\n");
        s.push_str(&render_history(ctx.history));
        s.push('\n');
    }
    s.push_str("\n# Review to evaluate\n");
    s.push_str(&serde_json::to_string(ctx.response).unwrap_or_default());
    s.push('\n');
    s
}

/// Prompt condensing raw guideline snippets into a short summary.
pub fn build_guideline_summary_prompt(file_path: &str, query: &str, snippets: &[String]) -> String {
    let mut s = String::new();
    s.push_str("You summarize coding guidelines concisely. ");
    s.push_str("Write a summary of 200 words or less, keeping only points relevant to the code below.\n");
    s.push_str(&format!("\n# File\n{file_path}\n"));
    s.push_str("\n# Code\n```\n");
    s.push_str(query);
    s.push_str("\n```\n\n# Guidelines\n");
    for (i, g) in snippets.iter().enumerate() {
        s.push_str(&format!("{}. {}\n", i + 1, g.trim()));
    }
    s
}

/// Prompt for a conversational reply in a review thread.
pub fn build_reply_prompt(ctx: &ReplyContext<'_>) -> String {
    let mut s = String::new();
    s.push_str("You are an AI code reviewer in a conversation with a developer about a review comment you made.\n");
    s.push_str("Acknowledge their reply, clarify where needed, suggest alternatives when useful.\n");
    s.push_str("Be constructive and concise. Answer in GitHub Markdown, without any preamble.\n");

    s.push_str("\n# Original review comment\n");
    s.push_str(ctx.original_comment.trim());
    s.push('\n');
    s.push_str(&format!("\nFile: {}\n", ctx.file_path));
    if let Some(line) = ctx.line_number {
        s.push_str(&format!("Line: {line}\n"));
    }
    if !ctx.diff_hunk.trim().is_empty() {
        s.push_str("\n# Code context\n```diff\n");
        s.push_str(ctx.diff_hunk.trim_end());
        s.push_str("\n```\n");
    }
    s.push_str("\n# Conversation\n");
    s.push_str(&ctx.conversation_history);
    s.push_str("\n\n# Latest user message\n");
    s.push_str(ctx.last_user_message.trim());
    s.push('\n');
    s
}

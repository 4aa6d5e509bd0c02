//! LLM client and reply decoding.
//!
//! The [`LlmClient`] trait decouples the loop from the model backend; tests
//! use scripted clients that return canned replies without network access.
//! The production backend speaks the OpenAI Responses API over HTTP.
//!
//! Reply decoding treats the model as an adversary: the raw text is scanned
//! for balanced top-level JSON objects, each candidate is validated against
//! the embedded reply schema, and only the first match is deserialized.

use std::env;
use std::time::Duration;

use jsonschema::Draft;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::action::ChangeSet;

const REPLY_SCHEMA: &str = include_str!("../../schemas/llm_reply.schema.json");

/// Model and request parameters for the production backend.
const LLM_MODEL: &str = "gpt-5.3-codex";
const LLM_REASONING_EFFORT: &str = "high";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Environment flag that enables full request/response dumps to stderr.
pub const DEBUG_LOG_ENV: &str = "BORK_ENABLE_DEBUG_LOG";

/// Failures on the model boundary. All of them are fatal to the run.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM unreachable: {0}")]
    Unreachable(String),
    #[error("LLM refused the request: {0}")]
    Refused(String),
    #[error("LLM reply carried no action JSON: {0}")]
    ReplyNotJson(String),
}

/// Abstraction over model backends.
pub trait LlmClient {
    /// Send the prompt, return the raw textual reply.
    fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Send the prompt and decode the reply into a [`ChangeSet`].
///
/// With `BORK_ENABLE_DEBUG_LOG=1` the full request and full response are
/// emitted to stderr before this returns.
#[instrument(skip_all, fields(prompt_bytes = prompt.len()))]
pub fn request_changes<L: LlmClient>(llm: &L, prompt: &str) -> Result<ChangeSet, LlmError> {
    let debug_dump = debug_log_enabled();
    if debug_dump {
        eprintln!("--- LLM REQUEST ---\n{prompt}\n--- END LLM REQUEST ---");
    }
    let raw = llm.complete(prompt)?;
    if debug_dump {
        eprintln!("--- LLM RESPONSE ---\n{raw}\n--- END LLM RESPONSE ---");
    }
    let changes = extract_change_set(&raw)?;
    debug!(actions = changes.len(), "decoded reply");
    Ok(changes)
}

fn debug_log_enabled() -> bool {
    env::var(DEBUG_LOG_ENV).is_ok_and(|v| v == "1")
}

/// Extract the first top-level JSON object in `raw` whose shape matches the
/// reply schema.
pub fn extract_change_set(raw: &str) -> Result<ChangeSet, LlmError> {
    let validator = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&serde_json::from_str::<Value>(REPLY_SCHEMA).expect("embedded schema is valid JSON"))
        .expect("embedded schema compiles");

    // Fast path: the reply is exactly one JSON object, as instructed. An
    // entirely-empty object means "no changes" even though the schema asks
    // for explicit empty fields.
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        if value.is_object() && (validator.is_valid(&value) || value == json!({})) {
            return deserialize_reply(&value);
        }
    }

    // Scan every `{`: a candidate that fails to balance, parse, or validate
    // just moves the scan forward one byte, so prose with stray braces cannot
    // mask a later well-formed payload.
    let bytes = raw.as_bytes();
    let mut pos = 0;
    while let Some(open) = bytes[pos..].iter().position(|&b| b == b'{') {
        let start = pos + open;
        if let Some(end) = find_balanced_end(raw, start) {
            if let Ok(value) = serde_json::from_str::<Value>(&raw[start..=end]) {
                if validator.is_valid(&value) {
                    return deserialize_reply(&value);
                }
            }
        }
        pos = start + 1;
    }

    warn!(reply_bytes = raw.len(), "no schema-matching JSON object in reply");
    Err(LlmError::ReplyNotJson(format!(
        "no matching object in {} bytes of reply",
        raw.len()
    )))
}

fn deserialize_reply(value: &Value) -> Result<ChangeSet, LlmError> {
    serde_json::from_value(value.clone())
        .map_err(|err| LlmError::ReplyNotJson(format!("matching object failed to decode: {err}")))
}

/// Index of the `}` balancing the `{` at `start`, skipping braces inside JSON
/// strings. `None` if the span never balances.
fn find_balanced_end(raw: &str, start: usize) -> Option<usize> {
    let bytes = raw.as_bytes();
    debug_assert_eq!(bytes[start], b'{');
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Production backend: OpenAI Responses API over blocking HTTP.
pub struct HttpLlmClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl HttpLlmClient {
    /// Build from `OPENAI_API_KEY` and optional `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| LlmError::Unreachable("OPENAI_API_KEY is not set".to_string()))?;
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base_url, api_key)
    }

    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, LlmError> {
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| LlmError::Unreachable(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

impl LlmClient for HttpLlmClient {
    #[instrument(skip_all)]
    fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let body = json!({
            "model": LLM_MODEL,
            "input": prompt,
            "reasoning": { "effort": LLM_REASONING_EFFORT },
            "text": { "format": { "type": "json_object" } },
        });

        let response = self
            .http
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|err| LlmError::Unreachable(err.to_string()))?;

        let status = response.status();
        let payload = response
            .text()
            .map_err(|err| LlmError::Unreachable(err.to_string()))?;
        if !status.is_success() {
            return Err(LlmError::Unreachable(format!(
                "endpoint returned {status}: {}",
                truncate(&payload, 500)
            )));
        }

        let reply: ResponsesReply = serde_json::from_str(&payload)
            .map_err(|err| LlmError::Unreachable(format!("unparseable API response: {err}")))?;
        reply.into_text()
    }
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Responses API payload, reduced to what the harness reads.
#[derive(Debug, Deserialize)]
struct ResponsesReply {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

impl ResponsesReply {
    /// Prefer the aggregated `output_text`; otherwise stitch content blocks.
    fn into_text(self) -> Result<String, LlmError> {
        if let Some(text) = self.output_text {
            if !text.trim().is_empty() {
                return Ok(text);
            }
        }
        let mut stitched = String::new();
        for item in self.output {
            for block in item.content {
                if block.kind == "refusal" {
                    return Err(LlmError::Refused(
                        block.refusal.or(block.text).unwrap_or_default(),
                    ));
                }
                if block.kind == "output_text" {
                    if let Some(text) = block.text {
                        stitched.push_str(&text);
                    }
                }
            }
        }
        if stitched.trim().is_empty() {
            return Err(LlmError::ReplyNotJson("empty reply".to_string()));
        }
        Ok(stitched)
    }
}

//! OpenAI adapter (text completions).
//!
//! Uses the OpenAI `responses` endpoint and implements the core
//! `CompletionPort`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use relay_core::{
    completion::{Completion, CompletionPort, CompletionRequest, TokenUsage},
    errors::Error,
    Result,
};

/// Ordered reply-extraction strategies. The first one returning text wins.
const EXTRACTORS: &[fn(&Value) -> Option<String>] = &[output_text, joined_output_content];

#[derive(Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct OpenAiCompletions {
    settings: OpenAiSettings,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a str,
    max_output_tokens: u32,
}

impl OpenAiCompletions {
    pub fn new(settings: OpenAiSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::Config(format!("reqwest client build: {e}")))?;
        Ok(Self { settings, http })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/responses", self.settings.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionPort for OpenAiCompletions {
    async fn complete(&self, req: CompletionRequest) -> Result<Completion> {
        let body = ResponsesRequest {
            model: &self.settings.model,
            input: &req.prompt,
            max_output_tokens: self.settings.max_output_tokens,
        };

        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::External(format!("openai request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "openai completion failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let v: Value = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("openai json error: {e}")))?;

        Ok(parse_completion(&v))
    }
}

pub fn parse_completion(v: &Value) -> Completion {
    Completion {
        text: extract_reply(v),
        usage: parse_usage(v),
    }
}

pub fn extract_reply(v: &Value) -> Option<String> {
    EXTRACTORS.iter().find_map(|extract| extract(v))
}

fn output_text(v: &Value) -> Option<String> {
    let text = v.get("output_text")?.as_str()?;
    non_blank(text.to_string())
}

/// Fragments are concatenated within a segment; segments are joined by
/// newlines. Segments without a `content` array (reasoning items) are skipped.
fn joined_output_content(v: &Value) -> Option<String> {
    let segments = v.get("output")?.as_array()?;
    let joined = segments
        .iter()
        .filter_map(|segment| segment.get("content").and_then(Value::as_array))
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n");
    non_blank(joined)
}

fn parse_usage(v: &Value) -> TokenUsage {
    let field = |name: &str| {
        v.get("usage")
            .and_then(|u| u.get(name))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    TokenUsage {
        input_tokens: field("input_tokens"),
        output_tokens: field("output_tokens"),
    }
}

fn non_blank(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

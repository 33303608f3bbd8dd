//! AI clients — the single point of entry for all Claude and Perplexity
//! calls in Align.
//!
//! ARCHITECTURAL RULE: no other module may call an AI provider directly.
//! Generated markup is treated as an opaque blob: it is returned to the
//! caller and stored as-is, never parsed or sanitized here.

use anyhow::Result;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::errors::AppError;

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all document-generation calls.
pub const CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";
const CLAUDE_MAX_TOKENS: u32 = 8192;

const PERPLEXITY_API_URL: &str = "https://api.perplexity.ai/chat/completions";
pub const PERPLEXITY_MODEL: &str = "sonar";

const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("Provider returned empty content")]
    EmptyContent,
}

impl From<AiError> for AppError {
    fn from(e: AiError) -> Self {
        AppError::Ai(e.to_string())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Claude
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ClaudeMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ClaudeResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl ClaudeResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct ClaudeApiError {
    error: ClaudeApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ClaudeApiErrorBody {
    message: String,
}

/// Wraps the Anthropic Messages API with retry logic and JSON helpers.
#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: String,
}

impl ClaudeClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    /// Makes a raw call to the Claude API, returning the full response.
    /// Retries on 429 (rate limit) and 5xx errors with exponential backoff.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<ClaudeResponse, AiError> {
        let request_body = ClaudeRequest {
            model: CLAUDE_MODEL,
            max_tokens: CLAUDE_MAX_TOKENS,
            system,
            messages: vec![ClaudeMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut last_error: Option<AiError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "Claude call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(AiError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Claude API returned {}: {}", status, body);
                last_error = Some(AiError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ClaudeApiError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(AiError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let claude_response: ClaudeResponse = response.json().await?;

            debug!(
                "Claude call succeeded: input_tokens={}, output_tokens={}",
                claude_response.usage.input_tokens, claude_response.usage.output_tokens
            );

            return Ok(claude_response);
        }

        Err(last_error.unwrap_or(AiError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    /// Calls Claude and returns the text content, fences stripped.
    pub async fn call_text(&self, prompt: &str, system: &str) -> Result<String, AiError> {
        let response = self.call(prompt, system).await?;
        let text = response.text().ok_or(AiError::EmptyContent)?;
        Ok(strip_fences(text).to_string())
    }

    /// Calls Claude and deserializes the text response as JSON. The prompt
    /// must instruct the model to return valid JSON.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, AiError> {
        let response = self.call(prompt, system).await?;
        let text = response.text().ok_or(AiError::EmptyContent)?;
        serde_json::from_str(strip_fences(text)).map_err(AiError::Parse)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Perplexity
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct PerplexityRequest<'a> {
    model: &'a str,
    messages: Vec<PerplexityMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct PerplexityMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct PerplexityResponse {
    choices: Vec<PerplexityChoice>,
}

#[derive(Debug, Deserialize)]
struct PerplexityChoice {
    message: PerplexityChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct PerplexityChoiceMessage {
    content: String,
}

/// Wraps the Perplexity chat-completions API for web-grounded research.
#[derive(Clone)]
pub struct PerplexityClient {
    client: Client,
    api_key: String,
}

impl PerplexityClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    pub async fn call(&self, prompt: &str, system: &str) -> Result<String, AiError> {
        let request_body = PerplexityRequest {
            model: PERPLEXITY_MODEL,
            messages: vec![
                PerplexityMessage {
                    role: "system",
                    content: system,
                },
                PerplexityMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .client
            .post(PERPLEXITY_API_URL)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: PerplexityResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(AiError::EmptyContent)
    }
}

/// Strips ```html / ```json / ``` code fences from model output.
fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    for tag in ["```html", "```json", "```"] {
        if let Some(stripped) = text.strip_prefix(tag) {
            return stripped
                .trim_start()
                .strip_suffix("```")
                .map(str::trim)
                .unwrap_or_else(|| stripped.trim_start());
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences_html() {
        let input = "```html\n<html><body>ok</body></html>\n```";
        assert_eq!(strip_fences(input), "<html><body>ok</body></html>");
    }

    #[test]
    fn test_strip_fences_json() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_fences_plain() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_fences_no_fences() {
        let input = "<html></html>";
        assert_eq!(strip_fences(input), "<html></html>");
    }

    #[test]
    fn test_claude_response_text_extraction() {
        let response: ClaudeResponse = serde_json::from_value(serde_json::json!({
            "content": [
                { "type": "thinking", "text": null },
                { "type": "text", "text": "hello" }
            ],
            "usage": { "input_tokens": 10, "output_tokens": 5 }
        }))
        .unwrap();
        assert_eq!(response.text(), Some("hello"));
    }
}

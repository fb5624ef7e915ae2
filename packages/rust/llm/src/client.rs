//! OpenAI-compatible `chat/completions` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use seoflow_shared::{LlmConfig, Result, SeoflowError};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{ChatClient, ChatRequest, ChatResponse};

/// User-Agent string for LLM requests.
const USER_AGENT: &str = concat!("seoflow/", env!("CARGO_PKG_VERSION"));

/// Upper bound on how much of an error body is kept in the error message.
const MAX_ERROR_BODY: usize = 2_000;

/// HTTP client for any OpenAI-compatible endpoint.
pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatClient {
    /// Build a client for `base_url` (e.g. `https://openrouter.ai/api/v1`).
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SeoflowError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Build a client from the `[llm]` config section and a resolved key.
    pub fn from_config(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        Self::new(&config.base_url, api_key, config.timeout_secs)
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    #[instrument(skip_all, fields(model = %request.model))]
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        let body = WireRequest {
            model: &request.model,
            messages: [
                WireMessage {
                    role: "system",
                    content: &request.system,
                },
                WireMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let response = self
            .client
            .post(self.chat_completions_url())
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| SeoflowError::Network(format!("chat completion: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let mut text = response.text().await.unwrap_or_default();
            if text.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| text.is_char_boundary(*i))
                    .unwrap_or(0);
                text.truncate(cut);
            }
            return Err(SeoflowError::Llm {
                status: Some(status.as_u16()),
                message: text,
            });
        }

        let wire: WireResponse = response.json().await.map_err(|e| SeoflowError::Llm {
            status: Some(status.as_u16()),
            message: format!("unreadable completion payload: {e}"),
        })?;

        let content = wire
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let (tokens_in, tokens_out) = wire
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        debug!(tokens_in, tokens_out, chars = content.len(), "completion received");

        Ok(ChatResponse {
            content,
            model: wire.model.unwrap_or(request.model),
            tokens_in,
            tokens_out,
        })
    }
}

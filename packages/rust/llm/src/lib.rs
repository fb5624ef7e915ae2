//! Chat-completion client used by the generators.
//!
//! Every generator talks to the model through the [`ChatClient`] trait so it
//! can be handed a deterministic fake in tests. The only production
//! implementation is [`OpenAiCompatClient`], which speaks the OpenAI
//! `chat/completions` wire format (OpenRouter, OpenAI, vLLM, Ollama).
//!
//! Responses are always requested as a single JSON object;
//! [`extract_json_object`] recovers that object from replies that wrap it in
//! markdown fences or prose.

mod client;
mod json;

use async_trait::async_trait;
use seoflow_shared::Result;

pub use client::OpenAiCompatClient;
pub use json::extract_json_object;

/// System instruction prefix shared by every call.
pub const JSON_ONLY_INSTRUCTION: &str = "Respond with valid JSON only.";

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// One system + one user message exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the provider for `response_format: json_object`.
    pub json_mode: bool,
}

impl ChatRequest {
    /// A JSON-mode request with the given role description as system prompt.
    pub fn json(model: impl Into<String>, role: &str, user: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: format!("{role} {JSON_ONLY_INSTRUCTION}"),
            user: user.into(),
            temperature: 0.7,
            max_tokens: 2_000,
            json_mode: true,
        }
    }

    /// Set the sampling budget.
    pub fn with_budget(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self.max_tokens = max_tokens;
        self
    }
}

/// Completion text plus accounting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    /// Model that actually answered (providers may route to another).
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// A chat-completion backend.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Run one completion. Implementations map transport failures to
    /// `Network` and non-2xx answers to `Llm { status, .. }`.
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse>;
}

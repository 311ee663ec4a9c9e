//! OpenAI-compatible chat completions client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, instrument};

use newnerd_core::{defaults, ChatBackend, ChatCompletion, ChatRequest, ChatRole, Error, Result};

use super::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ResponseFormat};
use crate::error::chat_error_from_response;

/// Configuration for the chat completions client.
#[derive(Debug, Clone)]
pub struct OpenAIChatConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key. Without one the chat-backed functions are disabled.
    pub api_key: Option<String>,
    /// Model used for every completion.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for OpenAIChatConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::OPENAI_BASE_URL.to_string(),
            api_key: None,
            model: defaults::OPENAI_CHAT_MODEL.to_string(),
            timeout_seconds: defaults::CHAT_TIMEOUT_SECS,
        }
    }
}

impl OpenAIChatConfig {
    /// Reads `OPENAI_BASE_URL`, `OPENAI_API_KEY`, `OPENAI_MODEL`, and
    /// `CHAT_TIMEOUT`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            base_url: lookup("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            api_key: lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()),
            model: lookup("OPENAI_MODEL")
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(defaults.model),
            timeout_seconds: lookup("CHAT_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Chat completions over `POST /chat/completions`.
pub struct OpenAIChatClient {
    client: Client,
    config: OpenAIChatConfig,
}

impl OpenAIChatClient {
    pub fn new(config: OpenAIChatConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            model = %config.model,
            "Initializing OpenAI chat client: url={}",
            config.base_url
        );

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OpenAIChatConfig {
        &self.config
    }

    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        req.header("Content-Type", "application/json")
    }
}

fn role_name(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    }
}

#[async_trait]
impl ChatBackend for OpenAIChatClient {
    #[instrument(
        skip(self, request),
        fields(subsystem = "inference", component = "openai", op = "chat", message_count = request.messages.len())
    )]
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        let start = Instant::now();

        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| ChatMessage {
                    role: role_name(m.role).to_string(),
                    content: Some(m.content.clone()),
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
            response_format: request.json_object.then(ResponseFormat::json_object),
        };

        let response = self
            .build_request("/chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("OpenAI chat request: {}", e))
                } else {
                    Error::Inference(format!("Request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(chat_error_from_response("openai", response).await);
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let total_tokens = result.usage.map(|u| u.total_tokens).unwrap_or(0);

        debug!(
            model = %self.config.model,
            total_tokens,
            duration_ms = start.elapsed().as_millis() as u64,
            "Chat completion finished, response length: {}",
            content.len()
        );
        Ok(ChatCompletion {
            content,
            total_tokens,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

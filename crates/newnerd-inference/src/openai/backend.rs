//! OpenAI-compatible embedding backend implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, instrument};

use newnerd_core::{defaults, EmbeddingBackend, Error, Result, Vector};

use super::types::*;
use crate::error::error_from_response;

/// Configuration for OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key for authentication (optional for local endpoints).
    pub api_key: Option<String>,
    /// Model to use for embeddings.
    pub embed_model: String,
    /// Expected embedding dimension.
    pub embed_dimension: usize,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::OPENAI_BASE_URL.to_string(),
            api_key: None,
            embed_model: defaults::OPENAI_EMBED_MODEL.to_string(),
            embed_dimension: defaults::OPENAI_EMBED_DIMENSION,
            timeout_seconds: defaults::EMBED_TIMEOUT_SECS,
        }
    }
}

impl OpenAIConfig {
    /// Build from a key lookup (environment or test map).
    ///
    /// Reads `OPENAI_BASE_URL`, `OPENAI_API_KEY`, `OPENAI_EMBED_MODEL`,
    /// `OPENAI_EMBED_DIM`, and `EMBED_TIMEOUT`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            base_url: lookup("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            api_key: lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()),
            embed_model: lookup("OPENAI_EMBED_MODEL").unwrap_or(defaults.embed_model),
            embed_dimension: lookup("OPENAI_EMBED_DIM")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.embed_dimension),
            timeout_seconds: lookup("EMBED_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
        }
    }
}

/// OpenAI-compatible embedding backend.
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    /// Create a new OpenAI backend with the given configuration.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Embedding(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            model = %config.embed_model,
            dimension = config.embed_dimension,
            "Initializing OpenAI embedding backend: url={}",
            config.base_url
        );

        Ok(Self { client, config })
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(OpenAIConfig::default())
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_lookup(|key| std::env::var(key).ok()))
    }

    /// Get the current configuration.
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// Build a request with authentication if configured.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        req.header("Content-Type", "application/json")
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAIBackend {
    #[instrument(
        skip(self, texts),
        fields(subsystem = "inference", component = "openai", op = "embed_texts", input_count = texts.len())
    )]
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let start = Instant::now();

        let request = EmbeddingRequest {
            model: self.config.embed_model.clone(),
            input: texts.to_vec(),
            encoding_format: Some("float".to_string()),
        };

        let response = self
            .build_request("/embeddings")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("OpenAI embedding request: {}", e))
                } else {
                    Error::Embedding(format!("Request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(error_from_response("openai", response).await);
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        if result.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "OpenAI returned {} embeddings for {} inputs",
                result.data.len(),
                texts.len()
            )));
        }

        // Sort by index to ensure correct ordering
        let mut data = result.data;
        data.sort_by_key(|d| d.index);

        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            if item.embedding.is_empty() {
                return Err(Error::Embedding(format!(
                    "OpenAI returned an empty embedding at index {}",
                    item.index
                )));
            }
            if item.embedding.len() != self.config.embed_dimension {
                return Err(Error::Embedding(format!(
                    "OpenAI returned {} dimensions, expected {}",
                    item.embedding.len(),
                    self.config.embed_dimension
                )));
            }
            vectors.push(Vector::from(item.embedding));
        }

        debug!(
            model = %self.config.embed_model,
            duration_ms = start.elapsed().as_millis() as u64,
            "Generated {} embeddings",
            vectors.len()
        );
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.embed_dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}

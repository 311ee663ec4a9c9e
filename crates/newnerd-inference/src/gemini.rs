//! Google Generative Language embedding backend.
//!
//! Calls `models/{model}:embedContent` once per input text. The default
//! model is `text-embedding-004` (768 dimensions).
//!
//! # Example
//!
//! ```rust,no_run
//! use newnerd_inference::gemini::GeminiBackend;
//! use newnerd_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = GeminiBackend::from_env().unwrap();
//!     let vectors = backend
//!         .embed_texts(&["fotossíntese".to_string()])
//!         .await
//!         .unwrap();
//!     assert_eq!(vectors[0].as_slice().len(), 768);
//! }
//! ```

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use newnerd_core::{defaults, EmbeddingBackend, Error, Result, Vector};

use crate::error::error_from_response;

/// Configuration for the Gemini embedding backend.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API base URL, up to and including the version segment.
    pub base_url: String,
    /// API key sent as the `key` query parameter.
    pub api_key: Option<String>,
    /// Embedding model name, without the `models/` prefix.
    pub embed_model: String,
    /// Expected embedding dimension.
    pub embed_dimension: usize,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::GEMINI_BASE_URL.to_string(),
            api_key: None,
            embed_model: defaults::GEMINI_EMBED_MODEL.to_string(),
            embed_dimension: defaults::GEMINI_EMBED_DIMENSION,
            timeout_seconds: defaults::EMBED_TIMEOUT_SECS,
        }
    }
}

impl GeminiConfig {
    /// Build from a key lookup (environment or test map).
    ///
    /// Reads `GOOGLE_API_KEY`, `GEMINI_BASE_URL`, `GEMINI_EMBED_MODEL`,
    /// `GEMINI_EMBED_DIM`, and `EMBED_TIMEOUT`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            base_url: lookup("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            api_key: lookup("GOOGLE_API_KEY").filter(|k| !k.trim().is_empty()),
            embed_model: lookup("GEMINI_EMBED_MODEL").unwrap_or(defaults.embed_model),
            embed_dimension: lookup("GEMINI_EMBED_DIM")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.embed_dimension),
            timeout_seconds: lookup("EMBED_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Option<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

/// Gemini embedding backend.
pub struct GeminiBackend {
    client: Client,
    config: GeminiConfig,
}

impl GeminiBackend {
    /// Create a new backend with the given configuration.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Embedding(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "gemini",
            model = %config.embed_model,
            dimension = config.embed_dimension,
            "Initializing Gemini embedding backend"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(GeminiConfig::from_lookup(|key| std::env::var(key).ok()))
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:embedContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.embed_model
        )
    }

    async fn embed_one(&self, api_key: &str, text: &str) -> Result<Vector> {
        let request = EmbedContentRequest {
            model: format!("models/{}", self.config.embed_model),
            content: Content {
                parts: [Part { text }],
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("Gemini embedding request: {}", e))
                } else {
                    Error::Embedding(format!("Request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(error_from_response("gemini", response).await);
        }

        let body: EmbedContentResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        let values = body
            .embedding
            .map(|e| e.values)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Embedding("Gemini returned no embedding values".to_string()))?;

        if values.len() != self.config.embed_dimension {
            return Err(Error::Embedding(format!(
                "Gemini returned {} dimensions, expected {}",
                values.len(),
                self.config.embed_dimension
            )));
        }

        Ok(Vector::from(values))
    }
}

#[async_trait]
impl EmbeddingBackend for GeminiBackend {
    #[instrument(
        skip(self, texts),
        fields(subsystem = "inference", component = "gemini", op = "embed_texts", input_count = texts.len())
    )]
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("GOOGLE_API_KEY is not set".to_string()))?;

        let start = Instant::now();
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_one(api_key, text).await?);
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

//! Mock embedding backend for deterministic testing.
//!
//! Vectors are derived from a hash of the input text, so equal texts always
//! embed identically and different texts (almost always) differ.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use newnerd_inference::mock::MockEmbeddingBackend;
//!
//! let backend = MockEmbeddingBackend::new().with_dimension(8).failing("quota");
//! let engine = HybridSearchEngine::new(keyword, Arc::new(EmbeddingSemanticLookup::new(chunks, Arc::new(backend))));
//! ```

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use newnerd_core::{EmbeddingBackend, Error, Result, Vector};

/// Mock embedding backend for testing.
#[derive(Clone)]
pub struct MockEmbeddingBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    model: String,
    latency_ms: u64,
    fail_with: Option<String>,
}

/// One recorded `embed_texts` call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub inputs: Vec<String>,
    pub timestamp: Instant,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: 8,
            model: "mock-embed".to_string(),
            latency_ms: 0,
            fail_with: None,
        }
    }
}

impl Default for MockEmbeddingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbeddingBackend {
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension;
        self
    }

    /// Set the reported model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).model = model.into();
        self
    }

    /// Simulated latency per call. Uses `tokio::time::sleep`, so paused-clock
    /// tests can advance past it.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Make every call fail with `Error::Embedding(message)`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).fail_with = Some(message.into());
        self
    }

    /// All logged calls.
    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of `embed_texts` calls made so far.
    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn clear_calls(&self) {
        self.call_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear()
    }

    /// The vector this backend produces for `text`.
    pub fn vector_for(&self, text: &str) -> Vector {
        Vector::from(deterministic_embedding(text, self.config.dimension))
    }
}

/// Unit-length vector seeded from an FNV-1a hash of `text`.
pub fn deterministic_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut state: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.as_bytes() {
        state ^= u64::from(*byte);
        state = state.wrapping_mul(0x0100_0000_01b3);
    }

    let mut values = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        // xorshift64
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        values.push(((state % 2000) as f32 / 1000.0) - 1.0);
    }

    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut values {
            *v /= norm;
        }
    }
    values
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        self.call_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(MockCall {
                inputs: texts.to_vec(),
                timestamp: Instant::now(),
            });

        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }
        if let Some(ref message) = self.config.fail_with {
            return Err(Error::Embedding(message.clone()));
        }

        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

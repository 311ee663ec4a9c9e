//! # newnerd-inference
//!
//! Embedding and chat backends for the New Nerd document library.
//!
//! This crate provides:
//! - Google Gemini embeddings (default, feature `gemini`)
//! - OpenAI-compatible embeddings and chat completions (feature `openai`)
//! - Provider selection from the environment
//! - Provider error classification
//! - A deterministic mock backend (feature `mock`)
//!
//! # Example
//!
//! ```rust,no_run
//! use newnerd_inference::{build_backend, EmbeddingConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = EmbeddingConfig::from_env().unwrap();
//!     let backend = build_backend(&config).unwrap();
//!     let texts = vec!["célula animal".to_string()];
//!     let embeddings = backend.embed_texts(&texts).await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;

#[cfg(feature = "gemini")]
pub mod gemini;

#[cfg(feature = "openai")]
pub mod openai;

// Mock embedding backend for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use newnerd_core::*;

pub use config::{build_backend, ConfigError, EmbeddingConfig, EmbeddingProvider};
pub use error::{ProviderErrorCode, ProviderErrorResponse};

#[cfg(feature = "gemini")]
pub use gemini::{GeminiBackend, GeminiConfig};

#[cfg(feature = "openai")]
pub use openai::{OpenAIBackend, OpenAIChatClient, OpenAIChatConfig, OpenAIConfig};

#[cfg(any(test, feature = "mock"))]
pub use mock::MockEmbeddingBackend;

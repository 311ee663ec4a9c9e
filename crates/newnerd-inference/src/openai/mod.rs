//! OpenAI-compatible embedding backend and chat completions client.
//!
//! Works with any endpoint implementing `POST /embeddings` and
//! `POST /chat/completions`: the OpenAI cloud API, Azure OpenAI, or a local
//! OpenAI-compatible server.
//!
//! # Example
//!
//! ```rust,no_run
//! use newnerd_inference::openai::{OpenAIBackend, OpenAIConfig};
//! use newnerd_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = OpenAIConfig {
//!         api_key: Some("sk-...".to_string()),
//!         ..OpenAIConfig::default()
//!     };
//!     let backend = OpenAIBackend::new(config).unwrap();
//!     let vectors = backend
//!         .embed_texts(&["Revolução Francesa".to_string()])
//!         .await
//!         .unwrap();
//!     assert_eq!(vectors.len(), 1);
//! }
//! ```

mod backend;
mod chat;
pub mod types;

pub use backend::{OpenAIBackend, OpenAIConfig};
pub use chat::{OpenAIChatClient, OpenAIChatConfig};

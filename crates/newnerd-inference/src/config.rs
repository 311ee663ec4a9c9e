//! Embedding provider configuration.
//!
//! The provider is chosen with `EMBED_PROVIDER` (`gemini` by default, or
//! `openai`); each provider then reads its own variables.
//!
//! # Example
//!
//! ```rust,no_run
//! use newnerd_inference::config::{build_backend, EmbeddingConfig};
//!
//! let config = EmbeddingConfig::from_env().expect("invalid embedding config");
//! let backend = build_backend(&config).expect("failed to build backend");
//! println!("embedding with {}", backend.model_name());
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use newnerd_core::{EmbeddingBackend, Result};

#[cfg(feature = "gemini")]
use crate::gemini::{GeminiBackend, GeminiConfig};
#[cfg(feature = "openai")]
use crate::openai::{OpenAIBackend, OpenAIConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid embedding provider: {0}")]
    InvalidProvider(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Missing API key for provider {0}: set {1}")]
    MissingApiKey(EmbeddingProvider, &'static str),

    #[error("Provider {0} is not compiled in")]
    Disabled(EmbeddingProvider),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl From<ConfigError> for newnerd_core::Error {
    fn from(err: ConfigError) -> Self {
        newnerd_core::Error::Config(err.to_string())
    }
}

/// Embedding provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingProvider {
    #[default]
    Gemini,
    OpenAI,
}

impl EmbeddingProvider {
    /// Environment variable holding the provider's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::Gemini => "GOOGLE_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
        }
    }
}

impl FromStr for EmbeddingProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAI),
            _ => Err(ConfigError::InvalidProvider(s.to_string())),
        }
    }
}

impl fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::OpenAI => write!(f, "openai"),
        }
    }
}

/// Top-level embedding configuration.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    #[cfg(feature = "gemini")]
    pub gemini: GeminiConfig,
    #[cfg(feature = "openai")]
    pub openai: OpenAIConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            #[cfg(feature = "gemini")]
            gemini: GeminiConfig::default(),
            #[cfg(feature = "openai")]
            openai: OpenAIConfig::default(),
        }
    }
}

impl EmbeddingConfig {
    /// Load from environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup and validate the result.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = match lookup("EMBED_PROVIDER") {
            Some(value) if !value.trim().is_empty() => value.parse()?,
            _ => EmbeddingProvider::default(),
        };

        let config = Self {
            provider,
            #[cfg(feature = "gemini")]
            gemini: GeminiConfig::from_lookup(&lookup),
            #[cfg(feature = "openai")]
            openai: OpenAIConfig::from_lookup(&lookup),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration of the selected provider.
    pub fn validate(&self) -> ConfigResult<()> {
        let (base_url, model, dimension, api_key) = match self.provider {
            #[cfg(feature = "gemini")]
            EmbeddingProvider::Gemini => (
                &self.gemini.base_url,
                &self.gemini.embed_model,
                self.gemini.embed_dimension,
                self.gemini.api_key.as_ref(),
            ),
            #[cfg(feature = "openai")]
            EmbeddingProvider::OpenAI => (
                &self.openai.base_url,
                &self.openai.embed_model,
                self.openai.embed_dimension,
                self.openai.api_key.as_ref(),
            ),
            #[allow(unreachable_patterns)]
            other => return Err(ConfigError::Disabled(other)),
        };

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "{} base_url must start with http:// or https://, got: {}",
                self.provider, base_url
            )));
        }
        if model.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{} embedding model cannot be empty",
                self.provider
            )));
        }
        if dimension == 0 {
            return Err(ConfigError::Validation(format!(
                "{} embedding dimension must be positive",
                self.provider
            )));
        }
        if api_key.is_none() {
            return Err(ConfigError::MissingApiKey(
                self.provider,
                self.provider.api_key_var(),
            ));
        }
        Ok(())
    }
}

/// Build the configured embedding backend.
pub fn build_backend(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingBackend>> {
    info!(
        subsystem = "inference",
        component = "config",
        provider = %config.provider,
        "Building embedding backend"
    );
    match config.provider {
        #[cfg(feature = "gemini")]
        EmbeddingProvider::Gemini => Ok(Arc::new(GeminiBackend::new(config.gemini.clone())?)),
        #[cfg(feature = "openai")]
        EmbeddingProvider::OpenAI => Ok(Arc::new(OpenAIBackend::new(config.openai.clone())?)),
        #[allow(unreachable_patterns)]
        other => Err(ConfigError::Disabled(other).into()),
    }
}

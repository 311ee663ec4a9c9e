//! Provider error classification shared by the HTTP embedding backends.

use serde::Deserialize;

use newnerd_core::Error;

/// Provider-agnostic error codes derived from an HTTP error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorCode {
    /// Invalid or missing credentials.
    AuthenticationError,
    /// Rate limit or quota exceeded.
    RateLimitExceeded,
    /// Model not found or not available.
    ModelNotFound,
    /// Input too large for the model.
    ContextLengthExceeded,
    /// Malformed request.
    InvalidRequest,
    /// Server error.
    ServerError,
    /// Unknown error.
    Unknown,
}

impl ProviderErrorCode {
    /// Determine error code from HTTP status and provider error type.
    ///
    /// `error_type` is OpenAI's `error.type`/`error.code` or Google's
    /// `error.status` (e.g. `RESOURCE_EXHAUSTED`).
    pub fn from_response(status: u16, error_type: &str) -> Self {
        let kind = error_type.to_lowercase();
        match (status, kind.as_str()) {
            (401 | 403, _) | (_, "unauthenticated" | "permission_denied") => {
                Self::AuthenticationError
            }
            (429, _) | (_, "resource_exhausted") => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found" | "not_found") => Self::ModelNotFound,
            (400, k) if k.contains("context_length") => Self::ContextLengthExceeded,
            (400, _) | (_, "invalid_argument") => Self::InvalidRequest,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::ServerError)
    }
}

/// Convert a classified provider error into the library error type.
pub fn to_core_error(provider: &str, code: ProviderErrorCode, message: &str) -> Error {
    match code {
        ProviderErrorCode::AuthenticationError => {
            Error::Config(format!("{} authentication failed: {}", provider, message))
        }
        ProviderErrorCode::ModelNotFound => {
            Error::Config(format!("{} model not found: {}", provider, message))
        }
        ProviderErrorCode::RateLimitExceeded => {
            Error::Embedding(format!("{} rate limit exceeded: {}", provider, message))
        }
        ProviderErrorCode::ContextLengthExceeded => {
            Error::Embedding(format!("{} input too long: {}", provider, message))
        }
        ProviderErrorCode::InvalidRequest => {
            Error::Embedding(format!("{} rejected request: {}", provider, message))
        }
        ProviderErrorCode::ServerError => {
            Error::Embedding(format!("{} server error: {}", provider, message))
        }
        ProviderErrorCode::Unknown => Error::Embedding(format!("{}: {}", provider, message)),
    }
}

/// Error envelope shared by OpenAI (`type`/`code`) and Google (`status`).
#[derive(Debug, Deserialize, Default)]
pub struct ProviderErrorResponse {
    #[serde(default)]
    pub error: ProviderErrorBody,
}

#[derive(Debug, Deserialize, Default)]
pub struct ProviderErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ProviderErrorResponse {
    pub fn kind(&self) -> &str {
        self.error
            .error_type
            .as_deref()
            .or(self.error.status.as_deref())
            .unwrap_or("unknown")
    }

    pub fn message(&self) -> &str {
        if self.error.message.is_empty() {
            "Unknown error"
        } else {
            &self.error.message
        }
    }
}

/// Turn a non-success HTTP response into a library error.
pub async fn error_from_response(provider: &str, response: reqwest::Response) -> Error {
    let status = response.status();
    let body: ProviderErrorResponse = response.json().await.unwrap_or_default();
    let code = ProviderErrorCode::from_response(status.as_u16(), body.kind());
    to_core_error(
        provider,
        code,
        &format!("HTTP {}: {}", status.as_u16(), body.message()),
    )
}

/// Like [`error_from_response`], for chat completions: provider failures
/// surface as [`Error::Inference`].
pub async fn chat_error_from_response(provider: &str, response: reqwest::Response) -> Error {
    match error_from_response(provider, response).await {
        Error::Embedding(msg) => Error::Inference(msg),
        other => other,
    }
}

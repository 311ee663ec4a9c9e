//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{error, warn};

use newnerd_core::{defaults, Error};

use crate::services::AssistantError;

/// Error returned by handlers. Renders as `{"error": message}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// An upstream provider (embedding or chat API) failed.
    #[error("{0}")]
    BadGateway(String),
    /// The chat model answered with something that is not the expected
    /// JSON. The raw reply is returned for inspection.
    #[error("Invalid model reply")]
    InvalidReply { raw: String },
    /// Hybrid search failed. Details are logged, the client sees a generic
    /// message.
    #[error("{}", defaults::SEARCH_FAILED_MESSAGE)]
    SearchFailed,
    #[error(transparent)]
    Internal(Error),
}

impl ApiError {
    /// Map a provider error to 502, anything else as usual.
    pub fn upstream(err: Error) -> Self {
        match err {
            Error::Embedding(msg)
            | Error::Inference(msg)
            | Error::Request(msg)
            | Error::Timeout(msg) => {
                ApiError::BadGateway(msg)
            }
            other => other.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::InvalidReply { .. } | ApiError::SearchFailed | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::DocumentNotFound(id) => ApiError::NotFound(format!("Document not found: {}", id)),
            Error::Cancelled(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other),
        }
    }
}

impl From<AssistantError> for ApiError {
    fn from(err: AssistantError) -> Self {
        match err {
            AssistantError::Backend(e) => ApiError::upstream(e),
            AssistantError::InvalidReply(reply) => {
                warn!(reason = %reply.reason, "Chat model reply was not valid JSON");
                ApiError::InvalidReply { raw: reply.raw }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Internal(ref err) = self {
            error!(error = %err, "Request failed");
        }
        let body = match self {
            ApiError::InvalidReply { ref raw } => serde_json::json!({
                "error": self.to_string(),
                "raw": raw,
            }),
            _ => serde_json::json!({
                "error": self.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

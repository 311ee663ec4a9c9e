//! HTTP handlers for newnerd-api.

pub mod functions;
pub mod library;
pub mod search;

use axum::response::IntoResponse;
use axum::Json;

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

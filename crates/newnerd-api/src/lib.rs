//! # newnerd-api
//!
//! HTTP server for the New Nerd document library: per-owner library routes,
//! hybrid search, and the serverless-function endpoints used by the web
//! clients.
//!
//! Owners are addressed in the path (`/api/v1/library/{kind}/{owner_id}`).
//! Authentication happens in front of this service.

pub mod config;
pub mod error;
pub mod handlers;
pub mod services;
pub mod state;

use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    map_response_body::MapResponseBodyLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use newnerd_core::defaults;

pub use config::{SemanticSource, ServerConfig};
pub use error::ApiError;
pub use state::{AppState, Backends};

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Routes without middleware.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/api/v1/library/:kind/:owner_id/documents",
            get(handlers::library::list_documents).post(handlers::library::upload_document),
        )
        .route(
            "/api/v1/library/:kind/:owner_id/documents/:id",
            delete(handlers::library::delete_document),
        )
        .route(
            "/api/v1/library/:kind/:owner_id/search",
            get(handlers::search::search_library),
        )
        .route(
            "/functions/v1/semantic-search",
            post(handlers::functions::semantic_search),
        )
        .route("/functions/v1/embed", post(handlers::functions::embed))
        .route(
            "/functions/v1/process-file",
            post(handlers::functions::process_file),
        )
        .route("/functions/v1/chat-ia", post(handlers::functions::chat_ia))
        .route(
            "/functions/v1/correct-answer",
            post(handlers::functions::correct_answer),
        )
        .route(
            "/functions/v1/generate-question",
            post(handlers::functions::generate_question),
        )
        .with_state(state)
}

/// The full application: routes plus tracing, request ids, CORS, and the
/// body size limit.
pub fn app(state: AppState, allowed_origins: Vec<HeaderValue>, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(defaults::CORS_MAX_AGE_SECS));

    routes(state)
        // Multipart uploads are bounded by the outer limit instead.
        .layer(axum::extract::DefaultBodyLimit::disable())
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::new())
                .layer(cors)
                // Cors needs a `Default` response body; erase the limit body type.
                .layer(MapResponseBodyLayer::new(axum::body::Body::new))
                .layer(RequestBodyLimitLayer::new(max_body_bytes)),
        )
}

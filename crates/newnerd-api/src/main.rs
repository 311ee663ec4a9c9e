//! newnerd-api - HTTP API server for the New Nerd document library

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newnerd_api::{app, AppState, Backends, SemanticSource, ServerConfig};
use newnerd_core::{ChatBackend, EmbeddingBackend, PlainTextExtractor, SemanticLookup};
use newnerd_db::{log_pool_metrics, Database, FilesystemBackend, PoolConfig};
use newnerd_inference::{build_backend, EmbeddingConfig, OpenAIChatClient, OpenAIChatConfig};
use newnerd_search::{FunctionLookupConfig, FunctionSemanticLookup, HybridSearchConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "newnerd_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "newnerd_api=debug,newnerd_search=debug,newnerd_db=info,tower_http=debug".into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("newnerd-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = ServerConfig::from_env()?;
    let search_config = HybridSearchConfig::from_env()?;
    let embedding_config = EmbeddingConfig::from_env()?;

    // Database
    let db = Database::connect_with_config(&config.database_url, PoolConfig::from_env()).await?;
    db.migrate().await?;
    log_pool_metrics(db.pool());
    info!("Database connected and migrated");

    // Object storage
    let storage = FilesystemBackend::new(config.storage_path.clone());
    if let Err(e) = storage.validate().await {
        warn!(
            path = %config.storage_path.display(),
            error = %e,
            "Storage backend failed validation; uploads will fail"
        );
    }

    let embedder = build_backend(&embedding_config)?;
    info!(
        provider = %embedding_config.provider,
        model = embedder.model_name(),
        dimension = embedder.dimension(),
        "Embedding backend ready"
    );

    let chat_config = OpenAIChatConfig::from_env();
    let chat: Option<Arc<dyn ChatBackend>> = if chat_config.api_key.is_some() {
        let client = OpenAIChatClient::new(chat_config)?;
        info!(model = client.model_name(), "Chat backend ready");
        Some(Arc::new(client))
    } else {
        warn!("OPENAI_API_KEY not set; chat-ia, correct-answer and generate-question are disabled");
        None
    };

    let backends = Backends {
        documents: Arc::new(db.documents.clone()),
        keyword: Arc::new(db.documents.clone()),
        chunks: Arc::new(db.chunks.clone()),
        storage: Arc::new(storage),
        embedder,
        extractor: Arc::new(PlainTextExtractor),
        chat,
    };

    let search_lookup: Arc<dyn SemanticLookup> = match config.semantic_source {
        SemanticSource::Local => backends.local_lookup(),
        SemanticSource::Function => Arc::new(FunctionSemanticLookup::new(
            FunctionLookupConfig::from_env(),
        )?),
    };
    info!(
        semantic_source = %config.semantic_source,
        conflict_policy = %search_config.conflict,
        lookup_timeout_secs = search_config.lookup_timeout.as_secs(),
        "Hybrid search configured"
    );

    let state = AppState::new(backends, search_lookup, search_config, config.ingest.clone());
    let router = app(state, config.origin_headers(), config.max_body_bytes);

    // Start server
    let addr = config.bind_address();
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

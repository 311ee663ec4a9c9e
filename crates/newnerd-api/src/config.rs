//! Server configuration read from the environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `HOST` | `0.0.0.0` |
//! | `PORT` | `3000` |
//! | `DATABASE_URL` | `postgres://localhost/newnerd` |
//! | `STORAGE_PATH` | `./data/storage` |
//! | `ALLOWED_ORIGINS` | local development origins |
//! | `MAX_BODY_SIZE_BYTES` | 50 MiB |
//! | `SEMANTIC_LOOKUP` | `local` (`local` or `function`) |
//! | `INGEST_EMBEDDING_FAILURE` | `degrade` (`fail` or `degrade`) |
//! | `CHUNK_SIZE` / `CHUNK_OVERLAP` | `1000` / `100` |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use axum::http::HeaderValue;
use tracing::warn;

use newnerd_core::{defaults, Error, Result};

use crate::services::{EmbeddingFailure, IngestConfig};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_DATABASE_URL: &str = "postgres://localhost/newnerd";
const DEFAULT_ALLOWED_ORIGINS: &str =
    "http://localhost:3000,http://localhost:5173,http://localhost:5500,http://127.0.0.1:5500";

/// Where the search route's semantic lookup runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SemanticSource {
    /// Embed the query in-process and match chunks in the database.
    #[default]
    Local,
    /// Call a remote `semantic-search` function.
    Function,
}

impl FromStr for SemanticSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "function" | "remote" => Ok(Self::Function),
            other => Err(Error::Config(format!(
                "SEMANTIC_LOOKUP must be 'local' or 'function', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SemanticSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Function => f.write_str("function"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub storage_path: PathBuf,
    pub allowed_origins: Vec<String>,
    pub max_body_bytes: usize,
    pub semantic_source: SemanticSource,
    pub ingest: IngestConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: defaults::SERVER_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            storage_path: PathBuf::from(defaults::STORAGE_PATH),
            allowed_origins: split_origins(DEFAULT_ALLOWED_ORIGINS),
            max_body_bytes: defaults::MAX_BODY_SIZE_BYTES,
            semantic_source: SemanticSource::default(),
            ingest: IngestConfig::default(),
        }
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}: {}", key, e))),
        _ => Ok(None),
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let ingest_defaults = IngestConfig::default();

        let ingest = IngestConfig {
            embedding_failure: parse_var::<EmbeddingFailure, _>(&lookup, "INGEST_EMBEDDING_FAILURE")?
                .unwrap_or(ingest_defaults.embedding_failure),
            chunk_size: parse_var(&lookup, "CHUNK_SIZE")?.unwrap_or(ingest_defaults.chunk_size),
            chunk_overlap: parse_var(&lookup, "CHUNK_OVERLAP")?
                .unwrap_or(ingest_defaults.chunk_overlap),
        };

        let config = Self {
            host: lookup("HOST")
                .filter(|h| !h.trim().is_empty())
                .unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT")?.unwrap_or(defaults.port),
            database_url: lookup("DATABASE_URL")
                .filter(|u| !u.trim().is_empty())
                .unwrap_or(defaults.database_url),
            storage_path: lookup("STORAGE_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_path),
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|raw| split_origins(&raw))
                .filter(|origins| !origins.is_empty())
                .unwrap_or(defaults.allowed_origins),
            max_body_bytes: parse_var(&lookup, "MAX_BODY_SIZE_BYTES")?
                .unwrap_or(defaults.max_body_bytes),
            semantic_source: parse_var(&lookup, "SEMANTIC_LOOKUP")?
                .unwrap_or(defaults.semantic_source),
            ingest,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ingest.chunk_size == 0 {
            return Err(Error::Config("CHUNK_SIZE must be positive".to_string()));
        }
        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(Error::Config(format!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.ingest.chunk_overlap, self.ingest.chunk_size
            )));
        }
        if self.max_body_bytes == 0 {
            return Err(Error::Config(
                "MAX_BODY_SIZE_BYTES must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// CORS origins as header values. Unparseable entries are skipped.
    pub fn origin_headers(&self) -> Vec<HeaderValue> {
        self.allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Invalid CORS origin '{}': {}", origin, e);
                    None
                }
            })
            .collect()
    }
}

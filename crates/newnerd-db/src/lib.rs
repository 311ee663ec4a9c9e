//! # newnerd-db
//!
//! PostgreSQL database layer for the New Nerd document library.
//!
//! This crate provides:
//! - Connection pool management
//! - Document repository (owner-scoped CRUD and title lookup)
//! - Chunk repository (pgvector semantic index)
//! - Object storage backend for uploaded files
//!
//! ## Example
//!
//! ```rust,ignore
//! use newnerd_db::Database;
//! use newnerd_core::{KeywordLookup, OwnerScope};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/newnerd").await?;
//!     let scope = OwnerScope::student(student_id);
//!     let docs = db.documents.find_by_title(&scope, "biologia", 5).await?;
//!     println!("{} title matches", docs.len());
//!     Ok(())
//! }
//! ```

pub mod chunks;
pub mod documents;
pub mod file_storage;
pub mod pool;

// Test fixtures for integration tests
// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

pub use chunks::PgChunkRepository;
pub use documents::PgDocumentRepository;
pub use file_storage::{object_key, FilesystemBackend, StorageBackend};
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

// Re-export core types
pub use newnerd_core::*;

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Library documents.
    pub documents: PgDocumentRepository,
    /// Embedded chunks for semantic search.
    pub chunks: PgChunkRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            documents: PgDocumentRepository::new(pool.clone()),
            chunks: PgChunkRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

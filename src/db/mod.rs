//! Database connection, sessions and entity declarations

pub mod entities;
pub mod schema_sync;
pub mod session;
pub mod sqlite_helpers;

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::warn;

pub use entities::{
    AIAssessment, Answer, Question, QuestionTechnology, Technology, User, UserQuestion,
};
pub use schema_sync::{SchemaSyncResult, sync_all_entity_schemas};
pub use session::Session;

/// Database wrapper providing connection pool access
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn options(url: &str) -> Result<SqliteConnectOptions> {
        Ok(SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL: {}", url))?
            .create_if_missing(true)
            .foreign_keys(true))
    }

    /// Create a new database connection pool
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(Self::options(url)?)
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;

        Ok(Self { pool })
    }

    /// Private in-memory database on a single long-lived connection.
    ///
    /// Every SQLite in-memory connection is its own database, so the pool
    /// must never open a second one or recycle the first.
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(Self::options("sqlite::memory:")?)
            .await
            .context("Failed to open in-memory database")?;

        Ok(Self { pool })
    }

    /// Create a new database connection pool with retry logic.
    /// Retries every `retry_interval` until successful or `attempts` run out.
    pub async fn connect_with_retry(
        url: &str,
        max_connections: u32,
        retry_interval: Duration,
        attempts: u32,
    ) -> Result<Self> {
        let mut attempt = 1;
        loop {
            match Self::connect(url, max_connections).await {
                Ok(db) => return Ok(db),
                Err(e) if attempt < attempts => {
                    warn!(
                        attempt,
                        "Database connection failed: {:#}. Retrying in {} seconds...",
                        e,
                        retry_interval.as_secs()
                    );
                    attempt += 1;
                    tokio::time::sleep(retry_interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a new unit of work
    pub fn session(&self) -> Session {
        Session::new(self.clone())
    }

    /// Create missing tables and columns for every entity
    pub async fn sync_schemas(&self) -> SchemaSyncResult {
        sync_all_entity_schemas(&self.pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

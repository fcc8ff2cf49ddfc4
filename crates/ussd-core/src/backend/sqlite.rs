//! SQLite backend
//!
//! The default backend: embedded, no external services, persists across
//! restarts. One table holds every namespace; handles created with
//! [`SqliteBackend::with_namespace`] share the connection pool.

use super::Backend;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite key-value backend bound to one namespace
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    namespace: String,
}

impl SqliteBackend {
    /// Open (creating if missing) the database at `path`
    ///
    /// # Errors
    ///
    /// Returns error if database creation or schema setup fails.
    pub async fn open(path: impl AsRef<Path>, namespace: &str) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Backend(format!("Failed to create database directory: {}", e)))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| Error::Configuration(format!("Invalid SQLite path: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::Backend(format!("Failed to connect to SQLite: {}", e)))?;

        let backend = Self::from_pool(pool, namespace).await?;
        info!(path = %path.display(), namespace = %namespace, "SQLite backend opened");
        Ok(backend)
    }

    /// Wrap an existing pool, creating the schema if needed
    pub async fn from_pool(pool: SqlitePool, namespace: &str) -> Result<Self> {
        let backend = Self {
            pool,
            namespace: namespace.to_string(),
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Another handle on the same database, bound to `namespace`
    #[must_use]
    pub fn with_namespace(&self, namespace: &str) -> Self {
        Self {
            pool: self.pool.clone(),
            namespace: namespace.to_string(),
        }
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                namespace TEXT NOT NULL,
                key BLOB NOT NULL,
                value BLOB NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Backend(format!("Failed to create kv_entries table: {}", e)))?;

        debug!("SQLite kv schema initialized");
        Ok(())
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Backend(format!("Health check failed: {}", e)))?;
        Ok(true)
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT value FROM kv_entries WHERE namespace = ? AND key = ?")
                .bind(&self.namespace)
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::Backend(format!("Failed to read entry: {}", e)))?;

        match row {
            Some((value,)) => Ok(value),
            None => Err(Error::NotFound(String::from_utf8_lossy(key).into_owned())),
        }
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO kv_entries (namespace, key, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(namespace, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(value)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Backend(format!("Failed to write entry: {}", e)))?;

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.pool.is_closed() {
            self.pool.close().await;
            info!(namespace = %self.namespace, "SQLite backend closed");
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "sqlite"
    }
}

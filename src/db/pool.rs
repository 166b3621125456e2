//! Database connection pool
//!
//! One pool per process, for whichever backend the config names.
//! Repositories borrow the concrete sqlx pool through `backend()` and run
//! the matching query path.

use anyhow::{Context, Result};
use sqlx::{
    mysql::{MySqlPool, MySqlPoolOptions},
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{DatabaseConfig, DatabaseDriver};

const SQLITE_MAX_CONNECTIONS: u32 = 20;
const MYSQL_MAX_CONNECTIONS: u32 = 30;

/// Connection pool for the configured backend
pub enum DatabasePool {
    Sqlite(SqlitePool),
    Mysql(MySqlPool),
}

/// Concrete pool borrowed from a `DatabasePool`
#[derive(Clone, Copy)]
pub enum Backend<'a> {
    Sqlite(&'a SqlitePool),
    Mysql(&'a MySqlPool),
}

/// Shared handle held by repositories and the app state
pub type DynDatabasePool = Arc<DatabasePool>;

impl DatabasePool {
    pub fn backend(&self) -> Backend<'_> {
        match self {
            Self::Sqlite(pool) => Backend::Sqlite(pool),
            Self::Mysql(pool) => Backend::Mysql(pool),
        }
    }

    /// Round-trip a trivial query; used by the health check
    pub async fn ping(&self) -> Result<()> {
        let result = match self.backend() {
            Backend::Sqlite(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
            Backend::Mysql(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
        };
        result.context("Database ping failed")
    }
}

fn is_in_memory(url: &str) -> bool {
    url.starts_with(":memory:") || url.starts_with("sqlite::memory:")
}

/// `sqlite:` URL that creates the file when missing
fn sqlite_url(url: &str) -> String {
    if is_in_memory(url) {
        return "sqlite::memory:".to_string();
    }
    match url.strip_prefix("sqlite:") {
        Some(_) if url.contains('?') => url.to_string(),
        Some(_) => format!("{}?mode=rwc", url),
        None => format!("sqlite:{}?mode=rwc", url),
    }
}

async fn connect_sqlite(url: &str) -> Result<SqlitePool> {
    let in_memory = is_in_memory(url);
    if !in_memory {
        let file = url.strip_prefix("sqlite:").unwrap_or(url);
        let file = file.split('?').next().unwrap_or(file);
        if let Some(dir) = Path::new(file).parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create database directory: {:?}", dir))?;
        }
    }

    // Foreign keys are a per-connection setting, so they go on the options
    let options = SqliteConnectOptions::from_str(&sqlite_url(url))
        .with_context(|| format!("Invalid SQLite URL: {}", url))?
        .foreign_keys(true);

    // Every in-memory connection is its own database: keep exactly one alive
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(SQLITE_MAX_CONNECTIONS)
    };

    pool_options
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to SQLite database: {}", url))
}

async fn connect_mysql(url: &str) -> Result<MySqlPool> {
    let url = if url.starts_with("mysql://") {
        url.to_string()
    } else {
        format!("mysql://{}", url)
    };
    MySqlPoolOptions::new()
        .max_connections(MYSQL_MAX_CONNECTIONS)
        .connect(&url)
        .await
        .with_context(|| format!("Failed to connect to MySQL database: {}", url))
}

/// Connect to the database named in the config
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    let pool = match config.driver {
        DatabaseDriver::Sqlite => DatabasePool::Sqlite(connect_sqlite(&config.url).await?),
        DatabaseDriver::Mysql => DatabasePool::Mysql(connect_mysql(&config.url).await?),
    };
    Ok(Arc::new(pool))
}

/// Single-connection in-memory SQLite pool for tests
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    create_pool(&DatabaseConfig {
        driver: DatabaseDriver::Sqlite,
        url: ":memory:".to_string(),
    })
    .await
}

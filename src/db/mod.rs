//! Database layer
//!
//! Persistence for activities, participants, preferences, the message log
//! and plans. Two backends are supported:
//! - SQLite (default, single-file deployment; `:memory:` for tests)
//! - MySQL
//!
//! # Usage
//!
//! ```ignore
//! use gatherly::config::DatabaseConfig;
//! use gatherly::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool};

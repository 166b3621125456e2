//! Database migrations module
//!
//! The bootstrap schema is embedded in the binary as SQL strings for both
//! SQLite and MySQL. Applied versions are tracked in the `_migrations`
//! table, so `run_migrations` is safe to call on every start.
//!
//! Each migration is defined as a `Migration` struct containing:
//! - `version`: Unique version number for ordering
//! - `name`: Human-readable migration name
//! - `up_sqlite`: SQL for SQLite database
//! - `up_mysql`: SQL for MySQL database

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::{Backend, DynDatabasePool};

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_activities",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS activities (
                id VARCHAR(36) PRIMARY KEY,
                title VARCHAR(255),
                description TEXT,
                proposed_date VARCHAR(100),
                time_window VARCHAR(100),
                start_time VARCHAR(50),
                location_address VARCHAR(500),
                status VARCHAR(20) NOT NULL DEFAULT 'planning',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_activities_created_at ON activities(created_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS activities (
                id VARCHAR(36) PRIMARY KEY,
                title VARCHAR(255),
                description TEXT,
                proposed_date VARCHAR(100),
                time_window VARCHAR(100),
                start_time VARCHAR(50),
                location_address VARCHAR(500),
                status VARCHAR(20) NOT NULL DEFAULT 'planning',
                created_at DATETIME(6) NOT NULL,
                updated_at DATETIME(6) NOT NULL
            );
            CREATE INDEX idx_activities_created_at ON activities(created_at);
        "#,
    },
    Migration {
        version: 2,
        name: "create_participants",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS participants (
                id VARCHAR(36) PRIMARY KEY,
                activity_id VARCHAR(36) NOT NULL,
                name VARCHAR(100),
                phone_number VARCHAR(20) NOT NULL,
                email VARCHAR(255),
                allow_group_text BOOLEAN NOT NULL DEFAULT 0,
                status VARCHAR(20) NOT NULL DEFAULT 'invited',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (activity_id) REFERENCES activities(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_participants_activity_id ON participants(activity_id);
            CREATE INDEX IF NOT EXISTS idx_participants_phone_number ON participants(phone_number);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS participants (
                id VARCHAR(36) PRIMARY KEY,
                activity_id VARCHAR(36) NOT NULL,
                name VARCHAR(100),
                phone_number VARCHAR(20) NOT NULL,
                email VARCHAR(255),
                allow_group_text BOOLEAN NOT NULL DEFAULT FALSE,
                status VARCHAR(20) NOT NULL DEFAULT 'invited',
                created_at DATETIME(6) NOT NULL,
                updated_at DATETIME(6) NOT NULL,
                FOREIGN KEY (activity_id) REFERENCES activities(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_participants_activity_id ON participants(activity_id);
            CREATE INDEX idx_participants_phone_number ON participants(phone_number);
        "#,
    },
    Migration {
        version: 3,
        name: "create_preferences",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS preferences (
                id VARCHAR(36) PRIMARY KEY,
                activity_id VARCHAR(36) NOT NULL,
                participant_id VARCHAR(36),
                category VARCHAR(50) NOT NULL,
                pref_key VARCHAR(100) NOT NULL,
                value TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (activity_id, participant_id, category, pref_key),
                FOREIGN KEY (activity_id) REFERENCES activities(id) ON DELETE CASCADE,
                FOREIGN KEY (participant_id) REFERENCES participants(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_preferences_participant_id ON preferences(participant_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS preferences (
                id VARCHAR(36) PRIMARY KEY,
                activity_id VARCHAR(36) NOT NULL,
                participant_id VARCHAR(36),
                category VARCHAR(50) NOT NULL,
                pref_key VARCHAR(100) NOT NULL,
                value TEXT NOT NULL,
                created_at DATETIME(6) NOT NULL,
                UNIQUE KEY uq_preferences_key (activity_id, participant_id, category, pref_key),
                FOREIGN KEY (activity_id) REFERENCES activities(id) ON DELETE CASCADE,
                FOREIGN KEY (participant_id) REFERENCES participants(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_preferences_participant_id ON preferences(participant_id);
        "#,
    },
    Migration {
        version: 4,
        name: "create_messages",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS messages (
                id VARCHAR(36) PRIMARY KEY,
                activity_id VARCHAR(36) NOT NULL,
                participant_id VARCHAR(36),
                direction VARCHAR(10) NOT NULL,
                channel VARCHAR(10) NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (activity_id) REFERENCES activities(id) ON DELETE CASCADE,
                FOREIGN KEY (participant_id) REFERENCES participants(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_messages_activity_created ON messages(activity_id, created_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS messages (
                id VARCHAR(36) PRIMARY KEY,
                activity_id VARCHAR(36) NOT NULL,
                participant_id VARCHAR(36),
                direction VARCHAR(10) NOT NULL,
                channel VARCHAR(10) NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL,
                created_at DATETIME(6) NOT NULL,
                FOREIGN KEY (activity_id) REFERENCES activities(id) ON DELETE CASCADE,
                FOREIGN KEY (participant_id) REFERENCES participants(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_messages_activity_created ON messages(activity_id, created_at);
        "#,
    },
    Migration {
        version: 5,
        name: "create_plans",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS plans (
                id VARCHAR(36) PRIMARY KEY,
                activity_id VARCHAR(36) NOT NULL,
                title VARCHAR(255) NOT NULL,
                description TEXT NOT NULL,
                scheduled_date DATE,
                time_window VARCHAR(100),
                start_time VARCHAR(50),
                location_address VARCHAR(500),
                schedule TEXT NOT NULL DEFAULT '[]',
                considerations TEXT,
                alternatives TEXT NOT NULL DEFAULT '[]',
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                source VARCHAR(20) NOT NULL DEFAULT 'heuristic',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (activity_id) REFERENCES activities(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_plans_activity_created ON plans(activity_id, created_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS plans (
                id VARCHAR(36) PRIMARY KEY,
                activity_id VARCHAR(36) NOT NULL,
                title VARCHAR(255) NOT NULL,
                description TEXT NOT NULL,
                scheduled_date DATE,
                time_window VARCHAR(100),
                start_time VARCHAR(50),
                location_address VARCHAR(500),
                schedule TEXT NOT NULL,
                considerations TEXT,
                alternatives TEXT NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                source VARCHAR(20) NOT NULL DEFAULT 'heuristic',
                created_at DATETIME(6) NOT NULL,
                updated_at DATETIME(6) NOT NULL,
                FOREIGN KEY (activity_id) REFERENCES activities(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_plans_activity_created ON plans(activity_id, created_at);
        "#,
    },
];

/// Run all pending migrations, returning how many were applied
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

/// Create the migrations tracking table if it doesn't exist
async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let result = match pool.backend() {
        Backend::Sqlite(p) => {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS _migrations (
                    version INTEGER PRIMARY KEY,
                    name VARCHAR(255) NOT NULL UNIQUE,
                    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
                )
                "#,
            )
            .execute(p)
            .await
            .map(|_| ())
        }
        Backend::Mysql(p) => {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS _migrations (
                    version INT PRIMARY KEY,
                    name VARCHAR(255) NOT NULL UNIQUE,
                    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
                )
                "#,
            )
            .execute(p)
            .await
            .map(|_| ())
        }
    };
    result.context("Failed to create migrations table")?;
    Ok(())
}

/// Get list of already applied migrations
pub async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.backend() {
        Backend::Sqlite(p) => get_applied_migrations_sqlite(p).await,
        Backend::Mysql(p) => get_applied_migrations_mysql(p).await,
    }
}

async fn get_applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn get_applied_migrations_mysql(pool: &MySqlPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get::<i32, _>("version") as i64,
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

/// Apply a single migration
async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.backend() {
        Backend::Sqlite(p) => apply_migration_sqlite(p, migration).await,
        Backend::Mysql(p) => apply_migration_mysql(p, migration).await,
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

async fn apply_migration_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_mysql) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, dropping empty and comment-only ones
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

/// Check if a string contains only SQL comments
fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    fn sqlite(pool: &DynDatabasePool) -> &SqlitePool {
        match pool.backend() {
            Backend::Sqlite(p) => p,
            Backend::Mysql(_) => panic!("expected the SQLite test pool"),
        }
    }

    async fn migrated_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    async fn insert_activity(pool: &SqlitePool, id: &str) {
        sqlx::query(
            "INSERT INTO activities (id, status, created_at, updated_at) VALUES (?, 'planning', ?, ?)",
        )
        .bind(id)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(pool)
        .await
        .expect("Failed to insert activity");
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        // Running again should apply 0 migrations
        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_applied_migrations_are_recorded() {
        let pool = migrated_pool().await;
        let applied = get_applied_migrations(&pool).await.unwrap();
        assert_eq!(applied.len(), MIGRATIONS.len());
        assert_eq!(applied[0].name, "create_activities");
    }

    #[tokio::test]
    async fn test_activity_delete_cascades() {
        let pool = migrated_pool().await;
        let sqlite = sqlite(&pool);

        insert_activity(sqlite, "act-1").await;
        sqlx::query(
            "INSERT INTO participants (id, activity_id, phone_number, created_at, updated_at) VALUES ('p-1', 'act-1', '+15550001111', ?, ?)",
        )
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(sqlite)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO preferences (id, activity_id, participant_id, category, pref_key, value, created_at) VALUES ('pr-1', 'act-1', 'p-1', 'timing', 'duration', '\"Half day\"', ?)",
        )
        .bind(Utc::now())
        .execute(sqlite)
        .await
        .unwrap();

        sqlx::query("DELETE FROM activities WHERE id = 'act-1'")
            .execute(sqlite)
            .await
            .unwrap();

        let remaining: i64 = sqlx::query("SELECT COUNT(*) AS n FROM participants")
            .fetch_one(sqlite)
            .await
            .unwrap()
            .get("n");
        assert_eq!(remaining, 0);
        let remaining: i64 = sqlx::query("SELECT COUNT(*) AS n FROM preferences")
            .fetch_one(sqlite)
            .await
            .unwrap()
            .get("n");
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_participant_requires_existing_activity() {
        let pool = migrated_pool().await;
        let result = sqlx::query(
            "INSERT INTO participants (id, activity_id, phone_number, created_at, updated_at) VALUES ('p-x', 'missing', '+15550001111', ?, ?)",
        )
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(sqlite(&pool))
        .await;

        assert!(result.is_err());
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT); CREATE TABLE b (id INT);";
        assert_eq!(split_sql_statements(sql).len(), 2);

        let sql_with_comments = "-- Comment\nCREATE TABLE a (id INT);\n-- trailing";
        assert_eq!(split_sql_statements(sql_with_comments).len(), 1);
    }

    #[test]
    fn test_is_comment_only() {
        assert!(is_comment_only("-- This is a comment"));
        assert!(is_comment_only("-- Line 1\n-- Line 2"));
        assert!(!is_comment_only("CREATE TABLE test"));
        assert!(!is_comment_only("-- Comment\nCREATE TABLE test"));
    }

    #[test]
    fn test_versions_are_sequential() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version, i as i32 + 1);
        }
    }
}

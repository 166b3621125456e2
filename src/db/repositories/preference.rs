//! Preference repository
//!
//! Preferences are unique per (activity, participant, category, key).
//! Group-level rows have no participant, and SQL treats NULLs as distinct
//! in unique indexes, so `upsert` looks the row up with a null-safe match
//! instead of relying on the database conflict clause.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{decode_value, encode_value, Preference};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Preference repository trait
#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    /// Insert the preference or replace the value of the existing row
    async fn upsert(&self, pref: &Preference) -> Result<Preference>;

    async fn list_by_participant(&self, participant_id: &str) -> Result<Vec<Preference>>;

    /// Every preference of an activity, oldest first
    async fn list_by_activity(&self, activity_id: &str) -> Result<Vec<Preference>>;

    /// Rows stored under a category/key pair across an activity, oldest first
    async fn list_by_key(
        &self,
        activity_id: &str,
        category: &str,
        key: &str,
    ) -> Result<Vec<Preference>>;

    /// Delete a participant's preferences, optionally keeping one category.
    /// Returns the number of rows removed.
    async fn delete_by_participant(
        &self,
        participant_id: &str,
        keep_category: Option<&str>,
    ) -> Result<u64>;

    /// Delete one category/key of a participant. Returns the number of rows removed.
    async fn delete_key(&self, participant_id: &str, category: &str, key: &str) -> Result<u64>;
}

pub struct SqlxPreferenceRepository {
    pool: DynDatabasePool,
}

impl SqlxPreferenceRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PreferenceRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, activity_id, participant_id, category, pref_key, value, created_at FROM preferences";

const FIND_EXISTING_SQL: &str = r#"
    SELECT id, created_at FROM preferences
    WHERE activity_id = ?
      AND (participant_id = ? OR (participant_id IS NULL AND ? IS NULL))
      AND category = ? AND pref_key = ?
"#;

const INSERT_SQL: &str = r#"
    INSERT INTO preferences (id, activity_id, participant_id, category, pref_key, value, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

#[async_trait]
impl PreferenceRepository for SqlxPreferenceRepository {
    async fn upsert(&self, pref: &Preference) -> Result<Preference> {
        let saved = match self.pool.backend() {
            Backend::Sqlite(pool) => upsert_preference_sqlite(pool, pref).await,
            Backend::Mysql(pool) => upsert_preference_mysql(pool, pref).await,
        };
        saved.context("Failed to save preference")
    }

    async fn list_by_participant(&self, participant_id: &str) -> Result<Vec<Preference>> {
        let sql = format!("{} WHERE participant_id = ? ORDER BY created_at ASC", SELECT_COLUMNS);
        self.fetch(&sql, &[participant_id])
            .await
            .context("Failed to list participant preferences")
    }

    async fn list_by_activity(&self, activity_id: &str) -> Result<Vec<Preference>> {
        let sql = format!("{} WHERE activity_id = ? ORDER BY created_at ASC", SELECT_COLUMNS);
        self.fetch(&sql, &[activity_id])
            .await
            .context("Failed to list activity preferences")
    }

    async fn list_by_key(
        &self,
        activity_id: &str,
        category: &str,
        key: &str,
    ) -> Result<Vec<Preference>> {
        let sql = format!(
            "{} WHERE activity_id = ? AND category = ? AND pref_key = ? ORDER BY created_at ASC",
            SELECT_COLUMNS
        );
        self.fetch(&sql, &[activity_id, category, key])
            .await
            .context("Failed to list preferences by key")
    }

    async fn delete_by_participant(
        &self,
        participant_id: &str,
        keep_category: Option<&str>,
    ) -> Result<u64> {
        let sql = match keep_category {
            Some(_) => "DELETE FROM preferences WHERE participant_id = ? AND category <> ?",
            None => "DELETE FROM preferences WHERE participant_id = ?",
        };
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let mut query = sqlx::query(sql).bind(participant_id);
                if let Some(category) = keep_category {
                    query = query.bind(category);
                }
                query.execute(pool).await?.rows_affected()
            }
            Backend::Mysql(pool) => {
                let mut query = sqlx::query(sql).bind(participant_id);
                if let Some(category) = keep_category {
                    query = query.bind(category);
                }
                query.execute(pool).await?.rows_affected()
            }
        };
        Ok(affected)
    }

    async fn delete_key(&self, participant_id: &str, category: &str, key: &str) -> Result<u64> {
        let sql =
            "DELETE FROM preferences WHERE participant_id = ? AND category = ? AND pref_key = ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(participant_id)
                .bind(category)
                .bind(key)
                .execute(pool)
                .await?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(participant_id)
                .bind(category)
                .bind(key)
                .execute(pool)
                .await?
                .rows_affected(),
        };
        Ok(affected)
    }
}

impl SqlxPreferenceRepository {
    async fn fetch(&self, sql: &str, binds: &[&str]) -> Result<Vec<Preference>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let mut query = sqlx::query(sql);
                for value in binds {
                    query = query.bind(*value);
                }
                let rows = query.fetch_all(pool).await?;
                rows.iter().map(row_to_preference_sqlite).collect()
            }
            Backend::Mysql(pool) => {
                let mut query = sqlx::query(sql);
                for value in binds {
                    query = query.bind(*value);
                }
                let rows = query.fetch_all(pool).await?;
                rows.iter().map(row_to_preference_mysql).collect()
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn upsert_preference_sqlite(pool: &SqlitePool, pref: &Preference) -> Result<Preference> {
    let encoded = encode_value(&pref.value);
    let existing = sqlx::query(FIND_EXISTING_SQL)
        .bind(&pref.activity_id)
        .bind(&pref.participant_id)
        .bind(&pref.participant_id)
        .bind(&pref.category)
        .bind(&pref.key)
        .fetch_optional(pool)
        .await?;

    if let Some(row) = existing {
        let id: String = row.get("id");
        sqlx::query("UPDATE preferences SET value = ? WHERE id = ?")
            .bind(&encoded)
            .bind(&id)
            .execute(pool)
            .await?;
        return Ok(Preference {
            id,
            created_at: row.get("created_at"),
            ..pref.clone()
        });
    }

    sqlx::query(INSERT_SQL)
        .bind(&pref.id)
        .bind(&pref.activity_id)
        .bind(&pref.participant_id)
        .bind(&pref.category)
        .bind(&pref.key)
        .bind(&encoded)
        .bind(pref.created_at)
        .execute(pool)
        .await?;
    Ok(pref.clone())
}

fn row_to_preference_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Preference> {
    let raw: String = row.get("value");
    Ok(Preference {
        id: row.get("id"),
        activity_id: row.get("activity_id"),
        participant_id: row.get("participant_id"),
        category: row.get("category"),
        key: row.get("pref_key"),
        value: decode_value(&raw),
        created_at: row.get("created_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn upsert_preference_mysql(pool: &MySqlPool, pref: &Preference) -> Result<Preference> {
    let encoded = encode_value(&pref.value);
    let existing = sqlx::query(FIND_EXISTING_SQL)
        .bind(&pref.activity_id)
        .bind(&pref.participant_id)
        .bind(&pref.participant_id)
        .bind(&pref.category)
        .bind(&pref.key)
        .fetch_optional(pool)
        .await?;

    if let Some(row) = existing {
        let id: String = row.get("id");
        sqlx::query("UPDATE preferences SET value = ? WHERE id = ?")
            .bind(&encoded)
            .bind(&id)
            .execute(pool)
            .await?;
        return Ok(Preference {
            id,
            created_at: row.get("created_at"),
            ..pref.clone()
        });
    }

    sqlx::query(INSERT_SQL)
        .bind(&pref.id)
        .bind(&pref.activity_id)
        .bind(&pref.participant_id)
        .bind(&pref.category)
        .bind(&pref.key)
        .bind(&encoded)
        .bind(pref.created_at)
        .execute(pool)
        .await?;
    Ok(pref.clone())
}

fn row_to_preference_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Preference> {
    let raw: String = row.get("value");
    Ok(Preference {
        id: row.get("id"),
        activity_id: row.get("activity_id"),
        participant_id: row.get("participant_id"),
        category: row.get("category"),
        key: row.get("pref_key"),
        value: decode_value(&raw),
        created_at: row.get("created_at"),
    })
}

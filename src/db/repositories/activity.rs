//! Activity repository
//!
//! This module provides:
//! - `ActivityRepository` trait defining the interface for activity data access
//! - `SqlxActivityRepository` implementing the trait for SQLite and MySQL

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Activity, ActivityStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Activity repository trait
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    /// Insert a new activity
    async fn create(&self, activity: &Activity) -> Result<Activity>;

    /// Get activity by ID
    async fn get(&self, id: &str) -> Result<Option<Activity>>;

    /// List all activities, newest first
    async fn list(&self) -> Result<Vec<Activity>>;

    /// Persist every editable field of an activity
    async fn update(&self, activity: &Activity) -> Result<Activity>;

    /// Update only the status
    async fn update_status(&self, id: &str, status: ActivityStatus) -> Result<()>;

    /// Delete an activity and, through foreign keys, everything it owns.
    /// Returns whether a row was deleted.
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// SQLx-based activity repository implementation
pub struct SqlxActivityRepository {
    pool: DynDatabasePool,
}

impl SqlxActivityRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ActivityRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_COLUMNS: &str = "SELECT id, title, description, proposed_date, time_window, start_time, location_address, status, created_at, updated_at FROM activities";

const INSERT_SQL: &str = r#"
    INSERT INTO activities (id, title, description, proposed_date, time_window, start_time, location_address, status, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_SQL: &str = r#"
    UPDATE activities
    SET title = ?, description = ?, proposed_date = ?, time_window = ?, start_time = ?, location_address = ?, status = ?, updated_at = ?
    WHERE id = ?
"#;

#[async_trait]
impl ActivityRepository for SqlxActivityRepository {
    async fn create(&self, activity: &Activity) -> Result<Activity> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_activity_sqlite(pool, activity).await,
            Backend::Mysql(pool) => create_activity_mysql(pool, activity).await,
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Activity>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_activity_sqlite(pool, id).await,
            Backend::Mysql(pool) => get_activity_mysql(pool, id).await,
        }
    }

    async fn list(&self) -> Result<Vec<Activity>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_activities_sqlite(pool).await,
            Backend::Mysql(pool) => list_activities_mysql(pool).await,
        }
    }

    async fn update(&self, activity: &Activity) -> Result<Activity> {
        let mut updated = activity.clone();
        updated.updated_at = Utc::now();
        match self.pool.backend() {
            Backend::Sqlite(pool) => update_activity_sqlite(pool, &updated).await?,
            Backend::Mysql(pool) => update_activity_mysql(pool, &updated).await?,
        }
        Ok(updated)
    }

    async fn update_status(&self, id: &str, status: ActivityStatus) -> Result<()> {
        let sql = "UPDATE activities SET status = ?, updated_at = ? WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(status.as_str())
                    .bind(Utc::now())
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update activity status")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(status.as_str())
                    .bind(Utc::now())
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update activity status")?;
            }
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let sql = "DELETE FROM activities WHERE id = ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete activity")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete activity")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_activity_sqlite(pool: &SqlitePool, activity: &Activity) -> Result<Activity> {
    sqlx::query(INSERT_SQL)
        .bind(&activity.id)
        .bind(&activity.title)
        .bind(&activity.description)
        .bind(&activity.proposed_date)
        .bind(&activity.time_window)
        .bind(&activity.start_time)
        .bind(&activity.location_address)
        .bind(activity.status.as_str())
        .bind(activity.created_at)
        .bind(activity.updated_at)
        .execute(pool)
        .await
        .context("Failed to create activity")?;

    Ok(activity.clone())
}

async fn get_activity_sqlite(pool: &SqlitePool, id: &str) -> Result<Option<Activity>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get activity by ID")?;

    row.as_ref().map(row_to_activity_sqlite).transpose()
}

async fn list_activities_sqlite(pool: &SqlitePool) -> Result<Vec<Activity>> {
    let rows = sqlx::query(&format!("{} ORDER BY created_at DESC", SELECT_COLUMNS))
        .fetch_all(pool)
        .await
        .context("Failed to list activities")?;

    rows.iter().map(row_to_activity_sqlite).collect()
}

async fn update_activity_sqlite(pool: &SqlitePool, activity: &Activity) -> Result<()> {
    sqlx::query(UPDATE_SQL)
        .bind(&activity.title)
        .bind(&activity.description)
        .bind(&activity.proposed_date)
        .bind(&activity.time_window)
        .bind(&activity.start_time)
        .bind(&activity.location_address)
        .bind(activity.status.as_str())
        .bind(activity.updated_at)
        .bind(&activity.id)
        .execute(pool)
        .await
        .context("Failed to update activity")?;
    Ok(())
}

fn row_to_activity_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Activity> {
    let status: String = row.get("status");
    Ok(Activity {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        proposed_date: row.get("proposed_date"),
        time_window: row.get("time_window"),
        start_time: row.get("start_time"),
        location_address: row.get("location_address"),
        status: status.parse()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_activity_mysql(pool: &MySqlPool, activity: &Activity) -> Result<Activity> {
    sqlx::query(INSERT_SQL)
        .bind(&activity.id)
        .bind(&activity.title)
        .bind(&activity.description)
        .bind(&activity.proposed_date)
        .bind(&activity.time_window)
        .bind(&activity.start_time)
        .bind(&activity.location_address)
        .bind(activity.status.as_str())
        .bind(activity.created_at)
        .bind(activity.updated_at)
        .execute(pool)
        .await
        .context("Failed to create activity")?;

    Ok(activity.clone())
}

async fn get_activity_mysql(pool: &MySqlPool, id: &str) -> Result<Option<Activity>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get activity by ID")?;

    row.as_ref().map(row_to_activity_mysql).transpose()
}

async fn list_activities_mysql(pool: &MySqlPool) -> Result<Vec<Activity>> {
    let rows = sqlx::query(&format!("{} ORDER BY created_at DESC", SELECT_COLUMNS))
        .fetch_all(pool)
        .await
        .context("Failed to list activities")?;

    rows.iter().map(row_to_activity_mysql).collect()
}

async fn update_activity_mysql(pool: &MySqlPool, activity: &Activity) -> Result<()> {
    sqlx::query(UPDATE_SQL)
        .bind(&activity.title)
        .bind(&activity.description)
        .bind(&activity.proposed_date)
        .bind(&activity.time_window)
        .bind(&activity.start_time)
        .bind(&activity.location_address)
        .bind(activity.status.as_str())
        .bind(activity.updated_at)
        .bind(&activity.id)
        .execute(pool)
        .await
        .context("Failed to update activity")?;
    Ok(())
}

fn row_to_activity_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Activity> {
    let status: String = row.get("status");
    Ok(Activity {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        proposed_date: row.get("proposed_date"),
        time_window: row.get("time_window"),
        start_time: row.get("start_time"),
        location_address: row.get("location_address"),
        status: status.parse()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

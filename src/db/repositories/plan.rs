//! Plan repository
//!
//! Schedules and alternatives are stored as JSON text columns.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Plan, ScheduleItem};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn create(&self, plan: &Plan) -> Result<Plan>;

    async fn get(&self, id: &str) -> Result<Option<Plan>>;

    /// Most recently created plan of an activity
    async fn latest_for_activity(&self, activity_id: &str) -> Result<Option<Plan>>;

    /// Plans of an activity, newest first
    async fn list_by_activity(&self, activity_id: &str) -> Result<Vec<Plan>>;

    /// Persist description, considerations and status
    async fn update(&self, plan: &Plan) -> Result<Plan>;
}

pub struct SqlxPlanRepository {
    pool: DynDatabasePool,
}

impl SqlxPlanRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PlanRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_COLUMNS: &str = "SELECT id, activity_id, title, description, scheduled_date, time_window, start_time, location_address, schedule, considerations, alternatives, status, source, created_at, updated_at FROM plans";

const INSERT_SQL: &str = r#"
    INSERT INTO plans (id, activity_id, title, description, scheduled_date, time_window, start_time, location_address, schedule, considerations, alternatives, status, source, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_SQL: &str = r#"
    UPDATE plans SET title = ?, description = ?, considerations = ?, status = ?, updated_at = ?
    WHERE id = ?
"#;

#[async_trait]
impl PlanRepository for SqlxPlanRepository {
    async fn create(&self, plan: &Plan) -> Result<Plan> {
        let schedule = serde_json::to_string(&plan.schedule)?;
        let alternatives = serde_json::to_string(&plan.alternatives)?;
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(INSERT_SQL)
                    .bind(&plan.id)
                    .bind(&plan.activity_id)
                    .bind(&plan.title)
                    .bind(&plan.description)
                    .bind(plan.scheduled_date)
                    .bind(&plan.time_window)
                    .bind(&plan.start_time)
                    .bind(&plan.location_address)
                    .bind(&schedule)
                    .bind(&plan.considerations)
                    .bind(&alternatives)
                    .bind(plan.status.as_str())
                    .bind(plan.source.as_str())
                    .bind(plan.created_at)
                    .bind(plan.updated_at)
                    .execute(pool)
                    .await
                    .context("Failed to create plan")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(INSERT_SQL)
                    .bind(&plan.id)
                    .bind(&plan.activity_id)
                    .bind(&plan.title)
                    .bind(&plan.description)
                    .bind(plan.scheduled_date)
                    .bind(&plan.time_window)
                    .bind(&plan.start_time)
                    .bind(&plan.location_address)
                    .bind(&schedule)
                    .bind(&plan.considerations)
                    .bind(&alternatives)
                    .bind(plan.status.as_str())
                    .bind(plan.source.as_str())
                    .bind(plan.created_at)
                    .bind(plan.updated_at)
                    .execute(pool)
                    .await
                    .context("Failed to create plan")?;
            }
        }
        Ok(plan.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<Plan>> {
        let sql = format!("{} WHERE id = ?", SELECT_COLUMNS);
        Ok(self
            .fetch(&sql, id)
            .await
            .context("Failed to get plan")?
            .into_iter()
            .next())
    }

    async fn latest_for_activity(&self, activity_id: &str) -> Result<Option<Plan>> {
        let sql = format!(
            "{} WHERE activity_id = ? ORDER BY created_at DESC LIMIT 1",
            SELECT_COLUMNS
        );
        Ok(self
            .fetch(&sql, activity_id)
            .await
            .context("Failed to get latest plan")?
            .into_iter()
            .next())
    }

    async fn list_by_activity(&self, activity_id: &str) -> Result<Vec<Plan>> {
        let sql = format!(
            "{} WHERE activity_id = ? ORDER BY created_at DESC",
            SELECT_COLUMNS
        );
        self.fetch(&sql, activity_id)
            .await
            .context("Failed to list plans")
    }

    async fn update(&self, plan: &Plan) -> Result<Plan> {
        let mut updated = plan.clone();
        updated.updated_at = Utc::now();
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(UPDATE_SQL)
                    .bind(&updated.title)
                    .bind(&updated.description)
                    .bind(&updated.considerations)
                    .bind(updated.status.as_str())
                    .bind(updated.updated_at)
                    .bind(&updated.id)
                    .execute(pool)
                    .await
                    .context("Failed to update plan")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(UPDATE_SQL)
                    .bind(&updated.title)
                    .bind(&updated.description)
                    .bind(&updated.considerations)
                    .bind(updated.status.as_str())
                    .bind(updated.updated_at)
                    .bind(&updated.id)
                    .execute(pool)
                    .await
                    .context("Failed to update plan")?;
            }
        }
        Ok(updated)
    }
}

impl SqlxPlanRepository {
    async fn fetch(&self, sql: &str, bind: &str) -> Result<Vec<Plan>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(sql).bind(bind).fetch_all(pool).await?;
                rows.iter().map(row_to_plan_sqlite).collect()
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(sql).bind(bind).fetch_all(pool).await?;
                rows.iter().map(row_to_plan_mysql).collect()
            }
        }
    }
}

/// Decode a JSON list column, treating unreadable text as empty
fn decode_list<T: serde::de::DeserializeOwned>(raw: &str) -> Vec<T> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn row_to_plan_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Plan> {
    let schedule: String = row.get("schedule");
    let alternatives: String = row.get("alternatives");
    let status: String = row.get("status");
    let source: String = row.get("source");
    Ok(Plan {
        id: row.get("id"),
        activity_id: row.get("activity_id"),
        title: row.get("title"),
        description: row.get("description"),
        scheduled_date: row.get("scheduled_date"),
        time_window: row.get("time_window"),
        start_time: row.get("start_time"),
        location_address: row.get("location_address"),
        schedule: decode_list::<ScheduleItem>(&schedule),
        considerations: row.get("considerations"),
        alternatives: decode_list(&alternatives),
        status: status.parse()?,
        source: source.parse()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_plan_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Plan> {
    let schedule: String = row.get("schedule");
    let alternatives: String = row.get("alternatives");
    let status: String = row.get("status");
    let source: String = row.get("source");
    Ok(Plan {
        id: row.get("id"),
        activity_id: row.get("activity_id"),
        title: row.get("title"),
        description: row.get("description"),
        scheduled_date: row.get("scheduled_date"),
        time_window: row.get("time_window"),
        start_time: row.get("start_time"),
        location_address: row.get("location_address"),
        schedule: decode_list::<ScheduleItem>(&schedule),
        considerations: row.get("considerations"),
        alternatives: decode_list(&alternatives),
        status: status.parse()?,
        source: source.parse()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

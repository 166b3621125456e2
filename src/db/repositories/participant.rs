//! Participant repository
//!
//! Database operations for participants.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Participant, ParticipantStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Participant repository trait
#[async_trait]
pub trait ParticipantRepository: Send + Sync {
    async fn create(&self, participant: &Participant) -> Result<Participant>;

    async fn get(&self, id: &str) -> Result<Option<Participant>>;

    /// Find a participant of an activity by normalized phone number
    async fn find_by_phone(&self, activity_id: &str, phone: &str) -> Result<Option<Participant>>;

    /// Most recently created participant with this phone in any activity
    async fn find_latest_by_phone(&self, phone: &str) -> Result<Option<Participant>>;

    /// Participants of an activity in the order they were added
    async fn list_by_activity(&self, activity_id: &str) -> Result<Vec<Participant>>;

    async fn list_by_status(
        &self,
        activity_id: &str,
        status: ParticipantStatus,
    ) -> Result<Vec<Participant>>;

    /// Persist contact fields and status
    async fn update(&self, participant: &Participant) -> Result<Participant>;

    async fn update_status(&self, id: &str, status: ParticipantStatus) -> Result<()>;
}

/// SQLx-based participant repository implementation
pub struct SqlxParticipantRepository {
    pool: DynDatabasePool,
}

impl SqlxParticipantRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ParticipantRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_COLUMNS: &str = "SELECT id, activity_id, name, phone_number, email, allow_group_text, status, created_at, updated_at FROM participants";

const INSERT_SQL: &str = r#"
    INSERT INTO participants (id, activity_id, name, phone_number, email, allow_group_text, status, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_SQL: &str = r#"
    UPDATE participants
    SET name = ?, phone_number = ?, email = ?, allow_group_text = ?, status = ?, updated_at = ?
    WHERE id = ?
"#;

/// Filter applied to a participant query
enum Filter<'a> {
    Id(&'a str),
    ActivityPhone(&'a str, &'a str),
    LatestPhone(&'a str),
    Activity(&'a str),
    ActivityStatus(&'a str, ParticipantStatus),
}

impl Filter<'_> {
    fn sql(&self) -> String {
        let clause = match self {
            Filter::Id(_) => "WHERE id = ?",
            Filter::ActivityPhone(..) => "WHERE activity_id = ? AND phone_number = ?",
            Filter::LatestPhone(_) => "WHERE phone_number = ? ORDER BY created_at DESC LIMIT 1",
            Filter::Activity(_) => "WHERE activity_id = ? ORDER BY created_at ASC",
            Filter::ActivityStatus(..) => {
                "WHERE activity_id = ? AND status = ? ORDER BY created_at ASC"
            }
        };
        format!("{} {}", SELECT_COLUMNS, clause)
    }

    fn binds(&self) -> Vec<&str> {
        match self {
            Filter::Id(v) | Filter::LatestPhone(v) | Filter::Activity(v) => vec![*v],
            Filter::ActivityPhone(a, p) => vec![*a, *p],
            Filter::ActivityStatus(a, s) => vec![*a, s.as_str()],
        }
    }
}

impl SqlxParticipantRepository {
    async fn fetch(&self, filter: Filter<'_>) -> Result<Vec<Participant>> {
        let sql = filter.sql();
        match self.pool.backend() {
            Backend::Sqlite(pool) => fetch_participants_sqlite(pool, &sql, filter.binds()).await,
            Backend::Mysql(pool) => fetch_participants_mysql(pool, &sql, filter.binds()).await,
        }
    }

    async fn fetch_one(&self, filter: Filter<'_>) -> Result<Option<Participant>> {
        Ok(self.fetch(filter).await?.into_iter().next())
    }
}

#[async_trait]
impl ParticipantRepository for SqlxParticipantRepository {
    async fn create(&self, participant: &Participant) -> Result<Participant> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_participant_sqlite(pool, participant).await?,
            Backend::Mysql(pool) => create_participant_mysql(pool, participant).await?,
        }
        Ok(participant.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<Participant>> {
        self.fetch_one(Filter::Id(id))
            .await
            .context("Failed to get participant by ID")
    }

    async fn find_by_phone(&self, activity_id: &str, phone: &str) -> Result<Option<Participant>> {
        self.fetch_one(Filter::ActivityPhone(activity_id, phone))
            .await
            .context("Failed to find participant by phone")
    }

    async fn find_latest_by_phone(&self, phone: &str) -> Result<Option<Participant>> {
        self.fetch_one(Filter::LatestPhone(phone))
            .await
            .context("Failed to find latest participant by phone")
    }

    async fn list_by_activity(&self, activity_id: &str) -> Result<Vec<Participant>> {
        self.fetch(Filter::Activity(activity_id))
            .await
            .context("Failed to list participants")
    }

    async fn list_by_status(
        &self,
        activity_id: &str,
        status: ParticipantStatus,
    ) -> Result<Vec<Participant>> {
        self.fetch(Filter::ActivityStatus(activity_id, status))
            .await
            .context("Failed to list participants by status")
    }

    async fn update(&self, participant: &Participant) -> Result<Participant> {
        let mut updated = participant.clone();
        updated.updated_at = Utc::now();
        match self.pool.backend() {
            Backend::Sqlite(pool) => update_participant_sqlite(pool, &updated).await?,
            Backend::Mysql(pool) => update_participant_mysql(pool, &updated).await?,
        }
        Ok(updated)
    }

    async fn update_status(&self, id: &str, status: ParticipantStatus) -> Result<()> {
        let sql = "UPDATE participants SET status = ?, updated_at = ? WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(status.as_str())
                    .bind(Utc::now())
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update participant status")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(status.as_str())
                    .bind(Utc::now())
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update participant status")?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_participant_sqlite(pool: &SqlitePool, p: &Participant) -> Result<()> {
    sqlx::query(INSERT_SQL)
        .bind(&p.id)
        .bind(&p.activity_id)
        .bind(&p.name)
        .bind(&p.phone_number)
        .bind(&p.email)
        .bind(p.allow_group_text)
        .bind(p.status.as_str())
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(pool)
        .await
        .context("Failed to create participant")?;
    Ok(())
}

async fn fetch_participants_sqlite(
    pool: &SqlitePool,
    sql: &str,
    binds: Vec<&str>,
) -> Result<Vec<Participant>> {
    let mut query = sqlx::query(sql);
    for value in binds {
        query = query.bind(value);
    }
    let rows = query.fetch_all(pool).await?;
    rows.iter().map(row_to_participant_sqlite).collect()
}

async fn update_participant_sqlite(pool: &SqlitePool, p: &Participant) -> Result<()> {
    sqlx::query(UPDATE_SQL)
        .bind(&p.name)
        .bind(&p.phone_number)
        .bind(&p.email)
        .bind(p.allow_group_text)
        .bind(p.status.as_str())
        .bind(p.updated_at)
        .bind(&p.id)
        .execute(pool)
        .await
        .context("Failed to update participant")?;
    Ok(())
}

fn row_to_participant_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Participant> {
    let status: String = row.get("status");
    Ok(Participant {
        id: row.get("id"),
        activity_id: row.get("activity_id"),
        name: row.get("name"),
        phone_number: row.get("phone_number"),
        email: row.get("email"),
        allow_group_text: row.get("allow_group_text"),
        status: status.parse()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_participant_mysql(pool: &MySqlPool, p: &Participant) -> Result<()> {
    sqlx::query(INSERT_SQL)
        .bind(&p.id)
        .bind(&p.activity_id)
        .bind(&p.name)
        .bind(&p.phone_number)
        .bind(&p.email)
        .bind(p.allow_group_text)
        .bind(p.status.as_str())
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(pool)
        .await
        .context("Failed to create participant")?;
    Ok(())
}

async fn fetch_participants_mysql(
    pool: &MySqlPool,
    sql: &str,
    binds: Vec<&str>,
) -> Result<Vec<Participant>> {
    let mut query = sqlx::query(sql);
    for value in binds {
        query = query.bind(value);
    }
    let rows = query.fetch_all(pool).await?;
    rows.iter().map(row_to_participant_mysql).collect()
}

async fn update_participant_mysql(pool: &MySqlPool, p: &Participant) -> Result<()> {
    sqlx::query(UPDATE_SQL)
        .bind(&p.name)
        .bind(&p.phone_number)
        .bind(&p.email)
        .bind(p.allow_group_text)
        .bind(p.status.as_str())
        .bind(p.updated_at)
        .bind(&p.id)
        .execute(pool)
        .await
        .context("Failed to update participant")?;
    Ok(())
}

fn row_to_participant_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Participant> {
    let status: String = row.get("status");
    Ok(Participant {
        id: row.get("id"),
        activity_id: row.get("activity_id"),
        name: row.get("name"),
        phone_number: row.get("phone_number"),
        email: row.get("email"),
        allow_group_text: row.get("allow_group_text"),
        status: status.parse()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{ActivityRepository, SqlxActivityRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Activity, CreateActivityInput};

    async fn setup() -> (SqlxParticipantRepository, SqlxActivityRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        (
            SqlxParticipantRepository::new(pool.clone()),
            SqlxActivityRepository::new(pool),
        )
    }

    async fn new_activity(repo: &SqlxActivityRepository) -> Activity {
        let activity = Activity::new(&CreateActivityInput::default());
        repo.create(&activity).await.expect("Failed to create activity")
    }

    #[tokio::test]
    async fn test_create_and_find_by_phone() {
        let (repo, activities) = setup().await;
        let activity = new_activity(&activities).await;
        let participant = Participant::new(
            &activity.id,
            "+15551234567".to_string(),
            Some("sam@example.com".to_string()),
            Some("Sam".to_string()),
        );
        repo.create(&participant).await.unwrap();

        let found = repo
            .find_by_phone(&activity.id, "+15551234567")
            .await
            .unwrap()
            .expect("Participant not found");
        assert_eq!(found.id, participant.id);
        assert_eq!(found.email.as_deref(), Some("sam@example.com"));
        assert!(!found.allow_group_text);

        assert!(repo
            .find_by_phone(&activity.id, "+15550000000")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_latest_by_phone_spans_activities() {
        let (repo, activities) = setup().await;
        let older = new_activity(&activities).await;
        let newer = new_activity(&activities).await;

        let first = Participant::new(&older.id, "+15551112222".to_string(), None, None);
        repo.create(&first).await.unwrap();
        let mut second = Participant::new(&newer.id, "+15551112222".to_string(), None, None);
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        repo.create(&second).await.unwrap();

        let latest = repo.find_latest_by_phone("+15551112222").await.unwrap().unwrap();
        assert_eq!(latest.activity_id, newer.id);
    }

    #[tokio::test]
    async fn test_list_and_status_filters() {
        let (repo, activities) = setup().await;
        let activity = new_activity(&activities).await;
        let a = Participant::new(&activity.id, "+15550000001".to_string(), None, None);
        let b = Participant::new(&activity.id, "+15550000002".to_string(), None, None);
        repo.create(&a).await.unwrap();
        repo.create(&b).await.unwrap();

        repo.update_status(&b.id, ParticipantStatus::Complete)
            .await
            .unwrap();

        assert_eq!(repo.list_by_activity(&activity.id).await.unwrap().len(), 2);
        let invited = repo
            .list_by_status(&activity.id, ParticipantStatus::Invited)
            .await
            .unwrap();
        assert_eq!(invited.len(), 1);
        assert_eq!(invited[0].id, a.id);
    }

    #[tokio::test]
    async fn test_update_contact_fields() {
        let (repo, activities) = setup().await;
        let activity = new_activity(&activities).await;
        let mut participant =
            Participant::new(&activity.id, "+15550000003".to_string(), None, None);
        repo.create(&participant).await.unwrap();

        participant.name = Some("Robin".to_string());
        participant.allow_group_text = true;
        repo.update(&participant).await.unwrap();

        let found = repo.get(&participant.id).await.unwrap().unwrap();
        assert_eq!(found.name.as_deref(), Some("Robin"));
        assert!(found.allow_group_text);
    }
}

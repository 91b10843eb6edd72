//! Operational events shown on the dashboard (heartbeats, signals, tuning notices)

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventRecord {
    pub id: i64,
    pub agent_id: Option<String>,
    pub event_type: String,
    pub severity: String,
    pub message: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub agent_id: Option<String>,
    pub event_type: String,
    pub severity: String,
    pub message: Option<String>,
    pub created_at: String,
}

pub struct EventRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> EventRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, event: &NewEvent) -> DbResult<i64> {
        let result = sqlx::query(
            r#"INSERT INTO events (agent_id, event_type, severity, message, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
        )
        .bind(&event.agent_id)
        .bind(&event.event_type)
        .bind(&event.severity)
        .bind(&event.message)
        .bind(&event.created_at)
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn recent(&self, limit: i64) -> DbResult<Vec<EventRecord>> {
        let records = sqlx::query_as::<_, EventRecord>(
            "SELECT * FROM events ORDER BY created_at DESC, id DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }
}

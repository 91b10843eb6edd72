//! Execution audit trail: every decision point, not only filled trades

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TradeLogRecord {
    pub id: i64,
    pub strategy_id: Option<String>,
    pub event: String,
    pub mode: String,
    pub market_id: Option<String>,
    /// JSON object, stored verbatim
    pub order_details: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewTradeLog {
    pub strategy_id: Option<String>,
    pub event: String,
    pub mode: String,
    pub market_id: Option<String>,
    pub order_details: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
}

pub struct TradeLogRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TradeLogRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, log: &NewTradeLog) -> DbResult<i64> {
        let result = sqlx::query(
            r#"INSERT INTO trade_logs
                (strategy_id, event, mode, market_id, order_details, result, error, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&log.strategy_id)
        .bind(&log.event)
        .bind(&log.mode)
        .bind(&log.market_id)
        .bind(&log.order_details)
        .bind(&log.result)
        .bind(&log.error)
        .bind(&log.created_at)
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent log rows, newest first, optionally for one strategy
    pub async fn recent(
        &self,
        strategy_id: Option<&str>,
        limit: i64,
    ) -> DbResult<Vec<TradeLogRecord>> {
        let records = match strategy_id {
            Some(id) => {
                sqlx::query_as::<_, TradeLogRecord>(
                    r#"SELECT * FROM trade_logs WHERE strategy_id = ?1
                       ORDER BY created_at DESC, id DESC LIMIT ?2"#,
                )
                .bind(id)
                .bind(limit)
                .fetch_all(self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, TradeLogRecord>(
                    "SELECT * FROM trade_logs ORDER BY created_at DESC, id DESC LIMIT ?1",
                )
                .bind(limit)
                .fetch_all(self.pool)
                .await?
            }
        };

        Ok(records)
    }
}

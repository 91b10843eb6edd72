//! Trade ledger repository
//!
//! Rows are append-only: the only mutation offered is the resolution refresh
//! of `closes_at` / `is_resolved`, and the schema triggers reject anything else.

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TradeRecord {
    pub id: i64,
    pub strategy_id: String,
    pub market: String,
    pub side: String,
    pub notional: String,
    pub pnl: String,
    pub market_id: Option<String>,
    pub market_slug: Option<String>,
    pub closes_at: Option<String>,
    pub is_resolved: bool,
    pub status: String,
    pub error: Option<String>,
    pub trading_mode: String,
    pub order_id: Option<String>,
    pub executed_at: String,
}

/// A trade about to be appended to the ledger
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub strategy_id: String,
    pub market: String,
    pub side: String,
    pub notional: String,
    pub pnl: String,
    pub market_id: Option<String>,
    pub market_slug: Option<String>,
    pub closes_at: Option<String>,
    pub is_resolved: bool,
    pub status: String,
    pub error: Option<String>,
    pub trading_mode: String,
    pub order_id: Option<String>,
    pub executed_at: String,
}

pub struct TradeRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TradeRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a trade and return its id
    pub async fn insert(&self, trade: &NewTrade) -> DbResult<i64> {
        let result = sqlx::query(
            r#"INSERT INTO trades
                (strategy_id, market, side, notional, pnl, market_id, market_slug,
                 closes_at, is_resolved, status, error, trading_mode, order_id, executed_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&trade.strategy_id)
        .bind(&trade.market)
        .bind(&trade.side)
        .bind(&trade.notional)
        .bind(&trade.pnl)
        .bind(&trade.market_id)
        .bind(&trade.market_slug)
        .bind(&trade.closes_at)
        .bind(trade.is_resolved)
        .bind(&trade.status)
        .bind(&trade.error)
        .bind(&trade.trading_mode)
        .bind(&trade.order_id)
        .bind(&trade.executed_at)
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Number of trades for a strategy executed at or after `since`
    pub async fn count_since(&self, strategy_id: &str, since: &str) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM trades WHERE strategy_id = ?1 AND executed_at >= ?2",
        )
        .bind(strategy_id)
        .bind(since)
        .fetch_one(self.pool)
        .await?;

        Ok(row.0)
    }

    /// Raw pnl values of a strategy's trades executed at or after `since`.
    /// Summed by the caller so decimal precision is kept.
    pub async fn pnl_since(&self, strategy_id: &str, since: &str) -> DbResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT pnl FROM trades WHERE strategy_id = ?1 AND executed_at >= ?2",
        )
        .bind(strategy_id)
        .bind(since)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|(p,)| p).collect())
    }

    /// A strategy's trades executed at or after `since`, oldest first
    pub async fn list_since(&self, strategy_id: &str, since: &str) -> DbResult<Vec<TradeRecord>> {
        let records = sqlx::query_as::<_, TradeRecord>(
            r#"SELECT * FROM trades
               WHERE strategy_id = ?1 AND executed_at >= ?2
               ORDER BY executed_at ASC, id ASC"#,
        )
        .bind(strategy_id)
        .bind(since)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    /// Most recent trades for a strategy, newest first
    pub async fn recent(&self, strategy_id: &str, limit: i64) -> DbResult<Vec<TradeRecord>> {
        let records = sqlx::query_as::<_, TradeRecord>(
            r#"SELECT * FROM trades WHERE strategy_id = ?1
               ORDER BY executed_at DESC, id DESC LIMIT ?2"#,
        )
        .bind(strategy_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    /// Unresolved trades that carry a market slug, oldest first
    pub async fn unresolved(&self, limit: i64) -> DbResult<Vec<TradeRecord>> {
        let records = sqlx::query_as::<_, TradeRecord>(
            r#"SELECT * FROM trades
               WHERE is_resolved = 0 AND market_slug IS NOT NULL
               ORDER BY executed_at ASC LIMIT ?1"#,
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    /// Refresh the resolution columns of one trade
    pub async fn update_resolution(
        &self,
        id: i64,
        closes_at: Option<&str>,
        is_resolved: bool,
    ) -> DbResult<()> {
        sqlx::query("UPDATE trades SET closes_at = ?2, is_resolved = ?3 WHERE id = ?1")
            .bind(id)
            .bind(closes_at)
            .bind(is_resolved)
            .execute(self.pool)
            .await?;

        Ok(())
    }
}

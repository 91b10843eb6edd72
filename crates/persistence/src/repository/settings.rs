//! Strategy settings repository: tunable thresholds, one row per strategy

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Default, Serialize, Deserialize, FromRow)]
pub struct StrategySettingsRecord {
    pub strategy_id: String,
    pub max_trade_notional: Option<String>,
    pub max_trades_per_hour: Option<i64>,
    pub max_daily_notional: Option<String>,
    pub max_daily_loss: Option<String>,
    pub divergence_threshold: Option<String>,
    pub certainty_threshold: Option<String>,
    pub liquidity_floor: Option<String>,
    pub order_size_multiplier: Option<String>,
    pub max_resolution_days: Option<i64>,
    pub last_tuned_at: Option<String>,
}

pub struct SettingsRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SettingsRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, strategy_id: &str) -> DbResult<Option<StrategySettingsRecord>> {
        let record = sqlx::query_as::<_, StrategySettingsRecord>(
            "SELECT * FROM strategy_settings WHERE strategy_id = ?1",
        )
        .bind(strategy_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(record)
    }

    /// Insert or replace every column of the settings row (upsert by strategy_id)
    pub async fn upsert(&self, record: &StrategySettingsRecord) -> DbResult<()> {
        sqlx::query(
            r#"INSERT INTO strategy_settings
                (strategy_id, max_trade_notional, max_trades_per_hour, max_daily_notional,
                 max_daily_loss, divergence_threshold, certainty_threshold, liquidity_floor,
                 order_size_multiplier, max_resolution_days, last_tuned_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
               ON CONFLICT(strategy_id) DO UPDATE SET
                 max_trade_notional = excluded.max_trade_notional,
                 max_trades_per_hour = excluded.max_trades_per_hour,
                 max_daily_notional = excluded.max_daily_notional,
                 max_daily_loss = excluded.max_daily_loss,
                 divergence_threshold = excluded.divergence_threshold,
                 certainty_threshold = excluded.certainty_threshold,
                 liquidity_floor = excluded.liquidity_floor,
                 order_size_multiplier = excluded.order_size_multiplier,
                 max_resolution_days = excluded.max_resolution_days,
                 last_tuned_at = excluded.last_tuned_at
            "#,
        )
        .bind(&record.strategy_id)
        .bind(&record.max_trade_notional)
        .bind(record.max_trades_per_hour)
        .bind(&record.max_daily_notional)
        .bind(&record.max_daily_loss)
        .bind(&record.divergence_threshold)
        .bind(&record.certainty_threshold)
        .bind(&record.liquidity_floor)
        .bind(&record.order_size_multiplier)
        .bind(record.max_resolution_days)
        .bind(&record.last_tuned_at)
        .execute(self.pool)
        .await?;

        Ok(())
    }
}

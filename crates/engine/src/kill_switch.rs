//! Kill Switch: emergency stop forcing every strategy back to paper mode

use crate::error::EngineResult;
use crate::types::{LogEvent, TradingMode, FALLBACK_CAPITAL};
use chrono::{DateTime, Utc};
use persistence::format_timestamp;
use persistence::repository::{NewTradeLog, StrategyRef, StrategyRepository, TradeLogRepository};
use persistence::SqlitePool;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
pub struct KillSwitchReport {
    pub success: bool,
    pub affected: usize,
    pub strategies: Vec<StrategyRef>,
    pub message: String,
}

/// Switch every non-paper strategy to paper in one statement and log it.
///
/// Each switched strategy starts a new paper epoch with its portfolio reset to
/// the paper baseline. Open positions and ledger rows are left alone. Safe to
/// call when nothing is live: the report says 0 and the audit row is still
/// written.
pub async fn kill_all(pool: &SqlitePool, now: DateTime<Utc>) -> EngineResult<KillSwitchReport> {
    let stamp = format_timestamp(now);
    let strategies = StrategyRepository::new(pool)
        .force_all_paper(&stamp, &FALLBACK_CAPITAL.to_string())
        .await?;
    let affected = strategies.len();
    let message = format!("Emergency stop: {} strategies switched to paper", affected);

    TradeLogRepository::new(pool)
        .insert(&NewTradeLog {
            strategy_id: None,
            event: LogEvent::KillSwitch.as_str().to_string(),
            mode: TradingMode::Paper.as_str().to_string(),
            order_details: serde_json::to_string(&strategies).ok(),
            result: Some(message.clone()),
            created_at: stamp,
            ..Default::default()
        })
        .await?;

    warn!(affected, "Kill switch engaged");

    Ok(KillSwitchReport {
        success: true,
        affected,
        strategies,
        message,
    })
}

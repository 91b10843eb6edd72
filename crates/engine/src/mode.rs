//! Paper/live mode switching
//!
//! Going live is gated on broker credentials and a successful broker ping.
//! A real transition resets the running portfolio to the new mode's baseline
//! and opens a new epoch at `mode_switched_at`.

use crate::broker::BrokerClient;
use crate::error::EngineError;
use crate::types::{LogEvent, Strategy, TradingMode};
use chrono::{DateTime, Utc};
use persistence::repository::{NewTradeLog, PortfolioReset, StrategyRepository, TradeLogRepository};
use persistence::{format_timestamp, DbError, SqlitePool};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ModeSwitchError {
    #[error("mode must be 'paper' or 'live'")]
    InvalidMode,

    #[error("Strategy {0} not found")]
    NotFound(String),

    #[error("Live trading not configured: broker credentials missing")]
    LiveNotConfigured,

    #[error("Broker unreachable: {0}")]
    BrokerUnreachable(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<DbError> for ModeSwitchError {
    fn from(e: DbError) -> Self {
        ModeSwitchError::Engine(EngineError::Db(e))
    }
}

/// Switch `strategy_id` to `requested` ("paper" | "live") and return the updated strategy
pub async fn switch_mode(
    pool: &SqlitePool,
    broker: &dyn BrokerClient,
    strategy_id: &str,
    requested: &str,
    now: DateTime<Utc>,
) -> Result<Strategy, ModeSwitchError> {
    let target: TradingMode = requested
        .parse()
        .map_err(|_| ModeSwitchError::InvalidMode)?;

    let repo = StrategyRepository::new(pool);
    let record = repo
        .get(strategy_id)
        .await?
        .ok_or_else(|| ModeSwitchError::NotFound(strategy_id.to_string()))?;
    let strategy = Strategy::try_from(record)?;

    if target == TradingMode::Live {
        if !broker.has_credentials() {
            warn!(strategy_id, "Live switch refused: no broker credentials");
            return Err(ModeSwitchError::LiveNotConfigured);
        }
        if let Err(e) = broker.ping().await {
            warn!(strategy_id, error = %e, "Live switch refused: broker ping failed");
            return Err(ModeSwitchError::BrokerUnreachable(e.to_string()));
        }
    }

    let previous = strategy.trading_mode;
    let stamp = format_timestamp(now);
    let transition = previous != target;

    let reset = transition.then(|| PortfolioReset {
        paper_cash: strategy.baseline_for(target).to_string(),
        paper_pnl: Decimal::ZERO.to_string(),
        paper_positions: 0,
    });
    repo.set_mode(strategy_id, target.as_str(), reset.as_ref(), &stamp)
        .await?;

    let result = if transition {
        format!("{} -> {}", previous, target)
    } else {
        format!("already {}", target)
    };
    TradeLogRepository::new(pool)
        .insert(&NewTradeLog {
            strategy_id: Some(strategy_id.to_string()),
            event: LogEvent::ModeChange.as_str().to_string(),
            mode: target.as_str().to_string(),
            order_details: reset.as_ref().map(|r| {
                serde_json::json!({
                    "paper_cash": r.paper_cash,
                    "paper_pnl": r.paper_pnl,
                    "paper_positions": r.paper_positions,
                })
                .to_string()
            }),
            result: Some(result),
            created_at: stamp,
            ..Default::default()
        })
        .await?;

    info!(strategy_id, from = %previous, to = %target, "Trading mode switched");

    let updated = repo
        .get(strategy_id)
        .await?
        .ok_or_else(|| ModeSwitchError::NotFound(strategy_id.to_string()))?;
    Ok(Strategy::try_from(updated)?)
}

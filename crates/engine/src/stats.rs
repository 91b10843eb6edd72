//! Dashboard read model: per-strategy portfolio figures for the current mode epoch

use crate::error::EngineResult;
use crate::types::{Strategy, Trade, TradeStatus};
use persistence::format_timestamp;
use persistence::repository::TradeRepository;
use persistence::SqlitePool;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyStats {
    pub base: Decimal,
    pub pnl: Decimal,
    /// Notional of filled trades only
    pub notional: Decimal,
    pub equity: Decimal,
    pub cash: Decimal,
    pub filled: usize,
    pub failed: usize,
}

/// Figures over `trades`, which must already be limited to the current epoch
pub fn summarize(strategy: &Strategy, trades: &[Trade]) -> StrategyStats {
    let base = strategy.baseline_for(strategy.trading_mode);

    let mut pnl = Decimal::ZERO;
    let mut notional = Decimal::ZERO;
    let mut filled = 0;
    let mut failed = 0;
    for t in trades {
        pnl += t.pnl;
        match t.status {
            TradeStatus::Filled => {
                notional += t.notional;
                filled += 1;
            }
            TradeStatus::Failed => failed += 1,
        }
    }

    StrategyStats {
        base,
        pnl,
        notional,
        equity: base + pnl,
        cash: (base - notional + pnl).max(Decimal::ZERO),
        filled,
        failed,
    }
}

/// Load the epoch's trades and summarize them
pub async fn strategy_stats(pool: &SqlitePool, strategy: &Strategy) -> EngineResult<StrategyStats> {
    let since = format_timestamp(strategy.mode_switched_at);
    let trades = TradeRepository::new(pool)
        .list_since(&strategy.id, &since)
        .await?
        .into_iter()
        .map(Trade::try_from)
        .collect::<EngineResult<Vec<_>>>()?;
    Ok(summarize(strategy, &trades))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FALLBACK_CAPITAL;
    use crate::testing::{insert_strategy, insert_trade_at, live_strategy, paper_strategy};
    use chrono::{Duration, Utc};
    use persistence::Database;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_stats_exclude_previous_epoch() {
        let db = Database::in_memory().await.unwrap();
        let strategy = paper_strategy("s1", "Bond Ladder");
        insert_strategy(db.pool(), &strategy).await;
        insert_trade_at(
            db.pool(),
            "s1",
            dec!(40),
            dec!(-30),
            strategy.mode_switched_at - Duration::seconds(1),
        )
        .await;
        insert_trade_at(db.pool(), "s1", dec!(25), dec!(5), Utc::now()).await;

        let stats = strategy_stats(db.pool(), &strategy).await.unwrap();
        assert_eq!(stats.base, dec!(100));
        assert_eq!(stats.pnl, dec!(5));
        assert_eq!(stats.notional, dec!(25));
        assert_eq!(stats.equity, dec!(105));
        assert_eq!(stats.cash, dec!(80));
        assert_eq!(stats.filled, 1);
    }

    #[test]
    fn test_live_and_fallback_base() {
        let strategy = live_strategy("s1", "Bond Ladder");
        let trades: Vec<Trade> = vec![];
        let stats = summarize(&strategy, &trades);
        assert_eq!(stats.base, dec!(250));
        assert_eq!(stats.cash, dec!(250));

        // Paper base follows the same fallback chain as the mode-switch reset
        let mut allocated = paper_strategy("s2", "Bond Ladder");
        allocated.paper_capital = None;
        allocated.capital_allocation = Some(dec!(250));
        assert_eq!(summarize(&allocated, &[]).base, dec!(250));
        assert_eq!(
            summarize(&allocated, &[]).base,
            allocated.baseline_for(allocated.trading_mode)
        );

        let mut broke = paper_strategy("s3", "Bond Ladder");
        broke.paper_capital = None;
        assert_eq!(summarize(&broke, &[]).base, FALLBACK_CAPITAL);
    }
}

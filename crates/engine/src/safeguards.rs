//! Safeguard Evaluator: pre-trade risk checks for live execution
//!
//! Checks run in order and stop at the first failure:
//! 1. position size against `max_position_size`
//! 2. orders in the trailing 60 seconds against `max_orders_per_minute`
//! 3. the UTC day's cumulative pnl plus the proposed pnl against `daily_loss_limit`
//!
//! Ledger reads happen at evaluation time with no caching and no isolation from
//! concurrent writers: two evaluations for the same strategy can both pass
//! before either trade is written. `Executor::with_serialization` closes that
//! window inside one process.

use crate::error::EngineResult;
use crate::types::{parse_decimal, RiskLimits};
use chrono::{DateTime, Duration, Utc};
use persistence::format_timestamp;
use persistence::repository::TradeRepository;
use persistence::SqlitePool;
use rust_decimal::Decimal;
use serde::Serialize;

/// Trailing window for the rate limit
const RATE_WINDOW_SECS: i64 = 60;

/// Which check rejected a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SafeguardCheck {
    PositionSize,
    RateLimit,
    DailyLoss,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafeguardDecision {
    Admitted,
    Rejected {
        check: SafeguardCheck,
        reason: String,
    },
}

impl SafeguardDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, SafeguardDecision::Admitted)
    }

    fn reject(check: SafeguardCheck, reason: String) -> Self {
        SafeguardDecision::Rejected { check, reason }
    }
}

/// Check 1: a single trade larger than the position cap is never admitted
pub fn check_position_size(notional: Decimal, limits: &RiskLimits) -> SafeguardDecision {
    if notional > limits.max_position_size {
        return SafeguardDecision::reject(
            SafeguardCheck::PositionSize,
            format!(
                "Position size ${} exceeds max ${}",
                notional.normalize(),
                limits.max_position_size.normalize()
            ),
        );
    }
    SafeguardDecision::Admitted
}

/// Check 2: `recent_orders` is the count of trades in the trailing minute
pub fn check_rate_limit(recent_orders: i64, limits: &RiskLimits) -> SafeguardDecision {
    if recent_orders >= limits.max_orders_per_minute {
        return SafeguardDecision::reject(
            SafeguardCheck::RateLimit,
            format!(
                "Rate limit: {} orders in last minute (max {})",
                recent_orders, limits.max_orders_per_minute
            ),
        );
    }
    SafeguardDecision::Admitted
}

/// Check 3: rejects once the day's pnl including this trade is at or below the floor.
///
/// The comparison is inclusive (`<=`): a strategy sitting exactly on its limit is
/// blocked even for a zero-pnl trade.
pub fn check_daily_loss(
    daily_pnl: Decimal,
    proposed_pnl: Decimal,
    limits: &RiskLimits,
) -> SafeguardDecision {
    let projected = daily_pnl + proposed_pnl;
    if projected <= limits.daily_loss_limit {
        return SafeguardDecision::reject(
            SafeguardCheck::DailyLoss,
            format!(
                "Daily loss limit hit: PnL ${} <= limit ${}",
                projected.round_dp(2),
                limits.daily_loss_limit.normalize()
            ),
        );
    }
    SafeguardDecision::Admitted
}

/// Midnight UTC of the day containing `now`
pub fn utc_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

/// Evaluate a proposed trade for `strategy_id` against the ledger as of `now`.
///
/// Never writes; the result depends only on ledger contents and `limits`.
pub async fn evaluate(
    pool: &SqlitePool,
    strategy_id: &str,
    proposed_notional: Decimal,
    proposed_pnl: Decimal,
    limits: &RiskLimits,
    now: DateTime<Utc>,
) -> EngineResult<SafeguardDecision> {
    let decision = check_position_size(proposed_notional, limits);
    if !decision.is_admitted() {
        return Ok(decision);
    }

    let trades = TradeRepository::new(pool);

    let window_start = format_timestamp(now - Duration::seconds(RATE_WINDOW_SECS));
    let recent = trades.count_since(strategy_id, &window_start).await?;
    let decision = check_rate_limit(recent, limits);
    if !decision.is_admitted() {
        return Ok(decision);
    }

    let day_start = format_timestamp(utc_day_start(now));
    let mut daily_pnl = Decimal::ZERO;
    for pnl in trades.pnl_since(strategy_id, &day_start).await? {
        // Unparseable values count as zero, matching how the dashboard sums them
        daily_pnl += parse_decimal("pnl", &pnl).unwrap_or(Decimal::ZERO);
    }

    Ok(check_daily_loss(daily_pnl, proposed_pnl, limits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{insert_strategy, insert_trade_at, paper_strategy};
    use chrono::TimeZone;
    use persistence::Database;
    use rust_decimal_macros::dec;

    fn limits() -> RiskLimits {
        RiskLimits {
            max_position_size: dec!(500),
            max_orders_per_minute: 5,
            daily_loss_limit: dec!(-100),
        }
    }

    #[test]
    fn test_position_size_rejects_above_cap() {
        let decision = check_position_size(dec!(600), &limits());
        match decision {
            SafeguardDecision::Rejected { check, reason } => {
                assert_eq!(check, SafeguardCheck::PositionSize);
                assert!(reason.contains("exceeds"));
                assert!(reason.contains("600"));
                assert!(reason.contains("500"));
            }
            SafeguardDecision::Admitted => panic!("600 should exceed 500"),
        }
        assert!(check_position_size(dec!(500), &limits()).is_admitted());
    }

    #[test]
    fn test_position_size_monotone() {
        let l = limits();
        let mut notional = dec!(500.01);
        for _ in 0..20 {
            assert!(!check_position_size(notional, &l).is_admitted());
            notional += dec!(37.5);
        }
    }

    #[test]
    fn test_rate_limit_boundary() {
        assert!(check_rate_limit(4, &limits()).is_admitted());
        assert!(!check_rate_limit(5, &limits()).is_admitted());
    }

    #[test]
    fn test_daily_loss_floor() {
        assert!(!check_daily_loss(dec!(-95), dec!(-10), &limits()).is_admitted());
        assert!(check_daily_loss(dec!(-95), dec!(0), &limits()).is_admitted());
        // Sitting exactly on the limit is already blocked
        assert!(!check_daily_loss(dec!(-100), dec!(0), &limits()).is_admitted());
    }

    #[test]
    fn test_utc_day_start() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 17, 45, 12).unwrap();
        assert_eq!(
            utc_day_start(now),
            Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_evaluate_rate_limit_against_ledger() {
        let db = Database::in_memory().await.unwrap();
        let strategy = paper_strategy("s1", "Bond Ladder");
        insert_strategy(db.pool(), &strategy).await;
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();

        for i in 0..4 {
            insert_trade_at(db.pool(), "s1", dec!(10), dec!(0), now - Duration::seconds(10 + i)).await;
        }
        // Outside the trailing minute
        insert_trade_at(db.pool(), "s1", dec!(10), dec!(0), now - Duration::seconds(61)).await;

        let decision = evaluate(db.pool(), "s1", dec!(10), dec!(0), &limits(), now)
            .await
            .unwrap();
        assert!(decision.is_admitted());

        insert_trade_at(db.pool(), "s1", dec!(10), dec!(0), now - Duration::seconds(1)).await;
        let decision = evaluate(db.pool(), "s1", dec!(10), dec!(0), &limits(), now)
            .await
            .unwrap();
        assert!(matches!(
            decision,
            SafeguardDecision::Rejected { check: SafeguardCheck::RateLimit, .. }
        ));
    }

    #[tokio::test]
    async fn test_evaluate_daily_loss_ignores_yesterday() {
        let db = Database::in_memory().await.unwrap();
        let strategy = paper_strategy("s1", "Bond Ladder");
        insert_strategy(db.pool(), &strategy).await;
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();

        insert_trade_at(db.pool(), "s1", dec!(20), dec!(-60), now - Duration::hours(3)).await;
        insert_trade_at(db.pool(), "s1", dec!(20), dec!(-35), now - Duration::hours(2)).await;
        // Yesterday's losses do not count toward today's floor
        insert_trade_at(db.pool(), "s1", dec!(20), dec!(-500), now - Duration::hours(13)).await;

        let blocked = evaluate(db.pool(), "s1", dec!(10), dec!(-10), &limits(), now)
            .await
            .unwrap();
        assert!(matches!(
            blocked,
            SafeguardDecision::Rejected { check: SafeguardCheck::DailyLoss, .. }
        ));

        let admitted = evaluate(db.pool(), "s1", dec!(10), dec!(0), &limits(), now)
            .await
            .unwrap();
        assert!(admitted.is_admitted());
    }

    #[tokio::test]
    async fn test_position_check_short_circuits_before_ledger() {
        let db = Database::in_memory().await.unwrap();
        let now = Utc::now();
        // Unknown strategy: the ledger would return nothing, but the first check wins
        let decision = evaluate(db.pool(), "nobody", dec!(501), dec!(0), &limits(), now)
            .await
            .unwrap();
        assert!(matches!(
            decision,
            SafeguardDecision::Rejected { check: SafeguardCheck::PositionSize, .. }
        ));
    }
}

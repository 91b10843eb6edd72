//! Auto-Tuner (Auditor)
//!
//! Walks each strategy's equity curve for the current mode epoch and, once the
//! drawdown from peak reaches 15%, tightens its settings by one bounded step.
//! Adjustments only ever tighten; every value is clamped to a hard bound.

use crate::error::EngineResult;
use crate::registry::{load_settings, save_settings};
use crate::types::{parse_decimal, Strategy, StrategyKind, StrategySettings};
use chrono::{DateTime, Utc};
use persistence::format_timestamp;
use persistence::repository::{EventRepository, NewEvent, StrategyRepository, TradeRepository};
use persistence::SqlitePool;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::{debug, info};

/// Drawdown at or above which a strategy is tuned
pub const DRAWDOWN_TRIGGER: Decimal = dec!(0.15);

/// Equity base when a strategy has no paper capital
const DEFAULT_AUDIT_BASE: Decimal = dec!(100);

const DIVERGENCE_STEP: Decimal = dec!(2);
const DIVERGENCE_CAP: Decimal = dec!(50);
const MULTIPLIER_DECAY: Decimal = dec!(0.9);
const MULTIPLIER_FLOOR: Decimal = dec!(0.5);
const CERTAINTY_STEP: Decimal = dec!(0.01);
const CERTAINTY_CAP: Decimal = dec!(0.99);
const LIQUIDITY_STEP: Decimal = dec!(0.05);
const LIQUIDITY_CAP: Decimal = dec!(0.9);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Drawdown {
    pub equity: Decimal,
    pub peak: Decimal,
    /// Fraction of peak, 0 when peak <= 0
    pub drawdown: Decimal,
}

/// Equity curve over `pnls` in chronological order, starting at `base`
pub fn compute_drawdown(base: Decimal, pnls: impl IntoIterator<Item = Decimal>) -> Drawdown {
    let mut equity = base;
    let mut peak = base;
    for pnl in pnls {
        equity += pnl;
        if equity > peak {
            peak = equity;
        }
    }

    let drawdown = if peak > Decimal::ZERO {
        (peak - equity) / peak
    } else {
        Decimal::ZERO
    };

    Drawdown {
        equity,
        peak,
        drawdown,
    }
}

/// One tightening step for `kind`
pub fn tune(kind: StrategyKind, current: &StrategySettings) -> StrategySettings {
    let mut next = current.clone();
    match kind {
        StrategyKind::Contrarian => {
            next.divergence_threshold =
                (current.divergence_threshold + DIVERGENCE_STEP).min(DIVERGENCE_CAP);
        }
        StrategyKind::Standard => {
            next.certainty_threshold =
                (current.certainty_threshold + CERTAINTY_STEP).min(CERTAINTY_CAP);
            next.liquidity_floor = (current.liquidity_floor + LIQUIDITY_STEP).min(LIQUIDITY_CAP);
        }
    }
    next.order_size_multiplier =
        (current.order_size_multiplier * MULTIPLIER_DECAY).max(MULTIPLIER_FLOOR);
    next
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub strategy_id: String,
    pub name: String,
    pub drawdown: Drawdown,
    pub tuned: bool,
    pub settings: Option<StrategySettings>,
}

impl AuditReport {
    pub fn summary(&self) -> String {
        let pct = (self.drawdown.drawdown * dec!(100)).round_dp(1);
        if self.tuned {
            format!("{}: tuned (dd {}%)", self.name, pct)
        } else {
            format!("{}: ok (dd {}%)", self.name, pct)
        }
    }
}

/// Audit one strategy against its current-epoch trades.
/// Returns `None` when the strategy has no trades in the epoch.
pub async fn audit(
    pool: &SqlitePool,
    strategy: &Strategy,
    now: DateTime<Utc>,
) -> EngineResult<Option<AuditReport>> {
    let since = format_timestamp(strategy.mode_switched_at);
    let trades = TradeRepository::new(pool)
        .list_since(&strategy.id, &since)
        .await?;
    if trades.is_empty() {
        return Ok(None);
    }

    let base = strategy.paper_capital.unwrap_or(DEFAULT_AUDIT_BASE);
    let pnls = trades
        .iter()
        .map(|t| parse_decimal("pnl", &t.pnl).unwrap_or(Decimal::ZERO));
    let drawdown = compute_drawdown(base, pnls);

    if drawdown.drawdown < DRAWDOWN_TRIGGER {
        debug!(strategy_id = %strategy.id, drawdown = %drawdown.drawdown, "Within drawdown bound");
        return Ok(Some(AuditReport {
            strategy_id: strategy.id.clone(),
            name: strategy.name.clone(),
            drawdown,
            tuned: false,
            settings: None,
        }));
    }

    let current = load_settings(pool, &strategy.id).await?;
    let mut tuned = tune(strategy.kind, &current);
    tuned.last_tuned_at = Some(now);
    save_settings(pool, &tuned).await?;

    let pct = (drawdown.drawdown * dec!(100)).round_dp(1);
    EventRepository::new(pool)
        .insert(&NewEvent {
            agent_id: None,
            event_type: "auditor".into(),
            severity: "info".into(),
            message: Some(format!(
                "Tuning applied for {} (drawdown {}%)",
                strategy.name, pct
            )),
            created_at: format_timestamp(now),
        })
        .await?;

    info!(strategy_id = %strategy.id, drawdown = %pct, kind = strategy.kind.as_str(), "Strategy tuned");

    Ok(Some(AuditReport {
        strategy_id: strategy.id.clone(),
        name: strategy.name.clone(),
        drawdown,
        tuned: true,
        settings: Some(tuned),
    }))
}

/// One auditor pass over every strategy
pub async fn run_audit(pool: &SqlitePool, now: DateTime<Utc>) -> EngineResult<Vec<AuditReport>> {
    let mut reports = Vec::new();
    for record in StrategyRepository::new(pool).list().await? {
        let strategy = Strategy::try_from(record)?;
        if let Some(report) = audit(pool, &strategy, now).await? {
            reports.push(report);
        }
    }

    let tuned = reports.iter().filter(|r| r.tuned).count();
    info!(audited = reports.len(), tuned, "Auditor pass complete");
    Ok(reports)
}

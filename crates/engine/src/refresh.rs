//! Resolution refresh: updates `closes_at` / `is_resolved` of open trades
//!
//! The only mutation of a ledger row that the storage triggers allow.

use crate::broker::MarketResolver;
use crate::error::EngineResult;
use persistence::repository::TradeRepository;
use persistence::SqlitePool;
use serde::Serialize;
use tracing::{info, warn};

pub const DEFAULT_REFRESH_LIMIT: i64 = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub updated: usize,
    pub failed: usize,
    /// Markets the resolver no longer knows
    pub skipped: usize,
    pub total: usize,
}

pub async fn refresh_resolutions(
    pool: &SqlitePool,
    resolver: &dyn MarketResolver,
    limit: i64,
) -> EngineResult<RefreshReport> {
    let repo = TradeRepository::new(pool);
    let pending = repo.unresolved(limit).await?;
    let mut report = RefreshReport {
        total: pending.len(),
        ..Default::default()
    };

    for trade in pending {
        let Some(slug) = trade.market_slug.as_deref() else {
            report.skipped += 1;
            continue;
        };

        match resolver.market_status(slug).await {
            Ok(Some(status)) => {
                let closes_at = status.closes_at.or(trade.closes_at);
                match repo
                    .update_resolution(trade.id, closes_at.as_deref(), status.is_resolved)
                    .await
                {
                    Ok(()) => report.updated += 1,
                    Err(e) => {
                        warn!(trade_id = trade.id, error = %e, "Resolution update failed");
                        report.failed += 1;
                    }
                }
            }
            Ok(None) => report.skipped += 1,
            Err(e) => {
                warn!(trade_id = trade.id, slug, error = %e, "Market status lookup failed");
                report.failed += 1;
            }
        }
    }

    info!(
        updated = report.updated,
        failed = report.failed,
        skipped = report.skipped,
        total = report.total,
        "Resolution refresh complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MarketStatus;
    use crate::testing::{insert_strategy, paper_strategy, FakeResolver};
    use chrono::Utc;
    use persistence::format_timestamp;
    use persistence::repository::NewTrade;
    use persistence::Database;

    async fn open_trade(db: &Database, slug: &str) -> i64 {
        TradeRepository::new(db.pool())
            .insert(&NewTrade {
                strategy_id: "s1".into(),
                market: format!("Market {slug}"),
                side: "NO".into(),
                notional: "15".into(),
                pnl: "0".into(),
                market_id: None,
                market_slug: Some(slug.into()),
                closes_at: Some("2026-11-01T00:00:00.000Z".into()),
                is_resolved: false,
                status: "filled".into(),
                error: None,
                trading_mode: "paper".into(),
                order_id: None,
                executed_at: format_timestamp(Utc::now()),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_refresh_counts_each_outcome() {
        let db = Database::in_memory().await.unwrap();
        insert_strategy(db.pool(), &paper_strategy("s1", "Copy Trader")).await;
        open_trade(&db, "resolved-market").await;
        open_trade(&db, "still-open").await;
        open_trade(&db, "delisted").await;

        let mut resolver = FakeResolver::default();
        resolver.statuses.insert(
            "resolved-market".into(),
            MarketStatus {
                closes_at: Some("2026-10-30T00:00:00Z".into()),
                is_resolved: true,
            },
        );
        resolver.statuses.insert(
            "still-open".into(),
            MarketStatus {
                closes_at: None,
                is_resolved: false,
            },
        );

        let report = refresh_resolutions(db.pool(), &resolver, DEFAULT_REFRESH_LIMIT)
            .await
            .unwrap();
        assert_eq!(
            report,
            RefreshReport {
                updated: 2,
                failed: 0,
                skipped: 1,
                total: 3
            }
        );

        let remaining = TradeRepository::new(db.pool()).unresolved(10).await.unwrap();
        assert_eq!(remaining.len(), 2);
        let open = remaining
            .iter()
            .find(|t| t.market_slug.as_deref() == Some("still-open"))
            .unwrap();
        assert_eq!(open.closes_at.as_deref(), Some("2026-11-01T00:00:00.000Z"));
    }

    #[tokio::test]
    async fn test_refresh_resolver_failure_counts_failed() {
        let db = Database::in_memory().await.unwrap();
        insert_strategy(db.pool(), &paper_strategy("s1", "Copy Trader")).await;
        open_trade(&db, "any").await;

        let resolver = FakeResolver {
            fail_with: Some("timeout".into()),
            ..Default::default()
        };
        let report = refresh_resolutions(db.pool(), &resolver, 10).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.updated, 0);
    }
}

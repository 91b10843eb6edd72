//! Execution Orchestrator
//!
//! For each proposed trade:
//! 1. paper mode records a simulated fill
//! 2. live mode runs the safeguards, resolves the market, and places the order
//!    through the broker
//!
//! Every stage writes an audit row to `trade_logs`. An admitted or attempted
//! trade always produces exactly one ledger row; a safeguard rejection produces
//! none. Broker and resolver failures are recorded, never propagated. Only
//! storage failures surface as `Err`.

use crate::broker::{build_order, BrokerClient, MarketResolver, OrderRequest};
use crate::error::EngineResult;
use crate::safeguards::{self, SafeguardCheck, SafeguardDecision};
use crate::types::{LogEvent, ProposedTrade, Strategy, TradeStatus, TradingMode};
use chrono::Utc;
use persistence::format_timestamp;
use persistence::repository::{NewTrade, NewTradeLog, TradeLogRepository, TradeRepository};
use persistence::SqlitePool;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

const NO_TRADABLE_IDENTIFIER: &str = "No tradable identifier";

/// What happened to a proposed trade
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Rejected by a safeguard; nothing was written to the ledger
    Blocked {
        check: SafeguardCheck,
        reason: String,
    },
    /// A ledger row was written, filled or failed
    Recorded {
        trade_id: i64,
        status: TradeStatus,
        error: Option<String>,
        mode: TradingMode,
    },
}

impl ExecutionOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self, ExecutionOutcome::Blocked { .. })
    }
}

/// One async mutex per strategy id
#[derive(Default)]
struct StrategyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl StrategyLocks {
    async fn lock_for(&self, strategy_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(strategy_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[derive(Serialize)]
struct ProposalDetails<'a> {
    market: &'a str,
    side: &'a str,
    notional: Decimal,
    pnl: Decimal,
    market_slug: Option<&'a str>,
}

impl<'a> From<&'a ProposedTrade> for ProposalDetails<'a> {
    fn from(p: &'a ProposedTrade) -> Self {
        Self {
            market: &p.market,
            side: p.side.as_str(),
            notional: p.notional,
            pnl: p.pnl,
            market_slug: p.market_slug.as_deref(),
        }
    }
}

/// Execution Orchestrator
#[derive(Clone)]
pub struct Executor {
    pool: SqlitePool,
    broker: Arc<dyn BrokerClient>,
    resolver: Arc<dyn MarketResolver>,
    locks: Option<Arc<StrategyLocks>>,
}

impl Executor {
    pub fn new(
        pool: SqlitePool,
        broker: Arc<dyn BrokerClient>,
        resolver: Arc<dyn MarketResolver>,
    ) -> Self {
        Self {
            pool,
            broker,
            resolver,
            locks: None,
        }
    }

    /// Serialize `execute` per strategy so evaluate-then-write cannot interleave
    /// with another execution for the same strategy in this process
    pub fn with_serialization(mut self) -> Self {
        self.locks = Some(Arc::new(StrategyLocks::default()));
        self
    }

    pub fn is_serialized(&self) -> bool {
        self.locks.is_some()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn broker(&self) -> &Arc<dyn BrokerClient> {
        &self.broker
    }

    pub fn resolver(&self) -> &Arc<dyn MarketResolver> {
        &self.resolver
    }

    pub async fn execute(
        &self,
        strategy: &Strategy,
        proposed: &ProposedTrade,
    ) -> EngineResult<ExecutionOutcome> {
        let _guard = match &self.locks {
            Some(locks) => Some(locks.lock_for(&strategy.id).await.lock_owned().await),
            None => None,
        };

        let mode = strategy.trading_mode;
        let mut order_id = None;
        let mut failure = None;

        if mode == TradingMode::Live {
            let decision = safeguards::evaluate(
                &self.pool,
                &strategy.id,
                proposed.notional,
                proposed.pnl,
                &strategy.risk_limits(),
                Utc::now(),
            )
            .await?;

            if let SafeguardDecision::Rejected { check, reason } = decision {
                warn!(strategy_id = %strategy.id, market = %proposed.market, %reason, "Safeguard blocked trade");
                self.log(
                    strategy,
                    proposed,
                    LogEvent::SafetyBlock,
                    details(&ProposalDetails::from(proposed)),
                    Some(reason.clone()),
                    None,
                )
                .await?;
                return Ok(ExecutionOutcome::Blocked { check, reason });
            }

            match self.place_live(strategy, proposed).await? {
                Ok(id) => order_id = Some(id),
                Err(message) => failure = Some(message),
            }
        }

        let status = if failure.is_some() {
            TradeStatus::Failed
        } else {
            TradeStatus::Filled
        };
        let pnl = match status {
            TradeStatus::Failed => Decimal::ZERO,
            TradeStatus::Filled => proposed.pnl,
        };

        let trade_id = TradeRepository::new(&self.pool)
            .insert(&NewTrade {
                strategy_id: strategy.id.clone(),
                market: proposed.market.clone(),
                side: proposed.side.as_str().to_string(),
                notional: proposed.notional.to_string(),
                pnl: pnl.to_string(),
                market_id: proposed.market_id.clone(),
                market_slug: proposed.market_slug.clone(),
                closes_at: proposed.closes_at.clone(),
                is_resolved: proposed.is_resolved,
                status: status.as_str().to_string(),
                error: failure.clone(),
                trading_mode: mode.as_str().to_string(),
                order_id: order_id.clone(),
                executed_at: format_timestamp(Utc::now()),
            })
            .await?;

        let (event, result) = match (&failure, mode) {
            (Some(message), _) => (LogEvent::LiveExec, format!("failed: {message}")),
            (None, TradingMode::Live) => (LogEvent::LiveExec, "recorded".to_string()),
            (None, TradingMode::Paper) => (LogEvent::PaperExec, "recorded".to_string()),
        };
        self.log(
            strategy,
            proposed,
            event,
            details(&ProposalDetails::from(proposed)),
            Some(result),
            failure.clone(),
        )
        .await?;

        info!(
            strategy_id = %strategy.id,
            trade_id,
            mode = %mode,
            status = status.as_str(),
            notional = %proposed.notional,
            "Trade recorded"
        );

        Ok(ExecutionOutcome::Recorded {
            trade_id,
            status,
            error: failure,
            mode,
        })
    }

    /// Resolve, pre-flight log, place. The inner `Err` is a recorded failure
    /// message; the outer `Err` is a storage failure.
    async fn place_live(
        &self,
        strategy: &Strategy,
        proposed: &ProposedTrade,
    ) -> EngineResult<Result<String, String>> {
        let resolved = match proposed.market_slug.as_deref() {
            Some(slug) => self.resolver.resolve(slug).await,
            None => Ok(None),
        };

        let market = match resolved {
            Ok(Some(market)) => market,
            Ok(None) => {
                self.log(
                    strategy,
                    proposed,
                    LogEvent::SafetyBlock,
                    details(&ProposalDetails::from(proposed)),
                    Some(NO_TRADABLE_IDENTIFIER.into()),
                    None,
                )
                .await?;
                return Ok(Err(NO_TRADABLE_IDENTIFIER.into()));
            }
            Err(e) => {
                let message = format!("{NO_TRADABLE_IDENTIFIER}: {e}");
                warn!(strategy_id = %strategy.id, error = %e, "Market resolution failed");
                self.log(
                    strategy,
                    proposed,
                    LogEvent::SafetyBlock,
                    details(&ProposalDetails::from(proposed)),
                    Some(NO_TRADABLE_IDENTIFIER.into()),
                    Some(e.to_string()),
                )
                .await?;
                return Ok(Err(message));
            }
        };

        let price = match proposed.price {
            Some(p) if p >= dec!(0.01) && p <= dec!(0.99) => p,
            other => {
                let message = match other {
                    Some(p) => format!("Limit price {} outside 0.01..0.99", p.normalize()),
                    None => "Missing limit price".to_string(),
                };
                self.log(
                    strategy,
                    proposed,
                    LogEvent::LiveError,
                    details(&ProposalDetails::from(proposed)),
                    None,
                    Some(message.clone()),
                )
                .await?;
                return Ok(Err(message));
            }
        };

        let order = build_order(&market, proposed, price);
        self.log(
            strategy,
            proposed,
            LogEvent::LiveRequest,
            details(&order),
            None,
            None,
        )
        .await?;

        match self.broker.place_order(&order).await {
            Ok(receipt) => {
                self.log_order_response(strategy, proposed, &order, "success", None)
                    .await?;
                Ok(Ok(receipt.order_id))
            }
            Err(e) => {
                let message = e.to_string();
                error!(strategy_id = %strategy.id, error = %message, "Broker order failed");
                self.log_order_response(strategy, proposed, &order, "failed", Some(message.clone()))
                    .await?;
                Ok(Err(message))
            }
        }
    }

    async fn log_order_response(
        &self,
        strategy: &Strategy,
        proposed: &ProposedTrade,
        order: &OrderRequest,
        result: &str,
        error: Option<String>,
    ) -> EngineResult<()> {
        self.log(
            strategy,
            proposed,
            LogEvent::LiveResponse,
            details(order),
            Some(result.to_string()),
            error,
        )
        .await
    }

    async fn log(
        &self,
        strategy: &Strategy,
        proposed: &ProposedTrade,
        event: LogEvent,
        order_details: Option<String>,
        result: Option<String>,
        error: Option<String>,
    ) -> EngineResult<()> {
        TradeLogRepository::new(&self.pool)
            .insert(&NewTradeLog {
                strategy_id: Some(strategy.id.clone()),
                event: event.as_str().to_string(),
                mode: strategy.trading_mode.as_str().to_string(),
                market_id: proposed
                    .market_id
                    .clone()
                    .or_else(|| proposed.market_slug.clone()),
                order_details,
                result,
                error,
                created_at: format_timestamp(Utc::now()),
            })
            .await?;
        Ok(())
    }
}

fn details<T: Serialize>(value: &T) -> Option<String> {
    serde_json::to_string(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        insert_strategy, insert_trade_at, live_strategy, paper_strategy, FakeBroker,
        FakeResolver,
    };
    use crate::types::MarketSide;
    use persistence::repository::TradeLogRecord;
    use persistence::Database;

    fn executor(db: &Database, broker: FakeBroker, resolver: FakeResolver) -> Executor {
        Executor::new(db.pool_clone(), Arc::new(broker), Arc::new(resolver))
    }

    fn live_proposal(notional: Decimal) -> ProposedTrade {
        let mut p = ProposedTrade::new("BTC above 100k", MarketSide::Yes, notional);
        p.market_slug = Some("btc-100k".into());
        p.price = Some(dec!(0.40));
        p
    }

    async fn events(db: &Database, strategy_id: &str) -> Vec<String> {
        let mut logs: Vec<TradeLogRecord> = TradeLogRepository::new(db.pool())
            .recent(Some(strategy_id), 100)
            .await
            .unwrap();
        logs.reverse();
        logs.into_iter().map(|l| l.event).collect()
    }

    async fn trade_count(db: &Database, strategy_id: &str) -> i64 {
        TradeRepository::new(db.pool())
            .count_since(strategy_id, "1970-01-01T00:00:00.000Z")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_paper_trade_records_fill_without_broker() {
        let db = Database::in_memory().await.unwrap();
        let strategy = paper_strategy("s1", "Bond Ladder");
        insert_strategy(db.pool(), &strategy).await;
        let broker = Arc::new(FakeBroker::healthy());
        let exec = Executor::new(db.pool_clone(), broker.clone(), Arc::new(FakeResolver::default()));

        let mut proposed = ProposedTrade::new("X", MarketSide::Yes, dec!(50));
        proposed.pnl = dec!(5);
        let outcome = exec.execute(&strategy, &proposed).await.unwrap();

        match outcome {
            ExecutionOutcome::Recorded { status, mode, error, .. } => {
                assert_eq!(status, TradeStatus::Filled);
                assert_eq!(mode, TradingMode::Paper);
                assert!(error.is_none());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(broker.order_count(), 0);
        assert_eq!(events(&db, "s1").await, vec!["paper_exec"]);

        let trades = TradeRepository::new(db.pool()).recent("s1", 10).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].pnl, "5");
        assert_eq!(trades[0].trading_mode, "paper");
    }

    #[tokio::test]
    async fn test_paper_mode_skips_safeguards() {
        let db = Database::in_memory().await.unwrap();
        let strategy = paper_strategy("s1", "Bond Ladder");
        insert_strategy(db.pool(), &strategy).await;
        let exec = executor(&db, FakeBroker::healthy(), FakeResolver::default());

        let outcome = exec
            .execute(&strategy, &ProposedTrade::new("X", MarketSide::No, dec!(900)))
            .await
            .unwrap();
        assert!(!outcome.is_blocked());
    }

    #[tokio::test]
    async fn test_live_block_writes_log_but_no_trade() {
        let db = Database::in_memory().await.unwrap();
        let strategy = live_strategy("s1", "Bond Ladder");
        insert_strategy(db.pool(), &strategy).await;
        let exec = executor(&db, FakeBroker::healthy(), FakeResolver::with_market("btc-100k"));

        let outcome = exec.execute(&strategy, &live_proposal(dec!(600))).await.unwrap();
        match outcome {
            ExecutionOutcome::Blocked { check, reason } => {
                assert_eq!(check, SafeguardCheck::PositionSize);
                assert!(reason.contains("exceeds"));
            }
            other => panic!("expected block, got {other:?}"),
        }
        assert_eq!(trade_count(&db, "s1").await, 0);
        assert_eq!(events(&db, "s1").await, vec!["safety_block"]);
    }

    #[tokio::test]
    async fn test_live_fill_logs_request_and_response() {
        let db = Database::in_memory().await.unwrap();
        let strategy = live_strategy("s1", "Bond Ladder");
        insert_strategy(db.pool(), &strategy).await;
        let broker = Arc::new(FakeBroker::healthy());
        let exec = Executor::new(
            db.pool_clone(),
            broker.clone(),
            Arc::new(FakeResolver::with_market("btc-100k")),
        );

        let outcome = exec.execute(&strategy, &live_proposal(dec!(20))).await.unwrap();
        assert!(matches!(
            outcome,
            ExecutionOutcome::Recorded { status: TradeStatus::Filled, mode: TradingMode::Live, .. }
        ));
        assert_eq!(broker.order_count(), 1);
        assert_eq!(broker.orders.lock().unwrap()[0].token_id, "btc-100k-yes");
        assert_eq!(
            events(&db, "s1").await,
            vec!["live_request", "live_response", "live_exec"]
        );

        let trades = TradeRepository::new(db.pool()).recent("s1", 10).await.unwrap();
        assert_eq!(trades[0].order_id.as_deref(), Some("0xorder1"));
    }

    #[tokio::test]
    async fn test_broker_failure_records_failed_trade() {
        let db = Database::in_memory().await.unwrap();
        let strategy = live_strategy("s1", "Bond Ladder");
        insert_strategy(db.pool(), &strategy).await;
        let exec = executor(
            &db,
            FakeBroker::rejecting("insufficient balance"),
            FakeResolver::with_market("btc-100k"),
        );

        let mut proposed = live_proposal(dec!(20));
        proposed.pnl = dec!(3);
        let outcome = exec.execute(&strategy, &proposed).await.unwrap();

        match outcome {
            ExecutionOutcome::Recorded { status, error, .. } => {
                assert_eq!(status, TradeStatus::Failed);
                assert!(error.unwrap().contains("insufficient balance"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let trades = TradeRepository::new(db.pool()).recent("s1", 10).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].status, "failed");
        assert_eq!(trades[0].pnl, "0");
        assert!(trades[0].error.is_some());

        let logs = TradeLogRepository::new(db.pool()).recent(Some("s1"), 10).await.unwrap();
        let last = &logs[0];
        assert_eq!(last.event, "live_exec");
        assert!(last.result.as_deref().unwrap().starts_with("failed: "));
        let response = logs.iter().find(|l| l.event == "live_response").unwrap();
        assert_eq!(response.result.as_deref(), Some("failed"));
    }

    #[tokio::test]
    async fn test_unresolved_market_records_failed_trade() {
        let db = Database::in_memory().await.unwrap();
        let strategy = live_strategy("s1", "Bond Ladder");
        insert_strategy(db.pool(), &strategy).await;
        let broker = Arc::new(FakeBroker::healthy());
        let exec = Executor::new(db.pool_clone(), broker.clone(), Arc::new(FakeResolver::default()));

        let outcome = exec.execute(&strategy, &live_proposal(dec!(20))).await.unwrap();
        match outcome {
            ExecutionOutcome::Recorded { status, error, .. } => {
                assert_eq!(status, TradeStatus::Failed);
                assert_eq!(error.as_deref(), Some(NO_TRADABLE_IDENTIFIER));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(broker.order_count(), 0);
        assert_eq!(events(&db, "s1").await, vec!["safety_block", "live_exec"]);
        assert_eq!(trade_count(&db, "s1").await, 1);
    }

    #[tokio::test]
    async fn test_resolver_error_records_failed_trade() {
        let db = Database::in_memory().await.unwrap();
        let strategy = live_strategy("s1", "Bond Ladder");
        insert_strategy(db.pool(), &strategy).await;
        let broker = Arc::new(FakeBroker::healthy());
        let resolver = FakeResolver {
            fail_with: Some("gamma timeout".into()),
            ..FakeResolver::with_market("btc-100k")
        };
        let exec = Executor::new(db.pool_clone(), broker.clone(), Arc::new(resolver));

        let mut proposed = live_proposal(dec!(20));
        proposed.pnl = dec!(7);
        let outcome = exec.execute(&strategy, &proposed).await.unwrap();
        assert!(matches!(
            outcome,
            ExecutionOutcome::Recorded { status: TradeStatus::Failed, .. }
        ));
        assert_eq!(broker.order_count(), 0);
        assert_eq!(events(&db, "s1").await, vec!["safety_block", "live_exec"]);

        let trades = TradeRepository::new(db.pool()).recent("s1", 10).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].status, "failed");
        assert_eq!(trades[0].pnl, "0");
        let error = trades[0].error.as_deref().unwrap();
        assert!(error.starts_with("No tradable identifier: "));
        assert!(error.contains("gamma timeout"));
    }

    #[tokio::test]
    async fn test_missing_price_is_a_live_error() {
        let db = Database::in_memory().await.unwrap();
        let strategy = live_strategy("s1", "Bond Ladder");
        insert_strategy(db.pool(), &strategy).await;
        let exec = executor(&db, FakeBroker::healthy(), FakeResolver::with_market("btc-100k"));

        let mut proposed = live_proposal(dec!(20));
        proposed.price = None;
        let outcome = exec.execute(&strategy, &proposed).await.unwrap();
        assert!(matches!(
            outcome,
            ExecutionOutcome::Recorded { status: TradeStatus::Failed, .. }
        ));
        assert_eq!(events(&db, "s1").await, vec!["live_error", "live_exec"]);
    }

    #[tokio::test]
    async fn test_failed_rows_always_carry_zero_pnl_and_error() {
        let db = Database::in_memory().await.unwrap();
        let strategy = live_strategy("s1", "Bond Ladder");
        insert_strategy(db.pool(), &strategy).await;
        let exec = executor(
            &db,
            FakeBroker::rejecting("boom"),
            FakeResolver::with_market("btc-100k"),
        );

        for pnl in [dec!(-4), dec!(0), dec!(12.5)] {
            let mut proposed = live_proposal(dec!(10));
            proposed.pnl = pnl;
            exec.execute(&strategy, &proposed).await.unwrap();
        }

        let trades = TradeRepository::new(db.pool()).recent("s1", 10).await.unwrap();
        assert_eq!(trades.len(), 3);
        for t in trades.iter().filter(|t| t.status == "failed") {
            assert_eq!(t.pnl, "0");
            assert!(t.error.is_some());
        }
    }

    #[tokio::test]
    async fn test_rate_limit_applies_in_live_mode() {
        let db = Database::in_memory().await.unwrap();
        let strategy = live_strategy("s1", "Bond Ladder");
        insert_strategy(db.pool(), &strategy).await;
        for _ in 0..5 {
            insert_trade_at(db.pool(), "s1", dec!(10), dec!(0), Utc::now()).await;
        }
        let exec = executor(&db, FakeBroker::healthy(), FakeResolver::with_market("btc-100k"));

        let outcome = exec.execute(&strategy, &live_proposal(dec!(10))).await.unwrap();
        assert!(matches!(
            outcome,
            ExecutionOutcome::Blocked { check: SafeguardCheck::RateLimit, .. }
        ));
    }

    #[tokio::test]
    async fn test_serialized_executor_admits_up_to_rate_limit() {
        let db = Database::in_memory().await.unwrap();
        let mut strategy = live_strategy("s1", "Bond Ladder");
        strategy.max_orders_per_minute = 3;
        insert_strategy(db.pool(), &strategy).await;
        let exec = executor(&db, FakeBroker::healthy(), FakeResolver::with_market("btc-100k"))
            .with_serialization();
        assert!(exec.is_serialized());

        let mut handles = Vec::new();
        for _ in 0..6 {
            let exec = exec.clone();
            let strategy = strategy.clone();
            handles.push(tokio::spawn(async move {
                exec.execute(&strategy, &live_proposal(dec!(10))).await.unwrap()
            }));
        }

        let mut blocked = 0;
        for handle in handles {
            if handle.await.unwrap().is_blocked() {
                blocked += 1;
            }
        }
        assert_eq!(blocked, 3);
        assert_eq!(trade_count(&db, "s1").await, 3);
    }
}

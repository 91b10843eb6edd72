//! Test fixtures: strategy builders, ledger seeding and in-memory broker fakes

use crate::broker::{
    BrokerClient, BrokerError, MarketResolver, MarketStatus, OrderReceipt, OrderRequest,
    TradableMarket,
};
use crate::types::{Strategy, StrategyKind, TradingMode};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use persistence::format_timestamp;
use persistence::repository::{NewTrade, StrategyRepository, TradeRepository};
use persistence::SqlitePool;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Mutex;

pub fn paper_strategy(id: &str, name: &str) -> Strategy {
    let epoch = Utc::now() - Duration::days(1);
    Strategy {
        id: id.to_string(),
        name: name.to_string(),
        owner: None,
        kind: StrategyKind::infer_from_name(name),
        trading_mode: TradingMode::Paper,
        capital_allocation: None,
        paper_capital: Some(dec!(100)),
        paper_cash: dec!(100),
        paper_pnl: Decimal::ZERO,
        paper_positions: 0,
        max_position_size: dec!(500),
        max_orders_per_minute: 5,
        daily_loss_limit: dec!(-200),
        mirror_wallets: vec![],
        mode_switched_at: epoch,
        created_at: epoch,
    }
}

pub fn live_strategy(id: &str, name: &str) -> Strategy {
    Strategy {
        trading_mode: TradingMode::Live,
        capital_allocation: Some(dec!(250)),
        ..paper_strategy(id, name)
    }
}

pub async fn insert_strategy(pool: &SqlitePool, strategy: &Strategy) {
    StrategyRepository::new(pool)
        .insert(&strategy.to_record())
        .await
        .unwrap();
}

/// Append a filled paper trade at an explicit time
pub async fn insert_trade_at(
    pool: &SqlitePool,
    strategy_id: &str,
    notional: Decimal,
    pnl: Decimal,
    at: DateTime<Utc>,
) -> i64 {
    TradeRepository::new(pool)
        .insert(&NewTrade {
            strategy_id: strategy_id.to_string(),
            market: format!("Market {}", at.timestamp_millis()),
            side: "YES".into(),
            notional: notional.to_string(),
            pnl: pnl.to_string(),
            market_id: None,
            market_slug: None,
            closes_at: None,
            is_resolved: false,
            status: "filled".into(),
            error: None,
            trading_mode: "paper".into(),
            order_id: None,
            executed_at: format_timestamp(at),
        })
        .await
        .unwrap()
}

/// Broker that records every order and either fills or rejects it
#[derive(Default)]
pub struct FakeBroker {
    pub credentials: bool,
    pub reachable: bool,
    pub reject_with: Option<String>,
    pub orders: Mutex<Vec<OrderRequest>>,
}

impl FakeBroker {
    pub fn healthy() -> Self {
        Self {
            credentials: true,
            reachable: true,
            ..Default::default()
        }
    }

    pub fn rejecting(message: &str) -> Self {
        Self {
            reject_with: Some(message.to_string()),
            ..Self::healthy()
        }
    }

    pub fn order_count(&self) -> usize {
        self.orders.lock().unwrap().len()
    }
}

#[async_trait]
impl BrokerClient for FakeBroker {
    fn has_credentials(&self) -> bool {
        self.credentials
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        if self.reachable {
            Ok(())
        } else {
            Err(BrokerError::Unreachable("connection refused".into()))
        }
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderReceipt, BrokerError> {
        let mut orders = self.orders.lock().unwrap();
        orders.push(order.clone());
        match &self.reject_with {
            Some(message) => Err(BrokerError::Rejected(message.clone())),
            None => Ok(OrderReceipt {
                order_id: format!("0xorder{}", orders.len()),
                status: Some("matched".into()),
            }),
        }
    }
}

/// Resolver backed by a slug map
#[derive(Default)]
pub struct FakeResolver {
    pub markets: HashMap<String, TradableMarket>,
    pub statuses: HashMap<String, MarketStatus>,
    pub fail_with: Option<String>,
}

impl FakeResolver {
    pub fn with_market(slug: &str) -> Self {
        let mut resolver = Self::default();
        resolver.markets.insert(
            slug.to_string(),
            TradableMarket {
                yes_token_id: format!("{slug}-yes"),
                no_token_id: format!("{slug}-no"),
                tick_size: "0.01".into(),
                neg_risk: false,
            },
        );
        resolver
    }
}

#[async_trait]
impl MarketResolver for FakeResolver {
    async fn resolve(&self, slug: &str) -> Result<Option<TradableMarket>, BrokerError> {
        if let Some(message) = &self.fail_with {
            return Err(BrokerError::Unreachable(message.clone()));
        }
        Ok(self.markets.get(slug).cloned())
    }

    async fn market_status(&self, slug: &str) -> Result<Option<MarketStatus>, BrokerError> {
        if let Some(message) = &self.fail_with {
            return Err(BrokerError::Unreachable(message.clone()));
        }
        Ok(self.statuses.get(slug).cloned())
    }
}

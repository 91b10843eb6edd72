//! External service seams: order placement and market-identifier resolution
//!
//! The orchestrator only talks to these traits. HTTP implementations live in
//! `crate::api`; tests substitute in-memory fakes.

use crate::types::{MarketSide, ProposedTrade};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Broker credentials not configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Broker unreachable: {0}")]
    Unreachable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Limit order as accepted by the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub token_id: String,
    pub price: Decimal,
    /// Shares, not USD
    pub size: Decimal,
    pub side: OrderSide,
    pub tick_size: String,
    pub neg_risk: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    #[serde(alias = "orderID")]
    pub order_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Broker-tradable identifiers for a market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradableMarket {
    pub yes_token_id: String,
    pub no_token_id: String,
    pub tick_size: String,
    pub neg_risk: bool,
}

impl TradableMarket {
    pub fn token_for(&self, side: MarketSide) -> &str {
        match side {
            MarketSide::Yes => &self.yes_token_id,
            MarketSide::No => &self.no_token_id,
        }
    }
}

/// Close/resolution state of a market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStatus {
    pub closes_at: Option<String>,
    pub is_resolved: bool,
}

#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Whether wallet/API credentials are present; live mode is refused without them
    fn has_credentials(&self) -> bool;

    /// Cheap reachability probe
    async fn ping(&self) -> Result<(), BrokerError>;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderReceipt, BrokerError>;
}

#[async_trait]
pub trait MarketResolver: Send + Sync {
    /// `None` when the slug has no tradable identifiers
    async fn resolve(&self, slug: &str) -> Result<Option<TradableMarket>, BrokerError>;

    async fn market_status(&self, slug: &str) -> Result<Option<MarketStatus>, BrokerError>;
}

/// Build a BUY order for the proposed side: `size = notional / price` shares
pub fn build_order(market: &TradableMarket, proposed: &ProposedTrade, price: Decimal) -> OrderRequest {
    OrderRequest {
        token_id: market.token_for(proposed.side).to_string(),
        price,
        size: (proposed.notional / price).round_dp(2),
        side: OrderSide::Buy,
        tick_size: market.tick_size.clone(),
        neg_risk: market.neg_risk,
    }
}

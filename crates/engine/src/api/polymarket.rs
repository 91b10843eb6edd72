//! Polymarket Gamma API client: public market metadata, no authentication required
//!
//! Resolves a market slug into CLOB token ids, tick size and neg-risk flag,
//! and reports close/resolution state for the resolve refresher.

use crate::broker::{BrokerError, MarketResolver, MarketStatus, TradableMarket};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_GAMMA_URL: &str = "https://gamma-api.polymarket.com";

/// Polymarket Gamma API client
#[derive(Clone)]
pub struct GammaClient {
    client: Client,
    base_url: String,
}

// ---------------------------------------------------------------------------
// Deserialization structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaMarket {
    pub slug: Option<String>,
    pub question: Option<String>,
    /// JSON-encoded array `["<yes token>", "<no token>"]`
    pub clob_token_ids: Option<String>,
    pub order_price_min_tick_size: Option<f64>,
    pub neg_risk: Option<bool>,
    pub end_date: Option<String>,
    pub closed: Option<bool>,
}

impl GammaMarket {
    /// Tradable identifiers, if the market lists both outcome tokens
    pub fn tradable(&self) -> Option<TradableMarket> {
        let raw = self.clob_token_ids.as_deref()?;
        let tokens: Vec<String> = serde_json::from_str(raw).ok()?;
        let [yes, no] = <[String; 2]>::try_from(tokens).ok()?;
        if yes.is_empty() || no.is_empty() {
            return None;
        }

        Some(TradableMarket {
            yes_token_id: yes,
            no_token_id: no,
            tick_size: self
                .order_price_min_tick_size
                .map(|t| t.to_string())
                .unwrap_or_else(|| "0.01".to_string()),
            neg_risk: self.neg_risk.unwrap_or(false),
        })
    }

    pub fn status(&self) -> MarketStatus {
        MarketStatus {
            closes_at: self.end_date.clone(),
            is_resolved: self.closed.unwrap_or(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Client implementation
// ---------------------------------------------------------------------------

impl GammaClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, BrokerError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// GET /markets?slug={slug}: first matching market
    pub async fn get_market(&self, slug: &str) -> Result<Option<GammaMarket>, BrokerError> {
        let url = format!("{}/markets", self.base_url);
        debug!(slug, "Fetching Gamma market");

        let resp = self.client.get(&url).query(&[("slug", slug)]).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(BrokerError::Unreachable(format!(
                "Gamma markets error {}: {}",
                status, body
            )));
        }

        let markets: Vec<GammaMarket> = resp.json().await?;
        Ok(markets.into_iter().next())
    }
}

#[async_trait]
impl MarketResolver for GammaClient {
    async fn resolve(&self, slug: &str) -> Result<Option<TradableMarket>, BrokerError> {
        Ok(self.get_market(slug).await?.and_then(|m| m.tradable()))
    }

    async fn market_status(&self, slug: &str) -> Result<Option<MarketStatus>, BrokerError> {
        Ok(self.get_market(slug).await?.map(|m| m.status()))
    }
}

//! Signal sources and dispatch into the Execution Orchestrator
//!
//! A `SignalSource` turns an external feed into proposed trades. `dispatch`
//! drops proposals the strategy has already traded (same market and side),
//! executes the rest and announces each recorded trade as an event.

use crate::error::EngineResult;
use crate::executor::{ExecutionOutcome, Executor};
use crate::types::{dedupe_key, MarketSide, ProposedTrade, Strategy};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use persistence::format_timestamp;
use persistence::repository::{EventRepository, NewEvent, TradeRepository};
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, warn};

/// How many of the strategy's latest trades are checked for duplicates
const DEDUPE_WINDOW: i64 = 100;

/// Whale trades on markets closing later than this are ignored
const MAX_RESOLUTION_DAYS: i64 = 3;

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed error: {0}")]
    Feed(String),
}

#[async_trait]
pub trait SignalSource: Send + Sync {
    fn name(&self) -> &str;

    async fn poll(&self) -> Result<Vec<ProposedTrade>, SignalError>;
}

// ---------------------------------------------------------------------------
// Whale feed
// ---------------------------------------------------------------------------

/// One row of the whale-activity feed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhaleActivity {
    #[serde(default)]
    pub wallet: Option<String>,
    #[serde(default)]
    pub market_title: Option<String>,
    #[serde(default)]
    pub market_category: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub market_id: Option<String>,
    #[serde(default)]
    pub market_slug: Option<String>,
    #[serde(default)]
    pub closes_at: Option<String>,
    #[serde(default)]
    pub is_resolved: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct WhaleFeedResponse {
    #[serde(default)]
    data: Vec<WhaleActivity>,
}

/// USD size for a whale trade of the given tier
pub fn size_from_tier(tier: Option<&str>) -> Decimal {
    match tier {
        Some("mega") => dec!(30),
        Some("large") => dec!(20),
        Some("medium") => dec!(15),
        _ => dec!(10),
    }
}

/// Outcome text containing "no" mirrors as NO, everything else as YES
pub fn side_from_outcome(outcome: Option<&str>) -> MarketSide {
    match outcome {
        Some(o) if o.to_lowercase().contains("no") => MarketSide::No,
        _ => MarketSide::Yes,
    }
}

/// Which whale rows become proposals
#[derive(Debug, Clone)]
pub struct MirrorFilter {
    /// Lower-cased wallet addresses
    pub watchlist: HashSet<String>,
    /// Matched case-insensitively; rows without a category pass
    pub category: Option<String>,
    pub max_resolution: Duration,
}

impl MirrorFilter {
    pub fn new<I, S>(watchlist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            watchlist: watchlist
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
            category: Some("crypto".to_string()),
            max_resolution: Duration::days(MAX_RESOLUTION_DAYS),
        }
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    pub fn proposal(&self, row: &WhaleActivity, now: DateTime<Utc>) -> Option<ProposedTrade> {
        let wallet = row.wallet.as_deref()?.to_lowercase();
        if !self.watchlist.contains(&wallet) {
            return None;
        }

        if let (Some(wanted), Some(category)) = (&self.category, &row.market_category) {
            if !category.eq_ignore_ascii_case(wanted) {
                return None;
            }
        }

        let closes_at = DateTime::parse_from_rfc3339(row.closes_at.as_deref()?).ok()?;
        if closes_at.with_timezone(&Utc) - now > self.max_resolution {
            return None;
        }

        let market = row.market_title.clone()?;
        let side = side_from_outcome(row.outcome.as_deref());
        let mut proposed = ProposedTrade::new(market, side, size_from_tier(row.tier.as_deref()));
        proposed.price = row.price;
        proposed.market_id = row.market_id.clone();
        proposed.market_slug = row.market_slug.clone();
        proposed.closes_at = row.closes_at.clone();
        proposed.is_resolved = row.is_resolved.unwrap_or(false);
        Some(proposed)
    }

    pub fn proposals(&self, rows: &[WhaleActivity], now: DateTime<Utc>) -> Vec<ProposedTrade> {
        rows.iter().filter_map(|r| self.proposal(r, now)).collect()
    }
}

/// Whale-activity feed client
#[derive(Clone)]
pub struct WhaleFeedClient {
    client: Client,
    base_url: String,
}

impl WhaleFeedClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SignalError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()?,
            base_url: base_url.into(),
        })
    }

    /// GET ?action=whales&limit={limit}
    pub async fn fetch(&self, limit: u32) -> Result<Vec<WhaleActivity>, SignalError> {
        let limit = limit.to_string();
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("action", "whales"), ("limit", limit.as_str())])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SignalError::Feed(format!("whale feed error {}: {}", status, body)));
        }

        let feed: WhaleFeedResponse = resp.json().await?;
        debug!(count = feed.data.len(), "Whale activity fetched");
        Ok(feed.data)
    }
}

/// Whale mirror: the feed filtered through a `MirrorFilter`
pub struct WhaleFeedSource {
    client: WhaleFeedClient,
    filter: MirrorFilter,
}

impl WhaleFeedSource {
    pub fn new(client: WhaleFeedClient, filter: MirrorFilter) -> Self {
        Self { client, filter }
    }
}

#[async_trait]
impl SignalSource for WhaleFeedSource {
    fn name(&self) -> &str {
        "whale_mirror"
    }

    async fn poll(&self) -> Result<Vec<ProposedTrade>, SignalError> {
        let rows = self.client.fetch(50).await?;
        Ok(self.filter.proposals(&rows, Utc::now()))
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub proposed: usize,
    pub duplicates: usize,
    pub blocked: usize,
    pub recorded: usize,
    pub results: Vec<String>,
}

/// De-duplicate `proposals` and execute the survivors for `strategy`
pub async fn dispatch(
    executor: &Executor,
    strategy: &Strategy,
    source: &str,
    proposals: Vec<ProposedTrade>,
) -> EngineResult<DispatchReport> {
    let pool = executor.pool();
    let mut seen: HashSet<String> = TradeRepository::new(pool)
        .recent(&strategy.id, DEDUPE_WINDOW)
        .await?
        .iter()
        .map(|t| dedupe_key(&t.market, &t.side))
        .collect();

    let mut report = DispatchReport {
        proposed: proposals.len(),
        ..Default::default()
    };

    for proposed in proposals {
        if !seen.insert(proposed.dedupe_key()) {
            report.duplicates += 1;
            continue;
        }

        match executor.execute(strategy, &proposed).await? {
            ExecutionOutcome::Blocked { reason, .. } => {
                warn!(strategy_id = %strategy.id, market = %proposed.market, %reason, "Signal blocked");
                report.blocked += 1;
            }
            ExecutionOutcome::Recorded { .. } => {
                let price = proposed
                    .price
                    .map(|p| p.normalize().to_string())
                    .unwrap_or_else(|| "-".to_string());
                EventRepository::new(pool)
                    .insert(&NewEvent {
                        agent_id: None,
                        event_type: "copy_trade_signal".into(),
                        severity: "info".into(),
                        message: Some(format!(
                            "{}: {} {} @ {} (${})",
                            source,
                            proposed.side,
                            proposed.market,
                            price,
                            proposed.notional.normalize()
                        )),
                        created_at: format_timestamp(Utc::now()),
                    })
                    .await?;
                report.recorded += 1;
                report
                    .results
                    .push(format!("{} {}", proposed.market, proposed.side));
            }
        }
    }

    info!(
        strategy_id = %strategy.id,
        source,
        proposed = report.proposed,
        recorded = report.recorded,
        duplicates = report.duplicates,
        "Signals dispatched"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{insert_strategy, paper_strategy, FakeBroker, FakeResolver};
    use persistence::Database;
    use std::sync::Arc;

    const WHALE: &str = "0x6a72f61820b26b1fe4d956e17b6dc2a1ea3033ee";

    fn row(now: DateTime<Utc>) -> WhaleActivity {
        WhaleActivity {
            wallet: Some(WHALE.to_uppercase().replacen("0X", "0x", 1)),
            market_title: Some("BTC above 100k on Friday".into()),
            market_category: Some("Crypto".into()),
            outcome: Some("Yes".into()),
            tier: Some("large".into()),
            price: Some(dec!(0.42)),
            market_id: Some("m-1".into()),
            market_slug: Some("btc-100k-friday".into()),
            closes_at: Some((now + Duration::days(1)).to_rfc3339()),
            is_resolved: None,
        }
    }

    #[test]
    fn test_tier_sizes_and_side() {
        assert_eq!(size_from_tier(Some("mega")), dec!(30));
        assert_eq!(size_from_tier(Some("medium")), dec!(15));
        assert_eq!(size_from_tier(None), dec!(10));
        assert_eq!(side_from_outcome(Some("No")), MarketSide::No);
        assert_eq!(side_from_outcome(Some("Yes")), MarketSide::Yes);
        assert_eq!(side_from_outcome(None), MarketSide::Yes);
    }

    #[test]
    fn test_mirror_filter() {
        let now = Utc::now();
        let filter = MirrorFilter::new([WHALE]);

        let proposed = filter.proposal(&row(now), now).unwrap();
        assert_eq!(proposed.side, MarketSide::Yes);
        assert_eq!(proposed.notional, dec!(20));
        assert_eq!(proposed.price, Some(dec!(0.42)));

        let mut stranger = row(now);
        stranger.wallet = Some("0x0000000000000000000000000000000000000001".into());
        assert!(filter.proposal(&stranger, now).is_none());

        let mut politics = row(now);
        politics.market_category = Some("politics".into());
        assert!(filter.proposal(&politics, now).is_none());

        let mut far = row(now);
        far.closes_at = Some((now + Duration::days(4)).to_rfc3339());
        assert!(filter.proposal(&far, now).is_none());

        let mut undated = row(now);
        undated.closes_at = Some("soon".into());
        assert!(filter.proposal(&undated, now).is_none());
    }

    #[test]
    fn test_mirror_filter_category_override() {
        let now = Utc::now();
        let mut politics = row(now);
        politics.market_category = Some("Politics".into());

        let politics_only = MirrorFilter::new([WHALE]).with_category(Some("politics".into()));
        assert!(politics_only.proposal(&politics, now).is_some());
        assert!(politics_only.proposal(&row(now), now).is_none());

        let any = MirrorFilter::new([WHALE]).with_category(None);
        assert!(any.proposal(&politics, now).is_some());
        assert!(any.proposal(&row(now), now).is_some());
    }

    #[test]
    fn test_feed_payload_deserializes() {
        let raw = r#"{"data":[{"wallet":"0xabc","market_title":"ETH flips BTC","outcome":"No",
                      "tier":"mega","price":0.12,"closes_at":"2026-10-16T00:00:00Z"}]}"#;
        let feed: WhaleFeedResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(feed.data.len(), 1);
        assert_eq!(feed.data[0].price, Some(dec!(0.12)));
    }

    #[tokio::test]
    async fn test_dispatch_dedupes_against_ledger_and_batch() {
        let db = Database::in_memory().await.unwrap();
        let strategy = paper_strategy("s1", "Copy Trader");
        insert_strategy(db.pool(), &strategy).await;
        let executor = Executor::new(
            db.pool_clone(),
            Arc::new(FakeBroker::healthy()),
            Arc::new(FakeResolver::default()),
        );

        let a = ProposedTrade::new("A", MarketSide::Yes, dec!(10));
        let b = ProposedTrade::new("B", MarketSide::No, dec!(15));
        let first = dispatch(&executor, &strategy, "whale_mirror", vec![a.clone(), a.clone(), b])
            .await
            .unwrap();
        assert_eq!(first.recorded, 2);
        assert_eq!(first.duplicates, 1);

        // Same market, other side is a new signal
        let a_no = ProposedTrade::new("A", MarketSide::No, dec!(10));
        let second = dispatch(&executor, &strategy, "whale_mirror", vec![a, a_no])
            .await
            .unwrap();
        assert_eq!(second.recorded, 1);
        assert_eq!(second.duplicates, 1);

        let events = EventRepository::new(db.pool()).recent(10).await.unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.event_type == "copy_trade_signal"));
    }
}

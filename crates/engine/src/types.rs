//! Domain types shared by the execution path, the registry and the auditor

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use persistence::format_timestamp;
use persistence::repository::{StrategyRecord, StrategySettingsRecord, TradeRecord};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Portfolio base used when a strategy has neither capital allocation nor paper capital
pub const FALLBACK_CAPITAL: Decimal = dec!(1000);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    #[default]
    Paper,
    Live,
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingMode::Paper => "paper",
            TradingMode::Live => "live",
        }
    }

    /// Stored mode; anything unset or unrecognised trades on paper
    pub fn from_column(value: Option<&str>) -> Self {
        match value {
            Some("live") => TradingMode::Live,
            _ => TradingMode::Paper,
        }
    }
}

impl FromStr for TradingMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paper" => Ok(TradingMode::Paper),
            "live" => Ok(TradingMode::Live),
            _ => Err(EngineError::Validation(
                "mode must be 'paper' or 'live'".into(),
            )),
        }
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome side of a binary prediction market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketSide {
    #[serde(rename = "YES")]
    Yes,
    #[serde(rename = "NO")]
    No,
}

impl MarketSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketSide::Yes => "YES",
            MarketSide::No => "NO",
        }
    }
}

impl FromStr for MarketSide {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "YES" => Ok(MarketSide::Yes),
            "NO" => Ok(MarketSide::No),
            _ => Err(EngineError::Validation(format!(
                "side must be YES or NO, got {s:?}"
            ))),
        }
    }
}

impl fmt::Display for MarketSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the auditor tunes a strategy under drawdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Trades against AI/market divergence; tuned through the divergence threshold
    Contrarian,
    /// Certainty/liquidity driven; tuned through certainty and liquidity floors
    #[default]
    Standard,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Contrarian => "contrarian",
            StrategyKind::Standard => "standard",
        }
    }

    pub fn from_column(value: &str) -> Self {
        match value {
            "contrarian" => StrategyKind::Contrarian,
            _ => StrategyKind::Standard,
        }
    }

    /// Only used when a strategy is created without an explicit kind
    pub fn infer_from_name(name: &str) -> Self {
        if name.to_lowercase().contains("contrarian") {
            StrategyKind::Contrarian
        } else {
            StrategyKind::Standard
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Filled,
    Failed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Filled => "filled",
            TradeStatus::Failed => "failed",
        }
    }
}

/// Audit trail event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEvent {
    SafetyBlock,
    LiveRequest,
    LiveResponse,
    LiveError,
    PaperExec,
    LiveExec,
    ModeChange,
    KillSwitch,
}

impl LogEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEvent::SafetyBlock => "safety_block",
            LogEvent::LiveRequest => "live_request",
            LogEvent::LiveResponse => "live_response",
            LogEvent::LiveError => "live_error",
            LogEvent::PaperExec => "paper_exec",
            LogEvent::LiveExec => "live_exec",
            LogEvent::ModeChange => "mode_change",
            LogEvent::KillSwitch => "kill_switch",
        }
    }
}

/// Per-strategy limits read by the safeguard evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_position_size: Decimal,
    pub max_orders_per_minute: i64,
    /// Negative USD floor for the day's cumulative pnl
    pub daily_loss_limit: Decimal,
}

/// A named trading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub name: String,
    pub owner: Option<String>,
    pub kind: StrategyKind,
    pub trading_mode: TradingMode,
    pub capital_allocation: Option<Decimal>,
    pub paper_capital: Option<Decimal>,
    pub paper_cash: Decimal,
    pub paper_pnl: Decimal,
    pub paper_positions: i64,
    pub max_position_size: Decimal,
    pub max_orders_per_minute: i64,
    pub daily_loss_limit: Decimal,
    pub mirror_wallets: Vec<String>,
    /// Start of the current mode epoch
    pub mode_switched_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Strategy {
    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            max_position_size: self.max_position_size,
            max_orders_per_minute: self.max_orders_per_minute,
            daily_loss_limit: self.daily_loss_limit,
        }
    }

    /// Starting capital for a portfolio running in `mode`
    pub fn baseline_for(&self, mode: TradingMode) -> Decimal {
        match mode {
            TradingMode::Live => self
                .capital_allocation
                .or(self.paper_capital)
                .unwrap_or(FALLBACK_CAPITAL),
            TradingMode::Paper => self
                .paper_capital
                .or(self.capital_allocation)
                .unwrap_or(FALLBACK_CAPITAL),
        }
    }

    pub fn to_record(&self) -> StrategyRecord {
        StrategyRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            owner: self.owner.clone(),
            kind: self.kind.as_str().to_string(),
            trading_mode: Some(self.trading_mode.as_str().to_string()),
            capital_allocation: self.capital_allocation.map(|d| d.to_string()),
            paper_capital: self.paper_capital.map(|d| d.to_string()),
            paper_cash: self.paper_cash.to_string(),
            paper_pnl: self.paper_pnl.to_string(),
            paper_positions: self.paper_positions,
            max_position_size: self.max_position_size.to_string(),
            max_orders_per_minute: self.max_orders_per_minute,
            daily_loss_limit: self.daily_loss_limit.to_string(),
            mirror_wallets: serde_json::to_string(&self.mirror_wallets)
                .unwrap_or_else(|_| "[]".to_string()),
            mode_switched_at: format_timestamp(self.mode_switched_at),
            created_at: format_timestamp(self.created_at),
        }
    }
}

impl TryFrom<StrategyRecord> for Strategy {
    type Error = EngineError;

    fn try_from(r: StrategyRecord) -> EngineResult<Self> {
        let mirror_wallets: Vec<String> =
            serde_json::from_str(&r.mirror_wallets).map_err(|_| EngineError::InvalidRecord {
                field: "mirror_wallets",
                value: r.mirror_wallets.clone(),
            })?;

        Ok(Self {
            kind: StrategyKind::from_column(&r.kind),
            trading_mode: TradingMode::from_column(r.trading_mode.as_deref()),
            capital_allocation: parse_optional_decimal("capital_allocation", r.capital_allocation)?,
            paper_capital: parse_optional_decimal("paper_capital", r.paper_capital)?,
            paper_cash: parse_decimal("paper_cash", &r.paper_cash)?,
            paper_pnl: parse_decimal("paper_pnl", &r.paper_pnl)?,
            paper_positions: r.paper_positions,
            max_position_size: parse_decimal("max_position_size", &r.max_position_size)?,
            max_orders_per_minute: r.max_orders_per_minute,
            daily_loss_limit: parse_decimal("daily_loss_limit", &r.daily_loss_limit)?,
            mirror_wallets,
            mode_switched_at: parse_timestamp("mode_switched_at", &r.mode_switched_at)?,
            created_at: parse_timestamp("created_at", &r.created_at)?,
            id: r.id,
            name: r.name,
            owner: r.owner,
        })
    }
}

/// Tunable trading thresholds, one-to-one with a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySettings {
    pub strategy_id: String,
    pub max_trade_notional: Decimal,
    pub max_trades_per_hour: i64,
    pub max_daily_notional: Decimal,
    pub max_daily_loss: Decimal,
    pub divergence_threshold: Decimal,
    pub certainty_threshold: Decimal,
    pub liquidity_floor: Decimal,
    pub order_size_multiplier: Decimal,
    pub max_resolution_days: i64,
    pub last_tuned_at: Option<DateTime<Utc>>,
}

impl StrategySettings {
    pub fn defaults_for(strategy_id: &str) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            max_trade_notional: dec!(50),
            max_trades_per_hour: 5,
            max_daily_notional: dec!(200),
            max_daily_loss: dec!(-100),
            divergence_threshold: dec!(20),
            certainty_threshold: dec!(0.95),
            liquidity_floor: dec!(0.5),
            order_size_multiplier: dec!(1.0),
            max_resolution_days: 0,
            last_tuned_at: None,
        }
    }

    /// Columns left NULL fall back to the defaults
    pub fn from_record(r: StrategySettingsRecord) -> EngineResult<Self> {
        let d = Self::defaults_for(&r.strategy_id);
        Ok(Self {
            max_trade_notional: parse_optional_decimal("max_trade_notional", r.max_trade_notional)?
                .unwrap_or(d.max_trade_notional),
            max_trades_per_hour: r.max_trades_per_hour.unwrap_or(d.max_trades_per_hour),
            max_daily_notional: parse_optional_decimal("max_daily_notional", r.max_daily_notional)?
                .unwrap_or(d.max_daily_notional),
            max_daily_loss: parse_optional_decimal("max_daily_loss", r.max_daily_loss)?
                .unwrap_or(d.max_daily_loss),
            divergence_threshold: parse_optional_decimal(
                "divergence_threshold",
                r.divergence_threshold,
            )?
            .unwrap_or(d.divergence_threshold),
            certainty_threshold: parse_optional_decimal(
                "certainty_threshold",
                r.certainty_threshold,
            )?
            .unwrap_or(d.certainty_threshold),
            liquidity_floor: parse_optional_decimal("liquidity_floor", r.liquidity_floor)?
                .unwrap_or(d.liquidity_floor),
            order_size_multiplier: parse_optional_decimal(
                "order_size_multiplier",
                r.order_size_multiplier,
            )?
            .unwrap_or(d.order_size_multiplier),
            max_resolution_days: r.max_resolution_days.unwrap_or(d.max_resolution_days),
            last_tuned_at: r
                .last_tuned_at
                .as_deref()
                .map(|ts| parse_timestamp("last_tuned_at", ts))
                .transpose()?,
            strategy_id: r.strategy_id,
        })
    }

    pub fn to_record(&self) -> StrategySettingsRecord {
        StrategySettingsRecord {
            strategy_id: self.strategy_id.clone(),
            max_trade_notional: Some(self.max_trade_notional.to_string()),
            max_trades_per_hour: Some(self.max_trades_per_hour),
            max_daily_notional: Some(self.max_daily_notional.to_string()),
            max_daily_loss: Some(self.max_daily_loss.to_string()),
            divergence_threshold: Some(self.divergence_threshold.to_string()),
            certainty_threshold: Some(self.certainty_threshold.to_string()),
            liquidity_floor: Some(self.liquidity_floor.to_string()),
            order_size_multiplier: Some(self.order_size_multiplier.to_string()),
            max_resolution_days: Some(self.max_resolution_days),
            last_tuned_at: self.last_tuned_at.map(format_timestamp),
        }
    }
}

/// A candidate order from a signal source, not yet admitted or recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedTrade {
    pub market: String,
    pub side: MarketSide,
    /// USD size
    pub notional: Decimal,
    /// Realized or estimated pnl
    #[serde(default)]
    pub pnl: Decimal,
    /// Limit price for live orders (0.01..=0.99)
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub market_id: Option<String>,
    #[serde(default)]
    pub market_slug: Option<String>,
    #[serde(default)]
    pub closes_at: Option<String>,
    #[serde(default)]
    pub is_resolved: bool,
}

impl ProposedTrade {
    pub fn new(market: impl Into<String>, side: MarketSide, notional: Decimal) -> Self {
        Self {
            market: market.into(),
            side,
            notional,
            pnl: Decimal::ZERO,
            price: None,
            market_id: None,
            market_slug: None,
            closes_at: None,
            is_resolved: false,
        }
    }

    /// Key used to drop repeated proposals for the same market and side
    pub fn dedupe_key(&self) -> String {
        dedupe_key(&self.market, self.side.as_str())
    }
}

pub fn dedupe_key(market: &str, side: &str) -> String {
    format!("{}-{}", market, side)
}

/// A ledger row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub strategy_id: String,
    pub market: String,
    pub side: MarketSide,
    pub notional: Decimal,
    pub pnl: Decimal,
    pub market_id: Option<String>,
    pub market_slug: Option<String>,
    pub closes_at: Option<String>,
    pub is_resolved: bool,
    pub status: TradeStatus,
    pub error: Option<String>,
    pub trading_mode: TradingMode,
    pub order_id: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl TryFrom<TradeRecord> for Trade {
    type Error = EngineError;

    fn try_from(r: TradeRecord) -> EngineResult<Self> {
        let side = r.side.parse::<MarketSide>().map_err(|_| EngineError::InvalidRecord {
            field: "side",
            value: r.side.clone(),
        })?;
        let status = match r.status.as_str() {
            "filled" => TradeStatus::Filled,
            "failed" => TradeStatus::Failed,
            other => {
                return Err(EngineError::InvalidRecord {
                    field: "status",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            side,
            status,
            notional: parse_decimal("notional", &r.notional)?,
            pnl: parse_decimal("pnl", &r.pnl)?,
            trading_mode: TradingMode::from_column(Some(&r.trading_mode)),
            executed_at: parse_timestamp("executed_at", &r.executed_at)?,
            id: r.id,
            strategy_id: r.strategy_id,
            market: r.market,
            market_id: r.market_id,
            market_slug: r.market_slug,
            closes_at: r.closes_at,
            is_resolved: r.is_resolved,
            error: r.error,
            order_id: r.order_id,
        })
    }
}

pub(crate) fn parse_decimal(field: &'static str, value: &str) -> EngineResult<Decimal> {
    Decimal::from_str(value.trim()).map_err(|_| EngineError::InvalidRecord {
        field,
        value: value.to_string(),
    })
}

pub(crate) fn parse_optional_decimal(
    field: &'static str,
    value: Option<String>,
) -> EngineResult<Option<Decimal>> {
    value.as_deref().map(|v| parse_decimal(field, v)).transpose()
}

pub(crate) fn parse_timestamp(field: &'static str, value: &str) -> EngineResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| EngineError::InvalidRecord {
            field,
            value: value.to_string(),
        })
}

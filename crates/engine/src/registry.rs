//! Strategy Registry: creation, lookup and settings of strategies

use crate::error::{EngineError, EngineResult};
use crate::types::{Strategy, StrategyKind, StrategySettings, TradingMode};
use chrono::{DateTime, Utc};
use persistence::repository::{SettingsRepository, StrategyRepository};
use persistence::SqlitePool;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

/// Fields accepted when registering a strategy
#[derive(Debug, Clone, Deserialize)]
pub struct NewStrategy {
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub kind: Option<StrategyKind>,
    #[serde(default)]
    pub capital_allocation: Option<Decimal>,
    #[serde(default)]
    pub paper_capital: Option<Decimal>,
    pub max_position_size: Decimal,
    pub max_orders_per_minute: i64,
    pub daily_loss_limit: Decimal,
    #[serde(default)]
    pub mirror_wallets: Vec<String>,
}

/// Partial settings update; `None` keeps the stored value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub max_trade_notional: Option<Decimal>,
    pub max_trades_per_hour: Option<i64>,
    pub max_daily_notional: Option<Decimal>,
    pub max_daily_loss: Option<Decimal>,
    pub divergence_threshold: Option<Decimal>,
    pub certainty_threshold: Option<Decimal>,
    pub liquidity_floor: Option<Decimal>,
    pub order_size_multiplier: Option<Decimal>,
    pub max_resolution_days: Option<i64>,
}

/// Register a strategy in paper mode. The epoch starts at creation.
pub async fn create_strategy(
    pool: &SqlitePool,
    new: NewStrategy,
    now: DateTime<Utc>,
) -> EngineResult<Strategy> {
    let name = new.name.trim().to_string();
    if name.is_empty() {
        return Err(EngineError::Validation("name required".into()));
    }
    if new.max_orders_per_minute < 0 {
        return Err(EngineError::Validation(
            "max_orders_per_minute must not be negative".into(),
        ));
    }

    let mut strategy = Strategy {
        id: Uuid::new_v4().to_string(),
        kind: new.kind.unwrap_or_else(|| StrategyKind::infer_from_name(&name)),
        name,
        owner: new.owner,
        trading_mode: TradingMode::Paper,
        capital_allocation: new.capital_allocation,
        paper_capital: new.paper_capital,
        paper_cash: Decimal::ZERO,
        paper_pnl: Decimal::ZERO,
        paper_positions: 0,
        max_position_size: new.max_position_size,
        max_orders_per_minute: new.max_orders_per_minute,
        daily_loss_limit: new.daily_loss_limit,
        mirror_wallets: new.mirror_wallets,
        mode_switched_at: now,
        created_at: now,
    };
    strategy.paper_cash = strategy.baseline_for(TradingMode::Paper);

    StrategyRepository::new(pool)
        .insert(&strategy.to_record())
        .await?;

    info!(strategy_id = %strategy.id, name = %strategy.name, kind = strategy.kind.as_str(), "Strategy created");
    Ok(strategy)
}

pub async fn load_strategy(pool: &SqlitePool, id: &str) -> EngineResult<Strategy> {
    let record = StrategyRepository::new(pool)
        .get(id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("Strategy {id}")))?;
    Strategy::try_from(record)
}

pub async fn list_strategies(pool: &SqlitePool) -> EngineResult<Vec<Strategy>> {
    StrategyRepository::new(pool)
        .list()
        .await?
        .into_iter()
        .map(Strategy::try_from)
        .collect()
}

/// Stored settings, or the defaults when the strategy has no settings row
pub async fn load_settings(pool: &SqlitePool, strategy_id: &str) -> EngineResult<StrategySettings> {
    match SettingsRepository::new(pool).get(strategy_id).await? {
        Some(record) => StrategySettings::from_record(record),
        None => Ok(StrategySettings::defaults_for(strategy_id)),
    }
}

pub async fn save_settings(pool: &SqlitePool, settings: &StrategySettings) -> EngineResult<()> {
    SettingsRepository::new(pool)
        .upsert(&settings.to_record())
        .await?;
    Ok(())
}

/// Apply a settings-form submission on top of the stored settings
pub async fn update_settings(
    pool: &SqlitePool,
    strategy_id: &str,
    update: SettingsUpdate,
) -> EngineResult<StrategySettings> {
    // 404 before writing an orphan settings row
    load_strategy(pool, strategy_id).await?;

    let mut s = load_settings(pool, strategy_id).await?;
    if let Some(v) = update.max_trade_notional {
        s.max_trade_notional = v;
    }
    if let Some(v) = update.max_trades_per_hour {
        s.max_trades_per_hour = v;
    }
    if let Some(v) = update.max_daily_notional {
        s.max_daily_notional = v;
    }
    if let Some(v) = update.max_daily_loss {
        s.max_daily_loss = v;
    }
    if let Some(v) = update.divergence_threshold {
        s.divergence_threshold = v;
    }
    if let Some(v) = update.certainty_threshold {
        s.certainty_threshold = v;
    }
    if let Some(v) = update.liquidity_floor {
        s.liquidity_floor = v;
    }
    if let Some(v) = update.order_size_multiplier {
        s.order_size_multiplier = v;
    }
    if let Some(v) = update.max_resolution_days {
        s.max_resolution_days = v;
    }

    save_settings(pool, &s).await?;
    info!(strategy_id, "Strategy settings updated");
    Ok(s)
}

// ---------------------------------------------------------------------------
// Whale mirror
// ---------------------------------------------------------------------------

/// Validate and normalise a wallet address: `0x` + 40 hex chars, lower-cased
pub fn normalize_wallet(address: &str) -> EngineResult<String> {
    let address = address.trim();
    let valid = address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(EngineError::Validation("Invalid wallet address".into()));
    }
    Ok(address.to_lowercase())
}

/// Keep `[A-Za-z0-9_ -]`; fall back to the first 8 chars of the wallet
pub fn sanitize_label(label: Option<&str>, wallet: &str) -> String {
    let cleaned: String = label
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '-'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        wallet.chars().take(8).collect()
    } else {
        cleaned.to_string()
    }
}

/// Create a paper strategy that mirrors `wallet_address`, with default settings
pub async fn create_mirror(
    pool: &SqlitePool,
    wallet_address: &str,
    wallet_label: Option<&str>,
    now: DateTime<Utc>,
) -> EngineResult<Strategy> {
    let wallet = normalize_wallet(wallet_address)?;

    if let Some(existing) = StrategyRepository::new(pool)
        .find_by_mirror_wallet(&wallet)
        .await?
    {
        return Err(EngineError::Conflict(format!(
            "Wallet already mirrored by {}",
            existing.name
        )));
    }

    let label = sanitize_label(wallet_label, &wallet);
    let strategy = create_strategy(
        pool,
        NewStrategy {
            name: format!("Whale Mirror - {label}"),
            owner: None,
            kind: Some(StrategyKind::Standard),
            capital_allocation: Some(dec!(100)),
            paper_capital: Some(dec!(100)),
            max_position_size: dec!(500),
            max_orders_per_minute: 5,
            daily_loss_limit: dec!(-200),
            mirror_wallets: vec![wallet],
        },
        now,
    )
    .await?;

    save_settings(pool, &StrategySettings::defaults_for(&strategy.id)).await?;
    Ok(strategy)
}

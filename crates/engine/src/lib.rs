//! Poly Gate Engine: risk-gated trade execution
//!
//! Provides:
//! - Strategy registry and per-strategy settings
//! - Safeguard evaluator (position size, rate limit, daily loss)
//! - Execution orchestrator for paper and live trades with a full audit trail
//! - Kill switch, mode switching and the drawdown auditor
//! - Signal dispatch and resolution refresh
//! - Order gateway and Polymarket Gamma clients

pub mod api;
pub mod auditor;
pub mod broker;
pub mod error;
pub mod executor;
pub mod kill_switch;
pub mod mode;
pub mod refresh;
pub mod registry;
pub mod safeguards;
pub mod signals;
pub mod stats;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use api::{GammaClient, GatewayCredentials, OrderGatewayClient};
pub use auditor::{run_audit, AuditReport};
pub use broker::{BrokerClient, BrokerError, MarketResolver};
pub use error::{EngineError, EngineResult};
pub use executor::{ExecutionOutcome, Executor};
pub use kill_switch::{kill_all, KillSwitchReport};
pub use mode::{switch_mode, ModeSwitchError};
pub use refresh::{refresh_resolutions, RefreshReport};
pub use registry::{NewStrategy, SettingsUpdate};
pub use safeguards::{SafeguardCheck, SafeguardDecision};
pub use signals::{dispatch, MirrorFilter, SignalSource, WhaleFeedClient, WhaleFeedSource};
pub use stats::{strategy_stats, StrategyStats};
pub use types::*;

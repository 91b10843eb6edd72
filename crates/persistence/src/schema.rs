//! Database schema definitions

/// SQL to create all tables
/// NOTE: All amounts stored as TEXT to preserve rust_decimal::Decimal precision,
/// all timestamps as RFC 3339 UTC strings (see `format_timestamp`)
pub const CREATE_TABLES: &str = r#"
-- Strategy registry
CREATE TABLE IF NOT EXISTS strategies (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    owner TEXT,
    trading_mode TEXT DEFAULT 'paper',
    capital_allocation TEXT,
    paper_capital TEXT,
    paper_cash TEXT NOT NULL DEFAULT '0',
    paper_pnl TEXT NOT NULL DEFAULT '0',
    paper_positions INTEGER NOT NULL DEFAULT 0,
    max_position_size TEXT NOT NULL DEFAULT '500',
    max_orders_per_minute INTEGER NOT NULL DEFAULT 5,
    daily_loss_limit TEXT NOT NULL DEFAULT '-200',
    mirror_wallets TEXT NOT NULL DEFAULT '[]',
    mode_switched_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Tunable thresholds, one row per strategy
CREATE TABLE IF NOT EXISTS strategy_settings (
    strategy_id TEXT PRIMARY KEY REFERENCES strategies(id),
    max_trade_notional TEXT,
    max_trades_per_hour INTEGER,
    max_daily_notional TEXT,
    max_daily_loss TEXT,
    divergence_threshold TEXT,
    certainty_threshold TEXT,
    liquidity_floor TEXT,
    order_size_multiplier TEXT,
    max_resolution_days INTEGER
);

-- Trade ledger (append-only, see TRIGGERS)
CREATE TABLE IF NOT EXISTS trades (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    strategy_id TEXT NOT NULL REFERENCES strategies(id),
    market TEXT NOT NULL,
    side TEXT NOT NULL CHECK (side IN ('YES', 'NO')),
    notional TEXT NOT NULL,
    pnl TEXT NOT NULL DEFAULT '0',
    market_id TEXT,
    market_slug TEXT,
    closes_at TEXT,
    is_resolved INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL CHECK (status IN ('filled', 'failed')),
    error TEXT,
    trading_mode TEXT NOT NULL,
    order_id TEXT,
    executed_at TEXT NOT NULL,
    CHECK (status = 'filled' OR (pnl = '0' AND error IS NOT NULL))
);

-- Execution audit trail
CREATE TABLE IF NOT EXISTS trade_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    strategy_id TEXT REFERENCES strategies(id),
    event TEXT NOT NULL,
    mode TEXT NOT NULL,
    market_id TEXT,
    order_details TEXT,
    result TEXT,
    error TEXT,
    created_at TEXT NOT NULL
);

-- Operational notifications for the dashboard
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id TEXT,
    event_type TEXT NOT NULL,
    severity TEXT NOT NULL DEFAULT 'info',
    message TEXT,
    created_at TEXT NOT NULL
);

-- ========== INDEXES ==========

CREATE INDEX IF NOT EXISTS idx_trades_strategy_time ON trades(strategy_id, executed_at);
CREATE INDEX IF NOT EXISTS idx_trades_unresolved ON trades(is_resolved, executed_at);
CREATE INDEX IF NOT EXISTS idx_trade_logs_strategy_time ON trade_logs(strategy_id, created_at);
CREATE INDEX IF NOT EXISTS idx_trade_logs_time ON trade_logs(created_at);
CREATE INDEX IF NOT EXISTS idx_events_time ON events(created_at)
"#;

/// ALTER TABLE migrations applied after CREATE_TABLES.
/// "duplicate column name" errors are tolerated so these are safe to re-run.
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE strategies ADD COLUMN kind TEXT NOT NULL DEFAULT 'standard'",
    "ALTER TABLE strategy_settings ADD COLUMN last_tuned_at TEXT",
];

/// Ledger immutability. Only the resolution columns of a trade may change.
pub const TRIGGERS: &[&str] = &[
    r#"CREATE TRIGGER IF NOT EXISTS trades_append_only
       BEFORE UPDATE OF strategy_id, market, side, notional, pnl, market_id, market_slug,
                        status, error, trading_mode, order_id, executed_at ON trades
       BEGIN
           SELECT RAISE(ABORT, 'trades are append-only');
       END"#,
    r#"CREATE TRIGGER IF NOT EXISTS trades_no_delete
       BEFORE DELETE ON trades
       BEGIN
           SELECT RAISE(ABORT, 'trades are append-only');
       END"#,
    r#"CREATE TRIGGER IF NOT EXISTS trade_logs_no_update
       BEFORE UPDATE ON trade_logs
       BEGIN
           SELECT RAISE(ABORT, 'trade_logs are append-only');
       END"#,
    r#"CREATE TRIGGER IF NOT EXISTS trade_logs_no_delete
       BEFORE DELETE ON trade_logs
       BEGIN
           SELECT RAISE(ABORT, 'trade_logs are append-only');
       END"#,
];

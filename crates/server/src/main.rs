//! Poly Gate: risk-gated trade execution service
//!
//! Usage:
//!   poly-gate serve --port 3090      Launch the HTTP service
//!   poly-gate audit                  Run one auto-tuner pass
//!   poly-gate kill-switch            Force every strategy to paper mode
//!   poly-gate refresh                Refresh market resolution of open trades
//!   poly-gate mirror-run             Poll the whale feed and mirror trades

use chrono::Utc;
use clap::{Parser, Subcommand};
use engine::refresh::DEFAULT_REFRESH_LIMIT;
use engine::registry;
use engine::signals::SignalSource;
use engine::{
    dispatch, kill_all, refresh_resolutions, run_audit, Executor, GammaClient, MirrorFilter,
    OrderGatewayClient, WhaleFeedClient, WhaleFeedSource,
};
use persistence::Database;
use poly_gate::config::GateConfig;
use poly_gate::{create_router, AppState};
use std::sync::Arc;
use tracing::{error, info, warn};

const APP_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

#[derive(Parser)]
#[command(name = "poly-gate")]
#[command(about = "Risk-gated trade execution for prediction-market strategies", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the HTTP service
    Serve {
        /// Host to bind to (default: POLY_GATE_HOST or 0.0.0.0)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (default: POLY_GATE_PORT or 3090)
        #[arg(short, long)]
        port: Option<u16>,
        /// SQLite database path (default: POLY_GATE_DB_PATH)
        #[arg(long)]
        db: Option<String>,
    },
    /// Run one auditor pass over every strategy
    Audit,
    /// Emergency stop: switch every strategy to paper mode
    KillSwitch,
    /// Refresh close/resolution state of unresolved trades
    Refresh {
        /// Maximum number of trades to check
        #[arg(long, default_value_t = DEFAULT_REFRESH_LIMIT)]
        limit: i64,
    },
    /// Poll the whale feed once and mirror matching trades
    MirrorRun {
        /// Strategy id to trade for; mirrors POLY_MIRROR_WATCHLIST plus its own wallets.
        /// Without it, every strategy with mirror wallets runs on its own wallets.
        #[arg(long)]
        strategy: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,persistence=debug,poly_gate=debug,sqlx=warn")
    } else {
        EnvFilter::new("info,engine=info,poly_gate=info,sqlx=warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    let mut config = GateConfig::from_env();

    match cli.command {
        Commands::Serve { host, port, db } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(db) = db {
                config.db_path = db;
            }
            cmd_serve(config).await?;
        }
        Commands::Audit => cmd_audit(&config).await?,
        Commands::KillSwitch => cmd_kill_switch(&config).await?,
        Commands::Refresh { limit } => cmd_refresh(&config, limit).await?,
        Commands::MirrorRun { strategy } => cmd_mirror_run(&config, strategy).await?,
    }

    Ok(())
}

async fn open_database(path: &str) -> anyhow::Result<Database> {
    let db = Database::new(path).await.map_err(|e| {
        error!("Failed to initialize database: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })?;
    info!("Database initialized: {}", path);
    Ok(db)
}

fn build_executor(config: &GateConfig, db: &Database) -> anyhow::Result<Executor> {
    let broker = OrderGatewayClient::new(&config.gateway_url, config.credentials.clone())?;
    let resolver = GammaClient::new(&config.gamma_url)?;
    let executor = Executor::new(db.pool_clone(), Arc::new(broker), Arc::new(resolver));

    if config.credentials.is_none() {
        warn!("Broker credentials not configured: strategies cannot go live");
    }

    Ok(if config.serialize_execution {
        executor.with_serialization()
    } else {
        executor
    })
}

// ============================================================================
// Serve command: Axum web server
// ============================================================================

async fn cmd_serve(config: GateConfig) -> anyhow::Result<()> {
    info!("Poly Gate v{} starting...", APP_VERSION);

    let db = open_database(&config.db_path).await?;
    let executor = build_executor(&config, &db)?;
    let serialized = executor.is_serialized();

    let app = create_router(AppState {
        executor,
        cron_secret: config.cron_secret.clone(),
    });

    let addr: std::net::SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    println!("\n=== Poly Gate v{} ===", APP_VERSION);
    println!("Risk-gated trade execution");
    println!("Listening on http://{}", addr);
    println!("\nEndpoints:");
    println!("  GET  /health                   - Health check");
    println!("  POST /trade                    - Execute a proposed trade");
    println!("  GET  /strategies               - List strategies");
    println!("  GET  /strategies/:id           - Strategy, settings and stats");
    println!("  POST /strategies/mirror        - Create a whale mirror strategy");
    println!("  POST /strategies/:id/mode      - Switch paper/live");
    println!("  PUT  /strategies/:id/settings  - Update strategy settings");
    println!("  POST /strategies/kill-switch   - Force all strategies to paper");
    println!("  GET  /trade-logs               - Execution audit trail");
    println!("  GET  /events | POST /event     - Operational events");
    println!("  GET  /cron/auditor             - Auto-tuner pass");
    println!("  GET  /cron/resolve-refresh     - Resolution refresh");
    println!("\n  Database: {}", config.db_path);
    println!(
        "  Live trading: {} | Serialized execution: {}",
        if config.credentials.is_some() { "configured" } else { "not configured" },
        serialized
    );
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Ctrl+C received, shutting down");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Batch commands
// ============================================================================

async fn cmd_audit(config: &GateConfig) -> anyhow::Result<()> {
    let db = open_database(&config.db_path).await?;
    let reports = run_audit(db.pool(), Utc::now()).await?;

    println!("\n=== Auditor ({} strategies with trades) ===", reports.len());
    for report in &reports {
        println!("  {}", report.summary());
    }
    let tuned = reports.iter().filter(|r| r.tuned).count();
    println!("\n  Tuned: {}", tuned);
    Ok(())
}

async fn cmd_kill_switch(config: &GateConfig) -> anyhow::Result<()> {
    let db = open_database(&config.db_path).await?;
    let report = kill_all(db.pool(), Utc::now()).await?;

    println!("\n{}", report.message);
    for s in &report.strategies {
        println!("  {} ({})", s.name, s.id);
    }
    Ok(())
}

async fn cmd_refresh(config: &GateConfig, limit: i64) -> anyhow::Result<()> {
    let db = open_database(&config.db_path).await?;
    let resolver = GammaClient::new(&config.gamma_url)?;
    let report = refresh_resolutions(db.pool(), &resolver, limit).await?;

    println!(
        "\nResolution refresh: {} updated, {} failed, {} skipped ({} checked)",
        report.updated, report.failed, report.skipped, report.total
    );
    Ok(())
}

async fn cmd_mirror_run(config: &GateConfig, strategy_id: Option<String>) -> anyhow::Result<()> {
    let feed_url = config
        .whale_feed_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("POLY_WHALE_FEED_URL is not set"))?;

    let db = open_database(&config.db_path).await?;
    let executor = build_executor(config, &db)?;
    let client = WhaleFeedClient::new(feed_url)?;

    let targets: Vec<(engine::Strategy, Vec<String>)> = match strategy_id {
        Some(id) => {
            let strategy = registry::load_strategy(db.pool(), &id).await?;
            let wallets = config
                .mirror_watchlist
                .iter()
                .chain(strategy.mirror_wallets.iter())
                .cloned()
                .collect();
            vec![(strategy, wallets)]
        }
        None => registry::list_strategies(db.pool())
            .await?
            .into_iter()
            .filter(|s| !s.mirror_wallets.is_empty())
            .map(|s| {
                let wallets = s.mirror_wallets.clone();
                (s, wallets)
            })
            .collect(),
    };

    if targets.is_empty() {
        println!("\nNo mirror strategies to run");
        return Ok(());
    }

    for (strategy, wallets) in targets {
        let filter = MirrorFilter::new(&wallets).with_category(config.mirror_category.clone());
        let source = WhaleFeedSource::new(client.clone(), filter);
        let proposals = match source.poll().await {
            Ok(p) => p,
            Err(e) => {
                error!(strategy_id = %strategy.id, error = %e, "Whale feed poll failed");
                continue;
            }
        };

        let report = dispatch(&executor, &strategy, source.name(), proposals).await?;
        println!(
            "\n{}: {} proposed, {} recorded, {} blocked, {} duplicates",
            strategy.name, report.proposed, report.recorded, report.blocked, report.duplicates
        );
        for line in &report.results {
            println!("  {}", line);
        }
    }

    Ok(())
}

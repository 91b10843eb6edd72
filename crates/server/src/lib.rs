//! Poly Gate HTTP surface
//!
//! Exposes the execution path, strategy administration, the audit trail and
//! the cron-triggered batch jobs over axum.

pub mod config;
pub mod error;
pub mod handlers;

use axum::routing::{get, post, put};
use axum::Router;
use engine::Executor;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub executor: Executor,
    pub cron_secret: Option<String>,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/trade", post(handlers::post_trade))
        .route(
            "/strategies",
            get(handlers::list_strategies).post(handlers::create_strategy),
        )
        .route("/strategies/mirror", post(handlers::create_mirror))
        .route("/strategies/kill-switch", post(handlers::kill_switch))
        .route("/strategies/:id", get(handlers::get_strategy))
        .route("/strategies/:id/mode", post(handlers::set_mode))
        .route("/strategies/:id/settings", put(handlers::update_settings))
        .route("/trade-logs", get(handlers::trade_logs))
        .route("/events", get(handlers::list_events))
        .route("/event", post(handlers::post_event))
        .route("/cron/auditor", get(handlers::cron_auditor))
        .route("/cron/resolve-refresh", get(handlers::cron_resolve_refresh))
        .with_state(state)
        .layer(cors)
}

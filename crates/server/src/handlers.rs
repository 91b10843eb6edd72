//! HTTP handlers

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::Json;
use chrono::Utc;
use engine::refresh::DEFAULT_REFRESH_LIMIT;
use engine::registry::{self, NewStrategy, SettingsUpdate};
use engine::{
    kill_all, refresh_resolutions, run_audit, strategy_stats, switch_mode, ExecutionOutcome,
    MarketSide, ProposedTrade,
};
use persistence::format_timestamp;
use persistence::repository::{EventRepository, NewEvent, TradeLogRepository};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::info;

const DEFAULT_LOG_LIMIT: i64 = 100;
const MAX_LOG_LIMIT: i64 = 500;
const DEFAULT_EVENT_LIMIT: i64 = 50;

/// `?limit=` capped at 500; zero or negative yields no rows
fn limit_param(params: &HashMap<String, String>, default: i64) -> i64 {
    params
        .get("limit")
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(default)
        .clamp(0, MAX_LOG_LIMIT)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// `/cron/*` callers must present `Bearer <CRON_SECRET>` when a secret is set
fn authorize_cron(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(secret) = state.cron_secret.as_deref() else {
        return Ok(());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(secret) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============================================================================
// Trade execution
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct TradeRequest {
    pub strategy_id: Option<String>,
    pub market: Option<String>,
    pub side: Option<String>,
    pub notional: Option<Decimal>,
    pub pnl: Option<Decimal>,
    pub price: Option<Decimal>,
    pub market_id: Option<String>,
    pub market_slug: Option<String>,
    pub closes_at: Option<String>,
    pub is_resolved: Option<bool>,
}

/// POST /trade: run one proposed trade through the orchestrator
pub async fn post_trade(
    State(state): State<AppState>,
    payload: Result<Json<TradeRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let req = body(payload)?;

    let (Some(strategy_id), Some(market), Some(side), Some(notional)) = (
        req.strategy_id.filter(|s| !s.is_empty()),
        req.market.filter(|s| !s.is_empty()),
        req.side,
        req.notional,
    ) else {
        return Err(ApiError::BadRequest(
            "strategy_id, market, side, notional required".into(),
        ));
    };
    let side: MarketSide = side.parse()?;
    if notional <= Decimal::ZERO {
        return Err(ApiError::BadRequest("notional must be positive".into()));
    }

    let strategy = registry::load_strategy(state.executor.pool(), &strategy_id).await?;

    let mut proposed = ProposedTrade::new(market, side, notional);
    proposed.pnl = req.pnl.unwrap_or(Decimal::ZERO);
    proposed.price = req.price;
    proposed.market_id = req.market_id;
    proposed.market_slug = req.market_slug;
    proposed.closes_at = req.closes_at;
    proposed.is_resolved = req.is_resolved.unwrap_or(false);

    match state.executor.execute(&strategy, &proposed).await? {
        ExecutionOutcome::Blocked { reason, .. } => Err(ApiError::BadRequest(reason)),
        ExecutionOutcome::Recorded {
            trade_id,
            status,
            error,
            mode,
        } => Ok(Json(json!({
            "ok": true,
            "trade_id": trade_id,
            "status": status,
            "mode": mode,
            "error": error,
        }))),
    }
}

// ============================================================================
// Strategies
// ============================================================================

/// GET /strategies
pub async fn list_strategies(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let strategies = registry::list_strategies(state.executor.pool()).await?;
    Ok(Json(json!({ "strategies": strategies })))
}

/// POST /strategies
pub async fn create_strategy(
    State(state): State<AppState>,
    payload: Result<Json<NewStrategy>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let new = body(payload)?;
    let strategy = registry::create_strategy(state.executor.pool(), new, Utc::now()).await?;
    Ok(Json(json!({ "ok": true, "strategy": strategy })))
}

/// GET /strategies/:id: strategy, settings and current-epoch stats
pub async fn get_strategy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let pool = state.executor.pool();
    let strategy = registry::load_strategy(pool, &id).await?;
    let settings = registry::load_settings(pool, &id).await?;
    let stats = strategy_stats(pool, &strategy).await?;
    Ok(Json(json!({
        "strategy": strategy,
        "settings": settings,
        "stats": stats,
    })))
}

#[derive(Debug, Deserialize)]
pub struct MirrorRequest {
    pub wallet_address: Option<String>,
    pub wallet_label: Option<String>,
}

/// POST /strategies/mirror
pub async fn create_mirror(
    State(state): State<AppState>,
    payload: Result<Json<MirrorRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let req = body(payload)?;
    let address = req.wallet_address.unwrap_or_default();
    let strategy = registry::create_mirror(
        state.executor.pool(),
        &address,
        req.wallet_label.as_deref(),
        Utc::now(),
    )
    .await?;
    Ok(Json(json!({ "ok": true, "strategy": strategy })))
}

/// PUT /strategies/:id/settings
pub async fn update_settings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<SettingsUpdate>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let update = body(payload)?;
    let settings = registry::update_settings(state.executor.pool(), &id, update).await?;
    Ok(Json(json!({ "settings": settings })))
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: Option<String>,
}

/// POST /strategies/:id/mode
pub async fn set_mode(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ModeRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let req = body(payload)?;
    let mode = req.mode.unwrap_or_default();
    let strategy = switch_mode(
        state.executor.pool(),
        state.executor.broker().as_ref(),
        &id,
        &mode,
        Utc::now(),
    )
    .await?;
    Ok(Json(json!({ "strategy": strategy })))
}

/// POST /strategies/kill-switch
pub async fn kill_switch(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let report = kill_all(state.executor.pool(), Utc::now()).await?;
    Ok(Json(json!({
        "success": report.success,
        "affected": report.affected,
        "strategies": report.strategies,
        "message": report.message,
    })))
}

// ============================================================================
// Audit trail and events
// ============================================================================

/// GET /trade-logs?strategy_id=&limit=
pub async fn trade_logs(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Value>> {
    let limit = limit_param(&params, DEFAULT_LOG_LIMIT);
    let strategy_id = params
        .get("strategy_id")
        .map(|s| s.as_str())
        .filter(|s| !s.is_empty());

    let logs = TradeLogRepository::new(state.executor.pool())
        .recent(strategy_id, limit)
        .await?;
    Ok(Json(json!({ "logs": logs })))
}

/// GET /events?limit=
pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Value>> {
    let limit = limit_param(&params, DEFAULT_EVENT_LIMIT);
    let events = EventRepository::new(state.executor.pool())
        .recent(limit)
        .await?;
    Ok(Json(json!({ "events": events })))
}

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub agent_id: Option<String>,
    pub event_type: Option<String>,
    pub severity: Option<String>,
    pub message: Option<String>,
}

/// POST /event
pub async fn post_event(
    State(state): State<AppState>,
    payload: Result<Json<EventRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let req = body(payload)?;
    let Some(event_type) = req.event_type.filter(|t| !t.is_empty()) else {
        return Err(ApiError::BadRequest("event_type required".into()));
    };

    let id = EventRepository::new(state.executor.pool())
        .insert(&NewEvent {
            agent_id: req.agent_id,
            event_type,
            severity: req.severity.unwrap_or_else(|| "info".to_string()),
            message: req.message,
            created_at: format_timestamp(Utc::now()),
        })
        .await?;
    Ok(Json(json!({ "ok": true, "id": id })))
}

// ============================================================================
// Cron
// ============================================================================

/// GET /cron/auditor: one auto-tuner pass
pub async fn cron_auditor(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    authorize_cron(&state, &headers)?;
    let reports = run_audit(state.executor.pool(), Utc::now()).await?;
    let results: Vec<String> = reports
        .iter()
        .filter(|r| r.tuned)
        .map(|r| r.summary())
        .collect();
    info!(tuned = results.len(), "Auditor run via cron");
    Ok(Json(json!({
        "ok": true,
        "tuned": results.len(),
        "results": results,
    })))
}

/// GET /cron/resolve-refresh
pub async fn cron_resolve_refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    authorize_cron(&state, &headers)?;
    let report = refresh_resolutions(
        state.executor.pool(),
        state.executor.resolver().as_ref(),
        DEFAULT_REFRESH_LIMIT,
    )
    .await?;
    Ok(Json(json!({
        "ok": true,
        "updated": report.updated,
        "failed": report.failed,
        "skipped": report.skipped,
        "total": report.total,
    })))
}

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::aggregator::{compute_diffs, compute_value_bets};
use crate::config::{Config, DEFAULT_LINE_MOVEMENT_THRESHOLD_PERCENT, DEFAULT_MIN_VALUE_PERCENT};
use crate::detector::detect_movements;
use crate::error::CalculatorError;
use crate::models::MatchStatus;
use crate::orchestrator::{OrchestratorHandle, OrchestratorStatus};
use crate::parser_client::ParserClient;
use crate::storage::{DiffBetStorage, OddsSnapshotStorage};

const DEFAULT_TOP_LIMIT: usize = 5;
const DEFAULT_MOVEMENTS_LIMIT: usize = 10;
const MAX_LIMIT: usize = 50;
const LINE_MOVEMENT_ODD_CUTOFF: f64 = 8.0;
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub parser: Option<Arc<ParserClient>>,
    pub diff_storage: Arc<dyn DiffBetStorage>,
    pub odds_storage: Arc<dyn OddsSnapshotStorage>,
    pub orchestrator: OrchestratorHandle,
    pub shutdown: watch::Receiver<bool>,
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health))
        .route("/diffs/top", get(diffs_top))
        .route("/value-bets/top", get(value_bets_top))
        .route("/line-movements/top", get(line_movements_top))
        .route("/diffs/status", get(diffs_status))
        .route("/async/start", post(async_start))
        .route("/async/stop", post(async_stop))
        .route("/async/stop_values", post(async_stop_values))
        .route("/async/stop_overlays", post(async_stop_overlays))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
}

async fn ping() -> &'static str {
    "pong"
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let healthy = tokio::time::timeout(HEALTH_CHECK_TIMEOUT, state.odds_storage.health_check())
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false);

    let status = if healthy { "ok" } else { "degraded" };
    let code = if healthy {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(HealthBody { status }))
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Deserialize)]
struct TopQuery {
    limit: Option<usize>,
    status: Option<String>,
}

fn clamp_limit(requested: Option<usize>, default: usize) -> usize {
    requested.map(|l| l.clamp(1, MAX_LIMIT)).unwrap_or(default)
}

fn parse_status_filter(raw: &Option<String>) -> Option<MatchStatus> {
    match raw.as_deref() {
        Some("live") => Some(MatchStatus::Live),
        Some("upcoming") => Some(MatchStatus::Upcoming),
        _ => None,
    }
}

async fn fetch_matches(state: &AppState) -> Result<Vec<crate::models::Match>, CalculatorError> {
    let parser = state.parser.as_ref().ok_or(CalculatorError::ParserNotConfigured)?;
    let mut shutdown = state.shutdown.clone();
    parser.fetch_matches(&mut shutdown).await
}

async fn diffs_top(State(state): State<AppState>, Query(query): Query<TopQuery>) -> Result<impl IntoResponse, CalculatorError> {
    let limit = clamp_limit(query.limit, DEFAULT_TOP_LIMIT);
    let status_filter = parse_status_filter(&query.status);
    let matches = fetch_matches(&state).await?;
    let now = Utc::now();

    let mut diffs = compute_diffs(&matches, MAX_LIMIT * 4);
    if let Some(wanted) = status_filter {
        diffs = filter_by_status(diffs, &matches, now, wanted);
    }
    diffs.truncate(limit);
    Ok(Json(diffs))
}

fn filter_by_status<T>(items: Vec<T>, matches: &[crate::models::Match], now: chrono::DateTime<Utc>, wanted: MatchStatus) -> Vec<T>
where
    T: HasMatchGroupKey,
{
    use crate::normalizer::group_key;
    let wanted_groups: std::collections::HashSet<String> = matches
        .iter()
        .filter(|m| m.status(now) == Some(wanted))
        .map(group_key)
        .filter(|k| !k.is_empty())
        .collect();
    items.into_iter().filter(|i| wanted_groups.contains(i.match_group_key())).collect()
}

trait HasMatchGroupKey {
    fn match_group_key(&self) -> &str;
}

impl HasMatchGroupKey for crate::models::DiffBet {
    fn match_group_key(&self) -> &str {
        &self.match_group_key
    }
}

impl HasMatchGroupKey for crate::models::ValueBet {
    fn match_group_key(&self) -> &str {
        &self.match_group_key
    }
}

async fn value_bets_top(State(state): State<AppState>, Query(query): Query<TopQuery>) -> Result<impl IntoResponse, CalculatorError> {
    let limit = clamp_limit(query.limit, DEFAULT_TOP_LIMIT);
    let status_filter = parse_status_filter(&query.status);
    let matches = fetch_matches(&state).await?;
    let now = Utc::now();

    let min_value_percent = state.config.min_value_percent.unwrap_or(DEFAULT_MIN_VALUE_PERCENT);
    let mut value_bets = compute_value_bets(&matches, &state.config.bookmaker_weights, min_value_percent, MAX_LIMIT * 4);
    if let Some(wanted) = status_filter {
        value_bets = filter_by_status(value_bets, &matches, now, wanted);
    }
    value_bets.truncate(limit);
    Ok(Json(value_bets))
}

#[derive(Deserialize)]
struct MovementsQuery {
    limit: Option<usize>,
}

async fn line_movements_top(State(state): State<AppState>, Query(query): Query<MovementsQuery>) -> Result<impl IntoResponse, CalculatorError> {
    let limit = clamp_limit(query.limit, DEFAULT_MOVEMENTS_LIMIT);
    let matches = fetch_matches(&state).await?;

    let line_movement_threshold_percent = state
        .config
        .line_movement_threshold_percent
        .unwrap_or(DEFAULT_LINE_MOVEMENT_THRESHOLD_PERCENT);
    let mut movements = detect_movements(&matches, line_movement_threshold_percent, state.odds_storage.as_ref()).await?;
    movements.retain(|m| m.current_odd <= LINE_MOVEMENT_ODD_CUTOFF);
    movements.truncate(limit);
    Ok(Json(movements))
}

#[derive(Serialize)]
struct DiffsStatusBody {
    parser_configured: bool,
    worker: OrchestratorStatus,
}

async fn diffs_status(State(state): State<AppState>) -> Json<DiffsStatusBody> {
    Json(DiffsStatusBody {
        parser_configured: state.parser.is_some(),
        worker: state.orchestrator.status(),
    })
}

async fn async_start(State(state): State<AppState>) -> Json<OrchestratorStatus> {
    Json(state.orchestrator.start())
}

async fn async_stop(State(state): State<AppState>) -> Json<OrchestratorStatus> {
    Json(state.orchestrator.stop())
}

async fn async_stop_values(State(state): State<AppState>) -> Json<OrchestratorStatus> {
    Json(state.orchestrator.stop_values())
}

async fn async_stop_overlays(State(state): State<AppState>) -> Json<OrchestratorStatus> {
    Json(state.orchestrator.stop_overlays())
}

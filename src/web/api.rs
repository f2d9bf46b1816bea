use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::AppState;
use crate::engine::{gather, render, BacktestReport, DashboardReport, DashboardRequest, Forecast, OnlineUpdate, SessionSummary};
use crate::error::DashboardError;
use crate::indicators::moving_averages;
use crate::provider::{fetch_history, fetch_latest};
use crate::types::PriceSeries;

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = match &self {
            DashboardError::DataUnavailable { .. } => StatusCode::NOT_FOUND,
            DashboardError::ModelUnavailable(_) | DashboardError::ModelLoad { .. } => StatusCode::SERVICE_UNAVAILABLE,
            e if e.is_validation() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SymbolQuery {
    pub symbol: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForecastQuery {
    pub symbol: Option<String>,
    pub days: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub symbol: Option<String>,
    pub days: Option<usize>,
    pub learn: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OnlineUpdateBody {
    pub symbol: Option<String>,
}

// === Status ===

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let model_ready = state.session.read().await.model_ready();
    Json(json!({
        "status": "ok",
        "model_ready": model_ready,
        "timestamp": chrono::Utc::now()
    }))
}

pub async fn get_session(State(state): State<AppState>) -> Json<SessionSummary> {
    Json(state.session.read().await.summary())
}

// === Data ===

pub async fn get_prices(
    State(state): State<AppState>,
    Query(query): Query<SymbolQuery>,
) -> Result<Json<PriceSeries>, DashboardError> {
    let symbol = state.symbol(query.symbol.as_deref())?;
    let series = fetch_history(state.provider.as_ref(), &symbol, state.today(), state.history_years()).await?;
    Ok(Json(series))
}

pub async fn get_moving_averages(
    State(state): State<AppState>,
    Query(query): Query<SymbolQuery>,
) -> Result<impl IntoResponse, DashboardError> {
    let symbol = state.symbol(query.symbol.as_deref())?;
    let series = fetch_history(state.provider.as_ref(), &symbol, state.today(), state.history_years()).await?;
    let averages = moving_averages(&series, &state.settings.forecast.moving_average_windows);

    Ok(Json(json!({
        "symbol": symbol,
        "moving_averages": averages
    })))
}

// === Prediction ===

pub async fn get_backtest(
    State(state): State<AppState>,
    Query(query): Query<SymbolQuery>,
) -> Result<Json<BacktestReport>, DashboardError> {
    let symbol = state.symbol(query.symbol.as_deref())?;
    let series = fetch_history(state.provider.as_ref(), &symbol, state.today(), state.history_years()).await?;

    let mut session = state.session.write().await;
    let view = session.load(series)?;
    Ok(Json(session.backtest(&view)?))
}

pub async fn get_forecast(
    State(state): State<AppState>,
    Query(query): Query<ForecastQuery>,
) -> Result<Json<Forecast>, DashboardError> {
    let symbol = state.symbol(query.symbol.as_deref())?;
    let days = query.days.unwrap_or(state.settings.forecast.default_days);
    if days == 0 {
        return Err(DashboardError::InvalidHorizon);
    }
    let series = fetch_history(state.provider.as_ref(), &symbol, state.today(), state.history_years()).await?;

    let mut session = state.session.write().await;
    let view = session.load(series)?;
    Ok(Json(session.forecast(&view, days)?))
}

pub async fn post_online_update(
    State(state): State<AppState>,
    Json(body): Json<OnlineUpdateBody>,
) -> Result<Json<OnlineUpdate>, DashboardError> {
    let symbol = state.symbol(body.symbol.as_deref())?;
    let today = state.today();
    let series = fetch_history(state.provider.as_ref(), &symbol, today, state.history_years()).await?;
    let observation = fetch_latest(state.provider.as_ref(), &symbol, today).await?;

    let mut session = state.session.write().await;
    let view = session.load(series)?;
    let update = session.online_update(&view, &observation)?;
    info!("Online update #{} applied for {}", update.updates_applied, symbol);
    Ok(Json(update))
}

// === Whole dashboard ===

pub async fn get_dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardReport>, DashboardError> {
    let request = DashboardRequest {
        symbol: state.symbol(query.symbol.as_deref())?,
        days: query.days.unwrap_or(state.settings.forecast.default_days),
        learn: query.learn.unwrap_or(false),
    };

    // Network first, lock second
    let gathered = gather(state.provider.as_ref(), &request, state.today(), state.history_years()).await;
    let mut session = state.session.write().await;
    Ok(Json(render(&mut session, &request, gathered)))
}

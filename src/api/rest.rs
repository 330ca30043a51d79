// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. Unknown symbols and alert ids map to
// 404 with a JSON error body; an invalid timeframe label maps to 400. CORS is
// configured permissively for development; tighten `allowed_origins` in
// production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::alerts::AlertCondition;
use crate::engine::FxEngine;
use crate::market_data::{Candle, Tick, Timeframe};

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(engine: Arc<FxEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/price/:symbol", get(price))
        .route("/api/v1/prices", get(all_prices))
        .route("/api/v1/ohlc/:symbol", get(ohlc))
        .route("/api/v1/history/:symbol", get(history))
        .route("/api/v1/indicators/:symbol", get(indicators))
        .route("/api/v1/chart/:symbol", get(chart))
        .route("/api/v1/alerts", post(create_alert))
        .route("/api/v1/alerts", get(all_alerts))
        .route("/api/v1/alerts/user/:user_id", get(user_alerts))
        .route("/api/v1/alerts/:id", delete(remove_alert))
        .route("/api/v1/hub/stats", get(hub_stats))
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(engine)
}

// =============================================================================
// Shared response shapes
// =============================================================================

type ApiError = (StatusCode, Json<serde_json::Value>);

fn not_found(message: String) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": message })),
    )
}

fn bad_request(message: String) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
}

#[derive(Serialize)]
struct PriceResponse {
    symbol: String,
    bid: f64,
    ask: f64,
    mid: f64,
    spread: f64,
    spread_pips: f64,
    timestamp: DateTime<Utc>,
}

impl From<&Tick> for PriceResponse {
    fn from(tick: &Tick) -> Self {
        Self {
            symbol: tick.symbol.to_uppercase(),
            bid: tick.bid,
            ask: tick.ask,
            mid: tick.mid,
            spread: tick.spread(),
            spread_pips: tick.spread_pips(),
            timestamp: tick.timestamp,
        }
    }
}

#[derive(Serialize)]
struct OhlcResponse {
    symbol: String,
    timestamp: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    is_bullish: bool,
}

impl From<&Candle> for OhlcResponse {
    fn from(candle: &Candle) -> Self {
        Self {
            symbol: candle.symbol.to_uppercase(),
            timestamp: candle.bucket_start,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            is_bullish: candle.is_bullish(),
        }
    }
}

/// Parse a `timeframe` query value, defaulting to 1h.
fn parse_timeframe(raw: &Option<String>) -> Result<Timeframe, ApiError> {
    match raw {
        None => Ok(Timeframe::H1),
        Some(label) => Timeframe::parse(label)
            .ok_or_else(|| bad_request(format!("Invalid timeframe: {label}"))),
    }
}

// =============================================================================
// Health
// =============================================================================

async fn health(State(engine): State<Arc<FxEngine>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "uptime_secs": engine.uptime_secs(),
        "upstream_state": engine.ingestor.state(),
        "ticks_processed": engine.ticks_processed(),
        "ticks_dropped": engine.ingestor.ticks_dropped(),
        "messages_ignored": engine.ingestor.messages_ignored(),
        "symbols_tracked": engine.price_book.symbol_count(),
        "active_alerts": engine.alerts.active_count(),
        "subscriber_connections": engine.hub.connection_count(),
        "server_time": Utc::now().timestamp_millis(),
    }))
}

// =============================================================================
// Prices
// =============================================================================

async fn price(
    State(engine): State<Arc<FxEngine>>,
    Path(symbol): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match engine.get_price(&symbol) {
        Some(tick) => Ok(Json(PriceResponse::from(&tick))),
        None => Err(not_found(format!("No data for symbol: {symbol}"))),
    }
}

async fn all_prices(State(engine): State<Arc<FxEngine>>) -> impl IntoResponse {
    let prices = engine.get_all_prices();
    let list: Vec<PriceResponse> = prices.values().map(PriceResponse::from).collect();
    Json(serde_json::json!({
        "prices": list,
        "count": list.len(),
        "timestamp": Utc::now(),
    }))
}

// =============================================================================
// Candles / history
// =============================================================================

#[derive(Deserialize)]
struct OhlcQuery {
    timeframe: Option<String>,
    limit: Option<usize>,
}

async fn ohlc(
    State(engine): State<Arc<FxEngine>>,
    Path(symbol): Path<String>,
    Query(query): Query<OhlcQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let timeframe = parse_timeframe(&query.timeframe)?;
    let limit = query.limit.unwrap_or(100).clamp(1, 500);

    let candles = engine.get_ohlc(&symbol, timeframe, limit);
    if candles.is_empty() {
        return Err(not_found(format!("No OHLC data for symbol: {symbol}")));
    }

    let list: Vec<OhlcResponse> = candles.iter().map(OhlcResponse::from).collect();
    Ok(Json(list))
}

#[derive(Deserialize)]
struct HistoryQuery {
    minutes: Option<i64>,
}

async fn history(
    State(engine): State<Arc<FxEngine>>,
    Path(symbol): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let minutes = query.minutes.unwrap_or(60).clamp(1, 1440);

    let ticks = engine.get_price_history(&symbol, minutes);
    if ticks.is_empty() {
        return Err(not_found(format!("No price history for symbol: {symbol}")));
    }

    let list: Vec<PriceResponse> = ticks.iter().map(PriceResponse::from).collect();
    Ok(Json(list))
}

// =============================================================================
// Indicators / chart data
// =============================================================================

#[derive(Deserialize)]
struct IndicatorQuery {
    timeframe: Option<String>,
}

async fn indicators(
    State(engine): State<Arc<FxEngine>>,
    Path(symbol): Path<String>,
    Query(query): Query<IndicatorQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let timeframe = parse_timeframe(&query.timeframe)?;

    match engine.get_technical_indicators(&symbol, timeframe) {
        Some(snapshot) => Ok(Json(snapshot)),
        None => Err(not_found(format!("Not enough data for symbol: {symbol}"))),
    }
}

#[derive(Deserialize)]
struct ChartQuery {
    timeframe: Option<String>,
    limit: Option<usize>,
    ma: Option<bool>,
}

/// Chart *data* only — image rendering belongs to an external collaborator
/// fed by this payload.
async fn chart(
    State(engine): State<Arc<FxEngine>>,
    Path(symbol): Path<String>,
    Query(query): Query<ChartQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let timeframe = parse_timeframe(&query.timeframe)?;
    let limit = query.limit.unwrap_or(50).clamp(10, 200);
    let with_ma = query.ma.unwrap_or(true);

    match engine.chart_data(&symbol, timeframe, limit, with_ma) {
        Some(data) => Ok(Json(data)),
        None => Err(not_found(format!("Cannot build chart data for symbol: {symbol}"))),
    }
}

// =============================================================================
// Alerts
// =============================================================================

#[derive(Deserialize)]
struct CreateAlertRequest {
    guild_id: i64,
    user_id: i64,
    channel_id: i64,
    symbol: String,
    condition: AlertCondition,
    target_price: f64,
}

async fn create_alert(
    State(engine): State<Arc<FxEngine>>,
    Json(request): Json<CreateAlertRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Only accept alerts for symbols the feed has actually produced.
    if engine.get_price(&request.symbol).is_none() {
        return Err(not_found(format!("Unknown symbol: {}", request.symbol)));
    }

    let alert = engine.add_alert(
        request.guild_id,
        request.user_id,
        request.channel_id,
        &request.symbol,
        request.condition,
        request.target_price,
    );

    info!(alert_id = alert.id, symbol = %alert.symbol, "alert created via API");
    Ok(Json(alert))
}

async fn all_alerts(State(engine): State<Arc<FxEngine>>) -> impl IntoResponse {
    Json(engine.get_all_alerts())
}

async fn user_alerts(
    State(engine): State<Arc<FxEngine>>,
    Path(user_id): Path<i64>,
) -> impl IntoResponse {
    Json(engine.get_user_alerts(user_id))
}

async fn remove_alert(
    State(engine): State<Arc<FxEngine>>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    if engine.remove_alert(id) {
        Ok(Json(serde_json::json!({ "status": "deleted", "alert_id": id })))
    } else {
        Err(not_found(format!("Alert not found: {id}")))
    }
}

// =============================================================================
// Hub stats
// =============================================================================

async fn hub_stats(State(engine): State<Arc<FxEngine>>) -> impl IntoResponse {
    Json(engine.hub.stats())
}

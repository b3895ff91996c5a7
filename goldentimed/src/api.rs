//! HTTP API for the goldentime daemon.
//!
//! Provides REST endpoints for:
//! - Health check
//! - Start / stop / status of trade runs, per identifier
//! - Single-tenant aliases on the `default` run
//! - Balance and price passthroughs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use goldentime_domain::{
    ApiCredentials, EntrySchedule, Price, RiskSpec, RunSnapshot, Side, Symbol, TradeRequest,
    TradeRunState, WallClockZone,
};

use crate::error::DaemonError;
use crate::registry::{TradeRegistry, DEFAULT_RUN};

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState {
    pub registry: Arc<TradeRegistry>,
    /// Zone for naive wall-clock fields in start bodies
    pub wall_clock: WallClockZone,
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Per-run venue credentials.
#[derive(Deserialize)]
pub struct CredentialsBody {
    pub api_key: String,
    pub api_secret: String,
}

/// Body of a start request.
#[derive(Deserialize)]
pub struct StartTradeBody {
    /// `long` or `short`
    pub position_type: String,
    pub symbol: String,
    /// Fixed quantity (exclusive with `fixed_loss`)
    #[serde(default)]
    pub qty: Option<Decimal>,
    /// Risk budget in quote currency (exclusive with `qty`)
    #[serde(default)]
    pub fixed_loss: Option<Decimal>,
    #[serde(default)]
    pub entry_time: Option<String>,
    #[serde(default)]
    pub immediate: bool,
    pub exit_time: String,
    #[serde(default)]
    pub take_profit: Option<Decimal>,
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    #[serde(default)]
    pub credentials: Option<CredentialsBody>,
}

impl StartTradeBody {
    /// Parse into a domain request, reading wall-clock fields in `zone`.
    pub fn into_request(
        self,
        zone: &WallClockZone,
    ) -> Result<(TradeRequest, Option<ApiCredentials>), DaemonError> {
        let invalid = |e: goldentime_domain::DomainError| DaemonError::InvalidRequest(e.to_string());

        let side: Side = self.position_type.parse().map_err(invalid)?;
        let symbol = Symbol::from_pair(&self.symbol.trim().to_uppercase()).map_err(invalid)?;

        let risk = match (self.qty, self.fixed_loss) {
            (Some(qty), None) => RiskSpec::fixed_quantity(qty).map_err(invalid)?,
            (None, Some(loss)) => RiskSpec::risk_budget(loss).map_err(invalid)?,
            (Some(_), Some(_)) => {
                return Err(DaemonError::InvalidRequest(
                    "qty and fixed_loss are mutually exclusive".to_string(),
                ))
            }
            (None, None) => {
                return Err(DaemonError::InvalidRequest(
                    "either qty or fixed_loss is required".to_string(),
                ))
            }
        };

        let entry_at = match self.entry_time.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(zone.parse(raw).map_err(invalid)?),
            _ => None,
        };
        let entry = EntrySchedule::from_parts(self.immediate, entry_at).map_err(invalid)?;
        let exit_at = zone.parse(&self.exit_time).map_err(invalid)?;

        let take_profit = self.take_profit.map(Price::new).transpose().map_err(invalid)?;
        let stop_loss = self.stop_loss.map(Price::new).transpose().map_err(invalid)?;

        let credentials = self
            .credentials
            .map(|c| ApiCredentials::new(c.api_key, c.api_secret));

        let request = TradeRequest {
            side,
            symbol,
            risk,
            entry,
            exit_at,
            take_profit,
            stop_loss,
        };
        Ok((request, credentials))
    }
}

/// Start outcome.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub accepted: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<RunSnapshot>,
}

/// Stop outcome.
#[derive(Debug, Serialize, Deserialize)]
pub struct StopResponse {
    pub accepted: bool,
    pub message: String,
}

/// Status of one run.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub phase: String,
    pub info: Option<TradeRunState>,
    pub error: Option<String>,
}

impl StatusResponse {
    fn unknown() -> Self {
        Self {
            running: false,
            phase: "unknown".to_string(),
            info: None,
            error: None,
        }
    }
}

impl From<RunSnapshot> for StatusResponse {
    fn from(snapshot: RunSnapshot) -> Self {
        Self {
            running: snapshot.running,
            phase: snapshot.phase.name().to_string(),
            info: Some(snapshot.info),
            error: snapshot.error,
        }
    }
}

/// One entry of the run listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: String,
    #[serde(flatten)]
    pub status: StatusResponse,
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub coin: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub coin: String,
    pub balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct PriceQuery {
    pub symbol: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PriceResponse {
    pub symbol: String,
    pub price: Decimal,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/trades", get(list_handler))
        .route(
            "/trades/:id",
            post(start_handler).get(status_handler).delete(stop_handler),
        )
        .route("/start_trade", post(start_default_handler))
        .route("/trade_status", get(status_default_handler))
        .route("/stop_trade", post(stop_default_handler))
        .route("/balance", get(balance_handler))
        .route("/price", get(price_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

async fn root_handler() -> &'static str {
    "goldentime trade daemon"
}

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn start_handler(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(body): Json<StartTradeBody>,
) -> (StatusCode, Json<StartResponse>) {
    start_run(&state, &id, body).await
}

async fn start_default_handler(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<StartTradeBody>,
) -> (StatusCode, Json<StartResponse>) {
    start_run(&state, DEFAULT_RUN, body).await
}

async fn start_run(state: &ApiState, id: &str, body: StartTradeBody) -> (StatusCode, Json<StartResponse>) {
    let result = match body.into_request(&state.wall_clock) {
        Ok((request, credentials)) => state.registry.start(id, request, credentials).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(snapshot) => {
            info!(id, run_id = %snapshot.run_id, "Start accepted via API");
            (
                StatusCode::ACCEPTED,
                Json(StartResponse {
                    accepted: true,
                    message: format!("Trade started for {}", id),
                    snapshot: Some(snapshot),
                }),
            )
        }
        Err(e) => {
            let snapshot = match &e {
                DaemonError::RunAlreadyActive(_) => state.registry.status(id).await,
                DaemonError::SymbolBusy { holder, .. } => state.registry.status(holder).await,
                _ => None,
            };
            (
                error_status(&e),
                Json(StartResponse {
                    accepted: false,
                    message: e.to_string(),
                    snapshot,
                }),
            )
        }
    }
}

async fn status_handler(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Json<StatusResponse> {
    Json(status_of(&state, &id).await)
}

async fn status_default_handler(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    Json(status_of(&state, DEFAULT_RUN).await)
}

async fn status_of(state: &ApiState, id: &str) -> StatusResponse {
    state
        .registry
        .status(id)
        .await
        .map(StatusResponse::from)
        .unwrap_or_else(StatusResponse::unknown)
}

async fn stop_handler(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<StopResponse>) {
    stop_run(&state, &id).await
}

async fn stop_default_handler(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<StopResponse>) {
    stop_run(&state, DEFAULT_RUN).await
}

async fn stop_run(state: &ApiState, id: &str) -> (StatusCode, Json<StopResponse>) {
    match state.registry.stop(id).await {
        Ok(_) => (
            StatusCode::OK,
            Json(StopResponse {
                accepted: true,
                message: format!("Stop requested for {}", id),
            }),
        ),
        Err(e) => (
            error_status(&e),
            Json(StopResponse {
                accepted: false,
                message: e.to_string(),
            }),
        ),
    }
}

async fn list_handler(State(state): State<Arc<ApiState>>) -> Json<Vec<RunSummary>> {
    let runs = state
        .registry
        .list()
        .await
        .into_iter()
        .map(|(id, snapshot)| RunSummary {
            id,
            status: snapshot.into(),
        })
        .collect();
    Json(runs)
}

async fn balance_handler(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let coin = query.coin.unwrap_or_else(|| "USDT".to_string()).to_uppercase();
    let balance = state
        .registry
        .gateway()
        .get_account_balance(&coin)
        .await
        .map_err(|e| to_error_response(e.into()))?;

    Ok(Json(BalanceResponse { coin, balance }))
}

async fn price_handler(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<PriceQuery>,
) -> Result<Json<PriceResponse>, ApiError> {
    let pair = query.symbol.unwrap_or_else(|| "BTCUSDT".to_string()).to_uppercase();
    let symbol = Symbol::from_pair(&pair).map_err(|e| to_error_response(e.into()))?;
    let price = state
        .registry
        .gateway()
        .get_price(&symbol)
        .await
        .map_err(|e| to_error_response(e.into()))?;

    Ok(Json(PriceResponse {
        symbol: symbol.as_pair(),
        price: price.as_decimal(),
    }))
}

// =============================================================================
// Helpers
// =============================================================================

fn error_status(error: &DaemonError) -> StatusCode {
    match error {
        DaemonError::RunNotFound(_) => StatusCode::NOT_FOUND,
        DaemonError::RunAlreadyActive(_) | DaemonError::SymbolBusy { .. } => StatusCode::CONFLICT,
        DaemonError::InvalidRequest(_) | DaemonError::Domain(_) => StatusCode::BAD_REQUEST,
        DaemonError::Exec(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn to_error_response(error: DaemonError) -> ApiError {
    (
        error_status(&error),
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

// =============================================================================
// Tests
// =============================================================================

//! Bybit v5 REST API Client for Linear Futures
//!
//! Provides REST API integration for:
//! - Tickers, klines and instrument filters (public)
//! - Market/limit orders, cancellation, position stop-loss (signed)
//! - Position size and wallet balance queries (signed)
//!
//! # Authentication
//!
//! Bybit v5 signs `timestamp + api_key + recv_window + payload` with
//! HMAC SHA256, where payload is the query string for GET and the JSON body
//! for POST. The signature travels in `X-BAPI-*` headers.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info};

use goldentime_domain::{
    ApiCredentials, Exchange, OrderSide, Price, Quantity, Symbol, TriggerReference,
};
use goldentime_exec::{ExchangeGateway, ExecError, ExecResult, ExtremeKind, PlacedOrder};

// =============================================================================
// Constants
// =============================================================================

/// Default request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Signature validity window in milliseconds
const RECV_WINDOW: &str = "5000";

/// Product category for USDT/USDC perpetuals
const CATEGORY: &str = "linear";

/// Order id prefix for position-attached stop-losses (the venue assigns none)
const TRADING_STOP_PREFIX: &str = "trading-stop:";

/// "Order does not exist or is already filled/cancelled"
const RET_ORDER_NOT_EXISTS: i64 = 110001;

/// "Not modified"
const RET_NOT_MODIFIED: i64 = 34040;

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur in the Bybit REST client.
#[derive(Debug, Clone, Error)]
pub enum BybitRestError {
    /// Failed to build request signature
    #[error("Failed to build signature: {0}")]
    SignatureError(String),

    /// Signed endpoint called without credentials
    #[error("Missing API credentials")]
    MissingCredentials,

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// API returned a non-zero retCode
    #[error("Bybit API error: {code} - {msg}")]
    ApiError { code: i64, msg: String },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,
}

impl From<BybitRestError> for ExecError {
    fn from(err: BybitRestError) -> Self {
        match err {
            BybitRestError::Timeout => ExecError::Timeout(err.to_string()),
            BybitRestError::ParseError(_) => ExecError::InvalidResponse(err.to_string()),
            BybitRestError::MissingCredentials | BybitRestError::SignatureError(_) => {
                ExecError::Config(err.to_string())
            }
            _ => ExecError::Exchange(err.to_string()),
        }
    }
}

// =============================================================================
// Bybit REST Client
// =============================================================================

/// Price and lot filters for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentFilters {
    pub tick_size: Decimal,
    pub min_order_qty: Decimal,
    pub qty_step: Decimal,
}

/// Bybit v5 REST client. One instance per venue session.
pub struct BybitRestClient {
    /// HTTP client
    client: Client,
    /// API credentials (public endpoints work without)
    credentials: Option<ApiCredentials>,
    /// Production or testnet
    exchange: Exchange,
    /// Per-request timeout
    request_timeout: Duration,
    /// Instrument filters never change during a session
    instruments: RwLock<HashMap<String, InstrumentFilters>>,
}

impl BybitRestClient {
    /// Create a client for `exchange`.
    pub fn new(credentials: Option<ApiCredentials>, exchange: Exchange) -> Self {
        Self {
            client: Client::new(),
            credentials,
            exchange,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            instruments: RwLock::new(HashMap::new()),
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Get the base URL for API requests.
    fn base_url(&self) -> &'static str {
        self.exchange.base_url()
    }

    /// Sign `timestamp + api_key + recv_window + payload`.
    fn sign(secret: &str, timestamp: &str, api_key: &str, payload: &str) -> Result<String, BybitRestError> {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        type HmacSha256 = Hmac<Sha256>;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| BybitRestError::SignatureError(format!("HMAC error: {}", e)))?;

        mac.update(timestamp.as_bytes());
        mac.update(api_key.as_bytes());
        mac.update(RECV_WINDOW.as_bytes());
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Headers for a signed request over `payload`.
    fn auth_headers(&self, payload: &str) -> Result<Vec<(&'static str, String)>, BybitRestError> {
        let credentials = self.credentials.as_ref().ok_or(BybitRestError::MissingCredentials)?;
        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = Self::sign(&credentials.api_secret, &timestamp, &credentials.api_key, payload)?;

        Ok(vec![
            ("X-BAPI-API-KEY", credentials.api_key.clone()),
            ("X-BAPI-TIMESTAMP", timestamp),
            ("X-BAPI-RECV-WINDOW", RECV_WINDOW.to_string()),
            ("X-BAPI-SIGN", signature),
        ])
    }

    /// Send a request and read the body, bounded by the request timeout.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, BybitRestError> {
        let response = timeout(self.request_timeout, request.send())
            .await
            .map_err(|_| BybitRestError::Timeout)?
            .map_err(|e| BybitRestError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| BybitRestError::ParseError(e.to_string()))?;

        if !status.is_success() {
            return Err(BybitRestError::RequestFailed(format!("HTTP {}: {}", status, body)));
        }
        Ok(body)
    }

    /// GET a public endpoint.
    async fn get_public<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, BybitRestError> {
        let query = encode_query(params);
        let url = format!("{}{}?{}", self.base_url(), endpoint, query);
        let body = self.send(self.client.get(&url)).await?;
        parse_envelope(&body)
    }

    /// GET a signed endpoint.
    async fn get_signed<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, BybitRestError> {
        let query = encode_query(params);
        let url = format!("{}{}?{}", self.base_url(), endpoint, query);

        let mut request = self.client.get(&url);
        for (name, value) in self.auth_headers(&query)? {
            request = request.header(name, value);
        }
        let body = self.send(request).await?;
        parse_envelope(&body)
    }

    /// POST a JSON body to a signed endpoint.
    async fn post_signed<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        payload: Value,
    ) -> Result<T, BybitRestError> {
        let body = payload.to_string();
        let url = format!("{}{}", self.base_url(), endpoint);

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(body.clone());
        for (name, value) in self.auth_headers(&body)? {
            request = request.header(name, value);
        }
        let body = self.send(request).await?;
        parse_envelope(&body)
    }

    // =========================================================================
    // Market API
    // =========================================================================

    /// Last traded price.
    ///
    /// `GET /v5/market/tickers`
    pub async fn last_price(&self, symbol: &str) -> Result<Decimal, BybitRestError> {
        let params = [("category", CATEGORY.to_string()), ("symbol", symbol.to_string())];
        let result: ListResult<TickerInfo> = self.get_public("/v5/market/tickers", &params).await?;

        let ticker = result
            .list
            .into_iter()
            .next()
            .ok_or_else(|| BybitRestError::ParseError(format!("no ticker for {}", symbol)))?;
        parse_decimal("lastPrice", &ticker.last_price)
    }

    /// Lows or highs of the `count` most recent completed candles, oldest first.
    ///
    /// `GET /v5/market/kline`
    pub async fn candle_extrema(
        &self,
        symbol: &str,
        interval: &str,
        count: usize,
        kind: ExtremeKind,
    ) -> Result<Vec<Decimal>, BybitRestError> {
        // One extra: the venue always includes the forming candle
        let params = [
            ("category", CATEGORY.to_string()),
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", (count + 1).to_string()),
        ];
        let result: ListResult<Vec<String>> = self.get_public("/v5/market/kline", &params).await?;
        completed_extrema(result.list, count, kind)
    }

    /// Instrument filters, cached per symbol.
    ///
    /// `GET /v5/market/instruments-info`
    pub async fn instrument_filters(&self, symbol: &str) -> Result<InstrumentFilters, BybitRestError> {
        let cached = self
            .instruments
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(symbol)
            .copied();
        if let Some(filters) = cached {
            return Ok(filters);
        }

        let params = [("category", CATEGORY.to_string()), ("symbol", symbol.to_string())];
        let result: ListResult<InstrumentInfo> =
            self.get_public("/v5/market/instruments-info", &params).await?;

        let info = result
            .list
            .into_iter()
            .next()
            .ok_or_else(|| BybitRestError::ParseError(format!("unknown instrument {}", symbol)))?;
        let filters = InstrumentFilters {
            tick_size: parse_decimal("tickSize", &info.price_filter.tick_size)?,
            min_order_qty: parse_decimal("minOrderQty", &info.lot_size_filter.min_order_qty)?,
            qty_step: parse_decimal("qtyStep", &info.lot_size_filter.qty_step)?,
        };

        debug!(symbol, ?filters, "Instrument filters loaded");
        self.instruments
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(symbol.to_string(), filters);
        Ok(filters)
    }

    // =========================================================================
    // Order API
    // =========================================================================

    /// Place an order.
    ///
    /// `POST /v5/order/create`
    pub async fn create_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        limit_price: Option<Decimal>,
        reduce_only: bool,
    ) -> Result<String, BybitRestError> {
        let order_type = if limit_price.is_some() { "Limit" } else { "Market" };
        let mut payload = json!({
            "category": CATEGORY,
            "symbol": symbol,
            "side": side.to_string(),
            "orderType": order_type,
            "qty": quantity.normalize().to_string(),
            "reduceOnly": reduce_only,
        });
        if let Some(price) = limit_price {
            payload["price"] = json!(price.normalize().to_string());
            payload["timeInForce"] = json!("GTC");
        }

        let result: OrderAck = self.post_signed("/v5/order/create", payload).await?;
        info!(symbol, %side, %quantity, reduce_only, order_id = %result.order_id, "Bybit order accepted");
        Ok(result.order_id)
    }

    /// Cancel an order. Unknown or already-closed ids succeed.
    ///
    /// `POST /v5/order/cancel`
    pub async fn cancel(&self, symbol: &str, order_id: &str) -> Result<(), BybitRestError> {
        let payload = json!({ "category": CATEGORY, "symbol": symbol, "orderId": order_id });

        match self.post_signed::<Value>("/v5/order/cancel", payload).await {
            Ok(_) => Ok(()),
            Err(BybitRestError::ApiError { code: RET_ORDER_NOT_EXISTS, .. }) => {
                debug!(symbol, order_id, "Cancel: order already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Set (or clear, with `"0"`) the position stop-loss.
    ///
    /// `POST /v5/position/trading-stop`
    pub async fn set_stop_loss(
        &self,
        symbol: &str,
        stop_loss: &str,
        trigger: TriggerReference,
    ) -> Result<(), BybitRestError> {
        let payload = json!({
            "category": CATEGORY,
            "symbol": symbol,
            "stopLoss": stop_loss,
            "slTriggerBy": trigger.as_str(),
            "tpslMode": "Full",
            "positionIdx": 0,
        });
        self.post_signed::<Value>("/v5/position/trading-stop", payload).await?;
        Ok(())
    }

    // =========================================================================
    // Account API
    // =========================================================================

    /// Absolute open position size.
    ///
    /// `GET /v5/position/list`
    pub async fn position_size(&self, symbol: &str) -> Result<Decimal, BybitRestError> {
        let params = [("category", CATEGORY.to_string()), ("symbol", symbol.to_string())];
        let result: ListResult<PositionInfo> = self.get_signed("/v5/position/list", &params).await?;

        result.list.iter().try_fold(Decimal::ZERO, |total, position| {
            Ok(total + parse_decimal("size", &position.size)?.abs())
        })
    }

    /// Unified account total equity.
    ///
    /// `GET /v5/account/wallet-balance`
    pub async fn wallet_equity(&self, coin: &str) -> Result<Decimal, BybitRestError> {
        let params = [("accountType", "UNIFIED".to_string()), ("coin", coin.to_string())];
        let result: ListResult<WalletInfo> =
            self.get_signed("/v5/account/wallet-balance", &params).await?;

        let wallet = result
            .list
            .into_iter()
            .next()
            .ok_or_else(|| BybitRestError::ParseError("empty wallet list".to_string()))?;
        parse_decimal("totalEquity", &wallet.total_equity)
    }
}

// =============================================================================
// ExchangeGateway
// =============================================================================

#[async_trait]
impl ExchangeGateway for BybitRestClient {
    async fn get_price(&self, symbol: &Symbol) -> ExecResult<Price> {
        let price = self.last_price(&symbol.as_pair()).await?;
        Ok(Price::new(price)?)
    }

    async fn get_recent_candle_extrema(
        &self,
        symbol: &Symbol,
        interval: &str,
        count: usize,
        kind: ExtremeKind,
    ) -> ExecResult<Vec<Price>> {
        let values = self.candle_extrema(&symbol.as_pair(), interval, count, kind).await?;
        values
            .into_iter()
            .map(|value| Price::new(value).map_err(ExecError::from))
            .collect()
    }

    async fn get_tick_size(&self, symbol: &Symbol) -> ExecResult<Price> {
        let filters = self.instrument_filters(&symbol.as_pair()).await?;
        Ok(Price::new(filters.tick_size)?)
    }

    async fn get_min_order_quantity(&self, symbol: &Symbol) -> ExecResult<Decimal> {
        Ok(self.instrument_filters(&symbol.as_pair()).await?.min_order_qty)
    }

    async fn get_quantity_step(&self, symbol: &Symbol) -> ExecResult<Decimal> {
        Ok(self.instrument_filters(&symbol.as_pair()).await?.qty_step)
    }

    async fn submit_market_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Quantity,
        reduce_only: bool,
    ) -> ExecResult<PlacedOrder> {
        let order_id = self
            .create_order(&symbol.as_pair(), side, quantity.as_decimal(), None, reduce_only)
            .await?;
        Ok(PlacedOrder::resting(order_id))
    }

    async fn submit_limit_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Quantity,
        price: Price,
        reduce_only: bool,
    ) -> ExecResult<PlacedOrder> {
        let order_id = self
            .create_order(
                &symbol.as_pair(),
                side,
                quantity.as_decimal(),
                Some(price.as_decimal()),
                reduce_only,
            )
            .await?;
        Ok(PlacedOrder::resting(order_id))
    }

    async fn submit_protective_stop(
        &self,
        symbol: &Symbol,
        stop_price: Price,
        trigger: TriggerReference,
    ) -> ExecResult<PlacedOrder> {
        let pair = symbol.as_pair();
        self.set_stop_loss(&pair, &stop_price.to_string(), trigger).await?;
        Ok(PlacedOrder::resting(format!("{}{}", TRADING_STOP_PREFIX, pair)))
    }

    async fn cancel_order(&self, symbol: &Symbol, order_id: &str) -> ExecResult<()> {
        let pair = symbol.as_pair();
        if order_id.starts_with(TRADING_STOP_PREFIX) {
            return match self.set_stop_loss(&pair, "0", TriggerReference::default()).await {
                Ok(()) => Ok(()),
                // Position already flat or stop already cleared
                Err(BybitRestError::ApiError { code, ref msg })
                    if code == RET_NOT_MODIFIED || msg.to_lowercase().contains("zero position") =>
                {
                    Ok(())
                }
                Err(e) => Err(e.into()),
            };
        }
        Ok(self.cancel(&pair, order_id).await?)
    }

    async fn get_open_position_size(&self, symbol: &Symbol) -> ExecResult<Decimal> {
        Ok(self.position_size(&symbol.as_pair()).await?)
    }

    async fn get_account_balance(&self, coin: &str) -> ExecResult<Decimal> {
        Ok(self.wallet_equity(&coin.to_uppercase()).await?)
    }
}

// =============================================================================
// Bybit Types (from API responses)
// =============================================================================

/// Envelope shared by every v5 response.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg", default)]
    ret_msg: String,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct ListResult<T> {
    #[serde(default = "Vec::new")]
    list: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TickerInfo {
    #[serde(rename = "lastPrice")]
    last_price: String,
}

#[derive(Debug, Deserialize)]
struct InstrumentInfo {
    #[serde(rename = "priceFilter")]
    price_filter: PriceFilter,
    #[serde(rename = "lotSizeFilter")]
    lot_size_filter: LotSizeFilterInfo,
}

#[derive(Debug, Deserialize)]
struct PriceFilter {
    #[serde(rename = "tickSize")]
    tick_size: String,
}

#[derive(Debug, Deserialize)]
struct LotSizeFilterInfo {
    #[serde(rename = "minOrderQty")]
    min_order_qty: String,
    #[serde(rename = "qtyStep")]
    qty_step: String,
}

#[derive(Debug, Deserialize)]
struct OrderAck {
    #[serde(rename = "orderId")]
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct PositionInfo {
    size: String,
}

#[derive(Debug, Deserialize)]
struct WalletInfo {
    #[serde(rename = "totalEquity")]
    total_equity: String,
}

// =============================================================================
// Parsing helpers
// =============================================================================

fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Check `retCode` and decode `result`.
fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<T, BybitRestError> {
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| BybitRestError::ParseError(e.to_string()))?;

    if envelope.ret_code != 0 {
        return Err(BybitRestError::ApiError {
            code: envelope.ret_code,
            msg: envelope.ret_msg,
        });
    }
    serde_json::from_value(envelope.result).map_err(|e| BybitRestError::ParseError(e.to_string()))
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, BybitRestError> {
    Decimal::from_str(raw.trim())
        .map_err(|e| BybitRestError::ParseError(format!("{} = {:?}: {}", field, raw, e)))
}

/// Kline rows are `[start, open, high, low, close, volume, turnover]`, newest
/// first. Sort oldest first, drop the forming candle, keep the last `count`.
fn completed_extrema(
    rows: Vec<Vec<String>>,
    count: usize,
    kind: ExtremeKind,
) -> Result<Vec<Decimal>, BybitRestError> {
    let column = match kind {
        ExtremeKind::Highs => 2,
        ExtremeKind::Lows => 3,
    };

    let mut candles = rows
        .iter()
        .map(|row| {
            let start = row
                .first()
                .ok_or_else(|| BybitRestError::ParseError("empty kline row".to_string()))?;
            let start: i64 = start
                .parse()
                .map_err(|_| BybitRestError::ParseError(format!("kline start {:?}", start)))?;
            let value = row
                .get(column)
                .ok_or_else(|| BybitRestError::ParseError("short kline row".to_string()))?;
            Ok((start, parse_decimal("kline", value)?))
        })
        .collect::<Result<Vec<(i64, Decimal)>, BybitRestError>>()?;

    candles.sort_by_key(|(start, _)| *start);
    candles.pop();

    let skip = candles.len().saturating_sub(count);
    Ok(candles.into_iter().skip(skip).map(|(_, value)| value).collect())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_client_is_an_exchange_gateway() {
        let gateway: std::sync::Arc<dyn ExchangeGateway> =
            std::sync::Arc::new(BybitRestClient::new(None, Exchange::BybitTestnet));
        assert_eq!(std::sync::Arc::strong_count(&gateway), 1);
    }

    #[test]
    fn test_sign_get_payload() {
        let signature = BybitRestClient::sign(
            "test-secret",
            "1700000000000",
            "test-key",
            "category=linear&symbol=BTCUSDT",
        )
        .unwrap();
        assert_eq!(
            signature,
            "9a7c8cfd6ba1a7c498aa4dd5a7f9cfbba01fcb6eebae734ffe0d775870a1a3fb"
        );
    }

    #[test]
    fn test_sign_post_payload() {
        let signature = BybitRestClient::sign(
            "test-secret",
            "1700000000000",
            "test-key",
            r#"{"category":"linear","symbol":"BTCUSDT"}"#,
        )
        .unwrap();
        assert_eq!(
            signature,
            "16378a8ca3caa3c068e2e74ef209dad5c036fec4047c7582ddcfcf13323a8275"
        );
    }

    #[test]
    fn test_signed_request_requires_credentials() {
        let client = BybitRestClient::new(None, Exchange::BybitTestnet);
        assert!(matches!(
            client.auth_headers("category=linear"),
            Err(BybitRestError::MissingCredentials)
        ));
    }

    #[test]
    fn test_auth_headers_carry_key() {
        let client = BybitRestClient::new(
            Some(ApiCredentials::new("key-1", "secret-1")),
            Exchange::BybitTestnet,
        );
        let headers = client.auth_headers("category=linear").unwrap();
        let names: Vec<&str> = headers.iter().map(|(name, _)| *name).collect();

        assert_eq!(
            names,
            vec!["X-BAPI-API-KEY", "X-BAPI-TIMESTAMP", "X-BAPI-RECV-WINDOW", "X-BAPI-SIGN"]
        );
        assert_eq!(headers[0].1, "key-1");
        assert_eq!(headers[2].1, "5000");
    }

    #[test]
    fn test_envelope_error_code() {
        let body = r#"{"retCode":110001,"retMsg":"order not exists or too late to cancel","result":{}}"#;
        let result: Result<Value, _> = parse_envelope(body);
        assert!(matches!(result, Err(BybitRestError::ApiError { code: 110001, .. })));
    }

    #[test]
    fn test_envelope_ticker() {
        let body = r#"{"retCode":0,"retMsg":"OK","result":{"category":"linear","list":[{"symbol":"BTCUSDT","lastPrice":"64250.50"}]}}"#;
        let result: ListResult<TickerInfo> = parse_envelope(body).unwrap();
        assert_eq!(parse_decimal("lastPrice", &result.list[0].last_price).unwrap(), dec!(64250.50));
    }

    #[test]
    fn test_completed_extrema_drops_forming_candle() {
        // Newest first, as the venue returns them
        let rows = vec![
            vec!["400", "0", "110", "99", "0", "0", "0"],
            vec!["300", "0", "108", "97", "0", "0", "0"],
            vec!["200", "0", "107", "96", "0", "0", "0"],
            vec!["100", "0", "105", "95", "0", "0", "0"],
        ]
        .into_iter()
        .map(|row| row.into_iter().map(String::from).collect())
        .collect::<Vec<Vec<String>>>();

        let lows = completed_extrema(rows.clone(), 5, ExtremeKind::Lows).unwrap();
        assert_eq!(lows, vec![dec!(95), dec!(96), dec!(97)]);

        let highs = completed_extrema(rows, 2, ExtremeKind::Highs).unwrap();
        assert_eq!(highs, vec![dec!(107), dec!(108)]);
    }

    #[test]
    fn test_exec_error_mapping() {
        assert!(matches!(ExecError::from(BybitRestError::Timeout), ExecError::Timeout(_)));
        assert!(matches!(
            ExecError::from(BybitRestError::MissingCredentials),
            ExecError::Config(_)
        ));
        assert!(matches!(
            ExecError::from(BybitRestError::ApiError { code: 10001, msg: "bad".into() }),
            ExecError::Exchange(_)
        ));
    }

    #[test]
    fn test_base_url_follows_environment() {
        let client = BybitRestClient::new(None, Exchange::Bybit);
        assert_eq!(client.base_url(), "https://api.bybit.com");
    }
}

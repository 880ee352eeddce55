//! Binance USDT-M futures client for market data, account state and order placement.
//!
//! This client handles:
//! - HMAC-SHA256 request signing (`X-MBX-APIKEY` header + `signature` param)
//! - Exchange rule caching from /fapi/v1/exchangeInfo
//! - Retrying idempotent GETs with exponential backoff
//! - Market orders (never retried)

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::models::{Candle, ExchangePosition, OrderResult, OrderSide, SymbolRules};

use super::types::*;
use super::Exchange;

/// Production USDT-M futures endpoint.
pub const FUTURES_API_BASE: &str = "https://fapi.binance.com";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const RECV_WINDOW_MS: u64 = 5000;
const RULES_TTL: Duration = Duration::from_secs(15 * 60);
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(8);

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
struct Credentials {
    api_key: String,
    api_secret: String,
}

#[derive(Default)]
struct RulesCache {
    rules: HashMap<String, SymbolRules>,
    loaded_at: Option<Instant>,
}

impl RulesCache {
    fn is_fresh(&self) -> bool {
        self.loaded_at.is_some_and(|t| t.elapsed() < RULES_TTL)
    }
}

/// Client for the Binance USDT-M futures REST API.
pub struct BinanceFutures {
    http: Client,
    base_url: String,
    credentials: Option<Credentials>,
    rules_cache: RwLock<RulesCache>,
}

impl BinanceFutures {
    /// Create a new client. Without credentials only public endpoints work.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, api_secret: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        let credentials = match (api_key, api_secret) {
            (Some(api_key), Some(api_secret)) if !api_key.is_empty() && !api_secret.is_empty() => {
                Some(Credentials { api_key, api_secret })
            }
            _ => None,
        };

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            rules_cache: RwLock::new(RulesCache::default()),
        })
    }

    /// Market-data-only client against production.
    pub fn public() -> Result<Self> {
        Self::new(FUTURES_API_BASE, None, None)
    }

    /// Create from environment variables:
    /// - BINANCE_API_KEY
    /// - BINANCE_API_SECRET
    /// - BINANCE_FUTURES_URL (defaults to production)
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("BINANCE_API_KEY").context("BINANCE_API_KEY not set")?;
        let api_secret = std::env::var("BINANCE_API_SECRET").context("BINANCE_API_SECRET not set")?;
        let base_url = std::env::var("BINANCE_FUTURES_URL").unwrap_or_else(|_| FUTURES_API_BASE.to_string());

        let client = Self::new(base_url, Some(api_key), Some(api_secret))?;
        if !client.has_credentials() {
            anyhow::bail!("BINANCE_API_KEY / BINANCE_API_SECRET are empty");
        }
        Ok(client)
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Build `query&signature=...` for a signed endpoint.
    fn signed_query(&self, params: &[(&str, String)]) -> Result<(String, String)> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| anyhow!("API credentials required for signed requests"))?;

        let mut all: Vec<(&str, String)> = params.to_vec();
        all.push(("recvWindow", RECV_WINDOW_MS.to_string()));
        all.push(("timestamp", Utc::now().timestamp_millis().to_string()));

        let query = serde_urlencoded::to_string(&all).context("Failed to encode query")?;
        let signature = sign(&creds.api_secret, &query)?;

        Ok((format!("{}&signature={}", query, signature), creds.api_key.clone()))
    }

    /// GET a public endpoint, retrying transient failures.
    async fn get_public<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let query = serde_urlencoded::to_string(params).context("Failed to encode query")?;
        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };
        debug!(url = %url, "GET");

        let http = &self.http;
        let url = &url;
        backoff::future::retry(retry_policy(), || async move {
            let response = http
                .get(url.as_str())
                .send()
                .await
                .map_err(|e| backoff::Error::transient(anyhow!(e).context(format!("GET {} failed", path))))?;
            decode_response(response, path).await
        })
        .await
    }

    /// GET a signed endpoint, re-signing on every attempt.
    async fn get_signed<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        backoff::future::retry(retry_policy(), || async move {
            let (query, api_key) = self.signed_query(params).map_err(backoff::Error::permanent)?;
            let url = format!("{}{}?{}", self.base_url, path, query);

            let response = self
                .http
                .get(&url)
                .header("X-MBX-APIKEY", api_key)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(anyhow!(e).context(format!("GET {} failed", path))))?;
            decode_response(response, path).await
        })
        .await
    }

    /// POST a signed endpoint exactly once.
    async fn post_signed<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let (query, api_key) = self.signed_query(params)?;
        let url = format!("{}{}?{}", self.base_url, path, query);

        let response = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", api_key)
            .send()
            .await
            .with_context(|| format!("POST {} failed", path))?;

        decode_response(response, path).await.map_err(|e| match e {
            backoff::Error::Permanent(err) => err,
            backoff::Error::Transient { err, .. } => err,
        })
    }

    /// Reload every symbol's rules from exchangeInfo.
    pub async fn refresh_rules(&self) -> Result<usize> {
        let info: ExchangeInfo = self.get_public("/fapi/v1/exchangeInfo", &[]).await?;

        let rules: HashMap<String, SymbolRules> = info
            .symbols
            .iter()
            .filter(|s| s.is_trading())
            .map(|s| (s.symbol.clone(), s.to_rules()))
            .collect();
        let count = rules.len();

        let mut cache = self.rules_cache.write().await;
        cache.rules = rules;
        cache.loaded_at = Some(Instant::now());

        info!(symbols = count, "Exchange rules refreshed");
        Ok(count)
    }
}

#[async_trait]
impl Exchange for BinanceFutures {
    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules> {
        {
            let cache = self.rules_cache.read().await;
            if cache.is_fresh() {
                return cache
                    .rules
                    .get(symbol)
                    .cloned()
                    .ok_or_else(|| anyhow!("No trading rules for {}", symbol));
            }
        }

        self.refresh_rules().await?;

        let cache = self.rules_cache.read().await;
        cache
            .rules
            .get(symbol)
            .cloned()
            .ok_or_else(|| anyhow!("No trading rules for {}", symbol))
    }

    async fn price(&self, symbol: &str) -> Result<Decimal> {
        let ticker: TickerPrice = self
            .get_public("/fapi/v1/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        Ok(ticker.price)
    }

    async fn equity(&self) -> Result<Decimal> {
        let account: AccountInfo = self.get_signed("/fapi/v2/account", &[]).await?;
        Ok(account.total_margin_balance)
    }

    async fn position(&self, symbol: &str) -> Result<ExchangePosition> {
        let items: Vec<PositionRisk> = self
            .get_signed("/fapi/v2/positionRisk", &[("symbol", symbol.to_string())])
            .await?;

        // Hedge mode reports LONG and SHORT legs separately; net them.
        let mut position = ExchangePosition::flat();
        for item in items.iter().filter(|p| p.symbol == symbol) {
            position.quantity += item.position_amt;
            if !item.position_amt.is_zero() {
                position.entry_price = item.entry_price;
            }
        }
        Ok(position)
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        reduce_only: bool,
    ) -> Result<OrderResult> {
        if quantity <= Decimal::ZERO {
            anyhow::bail!("Refusing to place order with quantity {}", quantity);
        }

        let client_order_id = format!("pyr-{}", uuid::Uuid::new_v4().simple());
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", quantity.normalize().to_string()),
            ("newClientOrderId", client_order_id.clone()),
            ("newOrderRespType", "RESULT".to_string()),
        ];
        if reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }

        let ack: OrderAck = self.post_signed("/fapi/v1/order", &params).await?;

        info!(
            symbol = %symbol,
            side = side.as_str(),
            qty = %quantity,
            order_id = ack.order_id,
            status = %ack.status,
            avg_price = %ack.avg_price,
            "Order placed"
        );

        Ok(OrderResult {
            order_id: ack.order_id.to_string(),
            client_order_id: if ack.client_order_id.is_empty() {
                client_order_id
            } else {
                ack.client_order_id
            },
            status: ack.status,
            executed_qty: ack.executed_qty,
            avg_price: ack.avg_price,
        })
    }

    async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let raw: Vec<serde_json::Value> = self
            .get_public(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.min(1500).to_string()),
                ],
            )
            .await?;
        Ok(parse_klines(&raw))
    }

    async fn quote_volume_24h(&self, symbol: &str) -> Result<Decimal> {
        let ticker: Ticker24h = self
            .get_public("/fapi/v1/ticker/24hr", &[("symbol", symbol.to_string())])
            .await?;
        Ok(ticker.quote_volume)
    }

    async fn funding_rate(&self, symbol: &str) -> Result<Decimal> {
        let index: PremiumIndex = self
            .get_public("/fapi/v1/premiumIndex", &[("symbol", symbol.to_string())])
            .await?;
        Ok(index.last_funding_rate)
    }

    fn name(&self) -> &'static str {
        "binance-futures"
    }
}

fn retry_policy() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(250),
        max_elapsed_time: Some(MAX_RETRY_ELAPSED),
        ..Default::default()
    }
}

/// Hex HMAC-SHA256 of `payload`.
fn sign(secret: &str, payload: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow!("failed to init signer: {}", e))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Turn a response into `T`; 5xx and 429 are transient, everything else permanent.
async fn decode_response<T: DeserializeOwned>(
    response: Response,
    path: &str,
) -> std::result::Result<T, backoff::Error<anyhow::Error>> {
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|e| format!("code {}: {}", e.code, e.msg))
            .unwrap_or(body);
        let err = anyhow!("{} request failed: {} - {}", path, status, detail);

        return if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            warn!(path = %path, status = %status, "Transient API error, retrying");
            Err(backoff::Error::transient(err))
        } else {
            Err(backoff::Error::permanent(err))
        };
    }

    response
        .json::<T>()
        .await
        .with_context(|| format!("Failed to parse {} response", path))
        .map_err(backoff::Error::permanent)
}

/// Parse kline arrays `[openTime, open, high, low, close, volume, ...]`.
fn parse_klines(raw: &[serde_json::Value]) -> Vec<Candle> {
    raw.iter()
        .filter_map(|row| {
            let row = row.as_array()?;
            if row.len() < 6 {
                return None;
            }
            let open_time = Utc.timestamp_millis_opt(row[0].as_i64()?).single()?;
            Some(Candle {
                open_time,
                open: json_f64(&row[1])?,
                high: json_f64(&row[2])?,
                low: json_f64(&row[3])?,
                close: json_f64(&row[4])?,
                volume: json_f64(&row[5])?,
            })
        })
        .collect()
}

fn json_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::String(s) => s.parse().ok(),
        other => other.as_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_matches_reference_vector() {
        // Example from the Binance futures API documentation
        let secret = "2b5eb11e18796d12d88f13dc27dbbd02c2cc51ff7059765ed9821957d82bb4d9";
        let query = "symbol=BTCUSDT&side=BUY&type=LIMIT&quantity=1&price=9000&timeInForce=GTC&recvWindow=5000&timestamp=1591702613943";

        let signature = sign(secret, query).unwrap();
        assert_eq!(
            signature,
            "3c661234138461fcc7a7d8746c6558c9842d4e10870d2ecbedf7777cad694af9"
        );
    }

    #[test]
    fn test_parse_klines() {
        let raw: Vec<serde_json::Value> = serde_json::from_str(
            r#"[
                [1499040000000, "0.01634790", "0.80000000", "0.01575800", "0.01577100", "148976.11427815", 1499644799999, "2434.19", 308, "1756.87", "28.46", "17928899.62"],
                [1499040300000, "0.01577100", "0.01600000", "0.01570000", "0.01590000", "1200.5", 1499040599999, "19.0", 10, "10.0", "0.1", "0"],
                ["bad"]
            ]"#,
        )
        .unwrap();

        let candles = parse_klines(&raw);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].high, 0.8);
        assert_eq!(candles[1].close, 0.0159);
        assert!(candles[0].open_time < candles[1].open_time);
    }

    #[test]
    fn test_signed_query_requires_credentials() {
        let client = BinanceFutures::public().unwrap();
        assert!(!client.has_credentials());
        assert!(client.signed_query(&[("symbol", "BTCUSDT".to_string())]).is_err());
    }

    #[test]
    fn test_signed_query_shape() {
        let client = BinanceFutures::new(
            "https://testnet.binancefuture.com/",
            Some("key".to_string()),
            Some("secret".to_string()),
        )
        .unwrap();

        let (query, api_key) = client.signed_query(&[("symbol", "BTCUSDT".to_string())]).unwrap();
        assert_eq!(api_key, "key");
        assert!(query.starts_with("symbol=BTCUSDT&recvWindow=5000&timestamp="));
        assert!(query.contains("&signature="));
        assert_eq!(client.base_url, "https://testnet.binancefuture.com");
    }
}

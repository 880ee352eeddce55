//! Liquidity and funding screen over the symbol pool.

use anyhow::Result;
use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::Exchange;
use crate::trading::env_parse;

/// Symbols traded when no pool is configured.
pub const DEFAULT_SYMBOL_POOL: &[&str] = &[
    "BTCUSDT",
    "ETHUSDT",
    "SOLUSDT",
    "XRPUSDT",
    "ADAUSDT",
    "DOGEUSDT",
    "LINKUSDT",
    "AVAXUSDT",
    "MATICUSDT",
    "SUIUSDT",
    "SEIUSDT",
    "1000PEPEUSDT",
    "1000BONKUSDT",
];

/// Shortlist thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortlistConfig {
    pub symbol_pool: Vec<String>,

    /// Minimum 24h quote volume in USDT
    pub volume_min_usd: Decimal,

    /// Minimum latest funding rate
    pub funding_rate_min: Decimal,

    /// Maximum symbols returned
    pub max_candidates: usize,
}

impl Default for ShortlistConfig {
    fn default() -> Self {
        Self {
            symbol_pool: DEFAULT_SYMBOL_POOL.iter().map(|s| s.to_string()).collect(),
            volume_min_usd: dec!(30_000_000),
            funding_rate_min: dec!(-0.05),
            max_candidates: 8,
        }
    }
}

impl ShortlistConfig {
    /// Defaults with `SYMBOL_POOL` (comma separated) applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(pool) = env_parse::<String>("SYMBOL_POOL")? {
            let symbols: Vec<String> = pool
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !symbols.is_empty() {
                config.symbol_pool = symbols;
            }
        }
        Ok(config)
    }
}

/// Screen metrics for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMetrics {
    pub symbol: String,
    pub quote_volume: Decimal,
    pub funding_rate: Decimal,
    pub approved: bool,
}

/// Fetch volume and funding for every pool symbol concurrently. A failed
/// fetch counts as zero.
pub async fn fetch_metrics(exchange: &dyn Exchange, config: &ShortlistConfig) -> Vec<SymbolMetrics> {
    let futures = config.symbol_pool.iter().map(|symbol| async move {
        let (volume, funding) = tokio::join!(
            exchange.quote_volume_24h(symbol),
            exchange.funding_rate(symbol)
        );

        let quote_volume = volume.unwrap_or_else(|e| {
            warn!(symbol = %symbol, error = %e, "Failed to fetch 24h volume");
            Decimal::ZERO
        });
        let funding_rate = funding.unwrap_or_else(|e| {
            warn!(symbol = %symbol, error = %e, "Failed to fetch funding rate");
            Decimal::ZERO
        });

        SymbolMetrics {
            symbol: symbol.clone(),
            quote_volume,
            funding_rate,
            approved: funding_rate >= config.funding_rate_min && quote_volume >= config.volume_min_usd,
        }
    });

    join_all(futures).await
}

/// Pick tradable candidates from already fetched metrics.
///
/// Approved symbols in pool order, capped at `max_candidates`. With none
/// approved, fall back to the highest volumes, then to the head of the pool.
pub fn select(metrics: &[SymbolMetrics], config: &ShortlistConfig) -> Vec<String> {
    let approved: Vec<String> = metrics
        .iter()
        .filter(|m| m.approved)
        .take(config.max_candidates)
        .map(|m| m.symbol.clone())
        .collect();
    if !approved.is_empty() {
        return approved;
    }

    let mut by_volume: Vec<&SymbolMetrics> = metrics.iter().filter(|m| m.quote_volume > Decimal::ZERO).collect();
    if !by_volume.is_empty() {
        by_volume.sort_by(|a, b| b.quote_volume.cmp(&a.quote_volume));
        let fallback: Vec<String> = by_volume
            .into_iter()
            .take(config.max_candidates)
            .map(|m| m.symbol.clone())
            .collect();
        info!(symbols = ?fallback, "No symbol passed the screen, using top volume");
        return fallback;
    }

    let head: Vec<String> = config.symbol_pool.iter().take(config.max_candidates).cloned().collect();
    warn!(symbols = ?head, "No volume data, using head of the pool");
    head
}

/// Fetch and select in one step.
pub async fn shortlist(exchange: &dyn Exchange, config: &ShortlistConfig) -> Vec<String> {
    let metrics = fetch_metrics(exchange, config).await;
    let selected = select(&metrics, config);
    debug!(count = selected.len(), pool = config.symbol_pool.len(), "Shortlist built");
    selected
}

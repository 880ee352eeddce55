//! The exchange interface consumed by the trading loop.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::{Candle, ExchangePosition, OrderResult, OrderSide, SymbolRules};

/// Everything the bot needs from a futures venue.
///
/// Implementations own transport concerns (signing, retries, rate limits);
/// callers only ever see `anyhow` errors.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Quantity/price constraints for `symbol`.
    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules>;

    /// Last traded price.
    async fn price(&self, symbol: &str) -> Result<Decimal>;

    /// Account equity in the quote asset, unrealized P&L included.
    async fn equity(&self) -> Result<Decimal>;

    /// Net position for `symbol` (signed quantity).
    async fn position(&self, symbol: &str) -> Result<ExchangePosition>;

    /// Place a market order. Never retried by the implementation.
    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        reduce_only: bool,
    ) -> Result<OrderResult>;

    /// Most recent `limit` candles, oldest first.
    async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>>;

    /// Rolling 24h volume in the quote asset.
    async fn quote_volume_24h(&self, symbol: &str) -> Result<Decimal>;

    /// Latest funding rate.
    async fn funding_rate(&self, symbol: &str) -> Result<Decimal>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

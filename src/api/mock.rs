//! In-memory exchange for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::{Candle, ExchangePosition, OrderResult, OrderSide, SymbolRules};

use super::Exchange;

/// An order the mock received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub reduce_only: bool,
}

#[derive(Default)]
struct MockState {
    prices: HashMap<String, Decimal>,
    rules: HashMap<String, SymbolRules>,
    equity: Decimal,
    positions: HashMap<String, ExchangePosition>,
    klines: HashMap<(String, String), Vec<Candle>>,
    volumes: HashMap<String, Decimal>,
    funding: HashMap<String, Decimal>,
    orders: Vec<RecordedOrder>,
    fail_orders: bool,
    failing_symbols: HashSet<String>,
    hanging_symbols: HashSet<String>,
    order_delay: Option<Duration>,
}

/// Scriptable exchange. Orders fill at the configured price and move the
/// stored position.
pub struct MockExchange {
    state: Mutex<MockState>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                equity: dec!(1000),
                ..Default::default()
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.with_state(|s| s.prices.insert(symbol.to_string(), price));
    }

    pub fn set_rules(&self, symbol: &str, rules: SymbolRules) {
        self.with_state(|s| s.rules.insert(symbol.to_string(), rules));
    }

    pub fn set_equity(&self, equity: Decimal) {
        self.with_state(|s| s.equity = equity);
    }

    pub fn set_position(&self, symbol: &str, quantity: Decimal, entry_price: Decimal) {
        self.with_state(|s| {
            s.positions
                .insert(symbol.to_string(), ExchangePosition { quantity, entry_price })
        });
    }

    pub fn set_klines(&self, symbol: &str, interval: &str, candles: Vec<Candle>) {
        self.with_state(|s| s.klines.insert((symbol.to_string(), interval.to_string()), candles));
    }

    pub fn set_volume(&self, symbol: &str, quote_volume: Decimal) {
        self.with_state(|s| s.volumes.insert(symbol.to_string(), quote_volume));
    }

    pub fn set_funding(&self, symbol: &str, rate: Decimal) {
        self.with_state(|s| s.funding.insert(symbol.to_string(), rate));
    }

    /// Make every subsequent order fail.
    pub fn fail_orders(&self, fail: bool) {
        self.with_state(|s| s.fail_orders = fail);
    }

    /// Make every market-data call for `symbol` fail.
    pub fn fail_symbol(&self, symbol: &str) {
        self.with_state(|s| s.failing_symbols.insert(symbol.to_string()));
    }

    /// Fill orders immediately but hold the acknowledgement for `delay`.
    pub fn delay_orders(&self, delay: Duration) {
        self.with_state(|s| s.order_delay = Some(delay));
    }

    /// Make price requests for `symbol` never complete.
    pub fn hang_symbol(&self, symbol: &str) {
        self.with_state(|s| s.hanging_symbols.insert(symbol.to_string()));
    }

    pub fn orders(&self) -> Vec<RecordedOrder> {
        self.with_state(|s| s.orders.clone())
    }

    fn check_symbol(&self, symbol: &str) -> Result<()> {
        if self.with_state(|s| s.failing_symbols.contains(symbol)) {
            bail!("injected failure for {}", symbol);
        }
        Ok(())
    }
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules> {
        self.check_symbol(symbol)?;
        self.with_state(|s| s.rules.get(symbol).cloned())
            .ok_or_else(|| anyhow!("No trading rules for {}", symbol))
    }

    async fn price(&self, symbol: &str) -> Result<Decimal> {
        if self.with_state(|s| s.hanging_symbols.contains(symbol)) {
            futures::future::pending::<()>().await;
        }
        self.check_symbol(symbol)?;
        self.with_state(|s| s.prices.get(symbol).copied())
            .ok_or_else(|| anyhow!("No price for {}", symbol))
    }

    async fn equity(&self) -> Result<Decimal> {
        Ok(self.with_state(|s| s.equity))
    }

    async fn position(&self, symbol: &str) -> Result<ExchangePosition> {
        self.check_symbol(symbol)?;
        Ok(self.with_state(|s| s.positions.get(symbol).copied().unwrap_or_default()))
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        reduce_only: bool,
    ) -> Result<OrderResult> {
        let result = self.with_state(|s| {
            s.orders.push(RecordedOrder {
                symbol: symbol.to_string(),
                side,
                quantity,
                reduce_only,
            });
            if s.fail_orders {
                bail!("order rejected by mock");
            }

            let price = s.prices.get(symbol).copied().unwrap_or_default();
            let signed = match side {
                OrderSide::Buy => quantity,
                OrderSide::Sell => -quantity,
            };
            let position = s.positions.entry(symbol.to_string()).or_default();
            if position.is_flat() {
                position.entry_price = price;
            }
            position.quantity += signed;
            if position.is_flat() {
                position.entry_price = Decimal::ZERO;
            }

            let id = s.orders.len();
            Ok(OrderResult {
                order_id: id.to_string(),
                client_order_id: format!("mock-{}", id),
                status: "FILLED".to_string(),
                executed_qty: quantity,
                avg_price: price,
            })
        });

        if let Some(delay) = self.with_state(|s| s.order_delay) {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        self.check_symbol(symbol)?;
        let candles = self
            .with_state(|s| s.klines.get(&(symbol.to_string(), interval.to_string())).cloned())
            .unwrap_or_default();
        let skip = candles.len().saturating_sub(limit as usize);
        Ok(candles.into_iter().skip(skip).collect())
    }

    async fn quote_volume_24h(&self, symbol: &str) -> Result<Decimal> {
        self.check_symbol(symbol)?;
        Ok(self.with_state(|s| s.volumes.get(symbol).copied().unwrap_or_default()))
    }

    async fn funding_rate(&self, symbol: &str) -> Result<Decimal> {
        self.check_symbol(symbol)?;
        Ok(self.with_state(|s| s.funding.get(symbol).copied().unwrap_or_default()))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

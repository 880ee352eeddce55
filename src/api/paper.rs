//! Paper trading: live market data, simulated fills and account.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Mutex;
use tracing::info;

use crate::models::{Candle, ExchangePosition, OrderResult, OrderSide, SymbolRules};

use super::Exchange;

/// Taker fee charged on simulated fills.
pub const DEFAULT_FEE_RATE: Decimal = dec!(0.0004);

#[derive(Debug, Default)]
struct PaperBook {
    /// Wallet balance: starting cash plus realized P&L minus fees
    cash: Decimal,
    positions: HashMap<String, ExchangePosition>,
    next_order_id: u64,
    fees_paid: Decimal,
    realized_pnl: Decimal,
}

/// Exchange that reads prices from a live venue and fills market orders
/// locally at the last price.
pub struct PaperExchange {
    market: Arc<dyn Exchange>,
    book: Mutex<PaperBook>,
    fee_rate: Decimal,
}

impl PaperExchange {
    pub fn new(market: Arc<dyn Exchange>, starting_cash: Decimal) -> Self {
        Self {
            market,
            book: Mutex::new(PaperBook {
                cash: starting_cash,
                next_order_id: 1,
                ..Default::default()
            }),
            fee_rate: DEFAULT_FEE_RATE,
        }
    }

    pub fn with_fee_rate(mut self, fee_rate: Decimal) -> Self {
        self.fee_rate = fee_rate;
        self
    }

    /// Realized P&L and fees paid so far, plus equity when prices are available.
    pub async fn summary(&self) -> PaperSummary {
        let (realized_pnl, fees_paid) = {
            let book = self.book.lock().await;
            (book.realized_pnl, book.fees_paid)
        };
        PaperSummary {
            realized_pnl,
            fees_paid,
            equity: self.equity().await.ok(),
        }
    }
}

/// Snapshot of the simulated account.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperSummary {
    pub realized_pnl: Decimal,
    pub fees_paid: Decimal,
    pub equity: Option<Decimal>,
}

impl std::fmt::Display for PaperSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Paper Account ===")?;
        writeln!(f, "Realized P&L:    ${:.2}", self.realized_pnl)?;
        writeln!(f, "Fees Paid:       ${:.2}", self.fees_paid)?;
        if let Some(equity) = self.equity {
            writeln!(f, "Equity:          ${:.2}", equity)?;
        }
        Ok(())
    }
}

/// Apply a signed fill to a position, returning realized P&L.
fn apply_fill(position: &mut ExchangePosition, signed_qty: Decimal, price: Decimal) -> Decimal {
    let current = position.quantity;

    // Opening or adding in the same direction: weighted average entry
    if current.is_zero() || current.is_sign_positive() == signed_qty.is_sign_positive() {
        let new_qty = current + signed_qty;
        let cost = current.abs() * position.entry_price + signed_qty.abs() * price;
        position.entry_price = if new_qty.is_zero() { Decimal::ZERO } else { cost / new_qty.abs() };
        position.quantity = new_qty;
        return Decimal::ZERO;
    }

    // Reducing, closing or flipping
    let closed = signed_qty.abs().min(current.abs());
    let per_unit = if current.is_sign_positive() {
        price - position.entry_price
    } else {
        position.entry_price - price
    };
    let realized = per_unit * closed;

    let new_qty = current + signed_qty;
    if new_qty.is_zero() {
        *position = ExchangePosition::flat();
    } else if new_qty.is_sign_positive() != current.is_sign_positive() {
        position.quantity = new_qty;
        position.entry_price = price;
    } else {
        position.quantity = new_qty;
    }

    realized
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules> {
        self.market.symbol_rules(symbol).await
    }

    async fn price(&self, symbol: &str) -> Result<Decimal> {
        self.market.price(symbol).await
    }

    async fn equity(&self) -> Result<Decimal> {
        let snapshot: Vec<(String, ExchangePosition)> = {
            let book = self.book.lock().await;
            book.positions
                .iter()
                .filter(|(_, p)| !p.is_flat())
                .map(|(s, p)| (s.clone(), *p))
                .collect()
        };

        let mut unrealized = Decimal::ZERO;
        for (symbol, position) in snapshot {
            let price = self.market.price(&symbol).await?;
            unrealized += (price - position.entry_price) * position.quantity;
        }

        let cash = self.book.lock().await.cash;
        Ok(cash + unrealized)
    }

    async fn position(&self, symbol: &str) -> Result<ExchangePosition> {
        let book = self.book.lock().await;
        Ok(book.positions.get(symbol).copied().unwrap_or_default())
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        reduce_only: bool,
    ) -> Result<OrderResult> {
        if quantity <= Decimal::ZERO {
            bail!("Refusing to place order with quantity {}", quantity);
        }
        let price = self.market.price(symbol).await?;
        if price <= Decimal::ZERO {
            bail!("No valid price for {}", symbol);
        }

        let signed_qty = match side {
            OrderSide::Buy => quantity,
            OrderSide::Sell => -quantity,
        };

        let mut book = self.book.lock().await;
        let position = book.positions.entry(symbol.to_string()).or_default();

        if reduce_only {
            let reduces = !position.is_flat()
                && position.quantity.is_sign_positive() != signed_qty.is_sign_positive()
                && quantity <= position.abs_quantity();
            if !reduces {
                bail!(
                    "ReduceOnly order rejected for {}: position {}, order {} {}",
                    symbol,
                    position.quantity,
                    side.as_str(),
                    quantity
                );
            }
        }

        let realized = apply_fill(position, signed_qty, price);
        let fee = quantity * price * self.fee_rate;

        book.cash += realized - fee;
        book.realized_pnl += realized;
        book.fees_paid += fee;
        let order_id = book.next_order_id;
        book.next_order_id += 1;

        info!(
            symbol = %symbol,
            side = side.as_str(),
            qty = %quantity,
            price = %price,
            realized = %realized,
            fee = %fee,
            "[PAPER] Order filled"
        );

        Ok(OrderResult {
            order_id: order_id.to_string(),
            client_order_id: format!("paper-{}", order_id),
            status: "FILLED".to_string(),
            executed_qty: quantity,
            avg_price: price,
        })
    }

    async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        self.market.klines(symbol, interval, limit).await
    }

    async fn quote_volume_24h(&self, symbol: &str) -> Result<Decimal> {
        self.market.quote_volume_24h(symbol).await
    }

    async fn funding_rate(&self, symbol: &str) -> Result<Decimal> {
        self.market.funding_rate(symbol).await
    }

    fn name(&self) -> &'static str {
        "paper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockExchange;

    fn paper(mock: Arc<MockExchange>) -> PaperExchange {
        PaperExchange::new(mock, dec!(1000)).with_fee_rate(Decimal::ZERO)
    }

    #[test]
    fn test_apply_fill_average_and_flip() {
        let mut pos = ExchangePosition::flat();
        assert_eq!(apply_fill(&mut pos, dec!(1), dec!(100)), Decimal::ZERO);
        assert_eq!(apply_fill(&mut pos, dec!(1), dec!(110)), Decimal::ZERO);
        assert_eq!(pos.quantity, dec!(2));
        assert_eq!(pos.entry_price, dec!(105));

        // sell 3: close 2 at +15 each, flip to short 1 at 120
        let realized = apply_fill(&mut pos, dec!(-3), dec!(120));
        assert_eq!(realized, dec!(30));
        assert_eq!(pos.quantity, dec!(-1));
        assert_eq!(pos.entry_price, dec!(120));

        let realized = apply_fill(&mut pos, dec!(1), dec!(100));
        assert_eq!(realized, dec!(20));
        assert!(pos.is_flat());
    }

    #[tokio::test]
    async fn test_paper_round_trip_updates_equity() {
        let mock = Arc::new(MockExchange::new());
        mock.set_price("BTCUSDT", dec!(100));
        let exchange = paper(mock.clone());

        exchange
            .place_market_order("BTCUSDT", OrderSide::Buy, dec!(2), false)
            .await
            .unwrap();
        assert_eq!(exchange.position("BTCUSDT").await.unwrap().quantity, dec!(2));

        mock.set_price("BTCUSDT", dec!(110));
        assert_eq!(exchange.equity().await.unwrap(), dec!(1020));

        exchange
            .place_market_order("BTCUSDT", OrderSide::Sell, dec!(2), true)
            .await
            .unwrap();
        assert!(exchange.position("BTCUSDT").await.unwrap().is_flat());
        assert_eq!(exchange.equity().await.unwrap(), dec!(1020));
        let summary = exchange.summary().await;
        assert_eq!(summary.realized_pnl, dec!(20));

        let rendered = summary.to_string();
        assert!(rendered.starts_with("=== Paper Account ===\n"));
        assert!(rendered.contains("Realized P&L:    $20.00"));
    }

    #[tokio::test]
    async fn test_reduce_only_rejected_without_position() {
        let mock = Arc::new(MockExchange::new());
        mock.set_price("ETHUSDT", dec!(2000));
        let exchange = paper(mock);

        let result = exchange
            .place_market_order("ETHUSDT", OrderSide::Sell, dec!(1), true)
            .await;
        assert!(result.is_err());
        assert!(exchange.position("ETHUSDT").await.unwrap().is_flat());
    }

    #[tokio::test]
    async fn test_fees_reduce_cash() {
        let mock = Arc::new(MockExchange::new());
        mock.set_price("BTCUSDT", dec!(100));
        let exchange = PaperExchange::new(mock, dec!(1000));

        exchange
            .place_market_order("BTCUSDT", OrderSide::Buy, dec!(1), false)
            .await
            .unwrap();
        // 100 * 0.0004
        assert_eq!(exchange.equity().await.unwrap(), dec!(999.96));
    }
}

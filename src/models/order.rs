//! Order and exchange-position types shared by adapters and the orchestrator.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Direction;

/// Side of a market order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    /// Side that opens or adds to a position in `direction`.
    pub fn opening(direction: Direction) -> Self {
        match direction {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        }
    }

    /// Side that reduces or closes a position in `direction`.
    pub fn closing(direction: Direction) -> Self {
        match direction {
            Direction::Long => OrderSide::Sell,
            Direction::Short => OrderSide::Buy,
        }
    }
}

/// Acknowledgement of a placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub client_order_id: String,
    pub status: String,
    pub executed_qty: Decimal,
    /// Average fill price, zero when the exchange has not reported it yet
    pub avg_price: Decimal,
}

/// Position as reported by the exchange.
///
/// `quantity` is signed: positive for long, negative for short, zero when flat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub quantity: Decimal,
    pub entry_price: Decimal,
}

impl ExchangePosition {
    pub fn flat() -> Self {
        Self::default()
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    pub fn direction(&self) -> Option<Direction> {
        if self.quantity > Decimal::ZERO {
            Some(Direction::Long)
        } else if self.quantity < Decimal::ZERO {
            Some(Direction::Short)
        } else {
            None
        }
    }

    pub fn abs_quantity(&self) -> Decimal {
        self.quantity.abs()
    }
}

//! Tracked lifecycle state of one open position.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open position tracked by the pyramiding engine.
///
/// `peak_price` only moves up while long, `trough_price` only moves down
/// while short. The other extreme stays at the entry price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    pub symbol: String,

    pub direction: Direction,

    /// Price at which the initial entry was triggered
    pub entry_price: Decimal,

    /// Quantity of the initial entry; adds are sized from it
    pub base_qty: Decimal,

    /// Entry plus every executed add
    pub total_qty: Decimal,

    /// Highest price seen since entry (long)
    pub peak_price: Decimal,

    /// Lowest price seen since entry (short)
    pub trough_price: Decimal,

    /// Number of pyramiding additions executed
    pub add_count: u32,

    /// Price at which the most recent add (or the entry) was triggered
    pub last_add_price: Decimal,

    pub opened_at: DateTime<Utc>,
}

impl PositionState {
    /// State for a fresh entry filled at `price`.
    pub fn open(symbol: impl Into<String>, direction: Direction, price: Decimal, qty: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            entry_price: price,
            base_qty: qty,
            total_qty: qty,
            peak_price: price,
            trough_price: price,
            add_count: 0,
            last_add_price: price,
            opened_at: Utc::now(),
        }
    }

    /// Record a new observed price, moving the favorable extreme outward only.
    pub fn observe_price(&mut self, price: Decimal) {
        match self.direction {
            Direction::Long => self.peak_price = self.peak_price.max(price),
            Direction::Short => self.trough_price = self.trough_price.min(price),
        }
    }

    /// Best price seen in the position's favor.
    pub fn extreme_price(&self) -> Decimal {
        match self.direction {
            Direction::Long => self.peak_price,
            Direction::Short => self.trough_price,
        }
    }

    /// Unrealized return at `price` relative to the entry price.
    pub fn profit_pct(&self, price: Decimal) -> Decimal {
        signed_move(self.direction, self.entry_price, price)
    }

    /// Return at the favorable extreme.
    pub fn peak_profit_pct(&self) -> Decimal {
        self.profit_pct(self.extreme_price())
    }

    /// Move since the last add, positive when in the position's favor.
    pub fn favorable_move_pct(&self, price: Decimal) -> Decimal {
        signed_move(self.direction, self.last_add_price, price)
    }

    /// Apply an executed pyramiding add.
    pub fn record_add(&mut self, qty: Decimal, price: Decimal) {
        self.add_count += 1;
        self.total_qty += qty;
        self.last_add_price = price;
    }
}

fn signed_move(direction: Direction, reference: Decimal, price: Decimal) -> Decimal {
    if reference <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    match direction {
        Direction::Long => (price - reference) / reference,
        Direction::Short => (reference - price) / reference,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_long_profit_and_peak() {
        let mut pos = PositionState::open("BTCUSDT", Direction::Long, dec!(100), dec!(1));

        pos.observe_price(dec!(120));
        pos.observe_price(dec!(110));

        assert_eq!(pos.peak_price, dec!(120));
        assert_eq!(pos.trough_price, dec!(100));
        assert_eq!(pos.profit_pct(dec!(110)), dec!(0.1));
        assert_eq!(pos.peak_profit_pct(), dec!(0.2));
    }

    #[test]
    fn test_short_profit_and_trough() {
        let mut pos = PositionState::open("ETHUSDT", Direction::Short, dec!(200), dec!(2));

        pos.observe_price(dec!(150));
        pos.observe_price(dec!(180));

        assert_eq!(pos.trough_price, dec!(150));
        assert_eq!(pos.profit_pct(dec!(180)), dec!(0.1));
        assert_eq!(pos.peak_profit_pct(), dec!(0.25));
        assert_eq!(pos.favorable_move_pct(dec!(190)), dec!(0.05));
    }

    #[test]
    fn test_record_add() {
        let mut pos = PositionState::open("SOLUSDT", Direction::Long, dec!(10), dec!(4));

        pos.record_add(dec!(2), dec!(10.5));

        assert_eq!(pos.add_count, 1);
        assert_eq!(pos.total_qty, dec!(6));
        assert_eq!(pos.base_qty, dec!(4));
        assert_eq!(pos.last_add_price, dec!(10.5));
    }

    #[test]
    fn test_zero_entry_price_is_total() {
        let pos = PositionState::open("XRPUSDT", Direction::Long, Decimal::ZERO, dec!(1));
        assert_eq!(pos.profit_pct(dec!(1)), Decimal::ZERO);
        assert_eq!(pos.favorable_move_pct(dec!(1)), Decimal::ZERO);
    }
}

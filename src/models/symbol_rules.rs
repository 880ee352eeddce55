//! Exchange-enforced trading constraints for a single symbol.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-symbol constraints published by the exchange.
///
/// Treated as a read-only value for the duration of a scan cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRules {
    /// Smallest quantity increment; order quantities must be a multiple of it
    pub step_size: Decimal,

    /// Minimum order quantity
    pub min_qty: Decimal,

    /// Minimum order value (price * quantity)
    pub min_notional: Decimal,

    /// Price increment (informational)
    pub tick_size: Decimal,
}

impl SymbolRules {
    pub fn new(step_size: Decimal, min_qty: Decimal, min_notional: Decimal, tick_size: Decimal) -> Self {
        Self {
            step_size,
            min_qty,
            min_notional,
            tick_size,
        }
    }

    /// Whether the rules can be used for quantization at all.
    pub fn has_valid_step(&self) -> bool {
        self.step_size > Decimal::ZERO
    }
}

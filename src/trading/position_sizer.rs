//! Position sizing: equity fraction to desired notional to exchange-legal quantity.

use rust_decimal::Decimal;
use tracing::debug;

use crate::models::SymbolRules;

use super::quantizer::{quantize, quantize_close, SizingResult};
use super::TradingConfig;

/// Size a base entry for `symbol`.
///
/// `desired = max(min_base_notional, equity * equity_ratio)`, then quantized
/// in entry mode. Untradable when equity or price is not positive, or when
/// `min_notional` cannot be met.
pub fn compute_order_qty(
    symbol: &str,
    equity: Decimal,
    equity_ratio: Decimal,
    price: Decimal,
    rules: &SymbolRules,
    min_base_notional: Decimal,
) -> SizingResult {
    if equity <= Decimal::ZERO {
        return SizingResult::skip(format!("non-positive equity {}", equity));
    }
    if price <= Decimal::ZERO {
        return SizingResult::skip(format!("invalid price {}", price));
    }

    let by_ratio = equity.checked_mul(equity_ratio).unwrap_or(Decimal::ZERO);
    let desired = min_base_notional.max(by_ratio);

    let result = quantize(desired, price, rules);

    debug!(
        symbol = %symbol,
        equity = %equity,
        ratio_usd = %by_ratio,
        chosen_usd = %desired,
        price = %price,
        step = %rules.step_size,
        min_notional = %rules.min_notional,
        qty = %result.quantity,
        tradable = result.tradable,
        "Sized base entry"
    );

    result
}

/// Sizer bound to a trading configuration.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    config: TradingConfig,
}

impl PositionSizer {
    /// Create a new position sizer with given config.
    pub fn new(config: TradingConfig) -> Self {
        Self { config }
    }

    /// Desired notional of a base entry before quantization.
    pub fn desired_notional(&self, equity: Decimal) -> Decimal {
        let by_ratio = equity
            .max(Decimal::ZERO)
            .checked_mul(self.config.equity_ratio)
            .unwrap_or(Decimal::ZERO);
        self.config.min_base_notional.max(by_ratio)
    }

    /// Base entry quantity using the configured ratio and floor.
    pub fn entry_qty(
        &self,
        symbol: &str,
        equity: Decimal,
        price: Decimal,
        rules: &SymbolRules,
    ) -> SizingResult {
        compute_order_qty(
            symbol,
            equity,
            self.config.equity_ratio,
            price,
            rules,
            self.config.min_base_notional,
        )
    }

    /// Pyramiding add: `base_qty * pyramid_add_ratio`, quantized in entry mode.
    pub fn add_qty(&self, base_qty: Decimal, price: Decimal, rules: &SymbolRules) -> SizingResult {
        if price <= Decimal::ZERO {
            return SizingResult::skip(format!("invalid price {}", price));
        }
        let notional = base_qty
            .checked_mul(self.config.pyramid_add_ratio)
            .and_then(|qty| qty.checked_mul(price));
        match notional {
            Some(notional) => quantize(notional, price, rules),
            None => SizingResult::skip("add notional overflow"),
        }
    }

    /// Full close of `held` units, floored to the step.
    pub fn close_qty(&self, held: Decimal, rules: &SymbolRules) -> SizingResult {
        quantize_close(held, held, rules)
    }
}

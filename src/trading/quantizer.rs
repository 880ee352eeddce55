//! Alignment of order quantities to exchange step, min-qty and min-notional rules.
//!
//! Two modes:
//! - entry mode ([`quantize`]) rounds **up** so the order clears `min_notional`
//! - close mode ([`quantize_close`]) rounds **down** so it never exceeds the held size
//!
//! All arithmetic is checked; overflow yields an untradable result instead of a panic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::SymbolRules;

/// Output of sizing and quantization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizingResult {
    /// Exchange-legal quantity, a multiple of `step_size`; zero when not tradable
    pub quantity: Decimal,

    /// False when no legal quantity exists and no order should be placed
    pub tradable: bool,

    /// Why the result is not tradable, or a short summary when it is
    pub reason: String,
}

impl SizingResult {
    pub fn ok(quantity: Decimal) -> Self {
        Self {
            quantity,
            tradable: true,
            reason: "sized".to_string(),
        }
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            quantity: Decimal::ZERO,
            tradable: false,
            reason: reason.into(),
        }
    }
}

/// Round `qty` up to the next multiple of `step`.
pub fn align_up(qty: Decimal, step: Decimal) -> Option<Decimal> {
    if step <= Decimal::ZERO {
        return None;
    }
    qty.checked_div(step)?.ceil().checked_mul(step)
}

/// Round `qty` down to the previous multiple of `step`.
pub fn align_down(qty: Decimal, step: Decimal) -> Option<Decimal> {
    if step <= Decimal::ZERO {
        return None;
    }
    qty.checked_div(step)?.floor().checked_mul(step)
}

/// Entry-mode quantization of a desired notional at `price`.
pub fn quantize(desired_notional: Decimal, price: Decimal, rules: &SymbolRules) -> SizingResult {
    if price <= Decimal::ZERO {
        return SizingResult::skip(format!("invalid price {}", price));
    }
    if !rules.has_valid_step() {
        return SizingResult::skip(format!("invalid step size {}", rules.step_size));
    }
    if desired_notional <= Decimal::ZERO {
        return SizingResult::skip(format!("non-positive notional {}", desired_notional));
    }

    match quantize_up(desired_notional, price, rules) {
        Some(qty) => {
            let notional = qty * price;
            if qty > Decimal::ZERO && notional >= rules.min_notional {
                SizingResult::ok(qty.normalize())
            } else {
                SizingResult::skip(format!(
                    "cannot reach min notional {} at price {} (best {})",
                    rules.min_notional, price, notional
                ))
            }
        }
        None => SizingResult::skip("quantity arithmetic overflow"),
    }
}

fn quantize_up(desired_notional: Decimal, price: Decimal, rules: &SymbolRules) -> Option<Decimal> {
    let step = rules.step_size;

    let raw_qty = desired_notional.checked_div(price)?;
    let mut qty = align_up(raw_qty, step)?;

    if qty < rules.min_qty {
        qty = align_up(rules.min_qty, step)?;
    }

    // Two passes: the re-aligned minimum, then one more step in case
    // min_notional / price rounded below the true quotient.
    if qty.checked_mul(price)? < rules.min_notional {
        let needed = rules.min_notional.checked_div(price)?;
        qty = qty.max(align_up(needed, step)?);

        if qty.checked_mul(price)? < rules.min_notional {
            qty = qty.checked_add(step)?;
        }
    }

    Some(qty)
}

/// Close-mode quantization: floor `requested` to the step, never above `held`.
///
/// Min-notional is not enforced since reduce-only orders are exempt, but the
/// result must still be at least one step and at least `min_qty`.
pub fn quantize_close(requested: Decimal, held: Decimal, rules: &SymbolRules) -> SizingResult {
    if !rules.has_valid_step() {
        return SizingResult::skip(format!("invalid step size {}", rules.step_size));
    }

    let capped = requested.min(held);
    if capped <= Decimal::ZERO {
        return SizingResult::skip("nothing to close");
    }

    let Some(qty) = align_down(capped, rules.step_size) else {
        return SizingResult::skip("quantity arithmetic overflow");
    };

    if qty <= Decimal::ZERO {
        return SizingResult::skip(format!(
            "{} is below one step of {}",
            capped, rules.step_size
        ));
    }
    if qty < rules.min_qty {
        return SizingResult::skip(format!("{} is below min qty {}", qty, rules.min_qty));
    }

    SizingResult::ok(qty.normalize())
}

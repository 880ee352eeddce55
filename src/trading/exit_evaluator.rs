//! Stop-loss and trailing-stop exits for open positions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::PositionState;

/// Why a position is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloseReason {
    StopLoss,
    TrailingStop,
    /// Opposing signal under the flatten-and-reopen policy
    Reversal,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::StopLoss => "stop-loss",
            CloseReason::TrailingStop => "trailing-stop",
            CloseReason::Reversal => "reversal",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitDecision {
    Hold,
    Close(CloseReason),
}

/// Update the position's favorable extreme and decide whether to close it.
///
/// Stop-loss takes precedence over the trailing stop. The trailing stop only
/// arms once the extreme shows a profit.
pub fn evaluate(
    position: &mut PositionState,
    current_price: Decimal,
    max_loss_pct: Decimal,
    trail_giveback_pct: Decimal,
) -> ExitDecision {
    if current_price <= Decimal::ZERO {
        return ExitDecision::Hold;
    }

    position.observe_price(current_price);

    let profit_pct = position.profit_pct(current_price);
    if profit_pct <= -max_loss_pct {
        return ExitDecision::Close(CloseReason::StopLoss);
    }

    let peak_profit_pct = position.peak_profit_pct();
    if peak_profit_pct > Decimal::ZERO {
        let trigger = peak_profit_pct * (Decimal::ONE - trail_giveback_pct);
        if profit_pct < trigger {
            return ExitDecision::Close(CloseReason::TrailingStop);
        }
    }

    ExitDecision::Hold
}

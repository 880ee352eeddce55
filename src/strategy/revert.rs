//! Mean reversion: RSI extremes or a close outside the Bollinger bands.

use crate::models::Signal;

use super::indicators::{bollinger, rsi, Bands};
use super::SignalConfig;

/// Readings behind a reversion signal, kept for logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reversion {
    pub signal: Signal,
    pub rsi: Option<f64>,
    pub bands: Option<Bands>,
}

pub fn revert_signal(closes: &[f64], config: &SignalConfig) -> Reversion {
    let rsi_value = rsi(closes, config.rsi_period);
    let bands = bollinger(closes, config.bb_period, config.bb_std_dev);

    let Some(&last) = closes.last() else {
        return Reversion {
            signal: Signal::None,
            rsi: None,
            bands: None,
        };
    };

    let oversold = rsi_value.is_some_and(|r| r <= config.rsi_oversold)
        || bands.is_some_and(|b| last <= b.lower);
    let overbought = rsi_value.is_some_and(|r| r >= config.rsi_overbought)
        || bands.is_some_and(|b| last >= b.upper);

    let signal = match (oversold, overbought) {
        (true, false) => Signal::Long,
        (false, true) => Signal::Short,
        _ => Signal::None,
    };

    Reversion {
        signal,
        rsi: rsi_value,
        bands,
    }
}

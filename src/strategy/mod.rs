//! Signal layer: indicators, trend and mean-reversion rules, and the
//! per-symbol generator that feeds the pyramid engine.

mod generator;
pub(crate) mod indicators;
mod revert;
mod trend;

pub use generator::SignalGenerator;

use serde::{Deserialize, Serialize};

/// Indicator periods and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Kline intervals to try, in order
    pub timeframes: Vec<String>,

    /// Candles requested per timeframe
    pub kline_limit: u32,

    /// Timeframes with fewer candles are skipped
    pub min_candles: usize,

    pub ema_fast: usize,
    pub ema_slow: usize,
    pub macd_signal: usize,

    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,

    pub bb_period: usize,
    /// Band width in standard deviations
    pub bb_std_dev: f64,

    /// Candles forming the channel a breakout must clear
    pub breakout_lookback: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            timeframes: vec!["15m".to_string(), "5m".to_string()],
            kline_limit: 200,
            min_candles: 30,
            ema_fast: 12,
            ema_slow: 26,
            macd_signal: 9,
            rsi_period: 14,
            rsi_oversold: 40.0,
            rsi_overbought: 60.0,
            bb_period: 20,
            bb_std_dev: 2.0,
            breakout_lookback: 20,
        }
    }
}

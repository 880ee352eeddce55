//! Per-symbol signal generation across timeframes.

use anyhow::Result;
use tracing::{debug, warn};

use crate::api::Exchange;
use crate::models::{Candle, Signal, SignalReport};

use super::indicators::donchian_breakout;
use super::revert::revert_signal;
use super::trend::trend_signal;
use super::SignalConfig;

/// Combines trend and mean-reversion readings into one [`SignalReport`].
#[derive(Debug, Clone, Default)]
pub struct SignalGenerator {
    config: SignalConfig,
}

impl SignalGenerator {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    /// Walk the configured timeframes in order; the first one that yields a
    /// direction wins. Timeframes that fail to load are skipped.
    pub async fn generate(&self, exchange: &dyn Exchange, symbol: &str) -> Result<SignalReport> {
        for timeframe in &self.config.timeframes {
            let candles = match exchange.klines(symbol, timeframe, self.config.kline_limit).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(symbol = %symbol, timeframe = %timeframe, error = %e, "Failed to fetch klines");
                    continue;
                }
            };

            if let Some(report) = self.evaluate(&candles, timeframe) {
                debug!(
                    symbol = %symbol,
                    timeframe = %timeframe,
                    signal = %report.signal,
                    breakout = report.breakout,
                    detail = %report.detail,
                    "Signal"
                );
                return Ok(report);
            }
        }

        debug!(symbol = %symbol, "No signal on any timeframe");
        Ok(SignalReport::none())
    }

    /// Evaluate one timeframe. `None` when the series is too short or neutral.
    pub fn evaluate(&self, candles: &[Candle], timeframe: &str) -> Option<SignalReport> {
        if candles.len() < self.config.min_candles {
            return None;
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let (trend, macd) = trend_signal(&closes, &self.config);
        let reversion = revert_signal(&closes, &self.config);

        // Trend takes precedence over reversion
        let signal = if trend != Signal::None { trend } else { reversion.signal };
        if signal == Signal::None {
            return None;
        }

        let channel = donchian_breakout(candles, self.config.breakout_lookback);
        let breakout = match signal {
            Signal::Long => channel.up,
            Signal::Short => channel.down,
            Signal::None => false,
        };

        let detail = format!(
            "trend={} revert={} hist={:.4} rsi={:.1} bbpos={:.2}",
            trend,
            reversion.signal,
            macd.map(|m| m.histogram).unwrap_or(0.0),
            reversion.rsi.unwrap_or(f64::NAN),
            reversion
                .bands
                .map(|b| b.position(closes[closes.len() - 1]))
                .unwrap_or(f64::NAN),
        );

        let mut report = SignalReport::new(signal).with_breakout(breakout);
        report.timeframe = Some(timeframe.to_string());
        report.detail = detail;
        Some(report)
    }
}

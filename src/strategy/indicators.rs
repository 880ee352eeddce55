//! Technical indicators over closing prices.
//!
//! All functions take oldest-first series and return `None` when the series is
//! too short to produce a value.

use statrs::statistics::Statistics;

use crate::models::Candle;

/// Exponential moving average with `alpha = 2 / (period + 1)`, seeded with
/// the first value. Same length as the input.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let Some(&first) = values.first() else {
        return Vec::new();
    };
    let alpha = 2.0 / (period.max(1) as f64 + 1.0);

    let mut out = Vec::with_capacity(values.len());
    let mut prev = first;
    out.push(prev);
    for &v in &values[1..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Latest MACD reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<Macd> {
    if closes.len() < slow.max(fast).max(2) {
        return None;
    }

    let fast_line = ema(closes, fast);
    let slow_line = ema(closes, slow);
    let macd_line: Vec<f64> = fast_line.iter().zip(&slow_line).map(|(f, s)| f - s).collect();
    let signal_line = ema(&macd_line, signal);

    let macd = *macd_line.last()?;
    let signal = *signal_line.last()?;
    Some(Macd {
        ema_fast: *fast_line.last()?,
        ema_slow: *slow_line.last()?,
        macd,
        signal,
        histogram: macd - signal,
    })
}

/// Wilder's RSI: averages seeded with the simple mean of the first `period`
/// changes, then smoothed with `1 / period`.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() <= period {
        return None;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let (seed, rest) = changes.split_at(period);

    let mut avg_gain = seed.iter().map(|c| c.max(0.0)).sum::<f64>() / period as f64;
    let mut avg_loss = seed.iter().map(|c| (-c).max(0.0)).sum::<f64>() / period as f64;

    let n = period as f64;
    for &c in rest {
        avg_gain = (avg_gain * (n - 1.0) + c.max(0.0)) / n;
        avg_loss = (avg_loss * (n - 1.0) + (-c).max(0.0)) / n;
    }

    if avg_loss == 0.0 {
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Bollinger bands of the last `period` closes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub lower: f64,
    pub middle: f64,
    pub upper: f64,
}

impl Bands {
    /// Position of `price` within the bands: 0 at the lower, 1 at the upper.
    pub fn position(&self, price: f64) -> f64 {
        let width = self.upper - self.lower;
        if width <= 0.0 {
            0.5
        } else {
            (price - self.lower) / width
        }
    }
}

pub fn bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<Bands> {
    if period < 2 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = window.mean();
    let std_dev = window.std_dev();
    if !middle.is_finite() || !std_dev.is_finite() {
        return None;
    }

    Some(Bands {
        lower: middle - num_std * std_dev,
        middle,
        upper: middle + num_std * std_dev,
    })
}

/// Whether the last close broke the channel of the previous `lookback` candles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Breakout {
    pub up: bool,
    pub down: bool,
}

pub fn donchian_breakout(candles: &[Candle], lookback: usize) -> Breakout {
    if lookback == 0 || candles.len() <= lookback {
        return Breakout::default();
    }

    let (last, history) = match candles.split_last() {
        Some(split) => split,
        None => return Breakout::default(),
    };
    let channel = &history[history.len() - lookback..];

    let high = channel.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = channel.iter().map(|c| c.low).fold(f64::MAX, f64::min);

    Breakout {
        up: last.close > high,
        down: last.close < low,
    }
}

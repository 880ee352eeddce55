//! OHLCV candle used by the signal layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One kline bar. Prices are f64: candles only feed indicators, never sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

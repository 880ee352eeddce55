//! Trend following: EMA crossover confirmed by the MACD histogram.

use crate::models::Signal;

use super::indicators::{macd, Macd};
use super::SignalConfig;

/// Long when the fast EMA is above the slow one and the histogram is
/// positive; short on the mirror condition.
pub fn trend_signal(closes: &[f64], config: &SignalConfig) -> (Signal, Option<Macd>) {
    let Some(m) = macd(closes, config.ema_fast, config.ema_slow, config.macd_signal) else {
        return (Signal::None, None);
    };

    let signal = if m.ema_fast > m.ema_slow && m.histogram > 0.0 {
        Signal::Long
    } else if m.ema_fast < m.ema_slow && m.histogram < 0.0 {
        Signal::Short
    } else {
        Signal::None
    };

    (signal, Some(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accelerating_rally_is_long() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64).powf(1.5) * 0.1).collect();
        let (signal, m) = trend_signal(&closes, &SignalConfig::default());
        assert_eq!(signal, Signal::Long);
        assert!(m.unwrap().histogram > 0.0);
    }

    #[test]
    fn test_accelerating_selloff_is_short() {
        let closes: Vec<f64> = (0..80).map(|i| 200.0 - (i as f64).powf(1.5) * 0.1).collect();
        let (signal, _) = trend_signal(&closes, &SignalConfig::default());
        assert_eq!(signal, Signal::Short);
    }

    #[test]
    fn test_flat_market_has_no_trend() {
        let closes = vec![100.0; 80];
        assert_eq!(trend_signal(&closes, &SignalConfig::default()).0, Signal::None);
    }

    #[test]
    fn test_short_series_has_no_trend() {
        let closes = vec![100.0, 101.0, 102.0];
        assert_eq!(trend_signal(&closes, &SignalConfig::default()), (Signal::None, None));
    }
}

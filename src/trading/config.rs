//! Trading configuration.

use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// What to do when a signal opposes an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReversalPolicy {
    /// Keep the current position; exits only come from stop-loss or trailing stop
    #[default]
    Ignore,
    /// Close the current position; the opposite entry follows once flat
    FlattenAndReopen,
}

impl FromStr for ReversalPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ignore" | "hold" => Ok(Self::Ignore),
            "flatten" | "flatten-and-reopen" | "flatten_and_reopen" | "reverse" => {
                Ok(Self::FlattenAndReopen)
            }
            other => Err(anyhow!("unknown reversal policy: {}", other)),
        }
    }
}

impl std::fmt::Display for ReversalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReversalPolicy::Ignore => write!(f, "ignore"),
            ReversalPolicy::FlattenAndReopen => write!(f, "flatten-and-reopen"),
        }
    }
}

/// Configuration for sizing, exits, and pyramiding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Fraction of account equity used for a base entry (0.0 to 1.0)
    pub equity_ratio: Decimal,

    /// Floor for the desired notional of a base entry, in USDT
    pub min_base_notional: Decimal,

    /// Loss (as a fraction of entry price) that forces a stop-loss close
    pub max_loss_pct: Decimal,

    /// Share of peak unrealized profit allowed to erode before closing
    pub trail_giveback_pct: Decimal,

    /// Whether to add to winning positions at all
    pub pyramid_enabled: bool,

    /// Maximum number of pyramiding additions per position
    pub pyramid_max_layers: u32,

    /// Size of each add relative to the base entry quantity
    pub pyramid_add_ratio: Decimal,

    /// Favorable move since the last add that triggers the next one
    pub pyramid_trigger_pct: Decimal,

    /// Handling of signals that oppose an open position
    pub reversal_policy: ReversalPolicy,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            equity_ratio: dec!(0.1),          // 10% of equity per entry
            min_base_notional: dec!(5),       // $5 floor
            max_loss_pct: dec!(0.30),         // 30% stop loss
            trail_giveback_pct: dec!(0.15),   // give back 15% of peak profit
            pyramid_enabled: true,
            pyramid_max_layers: 3,
            pyramid_add_ratio: dec!(0.5),     // half the base entry per add
            pyramid_trigger_pct: dec!(0.006), // 0.6% move since last add
            reversal_policy: ReversalPolicy::Ignore,
        }
    }
}

impl TradingConfig {
    /// Defaults overridden by any of the recognized environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_parse::<Decimal>("EQUITY_RATIO")? {
            config.equity_ratio = v;
        }
        if let Some(v) = env_parse::<Decimal>("MIN_BASE_NOTIONAL")? {
            config.min_base_notional = v;
        }
        if let Some(v) = env_parse::<Decimal>("MAX_LOSS_PCT")? {
            config.max_loss_pct = v;
        }
        if let Some(v) = env_parse::<Decimal>("TRAIL_GIVEBACK_PCT")? {
            config.trail_giveback_pct = v;
        }
        if let Some(v) = env_parse::<bool>("PYR_ENABLED")? {
            config.pyramid_enabled = v;
        }
        if let Some(v) = env_parse::<u32>("PYR_MAX_ADDS")? {
            config.pyramid_max_layers = v;
        }
        if let Some(v) = env_parse::<Decimal>("PYR_ADD_RATIO")? {
            config.pyramid_add_ratio = v;
        }
        if let Some(v) = env_parse::<Decimal>("PYR_TRIGGER_PCT")? {
            config.pyramid_trigger_pct = v;
        }
        if let Some(v) = env_parse::<ReversalPolicy>("REVERSAL_POLICY")? {
            config.reversal_policy = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject knob values that would make the engine meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.equity_ratio < Decimal::ZERO || self.equity_ratio > Decimal::ONE {
            anyhow::bail!("equity_ratio must be within [0, 1], got {}", self.equity_ratio);
        }
        if self.min_base_notional < Decimal::ZERO {
            anyhow::bail!("min_base_notional must not be negative");
        }
        if self.max_loss_pct <= Decimal::ZERO {
            anyhow::bail!("max_loss_pct must be positive, got {}", self.max_loss_pct);
        }
        if self.trail_giveback_pct < Decimal::ZERO || self.trail_giveback_pct > Decimal::ONE {
            anyhow::bail!(
                "trail_giveback_pct must be within [0, 1], got {}",
                self.trail_giveback_pct
            );
        }
        if self.pyramid_add_ratio < Decimal::ZERO {
            anyhow::bail!("pyramid_add_ratio must not be negative");
        }
        if self.pyramid_trigger_pct < Decimal::ZERO {
            anyhow::bail!("pyramid_trigger_pct must not be negative");
        }
        Ok(())
    }
}

/// Parse an optional environment variable, failing loudly on malformed values.
pub(crate) fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(None),
    }
}

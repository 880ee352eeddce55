//! Directional signal produced by the strategy layer.

use serde::{Deserialize, Serialize};

use super::Direction;

/// Directional opinion for one symbol on one scan tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Signal {
    Long,
    Short,
    #[default]
    None,
}

impl Signal {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Signal::Long => Some(Direction::Long),
            Signal::Short => Some(Direction::Short),
            Signal::None => None,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Long => write!(f, "LONG"),
            Signal::Short => write!(f, "SHORT"),
            Signal::None => write!(f, "NONE"),
        }
    }
}

/// Signal plus the context the pyramiding logic may use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalReport {
    pub signal: Signal,

    /// Close broke the recent channel in the signalled direction
    pub breakout: bool,

    /// Timeframe that produced the signal, if any
    pub timeframe: Option<String>,

    /// Human-readable explanation for logs
    pub detail: String,
}

impl SignalReport {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(signal: Signal) -> Self {
        Self {
            signal,
            ..Default::default()
        }
    }

    pub fn with_breakout(mut self, breakout: bool) -> Self {
        self.breakout = breakout;
        self
    }
}

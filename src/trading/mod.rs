//! Trading core: quantization, position sizing, exits, pyramiding.

mod config;
mod exit_evaluator;
mod position_sizer;
mod pyramid;
mod quantizer;

pub use config::{ReversalPolicy, TradingConfig};
pub(crate) use config::env_parse;
pub use exit_evaluator::CloseReason;
pub use position_sizer::PositionSizer;
pub use pyramid::{PyramidEngine, Reconciliation, TickAction, TickDecision, TickInputs};

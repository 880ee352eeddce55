//! Data models for symbols, positions, signals, candles, and orders.

mod candle;
mod order;
mod position;
mod signal;
mod symbol_rules;

pub use candle::Candle;
pub use order::{ExchangePosition, OrderResult, OrderSide};
pub use position::{Direction, PositionState};
pub use signal::{Signal, SignalReport};
pub use symbol_rules::SymbolRules;

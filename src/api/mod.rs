//! Exchange access: the typed interface the bot consumes and its implementations.

mod binance_client;
mod exchange;
#[cfg(test)]
mod mock;
mod paper;
mod types;

pub use binance_client::BinanceFutures;
pub use exchange::Exchange;
#[cfg(test)]
pub use mock::MockExchange;
pub use paper::{PaperExchange, DEFAULT_FEE_RATE};

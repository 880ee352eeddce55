//! Symbol screening.

mod shortlist;

pub use shortlist::{fetch_metrics, select, shortlist, ShortlistConfig, SymbolMetrics};

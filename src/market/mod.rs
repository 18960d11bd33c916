//! Market snapshot: per-cycle valuation, trade sizing, and fill projection.

mod state;

pub use state::{Balances, ChartData, MarketState, WEIGHTED_AVERAGE};

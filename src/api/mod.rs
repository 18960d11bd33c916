//! Exchange HTTP API: client and wire types.

mod client;
mod types;

pub use client::PoloniexClient;
pub use types::{OrderResponse, OrderSide, TickerEntry};

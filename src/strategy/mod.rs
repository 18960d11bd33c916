//! Trading strategies: given a market snapshot, propose trades.

mod equal_weight;
mod hold;

pub use equal_weight::EqualWeightStrategy;
pub use hold::HoldStrategy;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::history::MarketHistory;
use crate::market::MarketState;
use crate::models::ProposedTrade;

/// A strategy decides the cadence and content of the fund's cycles.
///
/// Proposals should be sized (`MarketState::set_sell_amount`) before they are
/// returned so the legality filter can inspect concrete amounts.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Time between decision cycles.
    fn trade_interval(&self) -> Duration;

    /// Propose zero or more trades against the snapshot.
    async fn propose_trades(
        &mut self,
        state: &MarketState,
        history: &MarketHistory,
    ) -> Result<Vec<ProposedTrade>>;
}

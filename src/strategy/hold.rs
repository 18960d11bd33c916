//! Buy-and-hold: never trades, keeps whatever the fund already holds.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::history::MarketHistory;
use crate::market::MarketState;
use crate::models::ProposedTrade;

use super::Strategy;

/// Proposes nothing; useful as a baseline to compare other strategies
/// against.
pub struct HoldStrategy {
    interval: Duration,
}

impl HoldStrategy {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl Strategy for HoldStrategy {
    fn name(&self) -> &str {
        "hold"
    }

    fn trade_interval(&self) -> Duration {
        self.interval
    }

    async fn propose_trades(
        &mut self,
        _state: &MarketState,
        _history: &MarketHistory,
    ) -> Result<Vec<ProposedTrade>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    #[test]
    fn test_proposes_nothing() {
        tokio_test::block_on(async {
            let history = MarketHistory::connect("sqlite::memory:").await.unwrap();
            let state = MarketState::new(HashMap::new(), HashMap::new(), Utc::now(), "BTC");

            let mut strategy = HoldStrategy::new(Duration::from_secs(60));
            let trades = strategy.propose_trades(&state, &history).await.unwrap();
            assert!(trades.is_empty());
        });
    }
}

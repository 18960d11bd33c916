//! Simulated market adapter: replays stored chart data and projects fills.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::history::MarketHistory;
use crate::market::{Balances, MarketState};
use crate::models::ProposedTrade;

use super::MarketAdapter;

/// Adapter for backtests and dry runs.
///
/// Market state comes from the history store at the requested timestamp;
/// execution never leaves the process, it projects the batch onto the held
/// balances instead.
pub struct BacktestAdapter {
    history: Arc<MarketHistory>,
    fiat: String,
    balances: Balances,
}

impl BacktestAdapter {
    pub fn new(
        history: Arc<MarketHistory>,
        fiat: impl Into<String>,
        initial_balances: Balances,
    ) -> Self {
        Self {
            history,
            fiat: fiat.into(),
            balances: initial_balances,
        }
    }
}

#[async_trait]
impl MarketAdapter for BacktestAdapter {
    async fn get_market_state(&mut self, time: DateTime<Utc>) -> Result<MarketState> {
        let chart_data = self.history.chart_data_at(time).await?;
        Ok(MarketState::new(
            chart_data,
            self.balances.clone(),
            time,
            self.fiat.clone(),
        ))
    }

    async fn execute(&mut self, trades: Vec<ProposedTrade>, state: &MarketState) -> Result<()> {
        self.balances = state.simulate_trades(&trades)?;
        debug!(trades = trades.len(), "applied simulated fills");
        Ok(())
    }

    fn balances(&self) -> Balances {
        self.balances.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{ChartData, WEIGHTED_AVERAGE};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    async fn seeded_history(time: DateTime<Utc>) -> Arc<MarketHistory> {
        let history = MarketHistory::connect("sqlite::memory:").await.unwrap();
        let chart: ChartData = HashMap::from([(
            "BTC_ETH".to_string(),
            HashMap::from([(WEIGHTED_AVERAGE.to_string(), dec!(0.5))]),
        )]);
        history.record_chart(time, &chart).await.unwrap();
        Arc::new(history)
    }

    #[tokio::test]
    async fn test_snapshot_reflects_history_and_balances() {
        let time = Utc::now();
        let history = seeded_history(time).await;
        let mut adapter = BacktestAdapter::new(
            history,
            "BTC",
            HashMap::from([("BTC".to_string(), dec!(2))]),
        );

        let state = adapter.get_market_state(time).await.unwrap();
        assert_eq!(state.price("BTC_ETH").unwrap(), dec!(0.5));
        assert_eq!(state.balance("BTC").unwrap(), dec!(2));
        assert_eq!(state.fiat, "BTC");
    }

    #[tokio::test]
    async fn test_execute_updates_balances_for_next_snapshot() {
        let time = Utc::now();
        let history = seeded_history(time).await;
        let mut adapter = BacktestAdapter::new(
            history,
            "BTC",
            HashMap::from([("BTC".to_string(), dec!(2))]),
        );

        let state = adapter.get_market_state(time).await.unwrap();
        let trade = ProposedTrade::new("BTC", "ETH", "BTC", dec!(1), dec!(0.0025));
        adapter.execute(vec![trade], &state).await.unwrap();

        let balances = adapter.balances();
        assert_eq!(balances["BTC"], dec!(1));
        assert_eq!(balances["ETH"], dec!(2));

        // The next cycle's snapshot sees the projected balances.
        let next = adapter.get_market_state(time).await.unwrap();
        assert_eq!(next.balance("ETH").unwrap(), dec!(2));
    }
}

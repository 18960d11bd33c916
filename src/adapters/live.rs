//! Live market adapter: real balances and real orders on the exchange.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::api::{OrderSide, PoloniexClient};
use crate::history::MarketHistory;
use crate::market::{Balances, MarketState};
use crate::models::ProposedTrade;

use super::MarketAdapter;

/// Adapter for live trading.
///
/// Balances come from the exchange account before every cycle; chart data
/// comes from the history store, which the live loop refreshes just before
/// asking for a snapshot.
pub struct LiveAdapter {
    client: PoloniexClient,
    history: Arc<MarketHistory>,
    fiat: String,
    balances: Balances,
}

impl LiveAdapter {
    pub fn new(client: PoloniexClient, history: Arc<MarketHistory>, fiat: impl Into<String>) -> Self {
        Self {
            client,
            history,
            fiat: fiat.into(),
            balances: Balances::new(),
        }
    }
}

#[async_trait]
impl MarketAdapter for LiveAdapter {
    async fn get_market_state(&mut self, time: DateTime<Utc>) -> Result<MarketState> {
        self.balances = self.client.balances().await?;
        let chart_data = self.history.chart_data_at(time).await?;
        Ok(MarketState::new(
            chart_data,
            self.balances.clone(),
            time,
            self.fiat.clone(),
        ))
    }

    async fn execute(&mut self, trades: Vec<ProposedTrade>, _state: &MarketState) -> Result<()> {
        for trade in &trades {
            let base = trade
                .market_base()
                .ok_or_else(|| anyhow!("malformed market name: {}", trade.market_name))?;
            let rate = trade
                .market_price
                .ok_or_else(|| anyhow!("trade has not been sized: {trade}"))?;

            // Orders on a base_quote market are denominated in the quote
            // asset at a base-per-quote rate. The exchange takes its fee out
            // of the fill, so the placed amount is the gross quote amount.
            let (side, amount) = if trade.sell_coin == base {
                (OrderSide::Buy, trade.sell_amount / rate)
            } else {
                (OrderSide::Sell, trade.sell_amount)
            };

            let order = self
                .client
                .place_order(&trade.market_name, side, rate, amount)
                .await?;
            info!(
                order_number = %order.order_number,
                market = %trade.market_name,
                side = %side,
                rate = %rate,
                amount = %amount,
                "order placed"
            );
        }

        // Fills changed the account server-side; refresh our view.
        self.balances = self.client.balances().await?;
        Ok(())
    }

    fn balances(&self) -> Balances {
        self.balances.clone()
    }
}

//! Equal-weight rebalancing: hold the same fiat value of every available
//! coin, fiat included.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

use crate::history::MarketHistory;
use crate::market::MarketState;
use crate::models::ProposedTrade;

use super::Strategy;

/// Every cycle, split the portfolio's total fiat value evenly across the
/// coins the market offers, selling overweight holdings down to the target
/// and buying underweight ones up to it.
pub struct EqualWeightStrategy {
    interval: Duration,
    fee: Decimal,
}

impl EqualWeightStrategy {
    pub fn new(interval: Duration, fee: Decimal) -> Self {
        Self { interval, fee }
    }
}

#[async_trait]
impl Strategy for EqualWeightStrategy {
    fn name(&self) -> &str {
        "equal-weight"
    }

    fn trade_interval(&self) -> Duration {
        self.interval
    }

    async fn propose_trades(
        &mut self,
        state: &MarketState,
        _history: &MarketHistory,
    ) -> Result<Vec<ProposedTrade>> {
        let fiat = state.fiat.clone();

        // Deterministic proposal order.
        let mut coins: Vec<String> = state.available_coins().into_iter().collect();
        coins.sort();
        if coins.is_empty() {
            return Ok(Vec::new());
        }

        let total = state.estimate_total_value(&state.balances, &fiat);
        if total <= Decimal::ZERO {
            debug!("nothing to rebalance");
            return Ok(Vec::new());
        }
        let ideal = total / Decimal::from(coins.len() as u64);
        let values = state.estimate_values(&state.balances, &fiat);

        let mut trades = Vec::new();

        // Sells first: they free the fiat the buys in the same batch spend.
        for coin in &coins {
            if *coin == fiat {
                continue;
            }
            let value = values.get(coin).copied().unwrap_or(Decimal::ZERO);
            if value > ideal {
                let mut trade =
                    ProposedTrade::new(coin.clone(), fiat.clone(), fiat.clone(), ideal, self.fee);
                state.set_sell_amount(&mut trade)?;
                trades.push(trade);
            }
        }

        for coin in &coins {
            if *coin == fiat {
                continue;
            }
            let value = values.get(coin).copied().unwrap_or(Decimal::ZERO);
            if value < ideal {
                let mut trade = ProposedTrade::new(
                    fiat.clone(),
                    coin.clone(),
                    fiat.clone(),
                    ideal - value,
                    self.fee,
                );
                state.set_sell_amount(&mut trade)?;
                trades.push(trade);
            }
        }

        debug!(trades = trades.len(), ideal = %ideal, "rebalance proposals");
        Ok(trades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{ChartData, WEIGHTED_AVERAGE};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn chart_btc_eth(price: Decimal) -> ChartData {
        HashMap::from([(
            "BTC_ETH".to_string(),
            HashMap::from([(WEIGHTED_AVERAGE.to_string(), price)]),
        )])
    }

    #[tokio::test]
    async fn test_buys_underweight_coin_from_fiat() {
        let history = MarketHistory::connect("sqlite::memory:").await.unwrap();
        let state = MarketState::new(
            chart_btc_eth(dec!(0.5)),
            HashMap::from([("BTC".to_string(), dec!(1))]),
            Utc::now(),
            "BTC",
        );

        let mut strategy = EqualWeightStrategy::new(Duration::from_secs(60), Decimal::ZERO);
        let trades = strategy.propose_trades(&state, &history).await.unwrap();

        // Two coins available, 1 BTC total: buy 0.5 BTC worth of ETH.
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].sell_coin, "BTC");
        assert_eq!(trades[0].buy_coin, "ETH");
        assert_eq!(trades[0].sell_amount, dec!(0.5));
        assert_eq!(trades[0].buy_amount, dec!(1));
    }

    #[tokio::test]
    async fn test_sells_overweight_coin_to_fiat() {
        let history = MarketHistory::connect("sqlite::memory:").await.unwrap();
        let state = MarketState::new(
            chart_btc_eth(dec!(0.5)),
            HashMap::from([("ETH".to_string(), dec!(4))]),
            Utc::now(),
            "BTC",
        );

        let mut strategy = EqualWeightStrategy::new(Duration::from_secs(60), Decimal::ZERO);
        let trades = strategy.propose_trades(&state, &history).await.unwrap();

        // Total 2 BTC over two coins: keep 1 BTC of ETH, sell the rest.
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].sell_coin, "ETH");
        assert_eq!(trades[0].buy_coin, "BTC");
        assert_eq!(trades[0].fiat_value_to_trade, dec!(1));
        assert_eq!(trades[0].sell_amount, dec!(3.5));
    }

    #[tokio::test]
    async fn test_empty_portfolio_proposes_nothing() {
        let history = MarketHistory::connect("sqlite::memory:").await.unwrap();
        let state = MarketState::new(chart_btc_eth(dec!(0.5)), HashMap::new(), Utc::now(), "BTC");

        let mut strategy = EqualWeightStrategy::new(Duration::from_secs(60), dec!(0.0025));
        let trades = strategy.propose_trades(&state, &history).await.unwrap();
        assert!(trades.is_empty());
    }
}

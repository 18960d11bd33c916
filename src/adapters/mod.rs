//! Market adapters: the seam between the fund and a real or simulated market.
//!
//! The trait carries the legality filter as provided methods so an adapter
//! for a market with different rules can override `is_legal` without
//! touching the filtering loop.

mod backtest;
mod live;

pub use backtest::BacktestAdapter;
pub use live::LiveAdapter;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;

use crate::market::{Balances, MarketState};
use crate::models::ProposedTrade;

/// Smallest fiat-denominated trade the market accepts.
pub const MINIMUM_FIAT_TRADE: Decimal = dec!(0.0001);

/// Access to a market: snapshots, execution, and the balances that
/// execution maintains.
#[async_trait]
pub trait MarketAdapter: Send + Sync {
    /// Snapshot of chart data and balances for `time`.
    async fn get_market_state(&mut self, time: DateTime<Utc>) -> Result<MarketState>;

    /// Execute `trades`. When this returns, [`balances`](Self::balances)
    /// reflects the fills, real or simulated.
    async fn execute(&mut self, trades: Vec<ProposedTrade>, state: &MarketState) -> Result<()>;

    /// Balances as of the last snapshot or execution.
    fn balances(&self) -> Balances;

    /// Whether a single proposed trade is legal by this market's rules.
    ///
    /// Never fails on a bad trade: illegal trades are described in a warning
    /// and dropped by [`filter_legal`](Self::filter_legal).
    fn is_legal(&self, proposed: &ProposedTrade, state: &MarketState) -> bool {
        let price = proposed.price.unwrap_or(Decimal::ZERO);
        if price.is_zero() {
            warn!(trade = %proposed, "dropping proposed trade: no derivable price");
            return false;
        }

        // An absent balance row counts as holding zero here; the filter
        // itself never raises.
        let held = state
            .balances
            .get(&proposed.sell_coin)
            .copied()
            .unwrap_or(Decimal::ZERO);
        if proposed.sell_amount > held {
            warn!(
                trade = %proposed,
                held = %held,
                coin = %proposed.sell_coin,
                "dropping proposed trade: selling more than is held"
            );
            return false;
        }

        if proposed.sell_amount < Decimal::ZERO || proposed.buy_amount < Decimal::ZERO {
            warn!(trade = %proposed, "dropping proposed trade: negative sell/buy amount");
            return false;
        }

        let fiat_leg = if proposed.sell_coin == proposed.fiat {
            Some(proposed.sell_amount)
        } else if proposed.buy_coin == proposed.fiat {
            Some(proposed.buy_amount)
        } else {
            None
        };
        if matches!(fiat_leg, Some(amount) if amount < MINIMUM_FIAT_TRADE) {
            warn!(trade = %proposed, "dropping proposed trade: transaction too small");
            return false;
        }

        if !state.chart_data.contains_key(&proposed.market_name) {
            warn!(
                trade = %proposed,
                market = %proposed.market_name,
                "dropping proposed trade: market not in chart data"
            );
            return false;
        }

        true
    }

    /// The legal subset of `proposed`, preserving input order.
    fn filter_legal(
        &self,
        proposed: Vec<ProposedTrade>,
        state: &MarketState,
    ) -> Vec<ProposedTrade> {
        proposed
            .into_iter()
            .filter(|trade| self.is_legal(trade, state))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{ChartData, WEIGHTED_AVERAGE};
    use std::collections::HashMap;

    /// Bare adapter exercising only the provided legality methods.
    struct StubAdapter;

    #[async_trait]
    impl MarketAdapter for StubAdapter {
        async fn get_market_state(&mut self, _time: DateTime<Utc>) -> Result<MarketState> {
            anyhow::bail!("not used in these tests")
        }

        async fn execute(
            &mut self,
            _trades: Vec<ProposedTrade>,
            _state: &MarketState,
        ) -> Result<()> {
            Ok(())
        }

        fn balances(&self) -> Balances {
            Balances::new()
        }
    }

    fn chart_with(market: &str, price: Decimal) -> ChartData {
        HashMap::from([(
            market.to_string(),
            HashMap::from([(WEIGHTED_AVERAGE.to_string(), price)]),
        )])
    }

    fn state_with(market: &str, price: Decimal, balances: &[(&str, Decimal)]) -> MarketState {
        MarketState::new(
            chart_with(market, price),
            balances
                .iter()
                .map(|(coin, amount)| (coin.to_string(), *amount))
                .collect(),
            Utc::now(),
            "BTC",
        )
    }

    fn sized_trade(
        sell_coin: &str,
        buy_coin: &str,
        sell_amount: Decimal,
        buy_amount: Decimal,
        price: Decimal,
    ) -> ProposedTrade {
        let mut trade = ProposedTrade::new(sell_coin, buy_coin, "BTC", dec!(1), dec!(0.0025));
        trade.price = Some(price);
        trade.market_price = Some(price);
        trade.sell_amount = sell_amount;
        trade.buy_amount = buy_amount;
        trade
    }

    #[test]
    fn test_filters_trade_without_price() {
        let adapter = StubAdapter;
        let state = state_with("BTC_ETH", dec!(0.5), &[("BTC", dec!(10))]);
        let trade = ProposedTrade::new("BTC", "ETH", "BTC", dec!(1), dec!(0.0025));

        assert!(!adapter.is_legal(&trade, &state));
    }

    #[test]
    fn test_filters_trade_selling_more_than_held() {
        let adapter = StubAdapter;
        let state = state_with("BTC_ETH", dec!(0.5), &[("BTC", dec!(1))]);
        let trade = sized_trade("BTC", "ETH", dec!(5), dec!(9.97), dec!(0.5));

        assert!(adapter.filter_legal(vec![trade], &state).is_empty());
    }

    #[test]
    fn test_filters_trade_from_unknown_balance() {
        let adapter = StubAdapter;
        // No XMR balance row at all: treated as zero held, filtered.
        let state = state_with("BTC_XMR", dec!(0.01), &[("BTC", dec!(1))]);
        let trade = sized_trade("XMR", "BTC", dec!(1), dec!(0.00997), dec!(100));

        assert!(!adapter.is_legal(&trade, &state));
    }

    #[test]
    fn test_filters_negative_amounts() {
        let adapter = StubAdapter;
        let state = state_with("BTC_ETH", dec!(0.5), &[("BTC", dec!(10))]);
        let trade = sized_trade("BTC", "ETH", dec!(-1), dec!(2), dec!(0.5));

        assert!(!adapter.is_legal(&trade, &state));
    }

    #[test]
    fn test_filters_dust_fiat_leg() {
        let adapter = StubAdapter;
        let state = state_with("BTC_ETH", dec!(0.5), &[("BTC", dec!(10))]);
        let trade = sized_trade("BTC", "ETH", dec!(0.00005), dec!(0.0000997), dec!(0.5));

        assert!(adapter.filter_legal(vec![trade], &state).is_empty());
    }

    #[test]
    fn test_filters_unknown_market() {
        let adapter = StubAdapter;
        let state = state_with("BTC_ETH", dec!(0.5), &[("BTC", dec!(10))]);
        let mut trade = sized_trade("BTC", "DOGE", dec!(1), dec!(1.99), dec!(0.5));
        trade.market_name = "BTC_DOGE".to_string();

        assert!(!adapter.is_legal(&trade, &state));
    }

    #[test]
    fn test_keeps_legal_trades_in_order() {
        let adapter = StubAdapter;
        let state = state_with("BTC_ETH", dec!(0.5), &[("BTC", dec!(10)), ("ETH", dec!(4))]);
        let buy = sized_trade("BTC", "ETH", dec!(1), dec!(1.995), dec!(0.5));
        let sell = sized_trade("ETH", "BTC", dec!(2), dec!(0.9975), dec!(2));
        let oversized = sized_trade("BTC", "ETH", dec!(100), dec!(199.5), dec!(0.5));

        let legal = adapter.filter_legal(vec![buy, oversized, sell], &state);
        assert_eq!(legal.len(), 2);
        assert_eq!(legal[0].sell_coin, "BTC");
        assert_eq!(legal[1].sell_coin, "ETH");
    }
}

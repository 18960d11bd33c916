//! An immutable snapshot of prices and holdings for one decision cycle.
//!
//! `MarketState` is the valuation and sizing engine: it converts amounts
//! between assets through direct or inverted markets, sizes proposed trades
//! net of fees, and projects the balance changes a batch of trades would
//! cause without executing anything.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::warn;

use crate::error::MarketError;
use crate::models::ProposedTrade;

/// Chart statistic every market must carry.
pub const WEIGHTED_AVERAGE: &str = "weighted_average";

// USD is only ever quoted against BTC in the supported chart data, so
// aggregate USD value converts through BTC in a single hop. Valuing across
// multiple intermediate markets is deliberately unsupported.
const USD_PIVOT: &str = "BTC";
const USD_MARKET: &str = "USD_BTC";

/// Market identifier (`"{base}_{quote}"`) -> statistic name -> value.
pub type ChartData = HashMap<String, HashMap<String, Decimal>>;

/// Asset symbol -> quantity held.
pub type Balances = HashMap<String, Decimal>;

/// Snapshot of the market and our holdings at a single point in time.
///
/// One instance exists per decision cycle; nothing here mutates after
/// construction. Balances may name assets with no chart entry, which are
/// treated as valueless with a warning rather than an error.
#[derive(Debug, Clone)]
pub struct MarketState {
    pub chart_data: ChartData,
    pub balances: Balances,
    pub time: DateTime<Utc>,
    pub fiat: String,
}

fn coin_names(market_name: &str) -> Result<(&str, &str), MarketError> {
    market_name
        .split_once('_')
        .ok_or_else(|| MarketError::MalformedMarket(market_name.to_string()))
}

impl MarketState {
    pub fn new(
        chart_data: ChartData,
        balances: Balances,
        time: DateTime<Utc>,
        fiat: impl Into<String>,
    ) -> Self {
        Self {
            chart_data,
            balances,
            time,
            fiat: fiat.into(),
        }
    }

    /// Quantity of `coin` held. A missing entry is an error, not zero.
    pub fn balance(&self, coin: &str) -> Result<Decimal, MarketError> {
        self.balances
            .get(coin)
            .copied()
            .ok_or_else(|| MarketError::MissingBalance(coin.to_string()))
    }

    /// Weighted-average price of a market, in terms of its base asset.
    pub fn price(&self, market: &str) -> Result<Decimal, MarketError> {
        self.price_stat(market, WEIGHTED_AVERAGE)
    }

    /// A named chart statistic for a market.
    pub fn price_stat(&self, market: &str, stat: &str) -> Result<Decimal, MarketError> {
        let stats = self
            .chart_data
            .get(market)
            .ok_or_else(|| MarketError::MissingMarket(market.to_string()))?;
        stats
            .get(stat)
            .copied()
            .ok_or_else(|| MarketError::MissingStatistic {
                market: market.to_string(),
                stat: stat.to_string(),
            })
    }

    fn available_markets(&self) -> impl Iterator<Item = &str> {
        self.chart_data.keys().map(String::as_str).filter(|market| {
            matches!(market.split_once('_'), Some((base, _)) if base == self.fiat)
        })
    }

    /// Coins purchasable with fiat, plus fiat itself.
    pub fn available_coins(&self) -> HashSet<String> {
        let mut coins: HashSet<String> = self
            .available_markets()
            .filter_map(|market| market.split_once('_'))
            .map(|(_, quote)| quote.to_string())
            .collect();
        coins.insert(self.fiat.clone());
        coins
    }

    /// Assets with a strictly positive balance.
    pub fn held_coins(&self) -> HashSet<String> {
        self.balances
            .iter()
            .filter(|(_, balance)| **balance > Decimal::ZERO)
            .map(|(coin, _)| coin.clone())
            .collect()
    }

    /// True if `coin` is the only asset held.
    pub fn only_holding(&self, coin: &str) -> bool {
        let held = self.held_coins();
        held.len() == 1 && held.contains(coin)
    }

    pub fn available_coins_not_held(&self) -> HashSet<String> {
        &self.available_coins() - &self.held_coins()
    }

    pub fn held_coins_with_chart_data(&self) -> HashSet<String> {
        &self.held_coins() & &self.available_coins()
    }

    /// Value of `amount` of `coin` in terms of `reference_coin`.
    ///
    /// Looks up the direct market `reference_coin_coin` first, then the
    /// inverted `coin_reference_coin`. `None` means no market can price the
    /// pair; aggregating callers treat that as zero, never as a failure.
    pub fn estimate_value(
        &self,
        coin: &str,
        amount: Decimal,
        reference_coin: &str,
    ) -> Option<Decimal> {
        if coin == reference_coin {
            return Some(amount);
        }

        let market = format!("{}_{}", reference_coin, coin);
        if let Some(reference_per_coin) =
            self.chart_data.get(&market).and_then(|s| s.get(WEIGHTED_AVERAGE))
        {
            return Some(amount * reference_per_coin);
        }

        // We may have to flip the coins around to find the market.
        let market = format!("{}_{}", coin, reference_coin);
        if let Some(coin_per_reference) =
            self.chart_data.get(&market).and_then(|s| s.get(WEIGHTED_AVERAGE))
        {
            if !coin_per_reference.is_zero() {
                return Some(amount / coin_per_reference);
            }
        }

        warn!(
            coin = %coin,
            reference = %reference_coin,
            "no market to price coin pair; has it been delisted?"
        );
        None
    }

    /// Per-asset values in terms of `reference_coin`, substituting zero where
    /// no market can price an asset.
    pub fn estimate_values(
        &self,
        balances: &Balances,
        reference_coin: &str,
    ) -> HashMap<String, Decimal> {
        balances
            .iter()
            .map(|(coin, amount)| {
                let value = self
                    .estimate_value(coin, *amount, reference_coin)
                    .unwrap_or(Decimal::ZERO);
                (coin.clone(), value)
            })
            .collect()
    }

    /// Total value of `balances` in terms of `reference_coin`.
    pub fn estimate_total_value(&self, balances: &Balances, reference_coin: &str) -> Decimal {
        self.estimate_values(balances, reference_coin)
            .values()
            .sum()
    }

    /// Total value of `balances` in USD, rounded to cents.
    pub fn estimate_total_value_usd(&self, balances: &Balances) -> Result<Decimal, MarketError> {
        let btc_value = self.estimate_total_value(balances, USD_PIVOT);
        let usd_value = btc_value * self.price(USD_MARKET)?;
        Ok(usd_value.round_dp(2))
    }

    /// Record the raw market quote and the direction-adjusted trading price
    /// on `trade`, returning the adjusted price.
    ///
    /// Chart prices are always quoted in the base asset; the sizing math runs
    /// in units of the asset actually being spent, so the quote is flipped
    /// when the trade buys the market's base currency.
    pub fn estimate_price(&self, trade: &mut ProposedTrade) -> Result<Decimal, MarketError> {
        let market_price = self.price(&trade.market_name)?;
        if market_price.is_zero() {
            return Err(MarketError::ZeroPrice(trade.market_name.clone()));
        }
        let (base, _quote) = coin_names(&trade.market_name)?;

        let price = if trade.buy_coin == base {
            Decimal::ONE / market_price
        } else {
            market_price
        };
        trade.market_price = Some(market_price);
        trade.price = Some(price);
        Ok(price)
    }

    /// Size `trade` so the portfolio moves toward holding
    /// `fiat_value_to_trade` worth of value in `trade.fiat`.
    ///
    /// Selling fiat spends exactly `fiat_value_to_trade`. Buying fiat sells
    /// the excess of `sell_coin` above that target, clamped at zero when the
    /// holding is already below it. Any other shape is a caller error. The
    /// fee comes off the sell leg only.
    pub fn set_sell_amount(&self, trade: &mut ProposedTrade) -> Result<(), MarketError> {
        self.size_against(trade, &self.balances)?;
        Ok(())
    }

    /// Sizing against an explicit balances map, so a simulated batch can let
    /// each trade see the balances left by the trades before it.
    fn size_against(
        &self,
        trade: &mut ProposedTrade,
        balances: &Balances,
    ) -> Result<Decimal, MarketError> {
        let price = self.estimate_price(trade)?;

        if trade.sell_coin == trade.fiat {
            trade.sell_amount = trade.fiat_value_to_trade;
        } else if trade.buy_coin == trade.fiat {
            let held = balances
                .get(&trade.sell_coin)
                .copied()
                .ok_or_else(|| MarketError::MissingBalance(trade.sell_coin.clone()))?;
            let current_value = held * price;
            let value_to_sell = current_value - trade.fiat_value_to_trade;
            // Already at or below target: nothing to sell.
            trade.sell_amount = (value_to_sell / price).max(Decimal::ZERO);
        } else {
            return Err(MarketError::TradeNotFiat {
                sell_coin: trade.sell_coin.clone(),
                buy_coin: trade.buy_coin.clone(),
                fiat: trade.fiat.clone(),
            });
        }

        let invested = trade.sell_amount * (Decimal::ONE - trade.fee);
        trade.buy_amount = invested / price;
        Ok(price)
    }

    /// Project the balances that would result from executing `trades` in
    /// order, without performing any real execution.
    ///
    /// Returns a fresh map; the snapshot's own balances are untouched. Each
    /// trade is sized against the balances as mutated by the trades before it
    /// in the batch. The projected credit is the optimistic
    /// `sell_amount / price` fill, before fees.
    pub fn simulate_trades(&self, trades: &[ProposedTrade]) -> Result<Balances, MarketError> {
        let mut new_balances = self.balances.clone();

        for trade in trades {
            let mut sized = trade.clone();
            let price = self.size_against(&mut sized, &new_balances)?;

            let debited = new_balances
                .get_mut(&sized.sell_coin)
                .ok_or_else(|| MarketError::MissingBalance(sized.sell_coin.clone()))?;
            *debited -= sized.sell_amount;

            let est_trade_amount = sized.sell_amount / price;
            *new_balances
                .entry(sized.buy_coin.clone())
                .or_insert(Decimal::ZERO) += est_trade_amount;
        }

        Ok(new_balances)
    }
}

//! Proposed trade: a strategy's intent to move value between fiat and a coin.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single proposed trade, one leg of which is always the fiat asset.
///
/// Strategies fill in the intent fields (`sell_coin`, `buy_coin`,
/// `fiat_value_to_trade`, `fee`); the sizing engine writes `market_price`,
/// `price`, `sell_amount` and `buy_amount`. A trade between two non-fiat
/// assets cannot be sized and is rejected with an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedTrade {
    /// Asset being spent
    pub sell_coin: String,

    /// Asset being acquired
    pub buy_coin: String,

    /// Market this trade executes on (`"{base}_{quote}"`)
    pub market_name: String,

    /// The designated fiat asset; exactly one of sell/buy must equal it
    pub fiat: String,

    /// Desired fiat-equivalent size. When selling fiat this is the amount to
    /// spend; when buying fiat it is the value of `sell_coin` to keep holding.
    pub fiat_value_to_trade: Decimal,

    /// Fractional fee charged on the sell leg (e.g. 0.0025)
    pub fee: Decimal,

    /// Raw market quote, in units of the base asset; written by the engine
    pub market_price: Option<Decimal>,

    /// Direction-adjusted trading price used by the sizing math; written by
    /// the engine
    pub price: Option<Decimal>,

    /// Quantity of `sell_coin` to sell; written by the engine
    pub sell_amount: Decimal,

    /// Quantity of `buy_coin` acquired net of fees; written by the engine
    pub buy_amount: Decimal,
}

impl ProposedTrade {
    /// Build an unsized trade. The market name is derived fiat-first from the
    /// non-fiat leg, matching how chart data keys its markets.
    pub fn new(
        sell_coin: impl Into<String>,
        buy_coin: impl Into<String>,
        fiat: impl Into<String>,
        fiat_value_to_trade: Decimal,
        fee: Decimal,
    ) -> Self {
        let sell_coin = sell_coin.into();
        let buy_coin = buy_coin.into();
        let fiat = fiat.into();
        let coin = if sell_coin == fiat {
            &buy_coin
        } else {
            &sell_coin
        };
        let market_name = format!("{}_{}", fiat, coin);

        Self {
            sell_coin,
            buy_coin,
            market_name,
            fiat,
            fiat_value_to_trade,
            fee,
            market_price: None,
            price: None,
            sell_amount: Decimal::ZERO,
            buy_amount: Decimal::ZERO,
        }
    }

    /// Base currency of the market this trade runs on.
    pub fn market_base(&self) -> Option<&str> {
        self.market_name.split_once('_').map(|(base, _)| base)
    }
}

impl fmt::Display for ProposedTrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} {} on {} (target {} {})",
            self.sell_amount,
            self.sell_coin,
            self.buy_amount,
            self.buy_coin,
            self.market_name,
            self.fiat_value_to_trade,
            self.fiat,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_market_name_derived_fiat_first() {
        let buy = ProposedTrade::new("BTC", "ETH", "BTC", dec!(1), dec!(0.0025));
        assert_eq!(buy.market_name, "BTC_ETH");
        assert_eq!(buy.market_base(), Some("BTC"));

        let sell = ProposedTrade::new("ETH", "BTC", "BTC", dec!(1), dec!(0.0025));
        assert_eq!(sell.market_name, "BTC_ETH");
    }

    #[test]
    fn test_new_trade_is_unsized() {
        let trade = ProposedTrade::new("BTC", "XMR", "BTC", dec!(0.5), dec!(0.0025));
        assert!(trade.price.is_none());
        assert!(trade.market_price.is_none());
        assert_eq!(trade.sell_amount, Decimal::ZERO);
        assert_eq!(trade.buy_amount, Decimal::ZERO);
    }
}

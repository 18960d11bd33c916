//! Wire types for the exchange HTTP API.

use std::fmt;

use rust_decimal::Decimal;
use serde::Deserialize;

/// Which side of a market an order is placed on. `Buy` acquires the quote
/// asset with the base asset; `Sell` does the opposite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The trading API command for this side.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One market's entry in the public ticker.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerEntry {
    pub last: Decimal,
    pub lowest_ask: Decimal,
    pub highest_bid: Decimal,
    #[serde(default)]
    pub percent_change: Decimal,
    #[serde(default)]
    pub base_volume: Decimal,
    #[serde(default)]
    pub quote_volume: Decimal,
    #[serde(default)]
    pub high24hr: Decimal,
    #[serde(default)]
    pub low24hr: Decimal,
}

/// Response to a buy/sell order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_number: String,
    #[serde(default)]
    pub resulting_trades: Vec<FillEntry>,
}

/// One fill reported back with an order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillEntry {
    pub amount: Decimal,
    pub rate: Decimal,
    pub total: Decimal,
}

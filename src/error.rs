//! Typed errors for the valuation and sizing core.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by market-state lookups and trade sizing.
///
/// These are caller/configuration errors and propagate to the orchestrator;
/// benign data gaps (a coin with no market) are handled in place with a
/// warning instead and never surface here.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("no balance entry for coin {0}")]
    MissingBalance(String),

    #[error("no chart data for market {0}")]
    MissingMarket(String),

    #[error("market {market} has no {stat} statistic")]
    MissingStatistic { market: String, stat: String },

    #[error("market {0} quotes a zero price")]
    ZeroPrice(String),

    #[error("market name {0} is not of the form base_quote")]
    MalformedMarket(String),

    #[error("proposed trade {sell_coin} -> {buy_coin} is neither to nor from fiat {fiat}")]
    TradeNotFiat {
        sell_coin: String,
        buy_coin: String,
        fiat: String,
    },

    #[error("no chart snapshot at or before {0}")]
    NoChartData(DateTime<Utc>),
}

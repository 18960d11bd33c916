//! Fund configuration.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Configuration shared by live runs and backtests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundConfig {
    /// Reference asset whose markets define the tradable universe
    pub fiat: String,

    /// Seconds between decision cycles
    pub trade_interval_secs: u64,

    /// Fractional fee charged on the sell leg of every trade
    pub fee: Decimal,

    /// Sqlite URL of the market history store
    pub database_url: String,

    /// Holdings a simulated run starts from
    pub initial_balances: HashMap<String, Decimal>,
}

impl FundConfig {
    pub fn trade_interval(&self) -> Duration {
        Duration::from_secs(self.trade_interval_secs)
    }
}

impl Default for FundConfig {
    fn default() -> Self {
        Self {
            fiat: "BTC".to_string(),
            trade_interval_secs: 86_400,              // Daily rebalance
            fee: dec!(0.0025),                        // 0.25% taker fee
            database_url: "sqlite:fundbot.db?mode=rwc".to_string(),
            initial_balances: HashMap::from([("BTC".to_string(), dec!(1))]),
        }
    }
}

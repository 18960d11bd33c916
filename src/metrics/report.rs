//! Summary statistics for one backtest run.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use statrs::statistics::Statistics;

/// Performance summary computed from a backtest's (time, USD value) series.
#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub initial_value: Decimal,
    pub final_value: Decimal,
    pub total_return_pct: f64,
    pub max_drawdown_pct: f64,
    /// Per-cycle Sharpe ratio (not annualized).
    pub sharpe_ratio: f64,
    pub cycles: usize,
}

impl BacktestReport {
    /// Summarize a value series. Returns `None` for an empty series.
    pub fn from_series(series: &[(DateTime<Utc>, Decimal)]) -> Option<Self> {
        let (start_time, initial_value) = *series.first()?;
        let (end_time, final_value) = *series.last()?;

        let values: Vec<f64> = series
            .iter()
            .map(|(_, value)| value.to_f64().unwrap_or(0.0))
            .collect();

        let initial = values[0];
        let total_return_pct = if initial > 0.0 {
            (values[values.len() - 1] - initial) / initial
        } else {
            0.0
        };

        let mut peak = f64::MIN;
        let mut max_drawdown_pct = 0.0f64;
        for value in &values {
            if *value > peak {
                peak = *value;
            }
            if peak > 0.0 {
                let drawdown = (peak - value) / peak;
                if drawdown > max_drawdown_pct {
                    max_drawdown_pct = drawdown;
                }
            }
        }

        let returns: Vec<f64> = values
            .windows(2)
            .filter(|pair| pair[0] > 0.0)
            .map(|pair| pair[1] / pair[0] - 1.0)
            .collect();
        let sharpe_ratio = if returns.len() > 1 {
            let mean = returns.clone().mean();
            let std_dev = returns.clone().std_dev();
            if std_dev > 0.0 {
                mean / std_dev
            } else {
                0.0
            }
        } else {
            0.0
        };

        Some(Self {
            start_time,
            end_time,
            initial_value,
            final_value,
            total_return_pct,
            max_drawdown_pct,
            sharpe_ratio,
            cycles: series.len(),
        })
    }
}

impl fmt::Display for BacktestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n{:=^52}", " BACKTEST REPORT ")?;
        writeln!(
            f,
            "Period:       {} to {}",
            self.start_time.format("%Y-%m-%d"),
            self.end_time.format("%Y-%m-%d")
        )?;
        writeln!(f, "Cycles:       {}", self.cycles)?;
        writeln!(f, "Initial:      ${:.2}", self.initial_value)?;
        writeln!(f, "Final:        ${:.2}", self.final_value)?;
        writeln!(f, "Return:       {:.2}%", self.total_return_pct * 100.0)?;
        writeln!(f, "Max Drawdown: {:.2}%", self.max_drawdown_pct * 100.0)?;
        writeln!(f, "Sharpe:       {:.2}", self.sharpe_ratio)?;
        writeln!(f, "{:=^52}", "")?;
        Ok(())
    }
}

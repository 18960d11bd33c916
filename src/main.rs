//! fundbot — a rebalancing crypto fund bot.
//!
//! Drives a pluggable strategy through fixed-cadence decision cycles, either
//! replayed against stored market history (backtest) or polled live against
//! the exchange.

mod adapters;
mod api;
mod config;
mod error;
mod fund;
mod history;
mod market;
mod metrics;
mod models;
mod strategy;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use futures::{pin_mut, StreamExt};
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::adapters::{BacktestAdapter, LiveAdapter, MarketAdapter};
use crate::api::PoloniexClient;
use crate::config::FundConfig;
use crate::fund::Fund;
use crate::history::MarketHistory;
use crate::metrics::BacktestReport;
use crate::strategy::{EqualWeightStrategy, HoldStrategy, Strategy};

/// Fund bot CLI.
#[derive(Parser)]
#[command(name = "fundbot")]
#[command(about = "Rebalance a multi-asset crypto fund, live or backtested", long_about = None)]
struct Cli {
    /// History database URL
    #[arg(short, long, default_value = "sqlite:./fundbot.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay stored history between two dates and report the USD value series
    Backtest {
        /// Start date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        end: String,

        /// Strategy to drive (hold, equal-weight)
        #[arg(short, long, default_value = "equal-weight")]
        strategy: String,

        /// Initial fiat holding to simulate from
        #[arg(short, long, default_value = "1.0")]
        capital: Decimal,

        /// Seconds between decision cycles
        #[arg(short, long, default_value = "86400")]
        interval: u64,
    },

    /// Run the live trading loop
    Run {
        /// Strategy to drive (hold, equal-weight)
        #[arg(short, long, default_value = "equal-weight")]
        strategy: String,

        /// Seconds between decision cycles
        #[arg(short, long, default_value = "86400")]
        interval: u64,

        /// Simulate fills locally instead of placing real orders
        #[arg(long)]
        dry_run: bool,
    },

    /// Fetch the latest chart data into the history store
    Scrape,

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = FundConfig::default();
    config.database_url = cli.database.clone();

    match cli.command {
        Commands::Backtest {
            start,
            end,
            strategy,
            capital,
            interval,
        } => {
            config.trade_interval_secs = interval;

            let start = parse_time(&start)?;
            let end = parse_time(&end)?;
            if end < start {
                bail!("backtest end {} is before start {}", end, start);
            }

            let history = Arc::new(MarketHistory::connect(&config.database_url).await?);
            let initial = HashMap::from([(config.fiat.clone(), capital)]);
            let adapter = BacktestAdapter::new(history.clone(), config.fiat.clone(), initial);
            let strategy = build_strategy(&strategy, &config)?;

            info!(
                start = %start,
                end = %end,
                capital = %capital,
                "starting backtest"
            );

            let mut fund = Fund::new(strategy, history, Box::new(adapter));
            let mut series = Vec::new();
            {
                let values = fund.begin_backtest(start, end);
                pin_mut!(values);

                let period = chrono::Duration::seconds(interval.max(1) as i64);
                let mut time = start;
                println!("\n{:<22} {:>14}", "TIME", "USD VALUE");
                println!("{}", "-".repeat(37));
                while let Some(value) = values.next().await {
                    let value = value?;
                    let stamp = time.format("%Y-%m-%d %H:%M:%S").to_string();
                    println!("{:<22} {:>14.2}", stamp, value);
                    series.push((time, value));
                    time += period;
                }
            }

            if let Some(report) = BacktestReport::from_series(&series) {
                println!("{}", report);
            }
        }

        Commands::Run {
            strategy,
            interval,
            dry_run,
        } => {
            config.trade_interval_secs = interval;

            info!(
                strategy = %strategy,
                interval = interval,
                dry_run = dry_run,
                "starting fund"
            );

            let (history, adapter): (Arc<MarketHistory>, Box<dyn MarketAdapter>) =
                if dry_run {
                    let history = Arc::new(MarketHistory::connect(&config.database_url).await?);
                    let adapter: Box<dyn MarketAdapter> = Box::new(BacktestAdapter::new(
                        history.clone(),
                        config.fiat.clone(),
                        config.initial_balances.clone(),
                    ));
                    (history, adapter)
                } else {
                    let client = PoloniexClient::from_env()
                        .context("live trading needs API credentials")?;
                    let history = Arc::new(
                        MarketHistory::with_client(&config.database_url, client.clone()).await?,
                    );
                    let adapter: Box<dyn MarketAdapter> =
                        Box::new(LiveAdapter::new(client, history.clone(), config.fiat.clone()));
                    (history, adapter)
                };

            let strategy = build_strategy(&strategy, &config)?;
            let mut fund = Fund::new(strategy, history, adapter);

            let shutdown = Arc::new(AtomicBool::new(false));
            let signal = shutdown.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("shutdown signal received");
                signal.store(true, Ordering::SeqCst);
            });

            fund.run_live(shutdown).await?;
        }

        Commands::Scrape => {
            let history = MarketHistory::connect(&config.database_url).await?;
            let markets = history.scrape_latest().await?;
            println!("Recorded chart snapshot for {} markets", markets);
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// Pick a strategy implementation by name.
fn build_strategy(name: &str, config: &FundConfig) -> Result<Box<dyn Strategy>> {
    let interval = config.trade_interval();
    match name.to_lowercase().as_str() {
        "hold" => Ok(Box::new(HoldStrategy::new(interval))),
        "equal-weight" | "equal_weight" | "equal" => {
            Ok(Box::new(EqualWeightStrategy::new(interval, config.fee)))
        }
        other => bail!("unknown strategy: {}", other),
    }
}

/// Parse a date as YYYY-MM-DD (midnight UTC) or full RFC 3339.
fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(s) {
        return Ok(datetime.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("could not parse date: {}", s))?;
    Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}

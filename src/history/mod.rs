//! Persistent market history: a sqlite store of chart-data snapshots.
//!
//! Backtests replay stored snapshots; the live loop appends a fresh one each
//! cycle via [`MarketHistory::scrape_latest`].

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::api::PoloniexClient;
use crate::error::MarketError;
use crate::market::ChartData;

/// Historical chart data, one row per (time, market, statistic).
pub struct MarketHistory {
    pool: SqlitePool,
    client: PoloniexClient,
}

impl MarketHistory {
    /// Open (or create) the history store with a public-only API client.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::with_client(database_url, PoloniexClient::public()?).await
    }

    /// Open the store with an explicit client (e.g. one pointed at a test
    /// server).
    pub async fn with_client(database_url: &str, client: PoloniexClient) -> Result<Self> {
        // Cycles run one at a time, so a single connection suffices; it also
        // keeps `sqlite::memory:` URLs on one database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .context("Failed to connect to history database")?;

        let history = Self { pool, client };
        history.run_migrations().await?;

        Ok(history)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chart_points (
                ts INTEGER NOT NULL,
                market TEXT NOT NULL,
                stat TEXT NOT NULL,
                value REAL NOT NULL,
                PRIMARY KEY (ts, market, stat)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist one chart snapshot at `time`.
    pub async fn record_chart(&self, time: DateTime<Utc>, chart: &ChartData) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for (market, stats) in chart {
            for (stat, value) in stats {
                sqlx::query(
                    "INSERT OR REPLACE INTO chart_points (ts, market, stat, value) \
                     VALUES (?, ?, ?, ?)",
                )
                .bind(time.timestamp())
                .bind(market)
                .bind(stat)
                .bind(value.to_f64().unwrap_or(0.0))
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// The most recent chart snapshot at or before `time`.
    pub async fn chart_data_at(&self, time: DateTime<Utc>) -> Result<ChartData> {
        let ts: Option<i64> = sqlx::query_scalar("SELECT MAX(ts) FROM chart_points WHERE ts <= ?")
            .bind(time.timestamp())
            .fetch_one(&self.pool)
            .await?;
        let ts = ts.ok_or(MarketError::NoChartData(time))?;

        let rows = sqlx::query("SELECT market, stat, value FROM chart_points WHERE ts = ?")
            .bind(ts)
            .fetch_all(&self.pool)
            .await?;

        let mut chart = ChartData::new();
        for row in rows {
            let market: String = row.get("market");
            let stat: String = row.get("stat");
            let value: f64 = row.get("value");
            chart
                .entry(market)
                .or_default()
                .insert(stat, Decimal::from_f64(value).unwrap_or(Decimal::ZERO));
        }

        Ok(chart)
    }

    /// Fetch the latest ticker and append it as a snapshot. Returns the
    /// number of markets recorded.
    pub async fn scrape_latest(&self) -> Result<usize> {
        let chart = self.client.ticker_chart().await?;
        let now = Utc::now();
        self.record_chart(now, &chart).await?;
        info!(markets = chart.len(), time = %now, "recorded chart snapshot");
        Ok(chart.len())
    }
}

//! Exchange HTTP client: public ticker plus signed trading endpoints.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use backoff::ExponentialBackoff;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use sha2::Sha512;
use tracing::debug;
use uuid::Uuid;

use crate::market::{Balances, ChartData, WEIGHTED_AVERAGE};

use super::types::{OrderResponse, OrderSide, TickerEntry};

const PUBLIC_API_BASE: &str = "https://poloniex.com/public";
const TRADING_API_BASE: &str = "https://poloniex.com/tradingApi";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

type HmacSha512 = Hmac<Sha512>;

#[derive(Clone)]
struct Credentials {
    key: String,
    secret: String,
}

/// Client for the exchange's HTTP API.
///
/// The public ticker needs no credentials; balance and order calls are
/// HMAC-SHA512 signed and require API keys.
#[derive(Clone)]
pub struct PoloniexClient {
    client: Client,
    public_url: String,
    trading_url: String,
    credentials: Option<Credentials>,
}

impl PoloniexClient {
    /// Create a client for public endpoints only.
    pub fn public() -> Result<Self> {
        Self::build(None)
    }

    /// Create a client with credentials from `POLONIEX_API_KEY` /
    /// `POLONIEX_API_SECRET`.
    pub fn from_env() -> Result<Self> {
        let key = std::env::var("POLONIEX_API_KEY").context("POLONIEX_API_KEY not set")?;
        let secret = std::env::var("POLONIEX_API_SECRET").context("POLONIEX_API_SECRET not set")?;
        Self::build(Some(Credentials { key, secret }))
    }

    fn build(credentials: Option<Credentials>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            public_url: PUBLIC_API_BASE.to_string(),
            trading_url: TRADING_API_BASE.to_string(),
            credentials,
        })
    }

    /// Point the client at different endpoints (for testing).
    pub fn with_base_urls(mut self, public_url: String, trading_url: String) -> Self {
        self.public_url = public_url;
        self.trading_url = trading_url;
        self
    }

    /// Latest ticker for every market, reshaped as chart data.
    pub async fn ticker_chart(&self) -> Result<ChartData> {
        let url = format!("{}?command=returnTicker", self.public_url);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        let ticker = backoff::future::retry(backoff, || async {
            let response = self.client.get(&url).send().await?.error_for_status()?;
            let ticker: HashMap<String, TickerEntry> = response.json().await?;
            Ok(ticker)
        })
        .await
        .context("Failed to fetch ticker")?;

        debug!(markets = ticker.len(), "fetched ticker");
        Ok(chart_from_ticker(ticker))
    }

    /// Balances of every asset on the account.
    pub async fn balances(&self) -> Result<Balances> {
        self.private_call("returnBalances", &[]).await
    }

    /// Place a limit order at `rate` for `amount` of the market's quote
    /// asset.
    pub async fn place_order(
        &self,
        market: &str,
        side: OrderSide,
        rate: Decimal,
        amount: Decimal,
    ) -> Result<OrderResponse> {
        let client_order_id = Uuid::new_v4().to_string();
        let params = [
            ("currencyPair", market.to_string()),
            ("rate", rate.to_string()),
            ("amount", amount.to_string()),
            ("clientOrderId", client_order_id.clone()),
        ];

        debug!(
            market = %market,
            side = %side,
            rate = %rate,
            amount = %amount,
            client_order_id = %client_order_id,
            "placing order"
        );
        self.private_call(side.as_str(), &params).await
    }

    async fn private_call<T: serde::de::DeserializeOwned>(
        &self,
        command: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| anyhow!("API credentials not configured"))?;

        let nonce = Utc::now().timestamp_millis().to_string();
        let mut form: Vec<(&str, String)> = vec![("command", command.to_string()), ("nonce", nonce)];
        form.extend_from_slice(params);

        let body = form
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("&");
        let signature = sign(&credentials.secret, &body)?;

        let response = self
            .client
            .post(&self.trading_url)
            .header("Key", &credentials.key)
            .header("Sign", signature)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("trading API call {} failed: {} - {}", command, status, text);
        }

        response
            .json()
            .await
            .context("Failed to parse trading API response")
    }
}

/// HMAC-SHA512 of the request body, hex encoded.
fn sign(secret: &str, body: &str) -> Result<String> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|_| anyhow!("invalid API secret"))?;
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Reshape a ticker response into chart data. The ticker's last price stands
/// in for the weighted average between full chart refreshes.
fn chart_from_ticker(ticker: HashMap<String, TickerEntry>) -> ChartData {
    ticker
        .into_iter()
        .map(|(market, entry)| {
            let stats = HashMap::from([
                (WEIGHTED_AVERAGE.to_string(), entry.last),
                ("lowest_ask".to_string(), entry.lowest_ask),
                ("highest_bid".to_string(), entry.highest_bid),
                ("base_volume".to_string(), entry.base_volume),
                ("quote_volume".to_string(), entry.quote_volume),
                ("high_24h".to_string(), entry.high24hr),
                ("low_24h".to_string(), entry.low24hr),
            ]);
            (market, stats)
        })
        .collect()
}

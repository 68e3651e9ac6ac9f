use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue},
};
use rust_decimal::{Decimal, prelude::FromPrimitive};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::error::MarketDataError;
use crate::position::round_money;

/// Latest prices keyed by symbol. `None` means the provider had no usable value.
pub type LatestPrices = HashMap<String, Option<Decimal>>;

/// Typed access to closing prices.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// One call for many symbols. Symbols the provider skipped map to `None`.
    async fn fetch_latest(&self, symbols: &[String]) -> Result<LatestPrices, MarketDataError>;

    async fn fetch_single_latest(&self, symbol: &str) -> Result<Decimal, MarketDataError>;

    /// Close of the last trading day on or before `date`, with that day's date.
    async fn fetch_close_on_or_before(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<(Decimal, NaiveDate), MarketDataError>;

    /// Close of the first trading day on or after `today - days`.
    async fn fetch_close_n_days_ago(&self, symbol: &str, days: u32)
    -> Result<Decimal, MarketDataError>;

    /// Most recent close within the last `window_days` calendar days.
    async fn fetch_recent_close(
        &self,
        symbol: &str,
        window_days: u32,
    ) -> Result<Decimal, MarketDataError>;

    /// Listed company name for a ticker.
    async fn fetch_company_name(&self, symbol: &str) -> Result<String, MarketDataError> {
        Err(MarketDataError::NoData(symbol.to_string()))
    }

    /// Upper bound on one whole call, retries included, given the
    /// configured per-call limit.
    fn call_deadline(&self, per_call: Duration) -> Duration {
        per_call
    }
}

/// Daily-bar window for the close `days` calendar days before `today`.
///
/// Starts on `today - days` and spans the lookaround so a weekend or holiday
/// resolves to the next trading day, never past `today`.
pub fn week_window(today: NaiveDate, days: u32) -> (NaiveDate, NaiveDate) {
    let start = today - Days::new(u64::from(days));
    let end = (start + Days::new(LOOKAROUND_DAYS - 1)).min(today);
    (start, end)
}

const DAILY: &str = "1Day";
const LOOKAROUND_DAYS: u64 = 5;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Alpaca market-data v2 client.
#[derive(Clone)]
pub struct AlpacaClient {
    client: Client,
    base_api: String,
    trading_api: Option<String>,
    feed: String,
    retries: u32,
    timeout: Duration,
}

impl AlpacaClient {
    pub fn new(
        base_api: String,
        key_id: String,
        secret: String,
        feed: String,
        retries: u32,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("APCA-API-KEY-ID", HeaderValue::from_str(&key_id)?);
        headers.insert("APCA-API-SECRET-KEY", HeaderValue::from_str(&secret)?);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_api,
            trading_api: None,
            feed,
            retries: retries.min(1),
            timeout,
        })
    }

    /// Enables company-name lookups against the trading API's assets endpoint.
    pub fn with_trading_api(mut self, trading_api: String) -> Self {
        self.trading_api = Some(trading_api);
        self
    }

    pub fn from_env(timeout: Duration) -> anyhow::Result<Self> {
        let base_api = std::env::var("APCA_API_BASE_URL")?;
        let key_id = std::env::var("APCA_API_KEY_ID")?;
        let secret = std::env::var("APCA_API_SECRET_KEY")?;
        let feed = std::env::var("APCA_FEED").unwrap_or_else(|_| "iex".to_string());
        let retries = std::env::var("APCA_RETRIES")
            .ok()
            .and_then(|r| r.parse().ok())
            .unwrap_or(1);
        let client = Self::new(base_api, key_id, secret, feed, retries, timeout)?;

        Ok(match std::env::var("APCA_TRADING_BASE_URL") {
            Ok(trading_api) => client.with_trading_api(trading_api),
            Err(_) => client,
        })
    }

    fn url(&self, path: &str) -> String {
        join(&self.base_api, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, MarketDataError> {
        let mut attempt = 0;
        loop {
            match self.try_get_json(url, query).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, url, "transient provider error, retrying");
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, MarketDataError> {
        let body = self
            .client
            .get(url)
            .query(&[("feed", self.feed.as_str())])
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body)
    }

    async fn daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, MarketDataError> {
        let url = self.url(&format!("/v2/stocks/{}/bars", symbol));

        let mut query = vec![
            ("timeframe", DAILY.to_string()),
            ("start", start.format("%Y-%m-%d").to_string()),
            ("limit", "1000".to_string()),
        ];
        if let Some(end) = end {
            query.push(("end", end.format("%Y-%m-%d").to_string()));
        }

        let res: BarsResponse = self.get_json(&url, &query).await?;
        let bars = res.bars.unwrap_or_default();
        debug!(symbol, bars = bars.len(), %start, "fetched daily bars");
        Ok(bars)
    }
}

#[async_trait]
impl MarketData for AlpacaClient {
    async fn fetch_latest(&self, symbols: &[String]) -> Result<LatestPrices, MarketDataError> {
        if symbols.is_empty() {
            return Ok(LatestPrices::new());
        }

        let url = self.url("/v2/stocks/bars/latest");
        let res: LatestBarsResponse = self
            .get_json(&url, &[("symbols", symbols.join(","))])
            .await?;

        Ok(latest_from_bars(symbols, &res.bars))
    }

    async fn fetch_single_latest(&self, symbol: &str) -> Result<Decimal, MarketDataError> {
        let url = self.url(&format!("/v2/stocks/{}/trades/latest", symbol));
        let res: LatestTradeResponse = self.get_json(&url, &[]).await?;

        to_price(symbol, res.trade.price)
    }

    async fn fetch_close_on_or_before(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<(Decimal, NaiveDate), MarketDataError> {
        let start = date - Days::new(LOOKAROUND_DAYS);
        let bars = self.daily_bars(symbol, start, Some(date)).await?;

        let bar = bars
            .last()
            .ok_or_else(|| MarketDataError::NoData(symbol.to_string()))?;
        Ok((to_price(symbol, bar.close)?, bar.timestamp.date_naive()))
    }

    async fn fetch_close_n_days_ago(
        &self,
        symbol: &str,
        days: u32,
    ) -> Result<Decimal, MarketDataError> {
        let (start, end) = week_window(Utc::now().date_naive(), days);
        let bars = self.daily_bars(symbol, start, Some(end)).await?;

        let bar = bars
            .first()
            .ok_or_else(|| MarketDataError::NoData(symbol.to_string()))?;
        to_price(symbol, bar.close)
    }

    async fn fetch_recent_close(
        &self,
        symbol: &str,
        window_days: u32,
    ) -> Result<Decimal, MarketDataError> {
        let start = Utc::now().date_naive() - Days::new(u64::from(window_days));
        let bars = self.daily_bars(symbol, start, None).await?;

        let bar = bars
            .last()
            .ok_or_else(|| MarketDataError::NoData(symbol.to_string()))?;
        to_price(symbol, bar.close)
    }

    async fn fetch_company_name(&self, symbol: &str) -> Result<String, MarketDataError> {
        let Some(trading_api) = &self.trading_api else {
            return Err(MarketDataError::NoData(symbol.to_string()));
        };
        let url = join(trading_api, &format!("/v2/assets/{}", symbol));
        let asset: Asset = self.get_json(&url, &[]).await?;

        match asset.name.map(|n| n.trim().to_string()) {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(MarketDataError::NoData(symbol.to_string())),
        }
    }

    /// Every attempt gets the client timeout, plus a back-off between them.
    fn call_deadline(&self, _per_call: Duration) -> Duration {
        let attempts = self.retries + 1;
        (self.timeout + RETRY_BACKOFF) * attempts
    }
}

fn join(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Converts a provider float into cents. NaN and infinities are rejected.
pub fn to_price(symbol: &str, value: f64) -> Result<Decimal, MarketDataError> {
    if !value.is_finite() {
        return Err(MarketDataError::InvalidPrice(symbol.to_string()));
    }
    Decimal::from_f64(value)
        .map(round_money)
        .ok_or_else(|| MarketDataError::InvalidPrice(symbol.to_string()))
}

fn latest_from_bars(symbols: &[String], bars: &HashMap<String, Bar>) -> LatestPrices {
    symbols
        .iter()
        .map(|s| {
            let price = bars.get(s).and_then(|b| to_price(s, b.close).ok());
            (s.clone(), price)
        })
        .collect()
}

//
// Match Alpaca API JSON
// https://docs.alpaca.markets/reference/stockbars
//
#[derive(Debug, Deserialize, Clone)]
pub struct BarsResponse {
    pub bars: Option<Vec<Bar>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LatestBarsResponse {
    #[serde(default)]
    pub bars: HashMap<String, Bar>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LatestTradeResponse {
    pub trade: Trade,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Trade {
    #[serde(rename = "p")]
    pub price: f64,
}

// https://docs.alpaca.markets/reference/get-v2-assets-symbol_or_asset_id
#[derive(Debug, Deserialize, Clone)]
pub struct Asset {
    pub symbol: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Bar {
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "o")]
    pub open: f64,

    #[serde(rename = "h")]
    pub high: f64,

    #[serde(rename = "l")]
    pub low: f64,

    #[serde(rename = "c")]
    pub close: f64,

    #[serde(rename = "v")]
    pub volume: i64,
}

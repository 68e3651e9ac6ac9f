use std::{future::Future, time::Duration};

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::delta::Delta;
use crate::error::{MarketDataError, RowError, StoreError};
use crate::market_data::{LatestPrices, MarketData};
use crate::position::TrackedPosition;

/// Knobs for a report cycle.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Upper bound on every store call, and on each market-data attempt.
    /// A whole market-data call may take longer, see
    /// [`MarketData::call_deadline`].
    pub fetch_timeout: Duration,
    /// Calendar days back for the weekly comparison.
    pub week_lookback_days: u32,
    /// Window of the last-resort historical lookup.
    pub fallback_window_days: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            week_lookback_days: 7,
            fallback_window_days: 5,
        }
    }
}

/// Where a current price came from. Tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    Batch,
    SingleLatest,
    RecentWindow,
}

impl PriceSource {
    pub const RANKED: [PriceSource; 3] = [
        PriceSource::Batch,
        PriceSource::SingleLatest,
        PriceSource::RecentWindow,
    ];
}

/// A resolved current price for one symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceSample {
    pub symbol: String,
    pub price: Decimal,
    pub source: PriceSource,
}

/// One line of a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub symbol: String,
    pub book_cost: Decimal,
    pub current_price: Decimal,
    pub since_inception: Delta,
    pub since_week: Delta,
    pub source: PriceSource,
}

pub(crate) async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, MarketDataError>>,
) -> Result<T, MarketDataError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| MarketDataError::Timeout(limit))?
}

/// Bounds one market-data call, retries included.
pub(crate) async fn bounded_market<T>(
    market: &dyn MarketData,
    config: &ReportConfig,
    fut: impl Future<Output = Result<T, MarketDataError>>,
) -> Result<T, MarketDataError> {
    bounded(market.call_deadline(config.fetch_timeout), fut).await
}

/// Bounds one store call. A stalled store surfaces as [`StoreError::Timeout`].
pub async fn bounded_store<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}

async fn try_source(
    source: PriceSource,
    symbol: &str,
    batch: &LatestPrices,
    market: &dyn MarketData,
    config: &ReportConfig,
) -> Result<Decimal, MarketDataError> {
    match source {
        PriceSource::Batch => batch
            .get(symbol)
            .copied()
            .flatten()
            .ok_or_else(|| MarketDataError::NoData(symbol.to_string())),
        PriceSource::SingleLatest => {
            bounded_market(market, config, market.fetch_single_latest(symbol)).await
        }
        PriceSource::RecentWindow => {
            bounded_market(
                market,
                config,
                market.fetch_recent_close(symbol, config.fallback_window_days),
            )
            .await
        }
    }
}

/// First source in [`PriceSource::RANKED`] that yields a price, if any.
pub async fn resolve_price(
    symbol: &str,
    batch: &LatestPrices,
    market: &dyn MarketData,
    config: &ReportConfig,
) -> Option<PriceSample> {
    for source in PriceSource::RANKED {
        match try_source(source, symbol, batch, market, config).await {
            Ok(price) => {
                debug!(symbol, ?source, %price, "resolved price");
                return Some(PriceSample {
                    symbol: symbol.to_string(),
                    price,
                    source,
                });
            }
            Err(e) => debug!(symbol, ?source, error = %e, "price source failed"),
        }
    }
    None
}

/// Builds the report row for one position.
///
/// Fails only when no source produced a current price. A missing week-ago
/// close zeroes the weekly columns and leaves the rest of the row intact.
pub async fn resolve_and_build_row(
    position: &TrackedPosition,
    batch: &LatestPrices,
    market: &dyn MarketData,
    config: &ReportConfig,
) -> Result<ReportRow, RowError> {
    let symbol = position.symbol.as_str();

    let sample = resolve_price(symbol, batch, market, config)
        .await
        .ok_or_else(|| RowError::PriceUnavailable(symbol.to_string()))?;

    let since_week = match bounded_market(
        market,
        config,
        market.fetch_close_n_days_ago(symbol, config.week_lookback_days),
    )
    .await
    {
        Ok(week_ago) => Delta::between(sample.price, week_ago),
        Err(e) => {
            warn!(symbol, error = %e, "week-ago close unavailable, weekly delta zeroed");
            Delta::neutral()
        }
    };

    Ok(ReportRow {
        symbol: position.symbol.clone(),
        book_cost: position.book_cost,
        current_price: sample.price,
        since_inception: Delta::between(sample.price, position.book_cost),
        since_week,
        source: sample.source,
    })
}

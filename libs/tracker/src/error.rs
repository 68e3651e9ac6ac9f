use std::time::Duration;

use thiserror::Error;

/// Failures talking to the position store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(#[from] fred::error::Error),

    #[error("corrupt record at {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Failures from the market-data provider.
#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider error: {0}")]
    Transient(String),

    #[error("market-data call timed out after {0:?}")]
    Timeout(Duration),

    #[error("no price data for {0}")]
    NoData(String),

    #[error("non-finite price for {0}")]
    InvalidPrice(String),
}

impl MarketDataError {
    /// Errors worth one more attempt: timeouts, connection drops, 429 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            MarketDataError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| {
                        s.is_server_error() || s == reqwest::StatusCode::TOO_MANY_REQUESTS
                    })
            }
            MarketDataError::Transient(_) | MarketDataError::Timeout(_) => true,
            MarketDataError::NoData(_) | MarketDataError::InvalidPrice(_) => false,
        }
    }
}

/// Why a single report row could not be built.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("no usable price for {0}")]
    PriceUnavailable(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a track request was rejected.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("book cost must be positive, got {0}")]
    InvalidBookCost(rust_decimal::Decimal),

    #[error("start date {0} is in the future")]
    FutureStartDate(chrono::NaiveDate),

    #[error(transparent)]
    Market(#[from] MarketDataError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

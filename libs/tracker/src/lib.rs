mod delta;
mod engine;
mod error;
mod market_data;
mod position;
mod report;
mod store;
mod track;

pub mod render;

#[cfg(test)]
mod test_support;

pub use delta::{Delta, Indicator};
pub use engine::{
    PriceSample, PriceSource, ReportConfig, ReportRow, bounded_store, resolve_and_build_row,
    resolve_price,
};
pub use error::{MarketDataError, RowError, StoreError, TrackError};
pub use market_data::{AlpacaClient, Asset, Bar, LatestPrices, MarketData, week_window};
pub use position::{
    ChannelId, LEGACY_SETTINGS_PREFIX, Setting, TrackedPosition, UserId, UserSettings,
    encode_flag, normalize_symbol, round_money,
};
pub use report::{ChannelTally, ReportBuilder, ReportResult};
pub use store::{PositionStore, RedisPositionStore};
pub use track::{BaselineKind, TrackOutcome, TrackRequest, track};

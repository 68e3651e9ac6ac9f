use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::engine::{ReportConfig, bounded_market, bounded_store};
use crate::error::TrackError;
use crate::market_data::MarketData;
use crate::position::{ChannelId, TrackedPosition, UserId, normalize_symbol, round_money};
use crate::store::PositionStore;

/// What a track request should record, before the lookup.
#[derive(Debug, Clone)]
pub struct TrackRequest {
    pub symbol: String,
    pub channel: ChannelId,
    pub book_cost: Option<Decimal>,
    pub start_date: Option<NaiveDate>,
}

/// How the baseline was chosen, for the reply to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineKind {
    Explicit,
    CloseOnDate,
    Latest,
}

#[derive(Debug, Clone)]
pub struct TrackOutcome {
    pub position: TrackedPosition,
    pub baseline: BaselineKind,
    /// False when an existing position was overwritten.
    pub added: bool,
    /// Listed company name, when the provider knows it.
    pub company: Option<String>,
}

/// Resolves the baseline and upserts the position.
///
/// The symbol is always looked up, so unknown tickers are rejected even
/// when the caller supplies a book cost.
pub async fn track(
    store: &dyn PositionStore,
    market: &dyn MarketData,
    config: &ReportConfig,
    user: UserId,
    request: TrackRequest,
    today: NaiveDate,
) -> Result<TrackOutcome, TrackError> {
    let symbol = normalize_symbol(&request.symbol);

    if let Some(cost) = request.book_cost
        && cost <= Decimal::ZERO
    {
        return Err(TrackError::InvalidBookCost(cost));
    }
    if let Some(date) = request.start_date
        && date > today
    {
        return Err(TrackError::FutureStartDate(date));
    }

    let (close, bar_date) = bounded_market(
        market,
        config,
        market.fetch_close_on_or_before(&symbol, request.start_date.unwrap_or(today)),
    )
    .await?;

    let (book_cost, start_date, baseline) = match (request.book_cost, request.start_date) {
        (Some(cost), date) => (cost, date.unwrap_or(today), BaselineKind::Explicit),
        (None, Some(_)) => (close, bar_date, BaselineKind::CloseOnDate),
        (None, None) => (close, bar_date, BaselineKind::Latest),
    };

    let position = TrackedPosition::new(&symbol, request.channel, round_money(book_cost), start_date);

    let added = bounded_store(
        config.fetch_timeout,
        store.put_tracked_position(user, position.clone()),
    )
    .await?;

    info!(user_id = user, symbol = %symbol, added, ?baseline, "tracked position");

    let company = match bounded_market(market, config, market.fetch_company_name(&symbol)).await {
        Ok(name) => Some(name),
        Err(e) => {
            debug!(symbol = %symbol, error = %e, "company name unavailable");
            None
        }
    };

    Ok(TrackOutcome {
        position,
        baseline,
        added,
        company,
    })
}

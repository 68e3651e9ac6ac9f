use std::{future::Future, sync::Arc};

use tracing::{debug, info, instrument, warn};

use crate::engine::{
    ReportConfig, ReportRow, bounded_market, bounded_store, resolve_and_build_row,
};
use crate::error::{RowError, StoreError};
use crate::market_data::{LatestPrices, MarketData};
use crate::position::{ChannelId, UserId};
use crate::store::PositionStore;

/// Channel occurrence counts in first-seen order.
#[derive(Debug, Default, Clone)]
pub struct ChannelTally {
    counts: Vec<(ChannelId, usize)>,
}

impl ChannelTally {
    pub fn record(&mut self, channel: ChannelId) {
        match self.counts.iter_mut().find(|(c, _)| *c == channel) {
            Some((_, n)) => *n += 1,
            None => self.counts.push((channel, 1)),
        }
    }

    /// Most frequent channel. Ties go to the one seen first.
    pub fn winner(&self) -> Option<ChannelId> {
        let mut best: Option<(ChannelId, usize)> = None;
        for &(channel, n) in &self.counts {
            if best.is_none_or(|(_, top)| n > top) {
                best = Some((channel, n));
            }
        }
        best.map(|(channel, _)| channel)
    }
}

/// Outcome of building one user's report.
#[derive(Debug, Clone, Default)]
pub struct ReportResult {
    pub user_id: UserId,
    pub rows: Vec<ReportRow>,
    /// Most common channel among the rows' positions.
    pub destination: Option<ChannelId>,
    /// Explicit user preference, overrides `destination` at delivery.
    pub default_channel: Option<ChannelId>,
    pub muted: bool,
    /// Symbols listed for the user that produced no row.
    pub skipped: Vec<String>,
}

impl ReportResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn delivery_channel(&self) -> Option<ChannelId> {
        self.default_channel.or(self.destination)
    }
}

/// Builds per-user reports from an injected store and market-data provider.
#[derive(Clone)]
pub struct ReportBuilder {
    store: Arc<dyn PositionStore>,
    market: Arc<dyn MarketData>,
    config: ReportConfig,
}

impl ReportBuilder {
    pub fn new(
        store: Arc<dyn PositionStore>,
        market: Arc<dyn MarketData>,
        config: ReportConfig,
    ) -> Self {
        Self {
            store,
            market,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn PositionStore> {
        &self.store
    }

    pub fn market(&self) -> &Arc<dyn MarketData> {
        &self.market
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Runs a store call under the configured fetch timeout.
    pub async fn bounded_store<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        bounded_store(self.config.fetch_timeout, fut).await
    }

    /// Everyone with tracked positions, bounded like any other store call.
    pub async fn list_users(&self) -> Result<Vec<UserId>, StoreError> {
        self.bounded_store(self.store.list_users()).await
    }

    /// Scheduled report: a muted user gets an empty result and no fetches.
    pub async fn build_report(&self, user: UserId) -> Result<ReportResult, StoreError> {
        self.build(user, true).await
    }

    /// On-demand report: the user asked, so mute is not honoured.
    pub async fn build_report_on_demand(&self, user: UserId) -> Result<ReportResult, StoreError> {
        self.build(user, false).await
    }

    #[instrument(name = "build_report", skip(self), fields(user_id = user))]
    async fn build(&self, user: UserId, honour_mute: bool) -> Result<ReportResult, StoreError> {
        let limit = self.config.fetch_timeout;
        let settings = bounded_store(limit, self.store.user_settings(user)).await?;

        let mut result = ReportResult {
            user_id: user,
            muted: settings.muted,
            default_channel: settings.default_channel,
            ..Default::default()
        };

        if honour_mute && settings.muted {
            debug!("user muted, skipping");
            return Ok(result);
        }

        let symbols = bounded_store(limit, self.store.list_symbols(user)).await?;
        if symbols.is_empty() {
            debug!("no tracked symbols");
            return Ok(result);
        }

        let batch = match bounded_market(
            self.market.as_ref(),
            &self.config,
            self.market.fetch_latest(&symbols),
        )
        .await
        {
            Ok(prices) => prices,
            Err(e) => {
                warn!(error = %e, "batch price fetch failed, falling back per symbol");
                LatestPrices::new()
            }
        };

        let mut tally = ChannelTally::default();

        for symbol in &symbols {
            match self.build_row(user, symbol, &batch).await {
                Ok(Some((row, channel))) => {
                    tally.record(channel);
                    result.rows.push(row);
                }
                Ok(None) => {
                    debug!(symbol = %symbol, "position dropped mid-cycle, skipping");
                    result.skipped.push(symbol.clone());
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "skipping symbol");
                    result.skipped.push(symbol.clone());
                }
            }
        }

        result.destination = tally.winner();

        info!(
            rows = result.rows.len(),
            skipped = result.skipped.len(),
            destination = ?result.destination,
            "report built"
        );
        Ok(result)
    }

    async fn build_row(
        &self,
        user: UserId,
        symbol: &str,
        batch: &LatestPrices,
    ) -> Result<Option<(ReportRow, ChannelId)>, RowError> {
        let limit = self.config.fetch_timeout;
        let Some(position) =
            bounded_store(limit, self.store.get_tracked_position(user, symbol)).await?
        else {
            return Ok(None);
        };

        let row =
            resolve_and_build_row(&position, batch, self.market.as_ref(), &self.config).await?;
        Ok(Some((row, position.channel)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Setting;
    use crate::test_support::{InMemoryStore, StubMarket, position};
    use rust_decimal_macros::dec;
    use std::sync::atomic::Ordering;

    fn builder(store: InMemoryStore, market: Arc<StubMarket>) -> ReportBuilder {
        ReportBuilder::new(Arc::new(store), market, ReportConfig::default())
    }

    #[test]
    fn majority_channel_wins() {
        let mut tally = ChannelTally::default();
        for c in [10, 10, 20] {
            tally.record(c);
        }
        assert_eq!(tally.winner(), Some(10));
    }

    #[test]
    fn tie_goes_to_first_seen() {
        let mut tally = ChannelTally::default();
        tally.record(10);
        tally.record(20);
        assert_eq!(tally.winner(), Some(10));

        let mut tally = ChannelTally::default();
        for c in [20, 10, 10, 20] {
            tally.record(c);
        }
        assert_eq!(tally.winner(), Some(20));
    }

    #[test]
    fn empty_tally_has_no_winner() {
        assert_eq!(ChannelTally::default().winner(), None);
    }

    #[tokio::test]
    async fn muted_user_gets_empty_report_without_fetching() {
        let store = InMemoryStore::with_positions(1, vec![position("AAA", dec!(10.00), 5)]);
        store.set(1, Setting::Muted, "1");
        let market = Arc::new(StubMarket::default().batch("AAA", dec!(11.00)));

        let report = builder(store, market.clone()).build_report(1).await.unwrap();

        assert!(report.is_empty());
        assert!(report.muted);
        assert_eq!(market.calls.total(), 0);
    }

    #[tokio::test]
    async fn on_demand_report_ignores_mute() {
        let store = InMemoryStore::with_positions(1, vec![position("AAA", dec!(10.00), 5)]);
        store.set(1, Setting::Muted, "1");
        let market = Arc::new(StubMarket::default().batch("AAA", dec!(11.00)));

        let report = builder(store, market)
            .build_report_on_demand(1)
            .await
            .unwrap();

        assert_eq!(report.rows.len(), 1);
    }

    #[tokio::test]
    async fn unresolvable_symbol_is_skipped_and_others_kept() {
        let store = InMemoryStore::with_positions(
            1,
            vec![
                position("AAA", dec!(10.00), 5),
                position("DEAD", dec!(3.00), 5),
                position("CCC", dec!(20.00), 6),
            ],
        );
        let market = Arc::new(
            StubMarket::default()
                .batch("AAA", dec!(11.00))
                .single("CCC", dec!(19.00)),
        );

        let report = builder(store, market.clone()).build_report(1).await.unwrap();

        let symbols: Vec<&str> = report.rows.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAA", "CCC"]);
        assert_eq!(report.skipped, vec!["DEAD"]);
        assert_eq!(market.calls.latest.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn destination_ignores_skipped_positions() {
        let store = InMemoryStore::with_positions(
            1,
            vec![
                position("AAA", dec!(10.00), 5),
                position("DEAD", dec!(3.00), 6),
                position("DEAD2", dec!(3.00), 6),
            ],
        );
        let market = Arc::new(StubMarket::default().batch("AAA", dec!(11.00)));

        let report = builder(store, market).build_report(1).await.unwrap();

        assert_eq!(report.destination, Some(5));
    }

    #[tokio::test]
    async fn store_failures_are_contained_per_symbol() {
        let store = InMemoryStore::with_positions(
            1,
            vec![position("AAA", dec!(10.00), 5), position("BBB", dec!(10.00), 5)],
        );
        store.unreadable(1, "BBB");
        store.ghost(1, "GONE");
        let market = Arc::new(
            StubMarket::default()
                .batch("AAA", dec!(12.00))
                .batch("BBB", dec!(12.00)),
        );

        let report = builder(store, market).build_report(1).await.unwrap();

        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.skipped, vec!["BBB", "GONE"]);
    }

    #[tokio::test]
    async fn batch_outage_falls_back_per_symbol() {
        let store = InMemoryStore::with_positions(1, vec![position("AAA", dec!(10.00), 5)]);
        let market = Arc::new(StubMarket::default().batch_down().single("AAA", dec!(9.00)));

        let report = builder(store, market).build_report(1).await.unwrap();

        assert_eq!(report.rows[0].current_price, dec!(9.00));
    }

    #[tokio::test]
    async fn default_channel_overrides_destination() {
        let store = InMemoryStore::with_positions(1, vec![position("AAA", dec!(10.00), 5)]);
        store.set(1, Setting::DefaultChannel, "77");
        let market = Arc::new(StubMarket::default().batch("AAA", dec!(11.00)));

        let report = builder(store, market).build_report(1).await.unwrap();

        assert_eq!(report.destination, Some(5));
        assert_eq!(report.delivery_channel(), Some(77));
    }

    #[tokio::test]
    async fn unreachable_store_is_a_user_level_error() {
        let store = InMemoryStore::with_positions(1, vec![position("AAA", dec!(10.00), 5)]);
        store.down_for(1);
        let market = Arc::new(StubMarket::default());

        let err = builder(store, market.clone()).build_report(1).await;

        assert!(matches!(err, Err(StoreError::Timeout(_))));
        assert_eq!(market.calls.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_store_times_out_instead_of_hanging() {
        let store = InMemoryStore::with_positions(1, vec![position("AAA", dec!(10.00), 5)]);
        store.stall();
        let market = Arc::new(StubMarket::default());
        let reports = builder(store, market.clone());
        let limit = reports.config().fetch_timeout;

        let err = reports.build_report(1).await;
        assert!(matches!(err, Err(StoreError::Timeout(l)) if l == limit));

        let err = reports.list_users().await;
        assert!(matches!(err, Err(StoreError::Timeout(l)) if l == limit));

        let err = reports
            .bounded_store(reports.store().delete_tracked_position(1, "AAA"))
            .await;
        assert!(matches!(err, Err(StoreError::Timeout(_))));
        assert_eq!(market.calls.total(), 0);
    }

    #[tokio::test]
    async fn list_users_passes_through_a_healthy_store() {
        let store = InMemoryStore::with_positions(3, vec![position("AAA", dec!(10.00), 5)]);
        let reports = builder(store, Arc::new(StubMarket::default()));

        assert_eq!(reports.list_users().await.unwrap(), vec![3]);
    }
}

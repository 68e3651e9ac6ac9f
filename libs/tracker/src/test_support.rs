//! Call-counting stand-ins for the store and the market-data provider.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::{MarketDataError, StoreError};
use crate::market_data::{LatestPrices, MarketData};
use crate::position::{ChannelId, Setting, TrackedPosition, UserId, normalize_symbol};
use crate::store::PositionStore;

pub fn position(symbol: &str, book_cost: Decimal, channel: ChannelId) -> TrackedPosition {
    let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    TrackedPosition::new(symbol, channel, book_cost, date)
}

#[derive(Default)]
pub struct MarketCalls {
    pub latest: AtomicUsize,
    pub single_latest: AtomicUsize,
    pub on_or_before: AtomicUsize,
    pub week_ago: AtomicUsize,
    pub recent: AtomicUsize,
    pub company_name: AtomicUsize,
}

impl MarketCalls {
    pub fn total(&self) -> usize {
        self.latest.load(Ordering::SeqCst)
            + self.single_latest.load(Ordering::SeqCst)
            + self.on_or_before.load(Ordering::SeqCst)
            + self.week_ago.load(Ordering::SeqCst)
            + self.recent.load(Ordering::SeqCst)
            + self.company_name.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct StubMarket {
    pub calls: MarketCalls,
    batch: HashMap<String, Decimal>,
    batch_down: bool,
    single: HashMap<String, Decimal>,
    hang_single: bool,
    recent: HashMap<String, Decimal>,
    week_ago: HashMap<String, Decimal>,
    history: HashMap<String, (Decimal, NaiveDate)>,
    names: HashMap<String, String>,
}

impl StubMarket {
    pub fn batch(mut self, symbol: &str, price: Decimal) -> Self {
        self.batch.insert(symbol.to_string(), price);
        self
    }

    pub fn batch_down(mut self) -> Self {
        self.batch_down = true;
        self
    }

    pub fn single(mut self, symbol: &str, price: Decimal) -> Self {
        self.single.insert(symbol.to_string(), price);
        self
    }

    pub fn hang_single_latest(mut self) -> Self {
        self.hang_single = true;
        self
    }

    pub fn recent(mut self, symbol: &str, price: Decimal) -> Self {
        self.recent.insert(symbol.to_string(), price);
        self
    }

    pub fn week_ago(mut self, symbol: &str, price: Decimal) -> Self {
        self.week_ago.insert(symbol.to_string(), price);
        self
    }

    pub fn history(mut self, symbol: &str, price: Decimal, date: NaiveDate) -> Self {
        self.history.insert(symbol.to_string(), (price, date));
        self
    }

    pub fn named(mut self, symbol: &str, name: &str) -> Self {
        self.names.insert(symbol.to_string(), name.to_string());
        self
    }
}

fn lookup(map: &HashMap<String, Decimal>, symbol: &str) -> Result<Decimal, MarketDataError> {
    map.get(symbol)
        .copied()
        .ok_or_else(|| MarketDataError::NoData(symbol.to_string()))
}

#[async_trait]
impl MarketData for StubMarket {
    async fn fetch_latest(&self, symbols: &[String]) -> Result<LatestPrices, MarketDataError> {
        self.calls.latest.fetch_add(1, Ordering::SeqCst);
        if self.batch_down {
            return Err(MarketDataError::Transient("503 Service Unavailable".into()));
        }
        Ok(symbols
            .iter()
            .map(|s| (s.clone(), self.batch.get(s).copied()))
            .collect())
    }

    async fn fetch_single_latest(&self, symbol: &str) -> Result<Decimal, MarketDataError> {
        self.calls.single_latest.fetch_add(1, Ordering::SeqCst);
        if self.hang_single {
            return std::future::pending().await;
        }
        lookup(&self.single, symbol)
    }

    async fn fetch_close_on_or_before(
        &self,
        symbol: &str,
        _date: NaiveDate,
    ) -> Result<(Decimal, NaiveDate), MarketDataError> {
        self.calls.on_or_before.fetch_add(1, Ordering::SeqCst);
        self.history
            .get(symbol)
            .copied()
            .ok_or_else(|| MarketDataError::NoData(symbol.to_string()))
    }

    async fn fetch_close_n_days_ago(
        &self,
        symbol: &str,
        _days: u32,
    ) -> Result<Decimal, MarketDataError> {
        self.calls.week_ago.fetch_add(1, Ordering::SeqCst);
        lookup(&self.week_ago, symbol)
    }

    async fn fetch_recent_close(
        &self,
        symbol: &str,
        _window_days: u32,
    ) -> Result<Decimal, MarketDataError> {
        self.calls.recent.fetch_add(1, Ordering::SeqCst);
        lookup(&self.recent, symbol)
    }

    async fn fetch_company_name(&self, symbol: &str) -> Result<String, MarketDataError> {
        self.calls.company_name.fetch_add(1, Ordering::SeqCst);
        self.names
            .get(symbol)
            .cloned()
            .ok_or_else(|| MarketDataError::NoData(symbol.to_string()))
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    positions: Mutex<BTreeMap<UserId, Vec<TrackedPosition>>>,
    settings: Mutex<HashMap<(UserId, Setting), String>>,
    unreadable: Mutex<HashSet<(UserId, String)>>,
    ghosts: Mutex<HashMap<UserId, Vec<String>>>,
    down: Mutex<HashSet<UserId>>,
    stalled: AtomicBool,
}

impl InMemoryStore {
    pub fn with_positions(user: UserId, positions: Vec<TrackedPosition>) -> Self {
        let store = Self::default();
        store.positions.lock().unwrap().insert(user, positions);
        store
    }

    pub fn set(&self, user: UserId, setting: Setting, value: &str) {
        self.settings
            .lock()
            .unwrap()
            .insert((user, setting), value.to_string());
    }

    /// Listed, but reading the record fails.
    pub fn unreadable(&self, user: UserId, symbol: &str) {
        self.unreadable
            .lock()
            .unwrap()
            .insert((user, symbol.to_string()));
    }

    /// Listed, but the record is gone by the time it is read.
    pub fn ghost(&self, user: UserId, symbol: &str) {
        self.ghosts
            .lock()
            .unwrap()
            .entry(user)
            .or_default()
            .push(symbol.to_string());
    }

    /// Every call for this user fails.
    pub fn down_for(&self, user: UserId) {
        self.down.lock().unwrap().insert(user);
    }

    /// Every call hangs from now on.
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    async fn ready(&self) {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    async fn check(&self, user: UserId) -> Result<(), StoreError> {
        self.ready().await;
        if self.down.lock().unwrap().contains(&user) {
            return Err(StoreError::Timeout(Duration::from_secs(1)));
        }
        Ok(())
    }
}

#[async_trait]
impl PositionStore for InMemoryStore {
    async fn get_tracked_position(
        &self,
        user: UserId,
        symbol: &str,
    ) -> Result<Option<TrackedPosition>, StoreError> {
        self.check(user).await?;
        let symbol = normalize_symbol(symbol);
        if self.unreadable.lock().unwrap().contains(&(user, symbol.clone())) {
            return Err(StoreError::Timeout(Duration::from_secs(1)));
        }
        Ok(self
            .positions
            .lock()
            .unwrap()
            .get(&user)
            .and_then(|ps| ps.iter().find(|p| p.symbol == symbol).cloned()))
    }

    async fn put_tracked_position(
        &self,
        user: UserId,
        position: TrackedPosition,
    ) -> Result<bool, StoreError> {
        self.check(user).await?;
        let position = position.normalized();
        let mut all = self.positions.lock().unwrap();
        let list = all.entry(user).or_default();
        match list.iter_mut().find(|p| p.symbol == position.symbol) {
            Some(existing) => {
                *existing = position;
                Ok(false)
            }
            None => {
                list.push(position);
                Ok(true)
            }
        }
    }

    async fn delete_tracked_position(
        &self,
        user: UserId,
        symbol: &str,
    ) -> Result<bool, StoreError> {
        self.check(user).await?;
        let symbol = normalize_symbol(symbol);
        let mut all = self.positions.lock().unwrap();
        let Some(list) = all.get_mut(&user) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|p| p.symbol != symbol);
        Ok(list.len() != before)
    }

    async fn list_symbols(&self, user: UserId) -> Result<Vec<String>, StoreError> {
        self.check(user).await?;
        let mut symbols: Vec<String> = self
            .positions
            .lock()
            .unwrap()
            .get(&user)
            .map(|ps| ps.iter().map(|p| p.symbol.clone()).collect())
            .unwrap_or_default();
        if let Some(ghosts) = self.ghosts.lock().unwrap().get(&user) {
            symbols.extend(ghosts.iter().cloned());
        }
        Ok(symbols)
    }

    async fn list_users(&self) -> Result<Vec<UserId>, StoreError> {
        self.ready().await;
        Ok(self.positions.lock().unwrap().keys().copied().collect())
    }

    async fn get_setting(
        &self,
        user: UserId,
        setting: Setting,
    ) -> Result<Option<String>, StoreError> {
        self.check(user).await?;
        Ok(self.settings.lock().unwrap().get(&(user, setting)).cloned())
    }

    async fn put_setting(
        &self,
        user: UserId,
        setting: Setting,
        value: String,
    ) -> Result<(), StoreError> {
        self.check(user).await?;
        self.settings.lock().unwrap().insert((user, setting), value);
        Ok(())
    }
}

//! Unbounded fetch-through cache.
//!
//! Entries never expire and the cache is never size-bounded; they are only
//! removed by the invalidation policy (see [`crate::invalidation`]).

use dashmap::DashMap;
use ratekeeper_common::{CurrencyInfo, CurrencyRate};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Cache key builders.
///
/// Dates render as `YYYY-MM-DD`, amounts keep their scale (`10` and `10.00`
/// are different keys).
pub mod keys {
    use chrono::NaiveDate;
    use ratekeeper_common::{CurrencyId, RateId};
    use rust_decimal::Decimal;

    pub const ALL_CURRENCIES: &str = "allCurrencies";
    pub const ALL_CURRENCIES_FROM_STORE: &str = "allCurrenciesFromDb";
    pub const ALL_RATES: &str = "allRates";

    pub fn rate(currency_id: CurrencyId, today: NaiveDate) -> String {
        format!("rate:{}:{}", currency_id, today)
    }

    pub fn rate_by_abbreviation(abbreviation: &str, today: NaiveDate) -> String {
        format!("rateByAbbreviation:{}:{}", abbreviation, today)
    }

    pub fn rates_on(abbreviation: &str, date: NaiveDate) -> String {
        format!("rates:{}:{}", abbreviation, date)
    }

    pub fn rate_by_id(id: RateId) -> String {
        format!("rateById:{}", id)
    }

    pub fn currency(id: CurrencyId) -> String {
        format!("currency:{}", id)
    }

    pub fn currency_with_rates(id: CurrencyId) -> String {
        format!("currencyWithRates:{}", id)
    }

    pub fn conversion(from: CurrencyId, to: CurrencyId, amount: Decimal) -> String {
        format!("convert:{}:{}:{}", from, to, amount)
    }
}

/// Thread-safe key-value store for one category of cached values.
pub struct CacheStore<V> {
    category: &'static str,
    entries: DashMap<String, V>,
}

impl<V: Clone> CacheStore<V> {
    pub fn new(category: &'static str) -> Self {
        Self {
            category,
            entries: DashMap::new(),
        }
    }

    /// Insert or overwrite a value.
    pub fn put(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        debug!(category = self.category, key = %key, "Cache put");
        self.entries.insert(key, value);
    }

    /// Get a value if present.
    pub fn get(&self, key: &str) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) => {
                debug!(category = self.category, key = %key, "Cache hit");
                Some(entry.value().clone())
            }
            None => {
                debug!(category = self.category, key = %key, "Cache miss");
                None
            }
        }
    }

    /// Remove a value; no-op if absent.
    pub fn remove(&self, key: &str) {
        debug!(category = self.category, key = %key, "Cache remove");
        self.entries.remove(key);
    }

    /// Drop every entry of this category.
    pub fn clear(&self) {
        debug!(category = self.category, "Cache clear");
        self.entries.clear();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-key guards that serialize resolution of a single cache key.
#[derive(Debug, Default)]
pub struct InflightGuards {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl InflightGuards {
    /// Wait for exclusive resolution rights on `key`.
    ///
    /// The map entry is dropped together with the returned guard.
    pub async fn acquire(&self, key: &str) -> InflightGuard<'_> {
        let lock = self.locks.entry(key.to_string()).or_default().clone();
        let held = lock.clone().lock_owned().await;
        InflightGuard {
            guards: self,
            key: key.to_string(),
            lock,
            _held: held,
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive resolution rights on one key.
#[derive(Debug)]
pub struct InflightGuard<'a> {
    guards: &'a InflightGuards,
    key: String,
    lock: Arc<Mutex<()>>,
    _held: OwnedMutexGuard<()>,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        // A later caller may already own a newer lock under the same key.
        self.guards
            .locks
            .remove_if(&self.key, |_, lock| Arc::ptr_eq(lock, &self.lock));
    }
}

/// The process-wide cache, typed by value category.
pub struct RateCache {
    pub currency_lists: CacheStore<Vec<CurrencyInfo>>,
    pub currencies: CacheStore<CurrencyInfo>,
    pub rate_lists: CacheStore<Vec<CurrencyRate>>,
    pub rates: CacheStore<CurrencyRate>,
    pub amounts: CacheStore<Decimal>,
    inflight: InflightGuards,
}

impl RateCache {
    pub fn new() -> Self {
        Self {
            currency_lists: CacheStore::new("currency_lists"),
            currencies: CacheStore::new("currencies"),
            rate_lists: CacheStore::new("rate_lists"),
            rates: CacheStore::new("rates"),
            amounts: CacheStore::new("amounts"),
            inflight: InflightGuards::default(),
        }
    }

    /// Drop every cached entry in every category.
    pub fn clear(&self) {
        debug!("Cache clear: all entries removed");
        self.currency_lists.clear();
        self.currencies.clear();
        self.rate_lists.clear();
        self.rates.clear();
        self.amounts.clear();
    }

    /// Whether `key` is cached in any category.
    pub fn contains(&self, key: &str) -> bool {
        self.currency_lists.contains(key)
            || self.currencies.contains(key)
            || self.rate_lists.contains(key)
            || self.rates.contains(key)
            || self.amounts.contains(key)
    }

    pub fn len(&self) -> usize {
        self.currency_lists.len()
            + self.currencies.len()
            + self.rate_lists.len()
            + self.rates.len()
            + self.amounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn inflight(&self) -> &InflightGuards {
        &self.inflight
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared rate cache.
pub type SharedRateCache = Arc<RateCache>;

//! Persisted storage of currencies and their rates.

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use ratekeeper_common::{CurrencyId, CurrencyInfo, CurrencyRate, RateId};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{RateError, RateResult};

/// Durable entity storage consulted by the engine on cache misses.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// All currencies.
    async fn find_all(&self) -> RateResult<Vec<CurrencyInfo>>;

    /// A currency by id, with its rates.
    async fn find_by_id(&self, id: CurrencyId) -> RateResult<Option<CurrencyInfo>>;

    /// A currency by its unique abbreviation, with its rates.
    async fn find_by_abbreviation(&self, abbreviation: &str) -> RateResult<Option<CurrencyInfo>>;

    /// A currency by id with its rates eagerly loaded.
    async fn find_by_id_with_rates(&self, id: CurrencyId) -> RateResult<Option<CurrencyInfo>>;

    /// Insert or update a currency, returning the stored form.
    async fn save(&self, currency: CurrencyInfo) -> RateResult<CurrencyInfo>;

    /// Save several currencies, preserving order.
    async fn save_all(&self, currencies: Vec<CurrencyInfo>) -> RateResult<Vec<CurrencyInfo>>;

    /// Delete a currency and every rate it owns.
    async fn delete_by_id(&self, id: CurrencyId) -> RateResult<()>;

    async fn find_rate_by_id(&self, id: RateId) -> RateResult<Option<CurrencyRate>>;

    async fn find_all_rates(&self) -> RateResult<Vec<CurrencyRate>>;

    /// Insert or update a rate, returning the stored form.
    async fn save_rate(&self, rate: CurrencyRate) -> RateResult<CurrencyRate>;

    async fn delete_rate_by_id(&self, id: RateId) -> RateResult<()>;

    /// Rates of the currency with `abbreviation` quoted on `date`.
    async fn find_rates_by_abbreviation_and_date(
        &self,
        abbreviation: &str,
        date: NaiveDate,
    ) -> RateResult<Vec<CurrencyRate>>;
}

#[derive(Default, Clone)]
struct Tables {
    currencies: BTreeMap<CurrencyId, CurrencyInfo>,
    rates: BTreeMap<RateId, CurrencyRate>,
    next_currency_id: CurrencyId,
    next_rate_id: RateId,
}

impl Tables {
    fn with_rates(&self, currency: &CurrencyInfo) -> CurrencyInfo {
        let mut currency = currency.clone();
        currency.rates = self
            .rates
            .values()
            .filter(|r| r.currency_id == currency.cur_id)
            .cloned()
            .collect();
        currency
    }

    fn find_by_abbreviation(&self, abbreviation: &str) -> Option<&CurrencyInfo> {
        self.currencies
            .values()
            .find(|c| c.cur_abbreviation == abbreviation)
    }

    fn save(&mut self, mut currency: CurrencyInfo) -> RateResult<CurrencyInfo> {
        let id = currency.cur_id.unwrap_or(self.next_currency_id + 1);

        if let Some(existing) = self.find_by_abbreviation(&currency.cur_abbreviation) {
            if existing.cur_id != Some(id) {
                return Err(RateError::invalid_argument(format!(
                    "Currency abbreviation already exists: {}",
                    currency.cur_abbreviation
                )));
            }
        }

        self.next_currency_id = self.next_currency_id.max(id);
        currency.cur_id = Some(id);
        let rates = std::mem::take(&mut currency.rates);
        self.currencies.insert(id, currency);

        for rate in rates {
            self.save_rate(rate.for_currency(id))?;
        }

        let stored = &self.currencies[&id];
        Ok(self.with_rates(stored))
    }

    fn save_rate(&mut self, mut rate: CurrencyRate) -> RateResult<CurrencyRate> {
        if rate.cur_official_rate.is_sign_negative() {
            return Err(RateError::invalid_argument(format!(
                "Official rate cannot be negative: {}",
                rate
            )));
        }

        if let Some(currency_id) = rate.currency_id {
            if !self.currencies.contains_key(&currency_id) {
                return Err(RateError::not_found(format!(
                    "Currency not found with id: {}",
                    currency_id
                )));
            }
        }

        let id = rate.id.unwrap_or(self.next_rate_id + 1);
        self.next_rate_id = self.next_rate_id.max(id);

        rate.id = Some(id);
        self.rates.insert(id, rate.clone());
        Ok(rate)
    }
}

/// [`RateStore`] kept entirely in memory.
///
/// Ids given by the caller are kept; missing ones are assigned sequentially
/// after the highest id seen. Rates are returned in id order,
/// which is the "stored order" resolution scans.
#[derive(Default)]
pub struct InMemoryRateStore {
    tables: RwLock<Tables>,
}

impl InMemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn currency_count(&self) -> usize {
        self.tables.read().currencies.len()
    }

    pub fn rate_count(&self) -> usize {
        self.tables.read().rates.len()
    }
}

#[async_trait]
impl RateStore for InMemoryRateStore {
    async fn find_all(&self) -> RateResult<Vec<CurrencyInfo>> {
        let tables = self.tables.read();
        Ok(tables.currencies.values().map(|c| tables.with_rates(c)).collect())
    }

    async fn find_by_id(&self, id: CurrencyId) -> RateResult<Option<CurrencyInfo>> {
        let tables = self.tables.read();
        Ok(tables.currencies.get(&id).map(|c| tables.with_rates(c)))
    }

    async fn find_by_abbreviation(&self, abbreviation: &str) -> RateResult<Option<CurrencyInfo>> {
        let tables = self.tables.read();
        Ok(tables
            .find_by_abbreviation(abbreviation)
            .map(|c| tables.with_rates(c)))
    }

    async fn find_by_id_with_rates(&self, id: CurrencyId) -> RateResult<Option<CurrencyInfo>> {
        self.find_by_id(id).await
    }

    async fn save(&self, currency: CurrencyInfo) -> RateResult<CurrencyInfo> {
        let mut tables = self.tables.write();
        let mut staged = tables.clone();
        let saved = staged.save(currency)?;
        *tables = staged;
        drop(tables);
        debug!(currency = %saved, "Saved currency");
        Ok(saved)
    }

    /// All or nothing: the batch is staged on a copy of the tables.
    async fn save_all(&self, currencies: Vec<CurrencyInfo>) -> RateResult<Vec<CurrencyInfo>> {
        let mut tables = self.tables.write();
        let mut staged = tables.clone();

        let saved = currencies
            .into_iter()
            .map(|c| staged.save(c))
            .collect::<RateResult<Vec<_>>>()?;

        *tables = staged;
        debug!(count = saved.len(), "Saved currencies");
        Ok(saved)
    }

    async fn delete_by_id(&self, id: CurrencyId) -> RateResult<()> {
        let mut tables = self.tables.write();
        if tables.currencies.remove(&id).is_some() {
            tables.rates.retain(|_, r| r.currency_id != Some(id));
            debug!(currency_id = id, "Deleted currency and its rates");
        }
        Ok(())
    }

    async fn find_rate_by_id(&self, id: RateId) -> RateResult<Option<CurrencyRate>> {
        Ok(self.tables.read().rates.get(&id).cloned())
    }

    async fn find_all_rates(&self) -> RateResult<Vec<CurrencyRate>> {
        Ok(self.tables.read().rates.values().cloned().collect())
    }

    async fn save_rate(&self, rate: CurrencyRate) -> RateResult<CurrencyRate> {
        let saved = self.tables.write().save_rate(rate)?;
        debug!(rate = %saved, "Saved rate");
        Ok(saved)
    }

    async fn delete_rate_by_id(&self, id: RateId) -> RateResult<()> {
        self.tables.write().rates.remove(&id);
        Ok(())
    }

    async fn find_rates_by_abbreviation_and_date(
        &self,
        abbreviation: &str,
        date: NaiveDate,
    ) -> RateResult<Vec<CurrencyRate>> {
        let tables = self.tables.read();
        let Some(currency) = tables.find_by_abbreviation(abbreviation) else {
            return Ok(Vec::new());
        };
        Ok(tables
            .rates
            .values()
            .filter(|r| r.currency_id == currency.cur_id && r.date == date)
            .cloned()
            .collect())
    }
}

/// Store wrapper that counts calls and can be told to fail, for tests.
#[cfg(any(test, feature = "test-utils"))]
pub struct CountingStore {
    inner: InMemoryRateStore,
    calls: std::sync::atomic::AtomicUsize,
    fail_writes: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "test-utils"))]
impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryRateStore::new(),
            calls: std::sync::atomic::AtomicUsize::new(0),
            fail_writes: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Number of store calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, std::sync::atomic::Ordering::SeqCst);
    }

    /// Make every subsequent write fail with an upstream error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryRateStore {
        &self.inner
    }

    fn hit(&self) {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn check_write(&self) -> RateResult<()> {
        self.hit();
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(RateError::upstream("Store write failed"));
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateStore for CountingStore {
    async fn find_all(&self) -> RateResult<Vec<CurrencyInfo>> {
        self.hit();
        self.inner.find_all().await
    }

    async fn find_by_id(&self, id: CurrencyId) -> RateResult<Option<CurrencyInfo>> {
        self.hit();
        self.inner.find_by_id(id).await
    }

    async fn find_by_abbreviation(&self, abbreviation: &str) -> RateResult<Option<CurrencyInfo>> {
        self.hit();
        self.inner.find_by_abbreviation(abbreviation).await
    }

    async fn find_by_id_with_rates(&self, id: CurrencyId) -> RateResult<Option<CurrencyInfo>> {
        self.hit();
        self.inner.find_by_id_with_rates(id).await
    }

    async fn save(&self, currency: CurrencyInfo) -> RateResult<CurrencyInfo> {
        self.check_write()?;
        self.inner.save(currency).await
    }

    async fn save_all(&self, currencies: Vec<CurrencyInfo>) -> RateResult<Vec<CurrencyInfo>> {
        self.check_write()?;
        self.inner.save_all(currencies).await
    }

    async fn delete_by_id(&self, id: CurrencyId) -> RateResult<()> {
        self.check_write()?;
        self.inner.delete_by_id(id).await
    }

    async fn find_rate_by_id(&self, id: RateId) -> RateResult<Option<CurrencyRate>> {
        self.hit();
        self.inner.find_rate_by_id(id).await
    }

    async fn find_all_rates(&self) -> RateResult<Vec<CurrencyRate>> {
        self.hit();
        self.inner.find_all_rates().await
    }

    async fn save_rate(&self, rate: CurrencyRate) -> RateResult<CurrencyRate> {
        self.check_write()?;
        self.inner.save_rate(rate).await
    }

    async fn delete_rate_by_id(&self, id: RateId) -> RateResult<()> {
        self.check_write()?;
        self.inner.delete_rate_by_id(id).await
    }

    async fn find_rates_by_abbreviation_and_date(
        &self,
        abbreviation: &str,
        date: NaiveDate,
    ) -> RateResult<Vec<CurrencyRate>> {
        self.hit();
        self.inner
            .find_rates_by_abbreviation_and_date(abbreviation, date)
            .await
    }
}

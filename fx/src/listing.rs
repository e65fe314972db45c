//! Read-through lookups of currencies and rates.

use chrono::NaiveDate;
use ratekeeper_common::{CurrencyId, CurrencyInfo, CurrencyRate, RateId};
use tracing::{info, instrument, warn};

use crate::cache::keys;
use crate::engine::RateEngine;
use crate::error::RateResult;

impl RateEngine {
    /// All currencies, seeded from the provider when the store is empty.
    #[instrument(skip(self))]
    pub async fn list_all_currencies(&self) -> RateResult<Vec<CurrencyInfo>> {
        self.requests.increment();

        if let Some(cached) = self.cache.currency_lists.get(keys::ALL_CURRENCIES) {
            return Ok(cached);
        }

        let mut currencies = self.store.find_all().await?;

        if currencies.is_empty() {
            let fetched = self.provider.fetch_all_currencies().await.map_err(|e| {
                warn!(provider = self.provider.name(), error = %e, "Provider failed to list currencies");
                e
            })?;
            currencies = self.store.save_all(fetched).await?;
            info!(
                provider = self.provider.name(),
                count = currencies.len(),
                "Seeded currencies from provider"
            );
        }

        self.cache
            .currency_lists
            .put(keys::ALL_CURRENCIES, currencies.clone());
        Ok(currencies)
    }

    /// All stored currencies, never consulting the provider.
    #[instrument(skip(self))]
    pub async fn list_all_currencies_from_store(&self) -> RateResult<Vec<CurrencyInfo>> {
        self.requests.increment();

        if let Some(cached) = self.cache.currency_lists.get(keys::ALL_CURRENCIES_FROM_STORE) {
            return Ok(cached);
        }

        let currencies = self.store.find_all().await?;
        self.cache
            .currency_lists
            .put(keys::ALL_CURRENCIES_FROM_STORE, currencies.clone());
        Ok(currencies)
    }

    #[instrument(skip(self))]
    pub async fn get_currency_by_id(&self, id: CurrencyId) -> RateResult<Option<CurrencyInfo>> {
        self.requests.increment();

        let key = keys::currency(id);
        if let Some(cached) = self.cache.currencies.get(&key) {
            return Ok(Some(cached));
        }

        let currency = self.store.find_by_id(id).await?;
        if let Some(currency) = &currency {
            self.cache.currencies.put(key, currency.clone());
        }
        Ok(currency)
    }

    #[instrument(skip(self))]
    pub async fn get_currency_with_rates(&self, id: CurrencyId) -> RateResult<Option<CurrencyInfo>> {
        self.requests.increment();

        let key = keys::currency_with_rates(id);
        if let Some(cached) = self.cache.currencies.get(&key) {
            return Ok(Some(cached));
        }

        let currency = self.store.find_by_id_with_rates(id).await?;
        if let Some(currency) = &currency {
            self.cache.currencies.put(key, currency.clone());
        }
        Ok(currency)
    }

    #[instrument(skip(self))]
    pub async fn list_all_rates(&self) -> RateResult<Vec<CurrencyRate>> {
        self.requests.increment();

        if let Some(cached) = self.cache.rate_lists.get(keys::ALL_RATES) {
            return Ok(cached);
        }

        let rates = self.store.find_all_rates().await?;
        self.cache.rate_lists.put(keys::ALL_RATES, rates.clone());
        Ok(rates)
    }

    #[instrument(skip(self))]
    pub async fn get_rate_by_id(&self, id: RateId) -> RateResult<Option<CurrencyRate>> {
        self.requests.increment();

        let key = keys::rate_by_id(id);
        if let Some(cached) = self.cache.rates.get(&key) {
            return Ok(Some(cached));
        }

        let rate = self.store.find_rate_by_id(id).await?;
        if let Some(rate) = &rate {
            self.cache.rates.put(key, rate.clone());
        }
        Ok(rate)
    }

    /// Rates of one currency on one date. Empty results are cached as well.
    #[instrument(skip(self))]
    pub async fn list_rates_by_abbreviation_and_date(
        &self,
        abbreviation: &str,
        date: NaiveDate,
    ) -> RateResult<Vec<CurrencyRate>> {
        self.requests.increment();

        let key = keys::rates_on(abbreviation, date);
        if let Some(cached) = self.cache.rate_lists.get(&key) {
            return Ok(cached);
        }

        let rates = self
            .store
            .find_rates_by_abbreviation_and_date(abbreviation, date)
            .await?;
        self.cache.rate_lists.put(key, rates.clone());
        Ok(rates)
    }
}

//! Rate resolution engine.
//!
//! Every read is answered from the first layer that has it: the cache, then
//! today's persisted rate, then the external provider. Provider quotes are
//! persisted and cached before they are returned.

use std::future::Future;
use std::sync::Arc;

use ratekeeper_common::{Clock, CurrencyId, CurrencyRate, SharedClock, SystemClock};
use tracing::{debug, info, instrument, warn};

use crate::cache::{keys, RateCache, SharedRateCache};
use crate::error::{RateError, RateResult};
use crate::metrics::RequestCounter;
use crate::provider::RateProvider;
use crate::store::RateStore;

/// Configuration for the rate engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Serialize concurrent misses on the same cache key so only one of them
    /// reaches the store and the provider.
    pub single_flight: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            single_flight: true,
        }
    }
}

/// The fetch-through rate engine.
pub struct RateEngine {
    pub(crate) store: Arc<dyn RateStore>,
    pub(crate) provider: Arc<dyn RateProvider>,
    pub(crate) cache: SharedRateCache,
    pub(crate) clock: SharedClock,
    pub(crate) requests: RequestCounter,
    config: EngineConfig,
}

impl RateEngine {
    /// Create an engine with a fresh cache and the system clock.
    pub fn new(
        store: Arc<dyn RateStore>,
        provider: Arc<dyn RateProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            provider,
            cache: Arc::new(RateCache::new()),
            clock: Arc::new(SystemClock),
            requests: RequestCounter::new(),
            config,
        }
    }

    /// Use a different clock to decide what "today" is.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an existing cache.
    pub fn with_cache(mut self, cache: SharedRateCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &RateCache {
        &self.cache
    }

    /// Today's rate for a currency, by id.
    ///
    /// An unknown id still reaches the provider; its quote is returned but
    /// neither persisted nor cached.
    #[instrument(skip(self))]
    pub async fn resolve_rate(&self, currency_id: CurrencyId) -> RateResult<CurrencyRate> {
        self.requests.increment();
        self.rate_for_id(currency_id).await
    }

    /// Today's rate for a currency, by abbreviation.
    ///
    /// `None` and `""` are rejected before any cache, store or provider access.
    #[instrument(skip(self))]
    pub async fn resolve_rate_by_abbreviation(
        &self,
        abbreviation: Option<&str>,
    ) -> RateResult<CurrencyRate> {
        self.requests.increment();
        self.rate_for_abbreviation(abbreviation).await
    }

    /// Today's rates for several currencies, in input order.
    ///
    /// The first failure fails the whole batch.
    #[instrument(skip(self), fields(count = abbreviations.len()))]
    pub async fn resolve_rates_bulk(&self, abbreviations: &[String]) -> RateResult<Vec<CurrencyRate>> {
        self.requests.increment();

        let mut rates = Vec::with_capacity(abbreviations.len());
        for abbreviation in abbreviations {
            rates.push(self.rate_for_abbreviation(Some(abbreviation.as_str())).await?);
        }
        Ok(rates)
    }

    /// Requests served since creation or the last reset.
    pub fn request_count(&self) -> u64 {
        self.requests.count()
    }

    pub fn reset_request_count(&self) {
        self.requests.reset();
    }

    /// Get engine statistics.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            cached_entries: self.cache.len(),
            inflight_keys: self.cache.inflight().len(),
            requests: self.requests.count(),
        }
    }

    pub(crate) async fn rate_for_id(&self, currency_id: CurrencyId) -> RateResult<CurrencyRate> {
        let today = self.clock.today();
        let key = keys::rate(currency_id, today);
        let key = key.as_str();

        let cached = || {
            self.cache
                .rate_lists
                .get(key)
                .and_then(|rates| rates.into_iter().next())
        };

        self.single_flight(key, cached, || async move {
            let currency = self.store.find_by_id(currency_id).await?;

            let Some(currency) = currency else {
                debug!(currency_id, "Unknown currency, quoting without persisting");
                return self
                    .provider
                    .fetch_current_rate(currency_id)
                    .await
                    .map_err(|e| {
                        RateError::not_found(format!(
                            "Currency not found with id: {}: {}",
                            currency_id, e
                        ))
                    });
            };

            if let Some(rate) = currency.rate_on(today) {
                self.cache.rate_lists.put(key, vec![rate.clone()]);
                return Ok(rate.clone());
            }

            let saved = self.fetch_and_persist(currency_id).await?;
            self.cache.rate_lists.put(key, vec![saved.clone()]);
            Ok(saved)
        })
        .await
    }

    pub(crate) async fn rate_for_abbreviation(
        &self,
        abbreviation: Option<&str>,
    ) -> RateResult<CurrencyRate> {
        let abbreviation = match abbreviation {
            None => {
                return Err(RateError::invalid_argument(
                    "Currency abbreviation cannot be null",
                ))
            }
            Some("") => {
                return Err(RateError::invalid_argument(
                    "Currency abbreviation cannot be empty",
                ))
            }
            Some(abbreviation) => abbreviation,
        };

        let today = self.clock.today();
        let key = keys::rate_by_abbreviation(abbreviation, today);
        let key = key.as_str();

        let cached = || self.cache.rates.get(key);

        self.single_flight(key, cached, || async move {
            let currency = self
                .store
                .find_by_abbreviation(abbreviation)
                .await?
                .ok_or_else(|| {
                    RateError::not_found(format!(
                        "Currency not found for abbreviation: {}",
                        abbreviation
                    ))
                })?;

            if let Some(rate) = currency.rate_on(today) {
                self.cache.rates.put(key, rate.clone());
                return Ok(rate.clone());
            }

            let currency_id = currency.cur_id.ok_or_else(|| {
                RateError::unexpected(format!("Stored currency {} has no id", abbreviation))
            })?;

            let saved = self.fetch_and_persist(currency_id).await?;
            self.cache.rates.put(key, saved.clone());
            Ok(saved)
        })
        .await
    }

    /// Quote a rate from the provider, attach it to the currency and persist it.
    async fn fetch_and_persist(&self, currency_id: CurrencyId) -> RateResult<CurrencyRate> {
        let quote = self
            .provider
            .fetch_current_rate(currency_id)
            .await
            .map_err(|e| {
                warn!(
                    provider = self.provider.name(),
                    currency_id,
                    error = %e,
                    "Provider failed to return rate"
                );
                e
            })?;

        let saved = self.store.save_rate(quote.for_currency(currency_id)).await?;

        info!(
            provider = self.provider.name(),
            currency_id,
            rate = %saved,
            "Persisted provider rate"
        );

        Ok(saved)
    }

    /// Run `resolve` for `key` unless `lookup` already has the answer.
    ///
    /// With single-flight enabled, concurrent callers for the same key wait
    /// for the first one and then re-check the cache.
    async fn single_flight<T, F, Fut>(
        &self,
        key: &str,
        lookup: impl Fn() -> Option<T>,
        resolve: F,
    ) -> RateResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RateResult<T>>,
    {
        if let Some(hit) = lookup() {
            return Ok(hit);
        }

        if !self.config.single_flight {
            return resolve().await;
        }

        let _guard = self.cache.inflight().acquire(key).await;

        if let Some(hit) = lookup() {
            debug!(key = %key, "Resolved by a concurrent request");
            return Ok(hit);
        }

        resolve().await
    }
}

/// Engine statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub cached_entries: usize,
    pub inflight_keys: usize,
    pub requests: u64,
}

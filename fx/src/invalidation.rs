//! Cache invalidation on writes.
//!
//! Currency writes clear the whole cache. Rate writes only touch the keys
//! derived from the written rate.

use chrono::NaiveDate;
use ratekeeper_common::{CurrencyId, CurrencyInfo, CurrencyPatch, CurrencyRate, RateId, RatePatch};
use tracing::{debug, info, instrument};

use crate::cache::{keys, RateCache};
use crate::engine::RateEngine;
use crate::error::{RateError, RateResult};

/// A successful write against the store.
#[derive(Debug, Clone, Copy)]
pub enum Mutation<'a> {
    CurrencyCreated,
    CurrencyUpdated,
    CurrencyDeleted,
    RateCreated {
        rate: &'a CurrencyRate,
        abbreviation: &'a str,
    },
    RateUpdated {
        id: RateId,
        rate: &'a CurrencyRate,
        abbreviation: &'a str,
    },
    /// `abbreviation` is `None` when the parent currency is already gone.
    RateDeleted {
        id: RateId,
        date: NaiveDate,
        abbreviation: Option<&'a str>,
    },
}

/// What a mutation does to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheInvalidation {
    /// Drop every entry in every category.
    ClearAll,
    /// Touch only the listed keys.
    Targeted {
        /// Rate list to store, as `(key, rate)`.
        refresh: Option<(String, CurrencyRate)>,
        /// Keys removed from the rate list category.
        evict_lists: Vec<String>,
        /// Keys removed from the single rate category.
        evict_rates: Vec<String>,
    },
}

impl CacheInvalidation {
    pub fn for_mutation(mutation: Mutation<'_>) -> Self {
        match mutation {
            Mutation::CurrencyCreated | Mutation::CurrencyUpdated | Mutation::CurrencyDeleted => {
                CacheInvalidation::ClearAll
            }
            Mutation::RateCreated { rate, abbreviation } => CacheInvalidation::Targeted {
                refresh: Some((keys::rates_on(abbreviation, rate.date), rate.clone())),
                evict_lists: Vec::new(),
                evict_rates: Vec::new(),
            },
            Mutation::RateUpdated {
                id,
                rate,
                abbreviation,
            } => CacheInvalidation::Targeted {
                refresh: Some((keys::rates_on(abbreviation, rate.date), rate.clone())),
                evict_lists: Vec::new(),
                evict_rates: vec![keys::rate_by_id(id)],
            },
            Mutation::RateDeleted {
                id,
                date,
                abbreviation,
            } => CacheInvalidation::Targeted {
                refresh: None,
                evict_lists: abbreviation
                    .map(|abbreviation| keys::rates_on(abbreviation, date))
                    .into_iter()
                    .collect(),
                evict_rates: vec![keys::rate_by_id(id)],
            },
        }
    }
}

impl RateCache {
    /// Apply an invalidation action.
    pub fn apply(&self, invalidation: CacheInvalidation) {
        match invalidation {
            CacheInvalidation::ClearAll => self.clear(),
            CacheInvalidation::Targeted {
                refresh,
                evict_lists,
                evict_rates,
            } => {
                if let Some((key, rate)) = refresh {
                    self.rate_lists.put(key, vec![rate]);
                }
                for key in &evict_lists {
                    self.rate_lists.remove(key);
                }
                for key in &evict_rates {
                    self.rates.remove(key);
                }
            }
        }
    }
}

impl RateEngine {
    fn invalidate(&self, mutation: Mutation<'_>) {
        let invalidation = CacheInvalidation::for_mutation(mutation);
        debug!(?invalidation, "Invalidating cache");
        self.cache.apply(invalidation);
    }

    /// Abbreviation of the currency a rate points at.
    async fn parent_abbreviation(&self, rate: &CurrencyRate) -> RateResult<String> {
        let currency_id = rate
            .currency_id
            .ok_or_else(|| RateError::invalid_argument("Rate must reference a currency"))?;

        let currency = self.store.find_by_id(currency_id).await?.ok_or_else(|| {
            RateError::not_found(format!("Currency not found with id: {}", currency_id))
        })?;

        Ok(currency.cur_abbreviation)
    }

    #[instrument(skip(self, currency), fields(abbreviation = %currency.cur_abbreviation))]
    pub async fn create_currency(&self, currency: CurrencyInfo) -> RateResult<CurrencyInfo> {
        self.requests.increment();

        let saved = self.store.save(currency).await?;
        self.invalidate(Mutation::CurrencyCreated);

        info!(currency = %saved, "Currency created");
        Ok(saved)
    }

    #[instrument(skip(self, patch))]
    pub async fn update_currency(
        &self,
        id: CurrencyId,
        patch: CurrencyPatch,
    ) -> RateResult<CurrencyInfo> {
        self.requests.increment();

        let mut currency = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| RateError::not_found(format!("Currency not found with id: {}", id)))?;
        currency.apply(patch);

        let saved = self.store.save(currency).await?;
        self.invalidate(Mutation::CurrencyUpdated);

        info!(currency = %saved, "Currency updated");
        Ok(saved)
    }

    /// Delete a currency and, with it, all of its rates.
    #[instrument(skip(self))]
    pub async fn delete_currency(&self, id: CurrencyId) -> RateResult<()> {
        self.requests.increment();

        self.store.delete_by_id(id).await?;
        self.invalidate(Mutation::CurrencyDeleted);

        info!(currency_id = id, "Currency deleted");
        Ok(())
    }

    /// Persist a rate for an existing currency.
    #[instrument(skip(self, rate), fields(rate = %rate))]
    pub async fn create_rate(&self, rate: CurrencyRate) -> RateResult<CurrencyRate> {
        self.requests.increment();

        let abbreviation = self.parent_abbreviation(&rate).await?;
        let saved = self.store.save_rate(rate).await?;
        self.invalidate(Mutation::RateCreated {
            rate: &saved,
            abbreviation: &abbreviation,
        });

        info!(rate = %saved, abbreviation = %abbreviation, "Rate created");
        Ok(saved)
    }

    #[instrument(skip(self, patch))]
    pub async fn update_rate(&self, id: RateId, patch: RatePatch) -> RateResult<CurrencyRate> {
        self.requests.increment();

        let mut rate = self
            .store
            .find_rate_by_id(id)
            .await?
            .ok_or_else(|| RateError::not_found(format!("Rate not found with id: {}", id)))?;
        rate.apply(patch);

        let abbreviation = self.parent_abbreviation(&rate).await?;
        let saved = self.store.save_rate(rate).await?;
        self.invalidate(Mutation::RateUpdated {
            id,
            rate: &saved,
            abbreviation: &abbreviation,
        });

        info!(rate = %saved, abbreviation = %abbreviation, "Rate updated");
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn delete_rate(&self, id: RateId) -> RateResult<()> {
        self.requests.increment();

        let rate = self
            .store
            .find_rate_by_id(id)
            .await?
            .ok_or_else(|| RateError::not_found(format!("Rate not found with id: {}", id)))?;

        let abbreviation = match rate.currency_id {
            Some(currency_id) => self
                .store
                .find_by_id(currency_id)
                .await?
                .map(|currency| currency.cur_abbreviation),
            None => None,
        };

        self.store.delete_rate_by_id(id).await?;
        self.invalidate(Mutation::RateDeleted {
            id,
            date: rate.date,
            abbreviation: abbreviation.as_deref(),
        });

        info!(rate_id = id, "Rate deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RateStore;
    use crate::testing::Fixture;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    /// Fill every category so a clear is observable.
    async fn prime(fx: &Fixture) -> (CurrencyId, Vec<String>) {
        let usd = fx.add_currency("USD", 100).await;
        let eur = fx.add_currency("EUR", 100).await;
        fx.provider.set_rate(usd, fx.quote(dec!(250.00), 100));
        fx.provider.set_rate(eur, fx.quote(dec!(300.00), 100));

        fx.engine.resolve_rate(usd).await.unwrap();
        fx.engine.resolve_rate_by_abbreviation(Some("EUR")).await.unwrap();
        fx.engine.convert(usd, eur, dec!(10)).await.unwrap();
        fx.engine.get_currency_by_id(usd).await.unwrap();
        fx.engine.list_all_currencies_from_store().await.unwrap();

        let primed = vec![
            keys::rate(usd, fx.today),
            keys::rate_by_abbreviation("EUR", fx.today),
            keys::conversion(usd, eur, dec!(10)),
            keys::currency(usd),
            keys::ALL_CURRENCIES_FROM_STORE.to_string(),
        ];
        for key in &primed {
            assert!(fx.engine.cache().contains(key), "{} should be cached", key);
        }

        (usd, primed)
    }

    #[test]
    fn test_currency_mutations_clear_all() {
        for mutation in [
            Mutation::CurrencyCreated,
            Mutation::CurrencyUpdated,
            Mutation::CurrencyDeleted,
        ] {
            assert_eq!(
                CacheInvalidation::for_mutation(mutation),
                CacheInvalidation::ClearAll
            );
        }
    }

    #[test]
    fn test_rate_update_targets_rate_keys() {
        let rate = CurrencyRate::new(dec!(3.2), 1, day(3)).with_id(7);

        let invalidation = CacheInvalidation::for_mutation(Mutation::RateUpdated {
            id: 7,
            rate: &rate,
            abbreviation: "USD",
        });

        assert_eq!(
            invalidation,
            CacheInvalidation::Targeted {
                refresh: Some(("rates:USD:2024-06-03".to_string(), rate.clone())),
                evict_lists: Vec::new(),
                evict_rates: vec!["rateById:7".to_string()],
            }
        );
    }

    #[test]
    fn test_rate_delete_without_parent_only_evicts_by_id() {
        let invalidation = CacheInvalidation::for_mutation(Mutation::RateDeleted {
            id: 7,
            date: day(3),
            abbreviation: None,
        });

        assert_eq!(
            invalidation,
            CacheInvalidation::Targeted {
                refresh: None,
                evict_lists: Vec::new(),
                evict_rates: vec!["rateById:7".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn test_create_currency_clears_cache() {
        let fx = Fixture::new();
        let (_, primed) = prime(&fx).await;

        fx.engine
            .create_currency(CurrencyInfo::new("826", "GBP", "Pound", 1))
            .await
            .unwrap();

        for key in &primed {
            assert!(!fx.engine.cache().contains(key), "{} should be evicted", key);
        }
        assert!(fx.engine.cache().is_empty());
    }

    #[tokio::test]
    async fn test_update_currency_clears_cache() {
        let fx = Fixture::new();
        let (usd, _) = prime(&fx).await;

        let updated = fx
            .engine
            .update_currency(
                usd,
                CurrencyPatch {
                    cur_code: "840".to_string(),
                    cur_abbreviation: "USD".to_string(),
                    cur_name: "US Dollar".to_string(),
                    cur_scale: 1,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.cur_id, Some(usd));
        assert_eq!(updated.cur_name, "US Dollar");
        assert_eq!(updated.rates.len(), 1);
        assert!(fx.engine.cache().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_currency() {
        let fx = Fixture::new();
        let (_, primed) = prime(&fx).await;

        let result = fx
            .engine
            .update_currency(
                404,
                CurrencyPatch {
                    cur_code: "0".to_string(),
                    cur_abbreviation: "XXX".to_string(),
                    cur_name: "None".to_string(),
                    cur_scale: 1,
                },
            )
            .await;

        assert_eq!(result, Err(RateError::not_found("Currency not found with id: 404")));
        for key in &primed {
            assert!(fx.engine.cache().contains(key));
        }
    }

    #[tokio::test]
    async fn test_delete_currency_clears_cache_and_rates() {
        let fx = Fixture::new();
        let (usd, _) = prime(&fx).await;

        fx.engine.delete_currency(usd).await.unwrap();

        assert!(fx.engine.cache().is_empty());
        assert!(fx.store.inner().find_by_id(usd).await.unwrap().is_none());
        assert_eq!(fx.store.inner().rate_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_cache() {
        let fx = Fixture::new();
        let (usd, primed) = prime(&fx).await;
        fx.store.fail_writes(true);

        let result = fx.engine.delete_currency(usd).await;

        assert!(matches!(result, Err(RateError::Upstream(_))));
        for key in &primed {
            assert!(fx.engine.cache().contains(key));
        }
    }

    #[tokio::test]
    async fn test_create_rate_refreshes_only_its_key() {
        let fx = Fixture::new();
        let (usd, primed) = prime(&fx).await;
        let before = fx.engine.cache().len();

        let saved = fx
            .engine
            .create_rate(CurrencyRate::new(dec!(251.00), 100, day(4)).for_currency(usd))
            .await
            .unwrap();

        assert_eq!(
            fx.engine.cache().rate_lists.get(&keys::rates_on("USD", day(4))),
            Some(vec![saved])
        );
        assert_eq!(fx.engine.cache().len(), before + 1);
        for key in &primed {
            assert!(fx.engine.cache().contains(key));
        }
    }

    #[tokio::test]
    async fn test_create_rate_requires_currency() {
        let fx = Fixture::new();

        let detached = fx.engine.create_rate(CurrencyRate::new(dec!(1), 1, day(3))).await;
        let unknown = fx
            .engine
            .create_rate(CurrencyRate::new(dec!(1), 1, day(3)).for_currency(42))
            .await;

        assert_eq!(
            detached,
            Err(RateError::invalid_argument("Rate must reference a currency"))
        );
        assert_eq!(unknown, Err(RateError::not_found("Currency not found with id: 42")));
        assert_eq!(fx.store.inner().rate_count(), 0);
        assert!(fx.engine.cache().is_empty());
    }

    #[tokio::test]
    async fn test_update_rate_refreshes_list_and_evicts_by_id() {
        let fx = Fixture::new();
        let (usd, primed) = prime(&fx).await;
        let rate = fx.add_rate(usd, dec!(240.00), day(2)).await;
        let rate_id = rate.id.unwrap();
        fx.engine.get_rate_by_id(rate_id).await.unwrap();
        assert!(fx.engine.cache().contains(&keys::rate_by_id(rate_id)));

        let updated = fx
            .engine
            .update_rate(
                rate_id,
                RatePatch {
                    cur_official_rate: dec!(241.00),
                    cur_scale: 100,
                    date: day(2),
                    currency_id: Some(usd),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.id, Some(rate_id));
        assert!(!fx.engine.cache().contains(&keys::rate_by_id(rate_id)));
        assert_eq!(
            fx.engine.cache().rate_lists.get(&keys::rates_on("USD", day(2))),
            Some(vec![updated])
        );
        for key in &primed {
            assert!(fx.engine.cache().contains(key));
        }
    }

    #[tokio::test]
    async fn test_update_missing_rate() {
        let fx = Fixture::new();

        let result = fx
            .engine
            .update_rate(
                9,
                RatePatch {
                    cur_official_rate: dec!(1),
                    cur_scale: 1,
                    date: day(2),
                    currency_id: None,
                },
            )
            .await;

        assert_eq!(result, Err(RateError::not_found("Rate not found with id: 9")));
    }

    #[tokio::test]
    async fn test_delete_rate_evicts_its_keys() {
        let fx = Fixture::new();
        let (usd, primed) = prime(&fx).await;
        let rate = fx.add_rate(usd, dec!(240.00), day(2)).await;
        let rate_id = rate.id.unwrap();
        fx.engine.get_rate_by_id(rate_id).await.unwrap();
        fx.engine
            .list_rates_by_abbreviation_and_date("USD", day(2))
            .await
            .unwrap();

        fx.engine.delete_rate(rate_id).await.unwrap();

        assert!(!fx.engine.cache().contains(&keys::rate_by_id(rate_id)));
        assert!(!fx.engine.cache().contains(&keys::rates_on("USD", day(2))));
        assert!(fx.store.inner().find_rate_by_id(rate_id).await.unwrap().is_none());
        for key in &primed {
            assert!(fx.engine.cache().contains(key));
        }
    }

    #[tokio::test]
    async fn test_delete_missing_rate() {
        let fx = Fixture::new();

        let result = fx.engine.delete_rate(9).await;

        assert_eq!(result, Err(RateError::not_found("Rate not found with id: 9")));
    }
}

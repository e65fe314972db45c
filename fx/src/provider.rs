//! Rate provider traits and implementations.

use async_trait::async_trait;
use ratekeeper_common::{CurrencyId, CurrencyInfo, CurrencyRate};

use crate::error::RateResult;

/// External source of currencies and official rates.
///
/// Failures are surfaced to the caller; the engine never retries them.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Every currency the provider knows about.
    async fn fetch_all_currencies(&self) -> RateResult<Vec<CurrencyInfo>>;

    /// Today's official rate for a currency, not yet attached or persisted.
    async fn fetch_current_rate(&self, currency_id: CurrencyId) -> RateResult<CurrencyRate>;
}

/// Mock rate provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    name: String,
    currencies: parking_lot::RwLock<Vec<CurrencyInfo>>,
    rates: dashmap::DashMap<CurrencyId, CurrencyRate>,
    failure: parking_lot::RwLock<Option<String>>,
    rate_calls: std::sync::atomic::AtomicUsize,
    currency_calls: std::sync::atomic::AtomicUsize,
    delay: parking_lot::RwLock<Option<std::time::Duration>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a new mock provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            currencies: parking_lot::RwLock::new(Vec::new()),
            rates: dashmap::DashMap::new(),
            failure: parking_lot::RwLock::new(None),
            rate_calls: std::sync::atomic::AtomicUsize::new(0),
            currency_calls: std::sync::atomic::AtomicUsize::new(0),
            delay: parking_lot::RwLock::new(None),
        }
    }

    /// Set the quote returned for a currency.
    pub fn set_rate(&self, currency_id: CurrencyId, rate: CurrencyRate) {
        self.rates.insert(currency_id, rate);
    }

    /// Set the currency listing.
    pub fn set_currencies(&self, currencies: Vec<CurrencyInfo>) {
        *self.currencies.write() = currencies;
    }

    /// Make every call fail with an upstream error carrying `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.write() = Some(message.into());
    }

    /// Delay every rate fetch, to widen race windows in tests.
    pub fn set_delay(&self, delay: std::time::Duration) {
        *self.delay.write() = Some(delay);
    }

    /// Number of `fetch_current_rate` calls so far.
    pub fn rate_calls(&self) -> usize {
        self.rate_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Number of `fetch_all_currencies` calls so far.
    pub fn currency_calls(&self) -> usize {
        self.currency_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn check_failure(&self) -> RateResult<()> {
        match self.failure.read().as_ref() {
            Some(message) => Err(crate::error::RateError::upstream(message.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_all_currencies(&self) -> RateResult<Vec<CurrencyInfo>> {
        self.currency_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.check_failure()?;
        Ok(self.currencies.read().clone())
    }

    async fn fetch_current_rate(&self, currency_id: CurrencyId) -> RateResult<CurrencyRate> {
        self.rate_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_failure()?;
        self.rates
            .get(&currency_id)
            .map(|r| r.clone())
            .ok_or_else(|| {
                crate::error::RateError::upstream(format!(
                    "No rate available for currency {}",
                    currency_id
                ))
            })
    }
}

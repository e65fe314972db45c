//! Shared engine fixture for unit tests.

use std::sync::Arc;

use chrono::NaiveDate;
use ratekeeper_common::{CurrencyId, CurrencyInfo, CurrencyRate, FixedClock};
use rust_decimal::Decimal;

use crate::engine::{EngineConfig, RateEngine};
use crate::provider::MockRateProvider;
use crate::store::{CountingStore, RateStore};

pub(crate) struct Fixture {
    pub engine: RateEngine,
    pub store: Arc<CountingStore>,
    pub provider: Arc<MockRateProvider>,
    pub today: NaiveDate,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let today = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let store = Arc::new(CountingStore::new());
        let provider = Arc::new(MockRateProvider::new("test"));
        let engine = RateEngine::new(store.clone(), provider.clone(), config)
            .with_clock(Arc::new(FixedClock::new(today)));

        Self {
            engine,
            store,
            provider,
            today,
        }
    }

    /// Save a currency directly, bypassing call counting.
    pub async fn add_currency(&self, abbreviation: &str, scale: u32) -> CurrencyId {
        let currency = CurrencyInfo::new("000", abbreviation, abbreviation, scale);
        let saved = self.store.inner().save(currency).await.unwrap();
        saved.cur_id.unwrap()
    }

    /// Persist a rate for a currency at the currency's scale.
    pub async fn add_rate(
        &self,
        currency_id: CurrencyId,
        official: Decimal,
        date: NaiveDate,
    ) -> CurrencyRate {
        let currency = self.store.inner().find_by_id(currency_id).await.unwrap().unwrap();
        let rate = CurrencyRate::new(official, currency.cur_scale, date).for_currency(currency_id);
        self.store.inner().save_rate(rate).await.unwrap()
    }

    /// An unattached quote dated today.
    pub fn quote(&self, official: Decimal, scale: u32) -> CurrencyRate {
        CurrencyRate::new(official, scale, self.today)
    }
}

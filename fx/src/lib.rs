//! Ratekeeper FX Engine
//!
//! Fetch-through rate cache and currency conversion core.
//!
//! # Features
//!
//! - Rate resolution from cache, then persisted storage, then an external provider
//! - Deterministic decimal conversion with half-up rounding
//! - Typed, unbounded cache with per-mutation invalidation
//! - Single-flight resolution of concurrent misses on the same key
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ratekeeper_fx::{EngineConfig, InMemoryRateStore, NbrbConfig, NbrbRateProvider, RateEngine};
//! use rust_decimal_macros::dec;
//!
//! let provider = NbrbRateProvider::new(NbrbConfig::default())?;
//! let engine = RateEngine::new(
//!     Arc::new(InMemoryRateStore::new()),
//!     Arc::new(provider),
//!     EngineConfig::default(),
//! );
//!
//! engine.list_all_currencies().await?;
//! let rate = engine.resolve_rate_by_abbreviation(Some("USD")).await?;
//! let eur = engine.convert(431, 451, dec!(100)).await?;
//! ```

pub mod cache;
pub mod conversion;
pub mod engine;
pub mod error;
pub mod invalidation;
pub mod listing;
pub mod metrics;
pub mod nbrb;
pub mod provider;
pub mod store;

#[cfg(test)]
mod testing;

pub use cache::{keys, CacheStore, RateCache, SharedRateCache};
pub use conversion::{convert_amount, per_unit_rate};
pub use engine::{EngineConfig, EngineStats, RateEngine};
pub use error::{ErrorKind, RateError, RateResult};
pub use invalidation::{CacheInvalidation, Mutation};
pub use metrics::RequestCounter;
pub use nbrb::{NbrbConfig, NbrbRateProvider};
pub use provider::RateProvider;
pub use store::{InMemoryRateStore, RateStore};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateProvider;
#[cfg(any(test, feature = "test-utils"))]
pub use store::CountingStore;

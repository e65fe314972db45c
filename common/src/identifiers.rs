//! Identifier types for Ratekeeper entities.

/// Surrogate key of a [`CurrencyInfo`](crate::CurrencyInfo), assigned by the store.
pub type CurrencyId = i32;

/// Surrogate key of a [`CurrencyRate`](crate::CurrencyRate), assigned by the store.
pub type RateId = i64;

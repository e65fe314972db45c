//! Ratekeeper Common Types
//!
//! Shared types used across Ratekeeper crates: the currency and rate model,
//! identifier aliases and the clock used to decide what "today" is.

pub mod identifiers;
pub mod currency;
pub mod time;

pub use identifiers::*;
pub use currency::*;
pub use time::*;

//! Currency metadata and official rate types.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CurrencyId, RateId};

/// A tracked currency and the rates quoted for it.
///
/// The currency owns its rates: deleting it removes every rate it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyInfo {
    /// Store-assigned identity, `None` until first saved.
    pub cur_id: Option<CurrencyId>,
    /// Free-form numeric or alphanumeric code.
    pub cur_code: String,
    /// Unique abbreviation, e.g. `USD`.
    pub cur_abbreviation: String,
    /// Display name.
    pub cur_name: String,
    /// Units of the currency per quoted rate.
    pub cur_scale: u32,
    /// Rates quoted for this currency, in stored order.
    #[serde(default)]
    pub rates: Vec<CurrencyRate>,
}

impl CurrencyInfo {
    /// Create an unsaved currency with no rates.
    pub fn new(
        cur_code: impl Into<String>,
        cur_abbreviation: impl Into<String>,
        cur_name: impl Into<String>,
        cur_scale: u32,
    ) -> Self {
        Self {
            cur_id: None,
            cur_code: cur_code.into(),
            cur_abbreviation: cur_abbreviation.into(),
            cur_name: cur_name.into(),
            cur_scale,
            rates: Vec::new(),
        }
    }

    /// Set the identity.
    pub fn with_id(mut self, id: CurrencyId) -> Self {
        self.cur_id = Some(id);
        self
    }

    /// First rate quoted on `date`, in stored order.
    ///
    /// Nothing prevents several rates on the same day; the earliest stored wins.
    pub fn rate_on(&self, date: NaiveDate) -> Option<&CurrencyRate> {
        self.rates.iter().find(|rate| rate.date == date)
    }

    /// Copy the editable fields of `patch` onto this currency.
    pub fn apply(&mut self, patch: CurrencyPatch) {
        self.cur_code = patch.cur_code;
        self.cur_abbreviation = patch.cur_abbreviation;
        self.cur_name = patch.cur_name;
        self.cur_scale = patch.cur_scale;
    }
}

impl fmt::Display for CurrencyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cur_id {
            Some(id) => write!(f, "{} (#{})", self.cur_abbreviation, id),
            None => write!(f, "{} (unsaved)", self.cur_abbreviation),
        }
    }
}

/// An official rate for one scale-unit of a currency on a given date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyRate {
    /// Store-assigned identity, `None` until first saved.
    pub id: Option<RateId>,
    /// Official rate, non-negative.
    pub cur_official_rate: Decimal,
    /// Scale at quote time; independent of the currency's current scale.
    pub cur_scale: u32,
    /// Calendar date of the quote.
    pub date: NaiveDate,
    /// Lookup reference to the owning currency.
    pub currency_id: Option<CurrencyId>,
}

impl CurrencyRate {
    /// Create an unsaved, unattached rate.
    pub fn new(cur_official_rate: Decimal, cur_scale: u32, date: NaiveDate) -> Self {
        Self {
            id: None,
            cur_official_rate,
            cur_scale,
            date,
            currency_id: None,
        }
    }

    /// Attach the rate to a currency.
    pub fn for_currency(mut self, currency_id: CurrencyId) -> Self {
        self.currency_id = Some(currency_id);
        self
    }

    /// Set the identity.
    pub fn with_id(mut self, id: RateId) -> Self {
        self.id = Some(id);
        self
    }

    /// Copy the editable fields of `patch` onto this rate.
    pub fn apply(&mut self, patch: RatePatch) {
        self.cur_official_rate = patch.cur_official_rate;
        self.cur_scale = patch.cur_scale;
        self.date = patch.date;
        self.currency_id = patch.currency_id;
    }
}

impl fmt::Display for CurrencyRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} on {}", self.cur_official_rate, self.cur_scale, self.date)
    }
}

/// Replacement values for an existing currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyPatch {
    pub cur_code: String,
    pub cur_abbreviation: String,
    pub cur_name: String,
    pub cur_scale: u32,
}

impl From<&CurrencyInfo> for CurrencyPatch {
    fn from(info: &CurrencyInfo) -> Self {
        Self {
            cur_code: info.cur_code.clone(),
            cur_abbreviation: info.cur_abbreviation.clone(),
            cur_name: info.cur_name.clone(),
            cur_scale: info.cur_scale,
        }
    }
}

/// Replacement values for an existing rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePatch {
    pub cur_official_rate: Decimal,
    pub cur_scale: u32,
    pub date: NaiveDate,
    pub currency_id: Option<CurrencyId>,
}

impl From<&CurrencyRate> for RatePatch {
    fn from(rate: &CurrencyRate) -> Self {
        Self {
            cur_official_rate: rate.cur_official_rate,
            cur_scale: rate.cur_scale,
            date: rate.date,
            currency_id: rate.currency_id,
        }
    }
}

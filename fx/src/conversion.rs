//! Currency conversion arithmetic.

use ratekeeper_common::{CurrencyId, CurrencyRate};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{info, instrument};

use crate::cache::keys;
use crate::engine::RateEngine;
use crate::error::{RateError, RateResult};

/// Fractional digits kept for a per-unit rate.
pub const PER_UNIT_DECIMALS: u32 = 6;

/// Fractional digits of a converted amount.
pub const RESULT_DECIMALS: u32 = 2;

fn round_half_up(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
}

/// Official rate divided by scale, rounded half-up to six places.
pub fn per_unit_rate(rate: &CurrencyRate) -> RateResult<Decimal> {
    if rate.cur_scale == 0 {
        return Err(RateError::invalid_argument(format!(
            "Rate scale must be positive: {}",
            rate
        )));
    }

    if rate.cur_official_rate.is_sign_negative() {
        return Err(RateError::invalid_argument(format!(
            "Official rate cannot be negative: {}",
            rate
        )));
    }

    let per_unit = rate
        .cur_official_rate
        .checked_div(Decimal::from(rate.cur_scale))
        .ok_or_else(|| RateError::invalid_argument(format!("Invalid rate: {}", rate)))?;

    Ok(round_half_up(per_unit, PER_UNIT_DECIMALS))
}

/// Convert `amount` of the `from` currency into the `to` currency.
///
/// Both rates are normalized to per-unit values first; the result is
/// rounded half-up to two places.
pub fn convert_amount(amount: Decimal, from: &CurrencyRate, to: &CurrencyRate) -> RateResult<Decimal> {
    let from_per_unit = per_unit_rate(from)?;
    let to_per_unit = per_unit_rate(to)?;

    if to_per_unit.is_zero() {
        return Err(RateError::invalid_argument(format!(
            "Target rate must be greater than zero: {}",
            to
        )));
    }

    let converted = amount
        .checked_mul(from_per_unit)
        .and_then(|value| value.checked_div(to_per_unit))
        .ok_or_else(|| RateError::invalid_argument("Conversion overflowed"))?;

    Ok(round_half_up(converted, RESULT_DECIMALS))
}

fn conversion_error(err: RateError) -> RateError {
    RateError::invalid_argument(format!("Conversion error: {}", err.message()))
}

impl RateEngine {
    /// Convert `amount` between two currencies at today's rates.
    ///
    /// Results are cached per amount, so `10` and `10.00` are cached separately.
    #[instrument(skip(self, amount), fields(amount = %amount))]
    pub async fn convert(
        &self,
        from_currency_id: CurrencyId,
        to_currency_id: CurrencyId,
        amount: Decimal,
    ) -> RateResult<Decimal> {
        self.requests.increment();

        if amount <= Decimal::ZERO {
            return Err(RateError::invalid_argument(
                "Amount must be greater than zero",
            ));
        }

        let key = keys::conversion(from_currency_id, to_currency_id, amount);
        if let Some(cached) = self.cache.amounts.get(&key) {
            return Ok(cached);
        }

        let from = self
            .rate_for_id(from_currency_id)
            .await
            .map_err(conversion_error)?;
        let to = self
            .rate_for_id(to_currency_id)
            .await
            .map_err(conversion_error)?;

        let result = convert_amount(amount, &from, &to).map_err(conversion_error)?;
        self.cache.amounts.put(key, result);

        info!(
            from = from_currency_id,
            to = to_currency_id,
            result = %result,
            "Conversion completed"
        );

        Ok(result)
    }
}

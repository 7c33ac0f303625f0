use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::BookingError;
use crate::model::{HOUR_MS, RateSchedule, Span};

/// Price of `span` under `rates`.
///
/// Whole hours are counted rounding down, with a one-hour minimum. Full days are charged at
/// the daily rate and the remaining hours at the hourly rate; the sum is rounded half-up to
/// cents.
pub fn price(rates: &RateSchedule, span: &Span) -> Decimal {
    let total_hours = (span.duration_ms() / HOUR_MS).max(1);
    let days = total_hours / 24;
    let hours = total_hours % 24;

    let amount = Decimal::from(days) * rates.per_day + Decimal::from(hours) * rates.per_hour;
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `amount` in minor currency units (10.50 → 1050). Fails if it has sub-cent precision.
pub fn to_minor_units(amount: Decimal) -> Result<i64, BookingError> {
    let minor = amount * Decimal::ONE_HUNDRED;
    if minor.fract() != Decimal::ZERO {
        return Err(BookingError::Payment(format!(
            "amount {amount} is not a whole number of cents"
        )));
    }
    minor
        .to_i64()
        .ok_or_else(|| BookingError::Payment(format!("amount {amount} out of range")))
}

// 💵 Currency amounts - fixed 2-fraction-digit decimals
//
// Amounts are rust_decimal values, never floats. Everything persisted or
// returned to a client carries exactly two fractional digits.

use crate::error::{LedgerError, LedgerResult};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Fractional digits of the currency minor unit
pub const CURRENCY_SCALE: u32 = 2;

pub fn one_cent() -> Decimal {
    Decimal::new(1, CURRENCY_SCALE)
}

/// Round half-up (away from zero) to the currency scale
pub fn quantize(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(CURRENCY_SCALE);
    rounded
}

/// True when the amount has no digits beyond the currency scale
pub fn is_representable(amount: Decimal) -> bool {
    amount.round_dp(CURRENCY_SCALE) == amount
}

/// Validate an expense amount: strictly positive and exact at 2 decimals
///
/// Returns the amount rescaled so it always prints with two decimals.
pub fn validate_amount(amount: Decimal) -> LedgerResult<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(format!(
            "{} must be greater than zero",
            amount
        )));
    }
    if !is_representable(amount) {
        return Err(LedgerError::InvalidAmount(format!(
            "{} has more than {} fractional digits",
            amount, CURRENCY_SCALE
        )));
    }

    let mut exact = amount;
    exact.rescale(CURRENCY_SCALE);
    Ok(exact)
}

/// Parse a textual amount ("12.50") into a validated decimal
pub fn parse_amount(text: &str) -> LedgerResult<Decimal> {
    let amount = Decimal::from_str(text.trim())
        .map_err(|e| LedgerError::InvalidAmount(format!("'{}': {}", text, e)))?;
    validate_amount(amount)
}

/// Normalize an ISO-4217 style currency code ("usd" → "USD")
pub fn normalize_currency(code: &str) -> LedgerResult<String> {
    let code = code.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(LedgerError::invalid_input(
            "currency",
            format!("'{}' is not a 3-letter currency code", code),
        ));
    }
    Ok(code.to_ascii_uppercase())
}

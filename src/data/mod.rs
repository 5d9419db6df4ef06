//! Market data: quote → digit extraction and the rolling digit window.

pub mod window;

use rust_decimal::{Decimal, RoundingStrategy};

pub use window::{DigitSnapshot, DigitWindow};

/// Final decimal digit of `quote` rendered with exactly `decimals`
/// fractional places (the venue's pip precision).
///
/// Trailing zeros count: `6123.45` at three decimals is `6123.450`,
/// digit 0. Negative quotes yield `None`.
pub fn last_digit(quote: Decimal, decimals: u32) -> Option<u8> {
    if quote.is_sign_negative() && !quote.is_zero() {
        return None;
    }
    let mut fixed = quote.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    fixed.rescale(decimals);
    // rescale silently caps the scale at 28
    if fixed.scale() != decimals {
        return None;
    }
    Some((fixed.mantissa().unsigned_abs() % 10) as u8)
}

/// Parse a quote from its textual JSON form without going through `f64`.
pub fn parse_quote(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    raw.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

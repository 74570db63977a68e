//! Bucket rounding and precision selection for the depth ladder

use rust_decimal::{Decimal, RoundingStrategy};

/// Largest scale a Decimal can carry
pub const MAX_PRECISION: u32 = 28;

/// Round `price` half-up to `precision` fractional digits.
///
/// The result always carries exactly `precision` digits after the point, so
/// `0.0004` at precision 5 renders as `0.00040`.
pub fn round_to_bucket(price: Decimal, precision: u32) -> Decimal {
    let precision = precision.min(MAX_PRECISION);
    let mut bucket = price.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero);
    bucket.rescale(precision);
    bucket
}

/// One unit at the given precision (`10^-precision`)
pub fn precision_unit(precision: u32) -> Decimal {
    Decimal::new(1, precision.min(MAX_PRECISION))
}

/// Precision that keeps the ladder aligned with the instrument's tick size.
///
/// Counts fractional digits up to and including the first nonzero one and
/// never goes below `min_precision`.
pub fn precision_for_price(price: Decimal, min_precision: u32) -> u32 {
    let fraction = price.abs().fract().normalize();
    if fraction.is_zero() {
        return min_precision.min(MAX_PRECISION);
    }

    let rendered = fraction.to_string();
    let leading = rendered
        .split_once('.')
        .and_then(|(_, digits)| digits.find(|c: char| c != '0'))
        .unwrap_or(0) as u32;

    (leading + 1).max(min_precision).min(MAX_PRECISION)
}

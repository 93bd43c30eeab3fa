//! Fixed-point helpers
//!
//! Prices, liquidity and volume are carried as `U256` scaled by 1e18 so that
//! sums and weighted sums stay exact. Only display and statistics leave the
//! integer domain.

use alloy_primitives::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Number of fixed-point units per whole token
pub const PRICE_SCALE: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Decimal digits of precision kept when weights are scaled to integers
pub const WEIGHT_SCALE: u64 = 1_000;

/// Convert a non-negative decimal into 1e18 fixed-point units.
///
/// Returns `None` for negative values. Digits beyond the 18th decimal are
/// truncated.
pub fn to_fixed(value: Decimal) -> Option<U256> {
    if value.is_sign_negative() && !value.is_zero() {
        return None;
    }
    let mantissa = u128::try_from(value.mantissa()).ok()?;
    let divisor = U256::from(10u64).pow(U256::from(value.scale()));
    Some(U256::from(mantissa) * PRICE_SCALE / divisor)
}

/// Convert 1e18 fixed-point units back into a decimal, if it fits.
pub fn from_fixed(value: U256) -> Option<Decimal> {
    let raw = u128::try_from(value).ok()?;
    let raw = i128::try_from(raw).ok()?;
    Decimal::try_from_i128_with_scale(raw, 18)
        .ok()
        .map(|d| d.normalize())
}

/// `10^exp` as a `U256`
pub fn pow10(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// Convert whole-token decimal amount into raw token units with `decimals`
pub fn to_token_units(amount: Decimal, decimals: u8) -> Option<U256> {
    Some(to_fixed(amount)? * pow10(decimals) / PRICE_SCALE)
}

/// Lossy conversion for statistics (impact, volatility)
pub fn to_f64(value: U256) -> f64 {
    value.to_string().parse().unwrap_or(0.0)
}

/// Human-readable form of a fixed-point amount
pub fn format_fixed(value: U256) -> String {
    match from_fixed(value) {
        Some(d) => d.to_string(),
        None => format!("{}e-18", value),
    }
}

/// Scale a weight to an integer with three decimal digits: `round(weight * 1000)`,
/// halves rounding away from zero.
///
/// Negative weights contribute nothing; weights too large for `u64` clamp to `u64::MAX`.
pub fn scale_weight(weight: Decimal) -> u64 {
    if weight.is_sign_negative() {
        return 0;
    }
    weight
        .checked_mul(Decimal::from(WEIGHT_SCALE))
        .map(|w| w.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|w| w.to_u64())
        .unwrap_or(u64::MAX)
}

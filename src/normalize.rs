//! Conversion between on-chain integer amounts and human readable decimal amounts.
//!
//! A token with `decimals = 6` stores `1.5` units as `1_500_000`. Both directions are exact
//! for any `U256` and any supported decimals, so `denormalize(normalize(x, d), d) == x`.

use alloy::primitives::U256;
use bigdecimal::num_bigint::{BigInt, Sign};
use bigdecimal::{BigDecimal, RoundingMode};

use crate::errors::{Error, Result};
use crate::utils::constants::MAX_DECIMALS;

/// `raw / 10^decimals`
///
/// # Errors
/// * If `decimals` is above [`MAX_DECIMALS`]
pub fn normalize(raw: U256, decimals: u8) -> Result<BigDecimal> {
    check_decimals(decimals)?;
    let digits = BigInt::from_bytes_be(Sign::Plus, &raw.to_be_bytes::<32>());
    Ok(BigDecimal::new(digits, i64::from(decimals)))
}

/// `round(value * 10^decimals)`, rounding half away from zero.
///
/// # Errors
/// * If `decimals` is above [`MAX_DECIMALS`]
/// * If `value` is negative or the result does not fit in 256 bits
pub fn denormalize(value: &BigDecimal, decimals: u8) -> Result<U256> {
    check_decimals(decimals)?;

    let (digits, scale) = value.as_bigint_and_exponent();
    let scaled = BigDecimal::new(digits, scale - i64::from(decimals))
        .with_scale_round(0, RoundingMode::HalfUp);
    let (integer, _) = scaled.into_bigint_and_exponent();

    let (sign, bytes) = integer.to_bytes_be();
    if sign == Sign::Minus {
        return Err(Error::validation(
            "amount",
            format!("{value} is negative"),
        ));
    }

    U256::try_from_be_slice(&bytes)
        .ok_or_else(|| Error::validation("amount", format!("{value} overflows 256 bits")))
}

/// # Errors
/// * If `decimals` is above [`MAX_DECIMALS`]
pub fn check_decimals(decimals: u8) -> Result<()> {
    if decimals > MAX_DECIMALS {
        return Err(Error::validation(
            "decimals",
            format!("{decimals} is outside [0, {MAX_DECIMALS}]"),
        ));
    }
    Ok(())
}

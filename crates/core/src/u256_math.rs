//! Conversions between decimal amounts and the contract's fixed-point units.
//!
//! Amounts cross the contract boundary as 18-decimal integers (WAD). Decimal
//! inputs are scaled in two steps of 1e9 so that the rounding happens at
//! nano-unit precision instead of on a 1e18-scaled float.

use alloy::primitives::U256;

use crate::error::{Error, Result};

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// 1e9, one step of the two-step WAD conversion
const NANO: U256 = U256::from_limbs([1_000_000_000u64, 0, 0, 0]);

/// Convert WAD (18 decimals) to f64.
/// Lossy; use for economics and display, never to build calldata.
#[inline(always)]
pub fn wad_to_f64(wad: U256) -> f64 {
    if wad <= U256::from(u128::MAX) {
        let value: u128 = wad.to();
        value as f64 / 1e18
    } else {
        let value = wad
            .as_limbs()
            .iter()
            .rev()
            .fold(0.0, |acc, &limb| acc * (u64::MAX as f64 + 1.0) + limb as f64);
        value / 1e18
    }
}

/// Convert an ETH amount to attoeth.
pub fn eth_to_attoeth(eth: f64) -> Result<U256> {
    decimal_to_wad(eth, "ETH")
}

/// Convert a DAI amount to attodai.
pub fn dai_to_attodai(dai: f64) -> Result<U256> {
    decimal_to_wad(dai, "DAI")
}

/// Leverage multiplier as the whole percentage the contract expects
/// (2.5x is 250).
pub fn multiplier_to_percent(multiplier: f64) -> Result<U256> {
    if !multiplier.is_finite() || multiplier < 1.0 {
        return Err(Error::InvalidInput(format!(
            "leverage multiplier must be at least 1, got {multiplier}"
        )));
    }
    let percent = (multiplier * 100.0).round();
    if percent >= u64::MAX as f64 {
        return Err(Error::InvalidInput(format!(
            "leverage multiplier {multiplier} is too large"
        )));
    }
    Ok(U256::from(percent as u64))
}

fn decimal_to_wad(value: f64, unit: &str) -> Result<U256> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::InvalidInput(format!(
            "{unit} amount must be finite and non-negative, got {value}"
        )));
    }
    let nanos = (value * 1e9).round();
    if nanos >= u128::MAX as f64 {
        return Err(Error::InvalidInput(format!("{unit} amount {value} is too large")));
    }
    Ok(U256::from(nanos as u128) * NANO)
}

//! Position economics.
//!
//! Pure functions of the current ETH/USD price, the provider fee rate and
//! the caller's inputs. `multiplier` is the leverage multiplier (total
//! position size over the user's own ETH); percentages are fractions
//! (`0.1` is 10%).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Collateralization ratio below which the vault is liquidated.
pub const LIQUIDATION_RATIO: f64 = 1.5;

/// Penalty charged on liquidation.
const LIQUIDATION_PENALTY: f64 = 0.13;

/// Floor of the low cost estimate, as a fraction of the loan.
const MIN_COST_FRACTION: f64 = 0.01;

/// Floor of the high cost estimate, as a fraction of the loan.
const MIN_HIGH_COST_FRACTION: f64 = 0.05;

/// Expected cost of acquiring the leveraged ETH.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostEstimate {
    /// Cost band in ETH
    Band { low: f64, high: f64 },
    /// The order book cannot fill the sale at this size
    InsufficientDepth,
}

/// Snapshot of the economics of a prospective position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionQuote {
    /// ETH/USD price the quote was computed at
    pub price: f64,
    /// Leverage multiplier
    pub multiplier: f64,
    /// User's own ETH
    pub size: f64,
    /// ETH borrowed against the position
    pub loan_size: f64,
    /// Provider fee in ETH
    pub fee_in_eth: f64,
    /// Price at which the position gets liquidated
    pub liquidation_price: f64,
    /// Approximate loss on liquidation, as a fraction of `size`
    pub liquidation_penalty_percent: f64,
}

impl PositionQuote {
    pub fn compute(price: f64, fee_rate: f64, multiplier: f64, size: f64) -> Result<Self> {
        Ok(Self {
            price,
            multiplier,
            size,
            loan_size: loan_size(multiplier, size)?,
            fee_in_eth: fee_in_eth(fee_rate, multiplier, size)?,
            liquidation_price: liquidation_price(price, multiplier)?,
            liquidation_penalty_percent: liquidation_penalty_percent(multiplier)?,
        })
    }
}

/// Price at which a position with `multiplier` gets liquidated.
///
/// Zero at 1x: an unleveraged position cannot be liquidated.
pub fn liquidation_price(price: f64, multiplier: f64) -> Result<f64> {
    check_amount("price", price)?;
    check_multiplier(multiplier)?;
    Ok(price * (LIQUIDATION_RATIO - LIQUIDATION_RATIO / multiplier))
}

/// ETH price at which the position has changed in value by `percent`.
pub fn future_price_for_percent_change(price: f64, percent: f64, multiplier: f64) -> Result<f64> {
    check_amount("price", price)?;
    check_finite("percent change", percent)?;
    check_multiplier(multiplier)?;
    Ok(price * (1.0 + percent / multiplier))
}

/// Change in position value if ETH moves from `price` to `future_price`.
pub fn percent_change_for_future_price(
    price: f64,
    future_price: f64,
    multiplier: f64,
) -> Result<f64> {
    check_positive("price", price)?;
    check_amount("future price", future_price)?;
    check_multiplier(multiplier)?;
    Ok(multiplier * (future_price / price - 1.0))
}

/// Value in USD, at today's price, of a position after ETH moves to
/// `future_price`.
pub fn position_value_at_future_price(
    price: f64,
    future_price: f64,
    multiplier: f64,
    size: f64,
) -> Result<f64> {
    check_amount("size", size)?;
    let percent = percent_change_for_future_price(price, future_price, multiplier)?;
    Ok((size + size * percent) * price)
}

pub fn change_in_position_value(
    price: f64,
    future_price: f64,
    multiplier: f64,
    size: f64,
) -> Result<f64> {
    let future = position_value_at_future_price(price, future_price, multiplier, size)?;
    let current = position_value_at_future_price(price, price, multiplier, size)?;
    Ok(future - current)
}

/// ETH borrowed to lever `size` up to `multiplier`.
pub fn loan_size(multiplier: f64, size: f64) -> Result<f64> {
    check_multiplier(multiplier)?;
    check_amount("size", size)?;
    Ok(size * multiplier - size)
}

/// Provider fee in ETH for the loan.
pub fn fee_in_eth(fee_rate: f64, multiplier: f64, size: f64) -> Result<f64> {
    check_amount("fee rate", fee_rate)?;
    Ok(loan_size(multiplier, size)? * fee_rate)
}

/// Approximate fraction of `size` lost if the position is liquidated.
///
/// Closed-form estimate for display; the contract does not guarantee it.
pub fn liquidation_penalty_percent(multiplier: f64) -> Result<f64> {
    check_multiplier(multiplier)?;
    let remaining = (LIQUIDATION_RATIO - LIQUIDATION_RATIO / multiplier)
        * (1.0 - LIQUIDATION_PENALTY / multiplier);
    Ok(multiplier * (remaining - 1.0))
}

/// Widen a point estimate of the trade cost into a band.
///
/// `low` is at least 1% of the loan, `high` at least twice `low` and at
/// least 5% of the loan.
pub fn cost_band(loan_size: f64, estimated_cost: f64) -> CostEstimate {
    let low = estimated_cost.max(loan_size * MIN_COST_FRACTION);
    let high = (2.0 * low).max(loan_size * MIN_HIGH_COST_FRACTION);
    CostEstimate::Band { low, high }
}

fn check_multiplier(multiplier: f64) -> Result<()> {
    if multiplier.is_finite() && multiplier >= 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "leverage multiplier must be at least 1, got {multiplier}"
        )))
    }
}

fn check_finite(what: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("{what} must be finite, got {value}")))
    }
}

fn check_amount(what: &str, value: f64) -> Result<()> {
    check_finite(what, value)?;
    if value < 0.0 {
        return Err(Error::InvalidInput(format!("{what} must not be negative, got {value}")));
    }
    Ok(())
}

fn check_positive(what: &str, value: f64) -> Result<()> {
    check_amount(what, value)?;
    if value == 0.0 {
        return Err(Error::InvalidInput(format!("{what} must be positive")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < EPSILON,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_liquidation_price() {
        assert_eq!(liquidation_price(1000.0, 1.0).unwrap(), 0.0);
        assert_eq!(liquidation_price(123.45, 1.0).unwrap(), 0.0);
        assert_close(liquidation_price(1000.0, 2.0).unwrap(), 750.0);
        assert_close(liquidation_price(1000.0, 3.0).unwrap(), 1000.0);
    }

    #[test]
    fn test_percent_future_price_round_trip() {
        for (price, multiplier, percent) in [
            (1000.0, 2.0, 0.25),
            (87.3, 1.5, -0.4),
            (4321.0, 2.75, 1.3),
        ] {
            let future = future_price_for_percent_change(price, percent, multiplier).unwrap();
            let back = percent_change_for_future_price(price, future, multiplier).unwrap();
            assert!((back - percent).abs() < 1e-3);
        }
    }

    #[test]
    fn test_position_value() {
        // 2x long of 1 ETH at $1000; ETH up 10% means the position is up 20%
        assert_close(position_value_at_future_price(1000.0, 1100.0, 2.0, 1.0).unwrap(), 1200.0);
        assert_close(change_in_position_value(1000.0, 1100.0, 2.0, 1.0).unwrap(), 200.0);
        assert_close(change_in_position_value(1000.0, 1000.0, 2.0, 1.0).unwrap(), 0.0);
    }

    #[test]
    fn test_loan_and_fee() {
        assert_close(loan_size(2.5, 2.0).unwrap(), 3.0);
        assert_close(loan_size(1.0, 2.0).unwrap(), 0.0);
        assert_close(fee_in_eth(0.01, 2.5, 2.0).unwrap(), 0.03);
    }

    #[test]
    fn test_liquidation_penalty() {
        assert_close(liquidation_penalty_percent(1.0).unwrap(), -1.0);
        // 2 * (0.75 * 0.935 - 1)
        assert_close(liquidation_penalty_percent(2.0).unwrap(), -0.5975);
    }

    #[test]
    fn test_cost_band() {
        let loan = 10.0;
        assert_eq!(
            cost_band(loan, loan * 0.1),
            CostEstimate::Band { low: 1.0, high: 2.0 }
        );
        // negative cost (a favourable fill) is clamped to the floors
        assert_eq!(
            cost_band(loan, -0.5),
            CostEstimate::Band { low: 0.1, high: 0.5 }
        );
        assert_eq!(
            cost_band(loan, 0.15),
            CostEstimate::Band { low: 0.15, high: 0.5 }
        );
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(liquidation_price(1000.0, 0.5), Err(Error::InvalidInput(_))));
        assert!(matches!(liquidation_price(1000.0, f64::NAN), Err(Error::InvalidInput(_))));
        assert!(matches!(loan_size(2.0, -1.0), Err(Error::InvalidInput(_))));
        assert!(matches!(
            percent_change_for_future_price(0.0, 100.0, 2.0),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_quote() {
        let quote = PositionQuote::compute(1000.0, 0.01, 2.0, 1.5).unwrap();
        assert_close(quote.loan_size, 1.5);
        assert_close(quote.fee_in_eth, 0.015);
        assert_close(quote.liquidation_price, 750.0);
    }
}

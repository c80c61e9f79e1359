//! Leveraged positions as reported by the contract.

use alloy::primitives::Address;
use liquid_long_chain::CDP;
use serde::{Deserialize, Serialize};

use crate::economics::LIQUIDATION_RATIO;
use crate::error::Error;
use crate::u256_math::wad_to_f64;

/// Snapshot of one position (a Maker CDP opened through LiquidLong).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// CDP id
    pub id: u64,
    /// ETH locked as collateral
    pub collateral_in_eth: f64,
    /// DAI drawn against the collateral
    pub debt_in_dai: f64,
    /// Address the position belongs to
    pub owner: Address,
    /// `true` if held through the owner's proxy rather than directly
    pub proxied: bool,
}

impl Position {
    /// ETH/USD price at which this position gets liquidated.
    ///
    /// `None` for a position without collateral.
    pub fn liquidation_price(&self) -> Option<f64> {
        (self.collateral_in_eth > 0.0)
            .then(|| LIQUIDATION_RATIO * self.debt_in_dai / self.collateral_in_eth)
    }
}

impl TryFrom<CDP> for Position {
    type Error = Error;

    fn try_from(cdp: CDP) -> Result<Self, Self::Error> {
        let id = u64::try_from(cdp.id)
            .map_err(|_| Error::ProtocolViolation(format!("CDP id {} does not fit in u64", cdp.id)))?;
        Ok(Self {
            id,
            collateral_in_eth: wad_to_f64(cdp.lockedAttoeth),
            debt_in_dai: wad_to_f64(cdp.debtInAttodai),
            owner: cdp.owner,
            proxied: !cdp.userOwned,
        })
    }
}

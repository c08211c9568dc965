//! The collateral pool and the two token supplies.

use serde::{Deserialize, Serialize};
use usm_math::{wad_div, wad_mul, Rounding, U256};

use crate::Result;

/// Pool and supply state, all WAD-scaled. The ledger is plain data: the
/// state machine in [`crate::protocol`] computes a whole replacement ledger,
/// runs the guards, and only then swaps it in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveLedger {
    /// Collateral (ETH) held by the pool.
    pub eth_pool: U256,
    /// Outstanding stable-token supply.
    pub usm_supply: U256,
    /// Outstanding equity-token supply.
    pub fum_supply: U256,
}

impl ReserveLedger {
    /// Fraction of the pool's value owed to USM holders:
    /// `usm_supply / (eth_pool · price)`, rounded up (a pessimistic read for
    /// every guard that compares against a ceiling). Zero while the pool or
    /// the USM supply is empty.
    ///
    /// # Errors
    ///
    /// - [`usm_math::MathError`] if the pool's value truncates to zero at
    ///   this price
    pub fn debt_ratio(&self, price: U256) -> Result<U256> {
        if self.eth_pool.is_zero() || self.usm_supply.is_zero() {
            return Ok(U256::zero());
        }
        let pool_value = wad_mul(self.eth_pool, price, Rounding::Down)?;
        Ok(wad_div(self.usm_supply, pool_value, Rounding::Up)?)
    }
}

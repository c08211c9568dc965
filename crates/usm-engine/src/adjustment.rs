//! The two lazily-decayed adjustment variables.
//!
//! Each is a value with the timestamp of its last write; reads decay it
//! forward to `now` without storing, and every committed trade writes the
//! decayed-then-nudged value back. Decay laws, with
//! `f = 2^-(Δt / half_life)`:
//!
//! ```text
//! buy/sell skew:  new = 1 + (old − 1) · f   (approaches neutral 1.0)
//! FUM price floor: new = old · f            (approaches resting 0)
//! ```
//!
//! The skew law is applied in the rearranged form `1 + old·f − f`, which
//! stays in unsigned arithmetic on both sides of neutral.

use serde::{Deserialize, Serialize};
use usm_math::{decay_factor, wad_mul, MathError, Rounding, U256, WAD};

use crate::{Result, BUY_SELL_ADJUSTMENT_HALF_LIFE, MIN_FUM_BUY_PRICE_HALF_LIFE};

/// A stored value and the Unix-seconds timestamp of its last write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedValue {
    /// WAD-scaled stored value.
    pub value: U256,
    /// Unix seconds of the last write.
    pub timestamp: u64,
}

/// Both adjustment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentState {
    buy_sell: TimedValue,
    min_fum_buy: TimedValue,
}

impl Default for AdjustmentState {
    fn default() -> Self {
        Self {
            buy_sell: TimedValue {
                value: WAD,
                timestamp: 0,
            },
            min_fum_buy: TimedValue {
                value: U256::zero(),
                timestamp: 0,
            },
        }
    }
}

impl AdjustmentState {
    /// Fresh state: neutral skew, no floor.
    pub fn new() -> Self {
        Self::default()
    }

    /// The buy/sell skew decayed forward to `now`, not stored.
    ///
    /// # Errors
    ///
    /// - [`MathError::Overflow`] on pathological stored values
    pub fn buy_sell_adjustment(&self, now: u64) -> Result<U256> {
        let elapsed = now.saturating_sub(self.buy_sell.timestamp);
        let factor = decay_factor(elapsed, BUY_SELL_ADJUSTMENT_HALF_LIFE)?;
        let kept = wad_mul(self.buy_sell.value, factor, Rounding::Down)?;
        let raised = WAD.checked_add(kept).ok_or(MathError::Overflow)?;
        Ok(raised.checked_sub(factor).ok_or(MathError::Overflow)?)
    }

    /// The FUM buy price floor decayed forward to `now`, not stored.
    ///
    /// # Errors
    ///
    /// - [`MathError::Overflow`] on pathological stored values
    pub fn min_fum_buy_price(&self, now: u64) -> Result<U256> {
        if self.min_fum_buy.value.is_zero() {
            return Ok(U256::zero());
        }
        let elapsed = now.saturating_sub(self.min_fum_buy.timestamp);
        let factor = decay_factor(elapsed, MIN_FUM_BUY_PRICE_HALF_LIFE)?;
        Ok(wad_mul(self.min_fum_buy.value, factor, Rounding::Up)?)
    }

    /// Store a new skew value as of `now`.
    pub fn set_buy_sell(&mut self, value: U256, now: u64) {
        self.buy_sell = TimedValue {
            value,
            timestamp: now,
        };
    }

    /// Store a new floor value as of `now`.
    pub fn set_min_fum_buy(&mut self, value: U256, now: u64) {
        self.min_fum_buy = TimedValue {
            value,
            timestamp: now,
        };
    }

    /// The raw stored skew, for snapshots.
    pub fn stored_buy_sell(&self) -> TimedValue {
        self.buy_sell
    }

    /// The raw stored floor, for snapshots.
    pub fn stored_min_fum_buy(&self) -> TimedValue {
        self.min_fum_buy
    }
}

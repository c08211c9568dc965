//! Two-sample TWAP over a trading pair's cumulative prices.
//!
//! The pair publishes running sums of its instantaneous price, one per
//! direction, each scaled by 2^112 (the UQ112x112 encoding) and weighted by
//! seconds. The average price over a window is then:
//!
//! ```text
//! TWAP = Δcumulative · 10^(18 + base_decimals − quote_decimals) / (Δt · 2^112)
//! ```
//!
//! where `Δcumulative` is taken from accumulator 0 when the base token is
//! the pair's first token, and from accumulator 1 when the pair lists the
//! tokens in reverse order. The decimal factor converts the pair's raw-unit
//! ratio into a WAD price of the base token in quote terms.

use serde::{Deserialize, Serialize};
use usm_math::{MathError, U256};

use crate::{OracleError, Result};

/// Bit width of the cumulative-price fixed-point encoding.
pub const CUMULATIVE_PRICE_BITS: u32 = 112;

/// One reading of a pair's cumulative-price accumulators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeSample {
    /// Token0-denominated accumulator (price of token0 in token1).
    pub cumulative0: U256,
    /// Token1-denominated accumulator (price of token1 in token0).
    pub cumulative1: U256,
    /// Pair timestamp of the reading, Unix seconds.
    pub timestamp: u64,
}

/// Average price of the base token in quote terms between two samples.
///
/// The accumulators wrap modulo 2^256 by construction, so the difference is
/// taken wrapping, which stays correct across a single wrap.
///
/// # Errors
///
/// - [`OracleError::ZeroElapsedTime`] if the samples do not span any time
/// - [`MathError::Overflow`] if the scaled difference exceeds 256 bits
pub fn compute_twap(
    older: &CumulativeSample,
    newer: &CumulativeSample,
    base_decimals: u32,
    quote_decimals: u32,
    reversed: bool,
) -> Result<U256> {
    let elapsed = newer
        .timestamp
        .checked_sub(older.timestamp)
        .filter(|e| *e > 0)
        .ok_or(OracleError::ZeroElapsedTime {
            timestamp: newer.timestamp,
        })?;

    let delta = if reversed {
        newer.cumulative1.overflowing_sub(older.cumulative1).0
    } else {
        newer.cumulative0.overflowing_sub(older.cumulative0).0
    };

    let exponent = i64::from(base_decimals) + 18 - i64::from(quote_decimals);
    let ten = U256::from(10u64);
    let denominator = U256::from(elapsed)
        .checked_mul(U256::one() << CUMULATIVE_PRICE_BITS as usize)
        .ok_or(MathError::Overflow)?;

    if exponent >= 0 {
        let scale = ten
            .checked_pow(U256::from(exponent as u64))
            .ok_or(MathError::Overflow)?;
        let numerator = delta.checked_mul(scale).ok_or(MathError::Overflow)?;
        Ok(numerator / denominator)
    } else {
        let scale = ten
            .checked_pow(U256::from(exponent.unsigned_abs()))
            .ok_or(MathError::Overflow)?;
        let denominator = denominator.checked_mul(scale).ok_or(MathError::Overflow)?;
        Ok(delta / denominator)
    }
}

/// TWAP feed over a pooled pair, holding the live pair reading plus the two
/// most recent committed samples.
///
/// Quoting always averages between the live reading and the newest committed
/// sample strictly older than it; keeping the previous committed sample as
/// well means a commit immediately followed by a quote still has a nonzero
/// window to average over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PooledTwapFeed {
    base_decimals: u32,
    quote_decimals: u32,
    reversed: bool,
    live: CumulativeSample,
    committed: CumulativeSample,
    previous: CumulativeSample,
}

impl PooledTwapFeed {
    /// Create a feed seeded with one initial pair reading.
    pub fn new(
        base_decimals: u32,
        quote_decimals: u32,
        reversed: bool,
        initial: CumulativeSample,
    ) -> Self {
        Self {
            base_decimals,
            quote_decimals,
            reversed,
            live: initial,
            committed: initial,
            previous: initial,
        }
    }

    /// Record the pair's current accumulator reading.
    pub fn set_pair_reading(&mut self, sample: CumulativeSample) {
        self.live = sample;
    }

    /// Promote the live reading to the committed pair of samples, if newer.
    ///
    /// Driven by the aggregator's refresh, after quoting.
    pub fn commit_sample(&mut self) {
        if self.live.timestamp > self.committed.timestamp {
            tracing::debug!(
                from = self.committed.timestamp,
                to = self.live.timestamp,
                "TWAP sample committed"
            );
            self.previous = self.committed;
            self.committed = self.live;
        }
    }

    /// TWAP between the live reading and the newest committed sample older
    /// than it.
    ///
    /// # Errors
    ///
    /// - [`OracleError::ZeroElapsedTime`] if no committed sample is older
    ///   than the live reading
    pub fn latest_price(&self) -> Result<U256> {
        let older = if self.committed.timestamp < self.live.timestamp {
            &self.committed
        } else {
            &self.previous
        };
        compute_twap(
            older,
            &self.live,
            self.base_decimals,
            self.quote_decimals,
            self.reversed,
        )
    }
}

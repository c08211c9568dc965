//! Half-life decay factors on the WAD scale.
//!
//! `half_exp(x)` approximates `2^-x` for `x >= 0` in WAD units. The exponent
//! is first rounded to the nearest tenth of a half-life; the fractional part
//! is raised via [`HALF_TO_THE_ONE_TENTH`] and the whole halvings are applied
//! as an exact right shift. At whole half-lives the result is therefore
//! exactly `WAD >> k`: three half-lives yield exactly `WAD / 8`.

use crate::wad::{wad_pow, Rounding, U256, WAD};
use crate::{MathError, Result};

/// `0.5^0.1` on the WAD scale, the per-tenth-of-a-half-life decay step.
pub const HALF_TO_THE_ONE_TENTH: U256 = U256([933_032_991_536_807_416, 0, 0, 0]);

/// Beyond this many half-lives the factor underflows to zero outright.
const MAX_HALF_LIVES: u64 = 256;

/// Approximate `2^-power` for a WAD-scale `power`, rounded to the nearest
/// tenth of a half-life.
///
/// Returns zero once the exponent reaches [`MAX_HALF_LIVES`] whole halvings.
///
/// # Errors
///
/// - [`MathError::Overflow`] if the rounding addend overflows (requires a
///   `power` within 2^-64 of the 256-bit ceiling)
pub fn half_exp(power: U256) -> Result<U256> {
    let tenth = WAD / U256::from(10u64);
    let rounding_addend = WAD / U256::from(20u64);
    let tenths = power
        .checked_add(rounding_addend)
        .ok_or(MathError::Overflow)?
        / tenth;
    if tenths >= U256::from(MAX_HALF_LIVES * 10) {
        return Ok(U256::zero());
    }
    let tenths = tenths.low_u64();
    let whole_halvings = (tenths / 10) as usize;
    let fractional = wad_pow(HALF_TO_THE_ONE_TENTH, tenths % 10, Rounding::Down)?;
    Ok(fractional >> whole_halvings)
}

/// Decay factor `2^-(elapsed / half_life)` on the WAD scale.
///
/// # Errors
///
/// - [`MathError::DivisionByZero`] if `half_life` is zero
pub fn decay_factor(elapsed: u64, half_life: u64) -> Result<U256> {
    if half_life == 0 {
        return Err(MathError::DivisionByZero);
    }
    let power = U256::from(elapsed)
        .checked_mul(WAD)
        .ok_or(MathError::Overflow)?
        / U256::from(half_life);
    half_exp(power)
}

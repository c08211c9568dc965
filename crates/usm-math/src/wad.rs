//! WAD-scale (10^18) fixed-point arithmetic on 256-bit unsigned integers.
//!
//! A value `x` on the WAD scale represents the rational `x / 10^18`, so
//! `WAD` is 1.0 and `WAD / 2` is 0.5. Multiplication and division take an
//! explicit [`Rounding`] so each call site states which party the residual
//! wei favors.
//!
//! The cube root is an integer Newton–Raphson iteration: starting above the
//! true root, each step is a strict improvement, and iteration stops at the
//! first non-decreasing step. The result `r` of `wad_cbrt(y, Down)` satisfies
//! `r^3 <= y * WAD^2 < (r + 1)^3`.

use crate::{MathError, Result};

// The generated impls spell out unqualified two-parameter `Result`s, so the
// macro must expand where the crate's one-parameter alias is not in scope.
mod uint_types {
    use uint::construct_uint;

    construct_uint! {
        /// 256-bit unsigned integer. Protocol amounts, prices and ratios are
        /// all carried as `U256` on the WAD scale.
        pub struct U256(4);
    }
}

pub use uint_types::U256;

/// The fixed-point scale: 10^18 represents 1.0.
pub const WAD: U256 = U256([1_000_000_000_000_000_000, 0, 0, 0]);

// Serialized as a decimal string: U256 does not fit in any JSON number type.
impl serde::Serialize for U256 {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for U256 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        U256::from_dec_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Rounding direction for a fixed-point multiply or divide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Truncate toward zero.
    Down,
    /// Round away from zero when a remainder exists.
    Up,
}

fn div_round(numerator: U256, denominator: U256, round: Rounding) -> Result<U256> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let quotient = numerator / denominator;
    match round {
        Rounding::Down => Ok(quotient),
        Rounding::Up => {
            if (numerator % denominator).is_zero() {
                Ok(quotient)
            } else {
                quotient
                    .checked_add(U256::one())
                    .ok_or(MathError::Overflow)
            }
        }
    }
}

/// Multiply two WAD-scale values: `x * y / WAD`, rounded as requested.
///
/// # Errors
///
/// - [`MathError::Overflow`] if `x * y` exceeds 256 bits
pub fn wad_mul(x: U256, y: U256, round: Rounding) -> Result<U256> {
    let product = x.checked_mul(y).ok_or(MathError::Overflow)?;
    div_round(product, WAD, round)
}

/// Divide two WAD-scale values: `x * WAD / y`, rounded as requested.
///
/// # Errors
///
/// - [`MathError::Overflow`] if `x * WAD` exceeds 256 bits
/// - [`MathError::DivisionByZero`] if `y` is zero
pub fn wad_div(x: U256, y: U256, round: Rounding) -> Result<U256> {
    let scaled = x.checked_mul(WAD).ok_or(MathError::Overflow)?;
    div_round(scaled, y, round)
}

/// Square a WAD-scale value: `x^2 / WAD`.
///
/// # Errors
///
/// - [`MathError::Overflow`] if `x^2` exceeds 256 bits
pub fn wad_squared(x: U256, round: Rounding) -> Result<U256> {
    wad_mul(x, x, round)
}

/// Cube a WAD-scale value: `x^3 / WAD^2`, with a single terminal rounding
/// step so the two WAD divisions do not compound.
///
/// # Errors
///
/// - [`MathError::Overflow`] if `x^3` exceeds 256 bits
pub fn wad_cubed(x: U256, round: Rounding) -> Result<U256> {
    let squared = x.checked_mul(x).ok_or(MathError::Overflow)?;
    let cubed = squared.checked_mul(x).ok_or(MathError::Overflow)?;
    let scale = WAD.checked_mul(WAD).ok_or(MathError::Overflow)?;
    div_round(cubed, scale, round)
}

/// Integer `n`-th power of a WAD-scale value by square-and-multiply, with
/// every intermediate multiply rounded as requested. `wad_pow(x, 0, _)` is
/// `WAD`.
///
/// # Errors
///
/// - [`MathError::Overflow`] if any intermediate product exceeds 256 bits
pub fn wad_pow(x: U256, n: u64, round: Rounding) -> Result<U256> {
    let mut base = x;
    let mut exponent = n;
    let mut acc = if exponent % 2 == 1 { base } else { WAD };
    exponent /= 2;
    while exponent != 0 {
        base = wad_mul(base, base, round)?;
        if exponent % 2 == 1 {
            acc = wad_mul(acc, base, round)?;
        }
        exponent /= 2;
    }
    Ok(acc)
}

/// Cube root of a WAD-scale value.
///
/// Computes the integer cube root of `y * WAD^2` by Newton–Raphson, seeded
/// at `(y + 2 * WAD) / 3` (above the true root for all `y`), iterating
/// `next = (2 * root + y * WAD^2 / root^2) / 3` while strictly decreasing.
/// `Down` returns the floor root; `Up` adds one wei when the floor root's
/// cube falls short of the target. `wad_cbrt(0, _)` is zero.
///
/// # Errors
///
/// - [`MathError::Overflow`] if `y * WAD^2` or an intermediate square
///   exceeds 256 bits
pub fn wad_cbrt(y: U256, round: Rounding) -> Result<U256> {
    if y.is_zero() {
        return Ok(U256::zero());
    }
    let scale = WAD.checked_mul(WAD).ok_or(MathError::Overflow)?;
    let target = y.checked_mul(scale).ok_or(MathError::Overflow)?;
    let three = U256::from(3u64);

    let mut root = y
        .checked_add(WAD.checked_mul(U256::from(2u64)).ok_or(MathError::Overflow)?)
        .ok_or(MathError::Overflow)?
        / three;
    loop {
        let root_squared = root.checked_mul(root).ok_or(MathError::Overflow)?;
        let next = root
            .checked_add(root)
            .ok_or(MathError::Overflow)?
            .checked_add(target / root_squared)
            .ok_or(MathError::Overflow)?
            / three;
        if next < root {
            root = next;
        } else {
            break;
        }
    }

    if round == Rounding::Up {
        let cube = root
            .checked_mul(root)
            .ok_or(MathError::Overflow)?
            .checked_mul(root)
            .ok_or(MathError::Overflow)?;
        if cube < target {
            root = root.checked_add(U256::one()).ok_or(MathError::Overflow)?;
        }
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wad(n: u64) -> U256 {
        U256::from(n) * WAD
    }

    #[test]
    fn test_wad_mul_exact() {
        let x = U256::from(3_000_000_000_000_000_000u64);
        let y = U256::from(1_500_000_000_000_000_000u64);
        let expected = U256::from(4_500_000_000_000_000_000u64);
        assert_eq!(wad_mul(x, y, Rounding::Down).expect("mul"), expected);
        assert_eq!(wad_mul(x, y, Rounding::Up).expect("mul"), expected);
    }

    #[test]
    fn test_wad_mul_rounding_differs_on_remainder() {
        // 1 wei * 1 wei is far below 1 wei.
        let one = U256::one();
        assert_eq!(wad_mul(one, one, Rounding::Down).expect("mul"), U256::zero());
        assert_eq!(wad_mul(one, one, Rounding::Up).expect("mul"), one);
    }

    #[test]
    fn test_wad_div_thirds() {
        let down = wad_div(WAD, wad(3), Rounding::Down).expect("div");
        let up = wad_div(WAD, wad(3), Rounding::Up).expect("div");
        assert_eq!(down, U256::from(333_333_333_333_333_333u64));
        assert_eq!(up, U256::from(333_333_333_333_333_334u64));
    }

    #[test]
    fn test_wad_div_by_zero() {
        let err = wad_div(WAD, U256::zero(), Rounding::Down).expect_err("zero divisor");
        assert_eq!(err, MathError::DivisionByZero);
    }

    #[test]
    fn test_wad_mul_overflow() {
        let err = wad_mul(U256::max_value(), wad(2), Rounding::Down).expect_err("overflow");
        assert_eq!(err, MathError::Overflow);
    }

    #[test]
    fn test_wad_squared_and_cubed() {
        assert_eq!(wad_squared(wad(2), Rounding::Down).expect("sq"), wad(4));
        assert_eq!(wad_cubed(wad(2), Rounding::Down).expect("cube"), wad(8));
        assert_eq!(wad_cubed(wad(10), Rounding::Up).expect("cube"), wad(1000));
    }

    #[test]
    fn test_wad_pow() {
        assert_eq!(wad_pow(wad(7), 0, Rounding::Down).expect("pow"), WAD);
        assert_eq!(wad_pow(wad(2), 10, Rounding::Down).expect("pow"), wad(1024));
        assert_eq!(wad_pow(wad(3), 3, Rounding::Down).expect("pow"), wad(27));
    }

    #[test]
    fn test_wad_cbrt_zero_and_exact_cubes() {
        assert_eq!(wad_cbrt(U256::zero(), Rounding::Down).expect("cbrt"), U256::zero());
        assert_eq!(wad_cbrt(U256::zero(), Rounding::Up).expect("cbrt"), U256::zero());
        assert_eq!(wad_cbrt(WAD, Rounding::Down).expect("cbrt"), WAD);
        assert_eq!(wad_cbrt(WAD, Rounding::Up).expect("cbrt"), WAD);
        assert_eq!(wad_cbrt(wad(8), Rounding::Down).expect("cbrt"), wad(2));
        assert_eq!(wad_cbrt(wad(8), Rounding::Up).expect("cbrt"), wad(2));
        assert_eq!(wad_cbrt(wad(27), Rounding::Down).expect("cbrt"), wad(3));
    }

    #[test]
    fn test_wad_cbrt_brackets_target() {
        let scale = WAD * WAD;
        for k in [1u64, 2, 3, 7, 10, 99, 1001, 10_000, 99_999, 1_000_001] {
            let y = wad(k);
            let target = y * scale;

            let down = wad_cbrt(y, Rounding::Down).expect("cbrt down");
            assert!(down * down * down <= target, "floor root too big for {k}");
            let above = down + U256::one();
            assert!(above * above * above > target, "floor root too small for {k}");

            let up = wad_cbrt(y, Rounding::Up).expect("cbrt up");
            assert!(up * up * up >= target, "ceil root too small for {k}");
            assert!(up <= down + U256::one(), "ceil root too big for {k}");
        }
    }

    #[test]
    fn test_decimal_string_conversions() {
        let value = U256::from_dec_str("250000000000000000000").expect("parse");
        assert_eq!(value, wad(250));
        assert_eq!(value.to_string(), "250000000000000000000");
        assert!(U256::from_dec_str("not a number").is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let value = wad(123) + U256::from(456u64);
        let json = serde_json::to_string(&value).expect("serialize");
        assert_eq!(json, "\"123000000000000000456\"");
        let back: U256 = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, value);
    }

    #[test]
    fn test_serde_rejects_garbage() {
        assert!(serde_json::from_str::<U256>("\"not a number\"").is_err());
    }
}

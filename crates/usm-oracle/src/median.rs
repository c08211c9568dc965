//! Median-of-three selection.

use usm_math::U256;

/// Median of three values in exactly three comparisons.
///
/// With `ab = a > b`, `bc = b > c`, `ca = c > a`: `a` is the median when
/// `ca == ab`, else `b` when `ab == bc`, else `c`. Ties resolve to either of
/// the tied values, which are equal anyway.
pub fn median3(a: U256, b: U256, c: U256) -> U256 {
    let ab = a > b;
    let bc = b > c;
    let ca = c > a;
    if ca == ab {
        a
    } else if ab == bc {
        b
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_orderings() {
        let (lo, mid, hi) = (U256::from(1u64), U256::from(2u64), U256::from(3u64));
        assert_eq!(median3(lo, mid, hi), mid);
        assert_eq!(median3(lo, hi, mid), mid);
        assert_eq!(median3(mid, lo, hi), mid);
        assert_eq!(median3(mid, hi, lo), mid);
        assert_eq!(median3(hi, lo, mid), mid);
        assert_eq!(median3(hi, mid, lo), mid);
    }

    #[test]
    fn test_ties() {
        let (x, y) = (U256::from(5u64), U256::from(9u64));
        assert_eq!(median3(x, x, y), x);
        assert_eq!(median3(x, y, x), x);
        assert_eq!(median3(y, x, x), x);
        assert_eq!(median3(x, x, x), x);
    }

    #[test]
    fn test_price_fixtures() {
        // Chainlink 385.98, Compound 414.174999, pooled TWAP 614.34...: the
        // Compound quote sits in the middle.
        let chainlink = U256::from(385_980_000_000_000_000_000u128);
        let compound = U256::from(414_174_999_000_000_000_000u128);
        let twap = U256::from(614_342_807_191_037_521_556u128);
        assert_eq!(median3(chainlink, compound, twap), compound);
    }
}

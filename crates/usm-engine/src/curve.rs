//! Quote prices and the closed-form trade integrals.
//!
//! FUM trades price each marginal unit off the pool, so a fund or defund of
//! size `Δ` integrates `1 / (pool + x)` over the trade; the closed forms
//! below are those integrals solved for the output amount. USM trades hold
//! the invariant `pool³ / usm²` through the trade, which is where the cube
//! roots come from. Every rounding direction favors the pool over the
//! caller.
//!
//! All functions here are pure: they take scalars and return scalars, and
//! the state machine decides what to do with the results.

use usm_math::{
    wad_cbrt, wad_cubed, wad_div, wad_mul, wad_squared, MathError, Rounding, U256, WAD,
};

use crate::{Result, Side, MAX_DEBT_RATIO};

fn quote_rounding(side: Side) -> Rounding {
    match side {
        Side::Buy => Rounding::Up,
        Side::Sell => Rounding::Down,
    }
}

/// ETH value of one USM at the reference price: `1 / price`.
///
/// # Errors
///
/// - [`MathError::DivisionByZero`] if `price` is zero
pub fn usm_to_eth(price: U256, side: Side) -> Result<U256> {
    Ok(wad_div(WAD, price, quote_rounding(side))?)
}

/// USM quote price in ETH terms, skewed by the buy/sell adjustment.
///
/// The skew widens only the side the last trades moved against: a below-
/// neutral adjustment raises the buy price, an above-neutral one lowers the
/// sell price, and the opposite side stays at the unadjusted quote.
///
/// # Errors
///
/// - [`MathError::DivisionByZero`] if `price` or `adjustment` is zero on a
///   path that divides by it
pub fn usm_price(price: U256, adjustment: U256, side: Side) -> Result<U256> {
    let base = usm_to_eth(price, side)?;
    match side {
        Side::Buy if adjustment < WAD => Ok(wad_div(base, adjustment, Rounding::Up)?),
        Side::Sell if adjustment > WAD => Ok(wad_div(base, adjustment, Rounding::Down)?),
        _ => Ok(base),
    }
}

/// Pool equity backing FUM, in ETH: `eth_pool − usm_supply / price`,
/// saturating at zero when the pool is underwater. The debt leg rounds
/// opposite to the requested direction so the buffer itself rounds with it.
///
/// # Errors
///
/// - [`MathError::DivisionByZero`] if `price` is zero
pub fn buffer(eth_pool: U256, usm_supply: U256, price: U256, round: Rounding) -> Result<U256> {
    let debt_round = match round {
        Rounding::Up => Rounding::Down,
        Rounding::Down => Rounding::Up,
    };
    let debt = wad_div(usm_supply, price, debt_round)?;
    Ok(eth_pool.saturating_sub(debt))
}

/// FUM quote price in ETH terms.
///
/// While no FUM exists the quote is flat at one USM's worth of ETH.
/// Otherwise it is `buffer / fum_supply`, skewed by the adjustment on the
/// widening side only (above-neutral raises the buy price, below-neutral
/// lowers the sell price), and the buy side is floored at
/// `min_fum_buy_price`.
///
/// # Errors
///
/// - [`MathError::DivisionByZero`] if `price` is zero
#[allow(clippy::too_many_arguments)]
pub fn fum_price(
    eth_pool: U256,
    usm_supply: U256,
    fum_supply: U256,
    price: U256,
    adjustment: U256,
    min_fum_buy_price: U256,
    side: Side,
) -> Result<U256> {
    if fum_supply.is_zero() {
        return usm_to_eth(price, side);
    }
    let round = quote_rounding(side);
    let equity = buffer(eth_pool, usm_supply, price, round)?;
    let mut quote = wad_div(equity, fum_supply, round)?;
    match side {
        Side::Buy => {
            if adjustment > WAD {
                quote = wad_mul(quote, adjustment, Rounding::Up)?;
            }
            quote = quote.max(min_fum_buy_price);
        }
        Side::Sell => {
            if adjustment < WAD {
                quote = wad_mul(quote, adjustment, Rounding::Down)?;
            }
        }
    }
    Ok(quote)
}

/// The FUM price floor recorded when a fund arrives with the debt ratio
/// above the ceiling: the per-FUM value of the minimum equity the pool must
/// retain, `(1 − MAX_DEBT_RATIO) · eth_pool / fum_supply`, rounded up.
///
/// # Errors
///
/// - [`MathError::DivisionByZero`] if `fum_supply` is zero
pub fn funding_floor(eth_pool: U256, fum_supply: U256) -> Result<U256> {
    let retained = WAD
        .checked_sub(MAX_DEBT_RATIO)
        .ok_or(MathError::Overflow)?;
    let minimum_equity = wad_mul(retained, eth_pool, Rounding::Up)?;
    Ok(wad_div(minimum_equity, fum_supply, Rounding::Up)?)
}

/// FUM created by funding `eth_in` while no USM debt exists: the price is
/// flat, `eth_in / fum_buy_price`.
///
/// # Errors
///
/// - [`MathError::DivisionByZero`] if `fum_buy_price` is zero
pub fn fum_from_fund_flat(eth_in: U256, fum_buy_price: U256) -> Result<U256> {
    Ok(wad_div(eth_in, fum_buy_price, Rounding::Down)?)
}

/// FUM created by funding `eth_in` against a live pool: the marginal price
/// slides up with the pool, integrating to
/// `eth_in · pool / ((pool + eth_in) · fum_buy_price)`.
///
/// # Errors
///
/// - [`MathError::Overflow`] on 256-bit overflow of the numerator
/// - [`MathError::DivisionByZero`] if the denominator is zero
pub fn fum_from_fund(eth_pool: U256, eth_in: U256, fum_buy_price: U256) -> Result<U256> {
    let numerator = eth_in.checked_mul(eth_pool).ok_or(MathError::Overflow)?;
    let grown = eth_pool.checked_add(eth_in).ok_or(MathError::Overflow)?;
    let denominator = wad_mul(grown, fum_buy_price, Rounding::Up)?;
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero.into());
    }
    Ok(numerator / denominator)
}

/// ETH released by defunding `fum_in`: the marginal price slides down as
/// the pool shrinks, integrating to
/// `pool · (fum_in · fum_sell_price) / (pool + fum_in · fum_sell_price)`.
///
/// # Errors
///
/// - [`MathError::Overflow`] on 256-bit overflow of the numerator
/// - [`MathError::DivisionByZero`] if the denominator is zero
pub fn eth_from_defund(eth_pool: U256, fum_in: U256, fum_sell_price: U256) -> Result<U256> {
    let value_floor = wad_mul(fum_in, fum_sell_price, Rounding::Down)?;
    let value_ceil = wad_mul(fum_in, fum_sell_price, Rounding::Up)?;
    let numerator = eth_pool.checked_mul(value_floor).ok_or(MathError::Overflow)?;
    let denominator = eth_pool.checked_add(value_ceil).ok_or(MathError::Overflow)?;
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero.into());
    }
    Ok(numerator / denominator)
}

/// USM created by minting with `eth_in` against a live pool, holding the
/// `pool³ / usm²` invariant:
///
/// ```text
/// usm₁ = ∛(F · usm₀²)  where
/// F = ((pool₁/pool₀)³ − 1) · pool₀ / usm_buy_price + usm₀
/// ```
///
/// Returns `usm₁ − usm₀`, which truncates to zero for vanishing inputs.
///
/// # Errors
///
/// - [`MathError::Overflow`] on 256-bit overflow
/// - [`MathError::DivisionByZero`] if `eth_pool` or `usm_buy_price` is zero
pub fn usm_from_mint(
    eth_pool: U256,
    usm_supply: U256,
    eth_in: U256,
    usm_buy_price: U256,
) -> Result<U256> {
    let grown = eth_pool.checked_add(eth_in).ok_or(MathError::Overflow)?;
    let pool_ratio = wad_div(grown, eth_pool, Rounding::Down)?;
    let growth = wad_cubed(pool_ratio, Rounding::Down)?
        .checked_sub(WAD)
        .ok_or(MathError::Overflow)?;
    if usm_buy_price.is_zero() {
        return Err(MathError::DivisionByZero.into());
    }
    let funded = growth.checked_mul(eth_pool).ok_or(MathError::Overflow)? / usm_buy_price;
    let integral = funded.checked_add(usm_supply).ok_or(MathError::Overflow)?;
    let supply_squared = wad_squared(usm_supply, Rounding::Down)?;
    let inner = wad_mul(integral, supply_squared, Rounding::Down)?;
    let new_supply = wad_cbrt(inner, Rounding::Down)?;
    Ok(new_supply.saturating_sub(usm_supply))
}

/// ETH released by burning `usm_in`, the mint integral run in reverse:
///
/// ```text
/// pool₁ = ∛(pool₀² · (pool₀ − F))  where
/// F = usm_sell_price · usm₀ · (1 − (usm₁/usm₀)³)
/// ```
///
/// Returns `pool₀ − pool₁`, which truncates to zero for vanishing inputs.
/// The caller must have checked `usm_in <= usm_supply`.
///
/// # Errors
///
/// - [`MathError::Overflow`] on 256-bit overflow, including `usm_in`
///   exceeding the supply
/// - [`MathError::DivisionByZero`] if `usm_supply` is zero
pub fn eth_from_burn(
    eth_pool: U256,
    usm_supply: U256,
    usm_in: U256,
    usm_sell_price: U256,
) -> Result<U256> {
    let remaining_supply = usm_supply.checked_sub(usm_in).ok_or(MathError::Overflow)?;
    let shrink = if remaining_supply.is_zero() {
        U256::zero()
    } else {
        let supply_ratio = wad_div(remaining_supply, usm_supply, Rounding::Up)?;
        wad_cubed(supply_ratio, Rounding::Up)?
    };
    let burned_fraction = WAD.checked_sub(shrink).ok_or(MathError::Overflow)?;
    let debt_value = wad_mul(usm_sell_price, usm_supply, Rounding::Down)?;
    let released = wad_mul(debt_value, burned_fraction, Rounding::Down)?;
    let retained = eth_pool.checked_sub(released).ok_or(MathError::Overflow)?;
    let inner = wad_mul(wad_squared(eth_pool, Rounding::Up)?, retained, Rounding::Up)?;
    let new_pool = wad_cbrt(inner, Rounding::Up)?;
    Ok(eth_pool.saturating_sub(new_pool))
}

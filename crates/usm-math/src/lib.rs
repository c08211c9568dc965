//! # usm-math
//!
//! Fixed-point arithmetic for the USM/FUM reserve engine.
//!
//! All protocol quantities (ETH amounts, token supplies, prices, ratios) are
//! 256-bit unsigned integers scaled by `WAD` = 10^18, so `WAD` itself
//! represents 1.0. Every rounding step is explicit: callers pick
//! [`Rounding::Down`] or [`Rounding::Up`] so that each formula can round
//! against the caller and the protocol never leaks value through truncation.
//!
//! ## Modules
//!
//! - [`wad`] — the `U256` type, WAD multiply/divide, powers and the integer
//!   cube root used by the mint/burn integrals
//! - [`decay`] — half-life decay factors (`2^-x` on the WAD scale)

pub mod decay;
pub mod wad;

pub use decay::{decay_factor, half_exp, HALF_TO_THE_ONE_TENTH};
pub use wad::{
    wad_cbrt, wad_cubed, wad_div, wad_mul, wad_pow, wad_squared, Rounding, U256, WAD,
};

/// Error types for fixed-point operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MathError {
    /// An intermediate product or sum exceeded 256 bits.
    #[error("arithmetic overflow")]
    Overflow,

    /// Division by zero.
    #[error("division by zero")]
    DivisionByZero,
}

/// Convenience result type for math operations.
pub type Result<T> = std::result::Result<T, MathError>;
